//! Sample frames and the output register that hands them to the sink.

use crate::config::FrameConfig;
use crate::core::SampleSink;

/// One frame of samples: M converters × S samples, NP-bit words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFrame {
    sequence: u64,
    m: usize,
    s: usize,
    n: u32,
    np: u32,
    cs: u32,
    words: Vec<u32>,
}

fn mask(bits: u32) -> u32 {
    if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 }
}

impl SampleFrame {
    /// An all-zero frame for `geometry`.
    pub fn new(geometry: &FrameConfig, sequence: u64) -> Self {
        Self::from_words(geometry, sequence, vec![0; geometry.words()])
    }

    /// Frame from raw NP-bit words indexed `c·S + s`.
    pub fn from_words(geometry: &FrameConfig, sequence: u64, mut words: Vec<u32>) -> Self {
        words.resize(geometry.words(), 0);
        Self {
            sequence,
            m: geometry.m,
            s: geometry.s,
            n: geometry.n,
            np: geometry.np,
            cs: geometry.cs,
            words,
        }
    }

    /// Position of this frame in the link's output stream, from 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Converters.
    pub fn converters(&self) -> usize {
        self.m
    }

    /// Samples per converter.
    pub fn samples_per_converter(&self) -> usize {
        self.s
    }

    /// Raw NP-bit word of sample `sample` of converter `converter`.
    pub fn raw(&self, converter: usize, sample: usize) -> u32 {
        self.words
            .get(converter * self.s + sample)
            .copied()
            .unwrap_or(0)
    }

    /// The N-bit sample value.
    pub fn sample(&self, converter: usize, sample: usize) -> u32 {
        (self.raw(converter, sample) >> (self.np - self.n)) & mask(self.n)
    }

    /// The CS control bits of the word.
    pub fn control(&self, converter: usize, sample: usize) -> u32 {
        (self.raw(converter, sample) >> (self.np - self.n - self.cs)) & mask(self.cs)
    }

    /// All samples of one converter.
    pub fn converter(&self, converter: usize) -> Vec<u32> {
        (0..self.s).map(|s| self.sample(converter, s)).collect()
    }

    /// Raw words, indexed `c·S + s`.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Samples packed big-endian into whole octets, converter-major.
    pub fn pack(&self) -> Vec<u8> {
        let width = self.n.div_ceil(8) as usize;
        let mut out = Vec::with_capacity(self.words.len() * width);
        for c in 0..self.m {
            for s in 0..self.s {
                let bytes = self.sample(c, s).to_be_bytes();
                out.extend_from_slice(&bytes[4 - width..]);
            }
        }
        out
    }
}

/// One-frame output register between the transport layer and the sink.
#[derive(Debug, Clone, Default)]
pub struct FrameAssembler {
    pending: Option<SampleFrame>,
    next_sequence: u64,
    delivered: u64,
}

impl FrameAssembler {
    /// Empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame is waiting for the sink.
    pub fn is_full(&self) -> bool {
        self.pending.is_some()
    }

    /// Frames handed to the sink.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Discard the pending frame. Sequence numbers keep counting.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Build a frame from demapped words into the register.
    ///
    /// Returns `false` and keeps the register unchanged if it is still full.
    pub fn load(&mut self, geometry: &FrameConfig, words: Vec<u32>) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(SampleFrame::from_words(geometry, self.next_sequence, words));
        self.next_sequence += 1;
        true
    }

    /// The pending frame, if any.
    pub fn peek(&self) -> Option<&SampleFrame> {
        self.pending.as_ref()
    }

    /// Hand the pending frame to `sink` if it is ready. Returns `true` on delivery.
    pub fn drain<S: SampleSink + ?Sized>(&mut self, sink: &mut S) -> bool {
        if !sink.is_ready() {
            return false;
        }
        match self.pending.take() {
            Some(frame) => {
                sink.accept(frame);
                self.delivered += 1;
                true
            }
            None => false,
        }
    }
}
