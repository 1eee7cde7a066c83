//! Transport layer: mapping between lane octets and converter sample words.
//!
//! One frame carries F octets on each of L lanes. The frame bit stream is lane
//! 0 octets 0..F, then lane 1, and so on, MSB first. Sample `s` of converter
//! `c` occupies the NP bits starting at `(c·S + s)·NP`; inside a word the N
//! sample bits come first, then CS control bits, then tail bits. Whatever is
//! left of the frame after M·S·NP bits is tail.

use log::debug;

use crate::config::FrameConfig;

/// What a frame bit carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitRole {
    /// Sample bit `bit` (0 = MSB) of sample `sample` of converter `converter`.
    Sample {
        /// Converter index.
        converter: usize,
        /// Sample index within the frame.
        sample: usize,
        /// Bit index, MSB first.
        bit: u32,
    },
    /// Control bit `bit` (0 = MSB) of the word.
    Control {
        /// Converter index.
        converter: usize,
        /// Sample index within the frame.
        sample: usize,
        /// Bit index, MSB first.
        bit: u32,
    },
    /// Tail bit of a word or of the frame.
    Tail,
}

/// Where a frame bit lives on the lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitSlot {
    /// Lane index.
    pub lane: usize,
    /// Octet within the lane's part of the frame.
    pub octet: usize,
    /// Bit within the octet, 7 = MSB.
    pub bit: u32,
}

/// A run of bits of one word that lie in one frame octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    /// Octet index in the lane-major frame buffer.
    index: usize,
    /// Right shift applied to the octet.
    shift: u32,
    /// Bits taken.
    width: u32,
}

/// Precomputed word ↔ octet mapping for one frame geometry.
#[derive(Debug, Clone)]
pub struct OffsetTable {
    geometry: FrameConfig,
    words: Vec<Vec<Segment>>,
}

impl OffsetTable {
    /// Build the table for `geometry`.
    pub fn new(geometry: FrameConfig) -> Self {
        let np = geometry.np as usize;
        let words = (0..geometry.words())
            .map(|w| {
                let mut segments = Vec::new();
                let mut pos = w * np;
                let end = pos + np;
                while pos < end {
                    let index = pos / 8;
                    let offset = pos % 8;
                    let width = (8 - offset).min(end - pos);
                    segments.push(Segment {
                        index,
                        shift: (8 - offset - width) as u32,
                        width: width as u32,
                    });
                    pos += width;
                }
                segments
            })
            .collect();
        debug!(
            "transport: offset table for L={} M={} N={} NP={} F={} S={} CS={}",
            geometry.l, geometry.m, geometry.n, geometry.np, geometry.f, geometry.s, geometry.cs
        );
        Self { geometry, words }
    }

    /// Frame geometry.
    pub fn geometry(&self) -> &FrameConfig {
        &self.geometry
    }

    /// Frame bit at which sample `sample` of converter `converter` starts.
    pub fn word_offset(&self, converter: usize, sample: usize) -> usize {
        (converter * self.geometry.s + sample) * self.geometry.np as usize
    }

    /// Lane position of frame bit `frame_bit`.
    pub fn slot(&self, frame_bit: usize) -> BitSlot {
        let lane_bits = 8 * self.geometry.f;
        let within = frame_bit % lane_bits;
        BitSlot {
            lane: frame_bit / lane_bits,
            octet: within / 8,
            bit: 7 - (within % 8) as u32,
        }
    }

    /// Role of frame bit `frame_bit`.
    pub fn locate(&self, frame_bit: usize) -> BitRole {
        let g = &self.geometry;
        if frame_bit >= g.payload_bits() {
            return BitRole::Tail;
        }
        let np = g.np as usize;
        let word = frame_bit / np;
        let bit = (frame_bit % np) as u32;
        let (converter, sample) = (word / g.s, word % g.s);
        if bit < g.n {
            BitRole::Sample {
                converter,
                sample,
                bit,
            }
        } else if bit < g.n + g.cs {
            BitRole::Control {
                converter,
                sample,
                bit: bit - g.n,
            }
        } else {
            BitRole::Tail
        }
    }

    /// Extract the M·S words of NP bits from a lane-major frame of F·L octets.
    ///
    /// Words are indexed `c·S + s`. Missing octets read as zero.
    pub fn demap(&self, frame: &[u8]) -> Vec<u32> {
        self.words
            .iter()
            .map(|segments| {
                segments.iter().fold(0u32, |acc, seg| {
                    let octet = frame.get(seg.index).copied().unwrap_or(0);
                    let bits = (u32::from(octet) >> seg.shift) & ((1u32 << seg.width) - 1);
                    (acc << seg.width) | bits
                })
            })
            .collect()
    }

    /// Place words into a lane-major frame of F·L octets. Tail bits are zero.
    pub fn map(&self, words: &[u32]) -> Vec<u8> {
        let mut frame = vec![0u8; self.geometry.f * self.geometry.l];
        for (segments, &word) in self.words.iter().zip(words) {
            let mut remaining: u32 = segments.iter().map(|s| s.width).sum();
            for seg in segments {
                remaining -= seg.width;
                let bits = (word >> remaining) & ((1u32 << seg.width) - 1);
                if let Some(octet) = frame.get_mut(seg.index) {
                    *octet |= (bits << seg.shift) as u8;
                }
            }
        }
        frame
    }
}

/// Collects aligned, descrambled lane octets into frames and demaps them.
#[derive(Debug, Clone)]
pub struct TransportDecoder {
    table: OffsetTable,
    frame: Vec<u8>,
    filled: usize,
    in_frame: bool,
}

impl TransportDecoder {
    /// Decoder for `geometry`.
    pub fn new(geometry: FrameConfig) -> Self {
        Self {
            frame: vec![0; geometry.f * geometry.l],
            table: OffsetTable::new(geometry),
            filled: 0,
            in_frame: false,
        }
    }

    /// The offset table.
    pub fn table(&self) -> &OffsetTable {
        &self.table
    }

    /// Drop a partially collected frame.
    pub fn reset(&mut self) {
        self.filled = 0;
        self.in_frame = false;
    }

    /// Push one octet per lane. `frame_start` marks octet 0 of a frame.
    ///
    /// Returns the frame's words on the F-th octet.
    pub fn push(&mut self, octets: &[u8], frame_start: bool) -> Option<Vec<u32>> {
        if frame_start {
            self.filled = 0;
            self.in_frame = true;
        }
        if !self.in_frame {
            return None;
        }

        let f = self.table.geometry.f;
        for (lane, &octet) in octets.iter().enumerate().take(self.table.geometry.l) {
            self.frame[lane * f + self.filled] = octet;
        }
        self.filled += 1;

        if self.filled < f {
            return None;
        }
        self.in_frame = false;
        self.filled = 0;
        Some(self.table.demap(&self.frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn scenario_a() -> FrameConfig {
        FrameConfig {
            l: 4,
            m: 4,
            n: 8,
            np: 8,
            f: 2,
            s: 1,
            cs: 0,
        }
    }

    fn random_geometry(rng: &mut StdRng) -> FrameConfig {
        loop {
            let np = rng.gen_range(1..=32u32);
            let n = rng.gen_range(1..=np);
            let cs = rng.gen_range(0..=(np - n).min(3));
            let g = FrameConfig {
                l: rng.gen_range(1..=8),
                m: rng.gen_range(1..=8),
                n,
                np,
                f: rng.gen_range(1..=16),
                s: rng.gen_range(1..=4),
                cs,
            };
            if g.frame_bits() >= g.payload_bits() {
                return g;
            }
        }
    }

    #[test]
    fn test_scenario_a_layout() {
        let table = OffsetTable::new(scenario_a());
        // Converters 0 and 1 on lane 0, 2 and 3 on lane 1.
        assert_eq!(table.slot(table.word_offset(0, 0)).lane, 0);
        assert_eq!(table.slot(table.word_offset(1, 0)), BitSlot { lane: 0, octet: 1, bit: 7 });
        assert_eq!(table.slot(table.word_offset(2, 0)), BitSlot { lane: 1, octet: 0, bit: 7 });
        assert_eq!(table.slot(table.word_offset(3, 0)).lane, 1);
        assert_eq!(table.locate(32), BitRole::Tail);

        let frame = hex::decode("a1b2c3d4e5f60718").unwrap();
        assert_eq!(table.demap(&frame), vec![0xa1, 0xb2, 0xc3, 0xd4]);
    }

    #[test]
    fn test_word_spanning_octets() {
        let g = FrameConfig {
            l: 2,
            m: 2,
            n: 12,
            np: 16,
            f: 2,
            s: 1,
            cs: 2,
        };
        let table = OffsetTable::new(g);
        let frame = hex::decode("abcd1234").unwrap();
        assert_eq!(table.demap(&frame), vec![0xabcd, 0x1234]);
        assert_eq!(
            table.locate(12),
            BitRole::Control {
                converter: 0,
                sample: 0,
                bit: 0
            }
        );
        assert_eq!(table.locate(14), BitRole::Tail);
    }

    #[test]
    fn test_every_bit_mapped_once() {
        let mut rng = StdRng::seed_from_u64(0x0ff5e7);
        for _ in 0..200 {
            let g = random_geometry(&mut rng);
            let table = OffsetTable::new(g);

            let mut roles = HashSet::new();
            let mut tail = 0;
            for bit in 0..g.frame_bits() {
                match table.locate(bit) {
                    BitRole::Tail => tail += 1,
                    role => assert!(roles.insert(role), "{g:?}: bit {bit} duplicates {role:?}"),
                }
            }
            let sample_bits = g.words() * (g.n + g.cs) as usize;
            assert_eq!(roles.len(), sample_bits, "{g:?}");
            assert_eq!(tail, g.frame_bits() - sample_bits, "{g:?}");

            for c in 0..g.m {
                for s in 0..g.s {
                    for b in 0..g.n {
                        let pos = table.word_offset(c, s) + b as usize;
                        assert_eq!(
                            table.locate(pos),
                            BitRole::Sample {
                                converter: c,
                                sample: s,
                                bit: b
                            }
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_map_inverts_demap() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let g = random_geometry(&mut rng);
            let table = OffsetTable::new(g);
            let mask = if g.np == 32 { u32::MAX } else { (1u32 << g.np) - 1 };
            let words: Vec<u32> = (0..g.words()).map(|_| rng.r#gen::<u32>() & mask).collect();
            let frame = table.map(&words);
            assert_eq!(frame.len(), g.f * g.l);
            assert_eq!(table.demap(&frame), words, "{g:?}");
        }
    }

    #[test]
    fn test_decoder_waits_for_frame_start() {
        let mut dec = TransportDecoder::new(scenario_a());
        assert!(dec.push(&[1, 2, 3, 4], false).is_none());
        assert!(dec.push(&[0xa1, 0xc3, 0, 0], true).is_none());
        let words = dec.push(&[0xb2, 0xd4, 0, 0], false).unwrap();
        assert_eq!(words, vec![0xa1, 0xb2, 0xc3, 0xd4]);
        assert!(dec.push(&[9, 9, 9, 9], false).is_none());
    }

    #[test]
    fn test_decoder_reset_discards_partial_frame() {
        let mut dec = TransportDecoder::new(scenario_a());
        dec.push(&[1, 1, 1, 1], true);
        dec.reset();
        assert!(dec.push(&[2, 2, 2, 2], false).is_none());
    }
}
