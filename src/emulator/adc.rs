//! Transmit side of a JESD204B ADC, for driving the receive link.
//!
//! The emulator sends /K/ while SYNC~ is asserted, starts the ILAS on the next
//! LMFC boundary after the receiver releases it, then sends scrambled frames of
//! a test pattern with the standard alignment character replacement. Lanes can
//! be skewed, dropped, slipped or given a different ILAS record.

use std::collections::VecDeque;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{FrameConfig, JesdSettings, LinkConfig};
use crate::core::{LaneSource, SampleSink};
use crate::core::constants::{CHAR_A, CHAR_F, CHAR_Q, CHAR_R, ILAS_CONFIG_LEN, ILAS_MULTIFRAMES};
use crate::datapath::{OffsetTable, SampleFrame, Scrambler, StplPattern};
use crate::lane::{IlasRecord, LaneInput};
use crate::link::{Link, TickReport};

/// Sample values the emulator transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    /// `frame·S + s + 16·c`, masked to N bits.
    Ramp,
    /// Short transport-layer test pattern, identical in every frame.
    Stpl(StplPattern),
    /// Uniformly random samples from a seeded generator.
    Random,
}

/// Transmitter phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Sending /K/ while SYNC~ is asserted.
    CodeGroupSync,
    /// Sending octet `octet` of the ILAS.
    Ilas {
        /// Octet index, `0..4·F·K`.
        octet: usize,
    },
    /// Sending user data.
    Data,
}

#[derive(Debug, Clone)]
struct TxLane {
    record: IlasRecord,
    code_sync: bool,
    delay: VecDeque<LaneInput>,
    slip: bool,
    scrambler: Scrambler,
    last_frame_octet: Option<u8>,
}

/// ADC transmitter model.
#[derive(Debug, Clone)]
pub struct AdcEmulator {
    settings: JesdSettings,
    geometry: FrameConfig,
    table: OffsetTable,
    rx_order: Vec<usize>,
    pattern: TestPattern,
    rng: StdRng,

    state: TxState,
    lmfc: usize,
    data_octet: usize,
    frame: Vec<u8>,
    lanes: Vec<TxLane>,
    sent: Vec<SampleFrame>,
    held: Option<Vec<LaneInput>>,
}

fn mask(bits: u32) -> u32 {
    if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 }
}

impl AdcEmulator {
    /// Emulator matching `config`, sending `pattern`.
    pub fn new(config: &LinkConfig, pattern: TestPattern) -> Self {
        Self::with_seed(config, pattern, 0x00ad_c08d)
    }

    /// Emulator with an explicit seed for [`TestPattern::Random`].
    pub fn with_seed(config: &LinkConfig, pattern: TestPattern, seed: u64) -> Self {
        let settings = config.settings;
        let geometry = settings.frame_config();
        let lanes = config.lanes();
        Self {
            settings,
            geometry,
            table: OffsetTable::new(geometry),
            rx_order: (0..lanes).map(|n| config.phy.physical_lane(n)).collect(),
            pattern,
            rng: StdRng::seed_from_u64(seed),
            state: TxState::CodeGroupSync,
            lmfc: 0,
            data_octet: 0,
            frame: vec![0; geometry.f * geometry.l],
            lanes: (0..lanes)
                .map(|n| TxLane {
                    record: IlasRecord::expected(&settings, n as u8),
                    code_sync: true,
                    delay: VecDeque::new(),
                    slip: false,
                    scrambler: Scrambler::new(),
                    last_frame_octet: None,
                })
                .collect(),
            sent: Vec::new(),
            held: None,
        }
    }

    /// Transmitter phase.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Delay logical lane `lane` by `ticks` octets relative to the others.
    pub fn set_skew(&mut self, lane: usize, ticks: usize) {
        if let Some(tx) = self.lanes.get_mut(lane) {
            tx.delay = std::iter::repeat_n(LaneInput::comma(), ticks).collect();
        }
    }

    /// Let logical lane `lane` report (or never report) code group sync.
    pub fn set_code_sync(&mut self, lane: usize, synced: bool) {
        if let Some(tx) = self.lanes.get_mut(lane) {
            tx.code_sync = synced;
        }
    }

    /// Send `record` in the ILAS of logical lane `lane`.
    pub fn set_ilas_record(&mut self, lane: usize, record: IlasRecord) {
        if let Some(tx) = self.lanes.get_mut(lane) {
            tx.record = record;
        }
    }

    /// The ILAS record logical lane `lane` sends.
    pub fn ilas_record(&self, lane: usize) -> Option<&IlasRecord> {
        self.lanes.get(lane).map(|tx| &tx.record)
    }

    /// Repeat the next octet of logical lane `lane`, shifting its stream by one.
    pub fn inject_slip(&mut self, lane: usize) {
        if let Some(tx) = self.lanes.get_mut(lane) {
            tx.slip = true;
        }
    }

    /// Every data frame sent so far, in order.
    pub fn sent_frames(&self) -> &[SampleFrame] {
        &self.sent
    }

    /// Index of the first sent frame from which `received` matches sample for sample.
    pub fn find_window(&self, received: &[SampleFrame]) -> Option<usize> {
        if received.is_empty() || received.len() > self.sent.len() {
            return None;
        }
        (0..=self.sent.len() - received.len()).find(|&start| {
            self.sent[start..]
                .iter()
                .zip(received)
                .all(|(tx, rx)| tx.words() == rx.words())
        })
    }

    /// Produce one octet per lane, indexed by physical lane.
    pub fn tick(&mut self, sync: bool) -> Vec<LaneInput> {
        let logical = self.next_octets(sync);
        self.lmfc = (self.lmfc + 1) % self.settings.multiframe_octets();

        let mut out = vec![LaneInput::idle(); self.lanes.len()];
        for (n, (tx, input)) in self.lanes.iter_mut().zip(logical).enumerate() {
            tx.delay.push_back(input);
            if tx.slip {
                tx.delay.push_back(input);
                tx.slip = false;
            }
            let delayed = tx.delay.pop_front().unwrap_or(input);
            let phy = self.rx_order.get(n).copied().unwrap_or(n);
            if let Some(slot) = out.get_mut(phy) {
                *slot = if tx.code_sync {
                    delayed
                } else {
                    LaneInput::idle()
                };
            }
        }
        out
    }

    /// Drive `link` for `ticks` device clocks, re-presenting inputs on stalls.
    pub fn run<S: SampleSink + ?Sized>(&mut self, link: &mut Link, sink: &mut S, ticks: usize) -> TickReport {
        let mut last = TickReport::default();
        for _ in 0..ticks {
            let inputs = match self.held.take() {
                Some(inputs) => inputs,
                None => self.tick(link.jsync()),
            };
            last = link.tick(&inputs, sink);
            if !last.consumed {
                self.held = Some(inputs);
            }
        }
        last
    }

    fn next_octets(&mut self, sync: bool) -> Vec<LaneInput> {
        if !sync {
            if self.state != TxState::CodeGroupSync {
                info!("adc: SYNC~ asserted, back to code group sync");
            }
            self.state = TxState::CodeGroupSync;
        }

        match self.state {
            TxState::CodeGroupSync if sync && self.lmfc == 0 => {
                debug!("adc: SYNC~ released, starting ILAS");
                self.state = TxState::Ilas { octet: 0 };
                self.ilas_octets(0)
            }
            TxState::CodeGroupSync => vec![LaneInput::comma(); self.lanes.len()],
            TxState::Ilas { octet } => self.ilas_octets(octet),
            TxState::Data => self.data_octets(),
        }
    }

    fn ilas_octets(&mut self, octet: usize) -> Vec<LaneInput> {
        let len = self.settings.multiframe_octets();
        let multiframe = octet / len;
        let phase = octet % len;

        let out = self
            .lanes
            .iter()
            .map(|tx| {
                if phase == 0 {
                    LaneInput::control(CHAR_R)
                } else if phase == len - 1 {
                    LaneInput::control(CHAR_A)
                } else if multiframe == 1 && phase == 1 {
                    LaneInput::control(CHAR_Q)
                } else if multiframe == 1 && (2..2 + ILAS_CONFIG_LEN).contains(&phase) {
                    LaneInput::data(tx.record.encode()[phase - 2])
                } else {
                    LaneInput::data(octet as u8)
                }
            })
            .collect();

        let next = octet + 1;
        if next == ILAS_MULTIFRAMES * len {
            debug!("adc: ILAS sent, entering data phase");
            self.state = TxState::Data;
            self.data_octet = 0;
            for tx in &mut self.lanes {
                tx.scrambler = Scrambler::new();
                tx.last_frame_octet = None;
            }
        } else {
            self.state = TxState::Ilas { octet: next };
        }
        out
    }

    fn data_octets(&mut self) -> Vec<LaneInput> {
        let f = self.geometry.f;
        let len = self.settings.multiframe_octets();
        let index = self.data_octet % f;
        let phase = self.data_octet % len;
        if index == 0 {
            self.next_frame();
        }
        self.data_octet += 1;

        let frame_end = index == f - 1;
        let multiframe_end = phase == len - 1;
        let scr = self.settings.scr;

        let mut out = Vec::with_capacity(self.lanes.len());
        for (lane, tx) in self.lanes.iter_mut().enumerate() {
            let plain = self.frame[lane * f + index];
            let octet = if scr { tx.scrambler.scramble(plain) } else { plain };

            let input = if !frame_end {
                LaneInput::data(octet)
            } else if scr {
                match octet {
                    CHAR_A if multiframe_end => LaneInput::control(CHAR_A),
                    CHAR_F if !multiframe_end => LaneInput::control(CHAR_F),
                    _ => LaneInput::data(octet),
                }
            } else if tx.last_frame_octet == Some(octet) {
                LaneInput::control(if multiframe_end { CHAR_A } else { CHAR_F })
            } else {
                LaneInput::data(octet)
            };

            if frame_end {
                tx.last_frame_octet = Some(octet);
            }
            out.push(input);
        }
        out
    }

    fn next_frame(&mut self) {
        let g = self.geometry;
        let sequence = self.sent.len() as u64;
        let shift = g.np - g.n;
        let words: Vec<u32> = (0..g.m)
            .flat_map(|c| (0..g.s).map(move |s| (c, s)))
            .map(|(c, s)| {
                let value = match self.pattern {
                    TestPattern::Ramp => {
                        (sequence as u32)
                            .wrapping_mul(g.s as u32)
                            .wrapping_add((s + 16 * c) as u32)
                    }
                    TestPattern::Stpl(pattern) => pattern.expected(c, s, g.n),
                    TestPattern::Random => self.rng.r#gen::<u32>(),
                };
                (value & mask(g.n)) << shift
            })
            .collect();
        self.frame = self.table.map(&words);
        self.sent.push(SampleFrame::from_words(&g, sequence, words));
    }
}

impl LaneSource for AdcEmulator {
    fn next_inputs(&mut self, jsync: bool) -> Vec<LaneInput> {
        self.tick(jsync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::CHAR_K;

    fn config() -> LinkConfig {
        LinkConfig::adc08dj5200rf(4).unwrap()
    }

    #[test]
    fn test_commas_until_sync() {
        let mut adc = AdcEmulator::new(&config(), TestPattern::Ramp);
        for _ in 0..100 {
            let out = adc.tick(false);
            assert!(out.iter().all(|i| *i == LaneInput::comma()));
        }
        assert_eq!(adc.state(), TxState::CodeGroupSync);
    }

    #[test]
    fn test_ilas_starts_on_lmfc_boundary() {
        let mut adc = AdcEmulator::new(&config(), TestPattern::Ramp);
        for _ in 0..10 {
            adc.tick(false);
        }
        // LMFC is at phase 10 of 64; ILAS starts 54 ticks later.
        for _ in 0..54 {
            assert_eq!(adc.tick(true)[0].octet, CHAR_K);
        }
        let first = adc.tick(true);
        assert!(first.iter().all(|i| *i == LaneInput::control(CHAR_R)));
        assert_eq!(adc.state(), TxState::Ilas { octet: 1 });
    }

    #[test]
    fn test_ilas_carries_lane_records() {
        let cfg = config();
        let mut adc = AdcEmulator::new(&cfg, TestPattern::Ramp);
        let mut lanes: Vec<Vec<LaneInput>> = vec![Vec::new(); 4];
        for _ in 0..(64 * 4) {
            for (phy, input) in adc.tick(true).into_iter().enumerate() {
                lanes[phy].push(input);
            }
        }
        assert_eq!(adc.state(), TxState::Data);

        for (logical, &phy) in cfg.phy.rx_order.iter().enumerate() {
            let stream = &lanes[phy];
            assert_eq!(stream[64 + 1], LaneInput::control(CHAR_Q));
            let config: Vec<u8> = stream[64 + 2..64 + 16].iter().map(|i| i.octet).collect();
            let record = IlasRecord::decode(&config.try_into().unwrap());
            assert_eq!(record.lid as usize, logical);
            assert_eq!(stream[4 * 64 - 1], LaneInput::control(CHAR_A));
        }
    }

    #[test]
    fn test_skew_delays_lane() {
        let mut adc = AdcEmulator::new(&config(), TestPattern::Ramp);
        adc.set_skew(1, 3);
        let phy = config().phy.physical_lane(1);
        let mut stream = Vec::new();
        for _ in 0..8 {
            stream.push(adc.tick(true)[phy]);
        }
        assert_eq!(stream[0], LaneInput::comma());
        assert_eq!(stream[2], LaneInput::comma());
        assert_eq!(stream[3], LaneInput::control(CHAR_R));
    }

    #[test]
    fn test_lane_without_code_sync() {
        let mut adc = AdcEmulator::new(&config(), TestPattern::Ramp);
        adc.set_code_sync(2, false);
        let phy = config().phy.physical_lane(2);
        let out = adc.tick(true);
        assert!(!out[phy].code_sync);
        assert!(out.iter().filter(|i| i.code_sync).count() == 3);
    }

    #[test]
    fn test_ramp_frames_recorded() {
        let mut adc = AdcEmulator::new(&config(), TestPattern::Ramp);
        for _ in 0..(4 * 64 + 6) {
            adc.tick(true);
        }
        let sent = adc.sent_frames();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].converter(1), vec![2 + 16]);
        assert_eq!(adc.find_window(&sent[1..]), Some(1));
    }
}
