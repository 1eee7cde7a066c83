//! The receive link: every component advanced once per device clock tick.

use log::trace;

use super::controller::{LinkController, LinkObservation, LinkState};
use crate::config::{FrameConfig, LinkConfig};
use crate::core::constants::{CONTROL_ENABLE, CONTROL_ILAS_DISABLE, STATUS_JSYNC, STATUS_READY};
use crate::core::{ConfigError, LinkFault, SampleSink};
use crate::datapath::{Descrambler, FrameAssembler, StplChecker, StplPattern, TransportDecoder};
use crate::lane::{DeskewBuffer, Lane, LaneInput};

/// Outcome of one [`Link::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// The lane inputs were consumed. When `false` the tick stalled on the
    /// sink and the same inputs must be presented again.
    pub consumed: bool,
    /// The controller changed state.
    pub transitioned: bool,
    /// A frame was handed to the sink.
    pub delivered: bool,
}

/// A multi-lane JESD204B receive link.
#[derive(Debug, Clone)]
pub struct Link {
    config: LinkConfig,
    geometry: FrameConfig,
    controller: LinkController,
    lanes: Vec<Lane>,
    rx_enable: Vec<bool>,
    deskew: DeskewBuffer,
    descramblers: Vec<Descrambler>,
    decoder: TransportDecoder,
    assembler: FrameAssembler,
    stpl: StplChecker,
    control: u32,
    ticks: u64,
}

impl Link {
    /// Build a link from a validated configuration.
    pub fn new(config: LinkConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let settings = config.settings;
        let lanes = config.lanes();
        let geometry = settings.frame_config();
        let control = if config.ilas_validation {
            0
        } else {
            CONTROL_ILAS_DISABLE
        };

        Ok(Self {
            geometry,
            controller: LinkController::new(&config),
            lanes: (0..lanes).map(|n| Lane::new(n, &settings)).collect(),
            rx_enable: vec![true; lanes],
            deskew: DeskewBuffer::new(lanes, config.deskew_depth),
            descramblers: vec![Descrambler::new(settings.scr); lanes],
            decoder: TransportDecoder::new(geometry),
            assembler: FrameAssembler::new(),
            stpl: StplChecker::new(StplPattern::from_random(config.stpl_random), geometry.n),
            control,
            ticks: 0,
            config,
        })
    }

    /// Configuration the link was built from.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Frame geometry.
    pub fn geometry(&self) -> &FrameConfig {
        &self.geometry
    }

    /// Controller state.
    pub fn state(&self) -> &LinkState {
        self.controller.state()
    }

    /// Recorded fault, while in `Error`.
    pub fn fault(&self) -> Option<&LinkFault> {
        self.controller.fault()
    }

    /// SYNC~ output: `true` once the receiver asks for ILAS.
    pub fn jsync(&self) -> bool {
        self.controller.jsync()
    }

    /// Logical lanes.
    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    /// Deskew buffer.
    pub fn deskew(&self) -> &DeskewBuffer {
        &self.deskew
    }

    /// Consumed ticks since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Frames delivered to the sink.
    pub fn frames_delivered(&self) -> u64 {
        self.assembler.delivered()
    }

    /// Current `link_control` word.
    pub fn control(&self) -> u32 {
        self.control
    }

    /// Set the `link_control` word; takes effect on the next tick.
    pub fn set_control(&mut self, control: u32) {
        self.control = control;
    }

    /// Set `link_control` bit 0.
    pub fn enable(&mut self) {
        self.control |= CONTROL_ENABLE;
    }

    /// Clear `link_control` bit 0.
    pub fn disable(&mut self) {
        self.control &= !CONTROL_ENABLE;
    }

    /// `link_status`: bit 0 ready, bit 1 SYNC~ released.
    pub fn status(&self) -> u32 {
        let mut status = 0;
        if self.controller.is_ready() {
            status |= STATUS_READY;
        }
        if self.controller.jsync() {
            status |= STATUS_JSYNC;
        }
        status
    }

    /// `link_fault`: code of the recorded fault, 0 if none.
    pub fn fault_code(&self) -> u32 {
        self.fault().map_or(0, LinkFault::code)
    }

    /// Gate physical RX lane `phy`.
    pub fn set_rx_enable(&mut self, phy: usize, enabled: bool) {
        if let Some(logical) = (0..self.lanes.len()).find(|&n| self.config.phy.physical_lane(n) == phy) {
            self.rx_enable[logical] = enabled;
        }
    }

    /// Enable or disable the short transport-layer test.
    pub fn set_stpl_enable(&mut self, enabled: bool) {
        self.stpl.set_enabled(enabled);
    }

    /// Whether the short transport-layer test is running.
    pub fn stpl_enabled(&self) -> bool {
        self.stpl.is_enabled()
    }

    /// Mismatching samples counted by the short transport-layer test.
    pub fn stpl_errors(&self) -> u64 {
        self.stpl.errors()
    }

    /// Return to `Reset` and discard all in-flight data.
    pub fn reset(&mut self) {
        self.controller.reset();
        self.flush();
    }

    /// Advance one device clock.
    ///
    /// `inputs` is indexed by physical lane; missing entries read as a lane
    /// without code sync. Frames are only handed to `sink` while the link is
    /// `Ready`.
    pub fn tick<S: SampleSink + ?Sized>(&mut self, inputs: &[LaneInput], sink: &mut S) -> TickReport {
        let enabled = self.control & CONTROL_ENABLE != 0;
        let mut report = TickReport::default();

        if self.assembler.is_full() {
            if self.assembler.drain(sink) {
                report.delivered = true;
            } else if enabled {
                trace!("link: sink not ready, tick {} stalled", self.ticks);
                return report;
            }
        }
        report.consumed = true;
        self.ticks += 1;

        let active = self.controller.lanes_active();
        for (n, lane) in self.lanes.iter_mut().enumerate() {
            lane.set_enabled(active && self.rx_enable[n]);
            let input = inputs
                .get(self.config.phy.physical_lane(n))
                .copied()
                .unwrap_or_default();
            if let Some(out) = lane.tick(&input) {
                self.deskew.write(n, out.octet, out.phase);
            }
        }

        let mut words = None;
        if let Some(row) = self.deskew.read() {
            let frame_start = row.first().is_some_and(|e| e.phase % self.geometry.f == 0);
            let octets: Vec<u8> = row
                .iter()
                .zip(self.descramblers.iter_mut())
                .map(|(entry, descrambler)| descrambler.descramble(entry.octet))
                .collect();
            words = self.decoder.push(&octets, frame_start);
        }

        let obs = LinkObservation {
            enabled,
            ilas_check_disabled: self.control & CONTROL_ILAS_DISABLE != 0,
            code_sync: self.lanes.iter().map(Lane::code_sync).collect(),
            ilas: self.lanes.iter().map(|l| l.ilas().record().copied()).collect(),
            deskew_aligned: self.deskew.is_aligned(),
            deskew_overflow: self.deskew.overflow(),
        };
        report.transitioned = self.controller.step(&obs);
        if report.transitioned
            && matches!(self.controller.state(), LinkState::Reset | LinkState::LaneSync { .. })
        {
            self.flush();
        }

        if let Some(words) = words {
            if self.controller.is_ready() && self.assembler.load(&self.geometry, words) {
                if let Some(frame) = self.assembler.peek() {
                    self.stpl.check(frame);
                }
                report.delivered |= self.assembler.drain(sink);
            }
        }
        report
    }

    /// Drop every piece of in-flight data path state.
    fn flush(&mut self) {
        for lane in &mut self.lanes {
            lane.reset();
        }
        self.deskew.reset();
        for descrambler in &mut self.descramblers {
            descrambler.reset();
        }
        self.decoder.reset();
        self.assembler.clear();
    }
}
