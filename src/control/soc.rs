//! The receive core inside its SoC: three clock domains and the crossings
//! between them.
//!
//! ```text
//!   control domain             device domain              refclk domain
//!  ┌──────────────┐  MultiReg  ┌──────────────┐           ┌──────────────┐
//!  │ ControlPlane │ ─────────> │     Link     │           │   counter    │
//!  │  (registers) │ <───────── │  PHY model   │           │              │
//!  └──────────────┘  MultiReg  └──────────────┘           └──────────────┘
//!         │                 latch pulse (PulseSynchronizer)      ▲  │
//!         └──────────────────────────────────────────────────────┘  │
//!         ▲                       value (MultiReg)                  │
//!         └─────────────────────────────────────────────────────────┘
//! ```

use log::{debug, info};

use super::cdc::MultiReg;
use super::clock::{ClockMeasurement, ClockScheduler, Edges};
use super::registers::{ControlPlane, Csr, DeviceControls, PhyControls, StatusSnapshot};
use crate::config::LinkConfig;
use crate::core::{ConfigError, LaneSource, RegisterError, SampleSink};
use crate::lane::LaneInput;
use crate::link::{Link, TickReport};

/// Outcome of one [`Soc::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    /// Domains clocked on this step.
    pub edges: Edges,
    /// Link outcome, when the device domain was clocked.
    pub tick: Option<TickReport>,
}

/// Receive core, register file and reference clock counter.
#[derive(Debug, Clone)]
pub struct Soc {
    link: Link,
    control: ControlPlane,
    clock: ClockMeasurement,
    scheduler: ClockScheduler,
    to_device: MultiReg<DeviceControls>,
    to_control: MultiReg<StatusSnapshot>,
    device_status: StatusSnapshot,
    phy_locked: u32,
    held: Option<Vec<LaneInput>>,
    device_ticks: u64,
    control_ticks: u64,
}

impl Soc {
    /// Build the SoC around a link for `config`.
    pub fn new(config: LinkConfig) -> Result<Self, ConfigError> {
        let scheduler = ClockScheduler::new(&config.clocks)?;
        let control = ControlPlane::new(&config);
        let lanes = config.lanes();
        let link = Link::new(config)?;
        info!(
            "soc: {} lanes, device {} Hz, control {} Hz, refclk {} Hz",
            lanes,
            link.config().clocks.device_hz,
            link.config().clocks.control_hz,
            link.config().clocks.refclk_hz,
        );

        let mut soc = Self {
            to_device: MultiReg::new(control.controls()),
            to_control: MultiReg::default(),
            device_status: StatusSnapshot::default(),
            phy_locked: lane_mask(lanes),
            held: None,
            device_ticks: 0,
            control_ticks: 0,
            link,
            control,
            clock: ClockMeasurement::new(),
            scheduler,
        };
        soc.apply_controls(soc.to_device.output());
        soc.device_status = soc.snapshot();
        soc.to_control.reset(soc.device_status);
        Ok(soc)
    }

    /// The receive link.
    pub fn link(&self) -> &Link {
        &self.link
    }

    /// The register file.
    pub fn control_plane(&self) -> &ControlPlane {
        &self.control
    }

    /// The clock scheduler.
    pub fn scheduler(&self) -> &ClockScheduler {
        &self.scheduler
    }

    /// Device clocks elapsed.
    pub fn device_ticks(&self) -> u64 {
        self.device_ticks
    }

    /// Control clocks elapsed.
    pub fn control_ticks(&self) -> u64 {
        self.control_ticks
    }

    /// Read a register.
    pub fn read(&self, csr: Csr) -> Result<u64, RegisterError> {
        self.control.read(csr)
    }

    /// Write a register.
    pub fn write(&mut self, csr: Csr, value: u64) -> Result<(), RegisterError> {
        self.control.write(csr, value)
    }

    /// Read a register by name.
    pub fn read_named(&self, name: &str) -> Result<u64, RegisterError> {
        self.control.read_named(name)
    }

    /// Write a register by name.
    pub fn write_named(&mut self, name: &str, value: u64) -> Result<(), RegisterError> {
        self.control.write_named(name, value)
    }

    /// Identifier string from the identifier memory.
    pub fn identifier(&self) -> String {
        self.control.identifier()
    }

    /// PHY control bits as seen by the device domain.
    pub fn phy_controls(&self) -> PhyControls {
        self.to_device.output().phy
    }

    /// Model PHY PLL lock. An unlocked PHY reports not ready and feeds no data.
    pub fn set_phy_locked(&mut self, phy: usize, locked: bool) {
        if phy >= 32 {
            return;
        }
        if locked {
            self.phy_locked |= 1 << phy;
        } else {
            self.phy_locked &= !(1 << phy);
        }
    }

    /// Device clock edge.
    pub fn device_tick<L, S>(&mut self, source: &mut L, sink: &mut S) -> TickReport
    where
        L: LaneSource + ?Sized,
        S: SampleSink + ?Sized,
    {
        self.to_device.tick(self.control.controls());
        self.apply_controls(self.to_device.output());

        let inputs = match self.held.take() {
            Some(inputs) => inputs,
            None => source.next_inputs(self.link.jsync()),
        };
        let report = self.link.tick(&inputs, sink);
        if !report.consumed {
            self.held = Some(inputs);
        }
        if report.transitioned {
            debug!("soc: link {} at device tick {}", self.link.state(), self.device_ticks);
        }

        self.device_ticks += 1;
        self.device_status = self.snapshot();
        report
    }

    /// Control clock edge.
    pub fn control_tick(&mut self) {
        self.to_control.tick(self.device_status);
        let latch = self.control.take_latch();
        self.clock.control_tick(latch);
        self.control.update_status(self.to_control.output(), self.clock.value());
        self.control_ticks += 1;
    }

    /// Reference clock edge.
    pub fn refclk_tick(&mut self) {
        self.clock.refclk_tick();
    }

    /// Advance the simulation to the next clock edge of any domain.
    pub fn step<L, S>(&mut self, source: &mut L, sink: &mut S) -> StepReport
    where
        L: LaneSource + ?Sized,
        S: SampleSink + ?Sized,
    {
        let edges = self.scheduler.next();
        if edges.refclk {
            self.refclk_tick();
        }
        let tick = edges.device.then(|| self.device_tick(source, sink));
        if edges.control {
            self.control_tick();
        }
        StepReport { edges, tick }
    }

    /// Step until `ticks` more device clocks have elapsed.
    pub fn run_device_ticks<L, S>(&mut self, source: &mut L, sink: &mut S, ticks: u64)
    where
        L: LaneSource + ?Sized,
        S: SampleSink + ?Sized,
    {
        let target = self.device_ticks + ticks;
        while self.device_ticks < target {
            self.step(source, sink);
        }
    }

    /// Step until `ticks` more control clocks have elapsed.
    pub fn run_control_ticks<L, S>(&mut self, source: &mut L, sink: &mut S, ticks: u64)
    where
        L: LaneSource + ?Sized,
        S: SampleSink + ?Sized,
    {
        let target = self.control_ticks + ticks;
        while self.control_ticks < target {
            self.step(source, sink);
        }
    }

    fn apply_controls(&mut self, controls: DeviceControls) {
        self.link.set_control(controls.link_control);
        self.link.set_stpl_enable(controls.stpl_enable);
        for phy in 0..self.link.lanes().len() {
            let up = PhyControls::bit(controls.phy.rx_enable & self.phy_locked, phy);
            self.link.set_rx_enable(phy, up);
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        let phy = self.to_device.output().phy;
        let lanes = lane_mask(self.link.lanes().len());
        StatusSnapshot {
            link_status: self.link.status(),
            link_fault: self.link.fault_code(),
            stpl_errors: self.link.stpl_errors(),
            frames: self.link.frames_delivered(),
            tx_ready: phy.tx_enable & self.phy_locked & lanes,
            rx_ready: phy.rx_enable & self.phy_locked & lanes,
        }
    }
}

fn lane_mask(lanes: usize) -> u32 {
    if lanes >= 32 {
        u32::MAX
    } else {
        (1u32 << lanes) - 1
    }
}

#[cfg(all(test, feature = "emulator"))]
mod tests {
    use super::*;
    use crate::core::NullSink;
    use crate::core::constants::{CONTROL_ENABLE, CONTROL_ILAS_DISABLE, STATUS_JSYNC, STATUS_READY};
    use crate::datapath::SampleFrame;
    use crate::emulator::{AdcEmulator, TestPattern};
    use crate::link::LinkState;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn board(lanes: usize) -> (Soc, AdcEmulator) {
        init_logging();
        let config = LinkConfig::adc08dj5200rf(lanes).unwrap();
        let adc = AdcEmulator::new(&config, TestPattern::Ramp);
        (Soc::new(config).unwrap(), adc)
    }

    fn enable_phys(soc: &mut Soc) {
        for phy in 0..soc.control_plane().lanes() {
            soc.write(Csr::PhyTxEnable(phy), 1).unwrap();
            soc.write(Csr::PhyRxEnable(phy), 1).unwrap();
        }
    }

    #[test]
    fn test_bring_up_sequence() {
        let (mut soc, mut adc) = board(8);
        let mut frames: Vec<SampleFrame> = Vec::new();

        enable_phys(&mut soc);
        soc.write(Csr::LinkControl, u64::from(CONTROL_ENABLE | CONTROL_ILAS_DISABLE))
            .unwrap();
        soc.run_device_ticks(&mut adc, &mut frames, 2_000);
        // Let the status cross back into the control domain.
        soc.run_control_ticks(&mut adc, &mut frames, 4);

        let status = soc.read_named("link_status").unwrap() as u32;
        assert_eq!(status, STATUS_READY | STATUS_JSYNC);
        assert_eq!(soc.read(Csr::LinkFault), Ok(0));
        assert!(soc.read(Csr::LinkFrames).unwrap() > 0);
        for phy in 0..8 {
            assert_eq!(soc.read(Csr::PhyRxReady(phy)), Ok(1));
            assert_eq!(soc.read(Csr::PhyTxReady(phy)), Ok(1));
        }
        assert_eq!(adc.find_window(&frames), Some(0));
    }

    #[test]
    fn test_validation_enabled_bring_up() {
        let (mut soc, mut adc) = board(4);
        enable_phys(&mut soc);
        soc.write(Csr::LinkControl, u64::from(CONTROL_ENABLE)).unwrap();
        soc.run_device_ticks(&mut adc, &mut NullSink, 2_000);
        assert_eq!(*soc.link().state(), LinkState::Ready);
    }

    #[test]
    fn test_core_without_rx_phys_times_out() {
        let (mut soc, mut adc) = board(4);
        soc.write(Csr::LinkControl, u64::from(CONTROL_ENABLE)).unwrap();
        soc.run_device_ticks(&mut adc, &mut NullSink, 6_000);
        soc.run_control_ticks(&mut adc, &mut NullSink, 4);

        assert_eq!(soc.read(Csr::LinkFault), Ok(1));
        assert_eq!(soc.read(Csr::LinkStatus), Ok(0));
        assert_eq!(soc.read(Csr::LinkFrames), Ok(0));
    }

    #[test]
    fn test_unlocked_phy_blocks_bring_up() {
        let (mut soc, mut adc) = board(4);
        enable_phys(&mut soc);
        soc.set_phy_locked(2, false);
        soc.write(Csr::LinkControl, u64::from(CONTROL_ENABLE)).unwrap();
        soc.run_device_ticks(&mut adc, &mut NullSink, 6_000);
        soc.run_control_ticks(&mut adc, &mut NullSink, 4);

        assert_eq!(soc.read(Csr::PhyRxReady(2)), Ok(0));
        assert_eq!(soc.read(Csr::PhyRxReady(1)), Ok(1));
        assert_eq!(soc.read(Csr::LinkFault), Ok(1));
    }

    #[test]
    fn test_writes_cross_with_latency() {
        let (mut soc, mut adc) = board(4);
        soc.write(Csr::LinkControl, u64::from(CONTROL_ENABLE)).unwrap();
        assert_eq!(soc.link().control() & CONTROL_ENABLE, 0);

        soc.device_tick(&mut adc, &mut NullSink);
        assert_eq!(soc.link().control() & CONTROL_ENABLE, 0);
        soc.device_tick(&mut adc, &mut NullSink);
        assert_eq!(soc.link().control() & CONTROL_ENABLE, CONTROL_ENABLE);
    }

    #[test]
    fn test_phy_controls_follow_registers() {
        let (mut soc, mut adc) = board(8);
        assert_eq!(soc.phy_controls().rx_polarity, 0b1111_0000);

        soc.write_named("phy3_tx_polarity", 1).unwrap();
        soc.run_device_ticks(&mut adc, &mut NullSink, 2);
        assert_eq!(soc.phy_controls().tx_polarity, 0b1000);
    }

    #[test]
    fn test_refclk_measurement() {
        let (mut soc, mut adc) = board(4);
        let interval = 17_500;

        soc.write(Csr::RefclkMeasurementLatch, 1).unwrap();
        soc.run_control_ticks(&mut adc, &mut NullSink, interval);
        let first = soc.read(Csr::RefclkMeasurementValue).unwrap();

        soc.write(Csr::RefclkMeasurementLatch, 1).unwrap();
        soc.run_control_ticks(&mut adc, &mut NullSink, interval);
        let second = soc.read(Csr::RefclkMeasurementValue).unwrap();

        assert!(first > 0);
        // 17_500 control clocks at 175 MHz are 100 us.
        let hz = (second - first) as f64 * 1e4;
        assert!((hz - 156_250_000.0).abs() < 1e5, "measured {hz}");
    }

    #[test]
    fn test_identifier() {
        let (soc, _) = board(4);
        assert_eq!(soc.identifier(), "FastScope Test SoC on AXAU15.");
        assert_eq!(soc.read_named("identifier_mem"), Ok(u64::from(b'F')));
    }
}
