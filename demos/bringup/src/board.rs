//! The simulated board: the SoC, the ADC driving its lanes and the frames it
//! captured.

use jesd204b_rx::config::LinkConfig;
use jesd204b_rx::control::{Csr, Soc};
use jesd204b_rx::core::constants::{CONTROL_ENABLE, CONTROL_ILAS_DISABLE};
use jesd204b_rx::core::{ConfigError, RegisterError};
use jesd204b_rx::datapath::SampleFrame;
use jesd204b_rx::emulator::{AdcEmulator, TestPattern};
use log::info;

/// Control clocks to wait after each step of the bring-up sequence.
const SETTLE_TICKS: u64 = 1_000;

/// SoC and emulated ADC on one board.
pub struct Board {
    /// The FPGA side.
    pub soc: Soc,
    /// The converter.
    pub adc: AdcEmulator,
    /// Frames delivered by the link.
    pub frames: Vec<SampleFrame>,
}

impl Board {
    /// Build a board for `config`, with the ADC sending a ramp.
    pub fn new(config: LinkConfig) -> Result<Self, ConfigError> {
        let adc = AdcEmulator::new(&config, TestPattern::Ramp);
        Ok(Self {
            soc: Soc::new(config)?,
            adc,
            frames: Vec::new(),
        })
    }

    /// Number of PHYs.
    pub fn lanes(&self) -> usize {
        self.soc.control_plane().lanes()
    }

    /// Run the simulation for `ticks` control clocks.
    pub fn settle(&mut self, ticks: u64) {
        self.soc.run_control_ticks(&mut self.adc, &mut self.frames, ticks);
    }

    /// Run the simulation for `ticks` device clocks.
    pub fn run(&mut self, ticks: u64) {
        self.soc.run_device_ticks(&mut self.adc, &mut self.frames, ticks);
    }

    /// Simulated seconds since power-up.
    pub fn elapsed_secs(&self) -> f64 {
        self.soc.scheduler().elapsed_secs()
    }

    /// Replay the board bring-up: PHYs and core off, TX PHYs on, RX PHYs on,
    /// then the core with ILAS field validation off.
    pub fn bring_up(&mut self) -> Result<(), RegisterError> {
        let lanes = self.lanes();
        info!("bring-up: {}", self.soc.identifier());

        info!("bring-up: disabling PHYs and core");
        for n in 0..lanes {
            self.soc.write_named(&format!("phy{n}_tx_enable"), 0)?;
            self.soc.write_named(&format!("phy{n}_rx_enable"), 0)?;
        }
        self.soc.write(Csr::LinkControl, 0)?;
        self.settle(SETTLE_TICKS);

        info!("bring-up: enabling TX PHYs");
        for n in 0..lanes {
            self.soc.write_named(&format!("phy{n}_tx_enable"), 1)?;
        }
        self.settle(SETTLE_TICKS);
        self.log_phys("tx", Csr::PhyTxReady)?;

        info!("bring-up: enabling RX PHYs");
        for n in 0..lanes {
            self.soc.write_named(&format!("phy{n}_rx_enable"), 1)?;
        }
        self.settle(SETTLE_TICKS);
        self.log_phys("rx", Csr::PhyRxReady)?;

        info!("bring-up: enabling JESD core");
        self.soc
            .write(Csr::LinkControl, u64::from(CONTROL_ENABLE | CONTROL_ILAS_DISABLE))?;
        Ok(())
    }

    fn log_phys(&self, side: &str, csr: impl Fn(usize) -> Csr) -> Result<(), RegisterError> {
        let mut ready = String::new();
        for n in 0..self.lanes() {
            ready.push(if self.soc.read(csr(n))? != 0 { '1' } else { '0' });
        }
        info!("bring-up: {side} ready {ready}");
        Ok(())
    }
}
