//! Link configuration.
//!
//! A [`LinkConfig`] carries everything the receive core is built from: the
//! JESD204B parameters, controller timeouts, deskew depth, PHY lane mapping and
//! the clock plan of the simulated SoC. Configurations are plain data and can be
//! loaded from JSON, with defaults for everything except the link parameters.

mod geometry;

pub use geometry::*;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;
use crate::core::constants::{
    DEFAULT_DEBOUNCE_CYCLES, DEFAULT_DESKEW_DEPTH, DEFAULT_ILAS_TIMEOUT, DEFAULT_LANE_SYNC_TIMEOUT,
    IDENTIFIER_MEM_SIZE, ILAS_MULTIFRAMES,
};

/// Controller timeouts, in device clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkTiming {
    /// Consecutive ticks with every lane in code sync before SYNC~ is released.
    pub debounce_cycles: u32,
    /// Ticks allowed in LaneSync.
    pub lane_sync_timeout: u32,
    /// Ticks allowed in IlasWait.
    pub ilas_timeout: u32,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            debounce_cycles: DEFAULT_DEBOUNCE_CYCLES,
            lane_sync_timeout: DEFAULT_LANE_SYNC_TIMEOUT,
            ilas_timeout: DEFAULT_ILAS_TIMEOUT,
        }
    }
}

/// PHY lane mapping and polarity.
///
/// Empty tables mean identity order and normal polarity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhyConfig {
    /// `rx_order[n]` is the physical lane feeding logical lane `n`.
    pub rx_order: Vec<usize>,
    /// RX polarity inversion per physical lane.
    pub rx_polarity: Vec<bool>,
    /// TX polarity inversion per physical lane.
    pub tx_polarity: Vec<bool>,
}

impl PhyConfig {
    /// Physical lane feeding `logical`.
    pub fn physical_lane(&self, logical: usize) -> usize {
        self.rx_order.get(logical).copied().unwrap_or(logical)
    }

    /// Initial RX polarity of physical lane `phy`.
    pub fn rx_polarity(&self, phy: usize) -> bool {
        self.rx_polarity.get(phy).copied().unwrap_or(false)
    }

    /// Initial TX polarity of physical lane `phy`.
    pub fn tx_polarity(&self, phy: usize) -> bool {
        self.tx_polarity.get(phy).copied().unwrap_or(false)
    }

    fn validate(&self, lanes: usize) -> Result<(), ConfigError> {
        for (what, len) in [
            ("rx_order", self.rx_order.len()),
            ("rx_polarity", self.rx_polarity.len()),
            ("tx_polarity", self.tx_polarity.len()),
        ] {
            if len != 0 && len != lanes {
                return Err(ConfigError::LaneCount {
                    what,
                    expected: lanes,
                    actual: len,
                });
            }
        }

        if !self.rx_order.is_empty() {
            let mut seen = vec![false; lanes];
            for &phy in &self.rx_order {
                match seen.get_mut(phy) {
                    Some(slot) if !*slot => *slot = true,
                    _ => return Err(ConfigError::LaneOrder(self.rx_order.clone())),
                }
            }
        }
        Ok(())
    }
}

/// Clock plan of the simulated SoC, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// JESD device clock (one octet per lane per cycle).
    pub device_hz: u64,
    /// Control/system clock of the register interface.
    pub control_hz: u64,
    /// Reference clock measured by the clock counter.
    pub refclk_hz: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            device_hz: 156_250_000,
            control_hz: 175_000_000,
            refclk_hz: 156_250_000,
        }
    }
}

fn default_deskew_depth() -> usize {
    DEFAULT_DESKEW_DEPTH
}

fn default_true() -> bool {
    true
}

/// Complete configuration of a receive link and its SoC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Expected link parameters.
    pub settings: JesdSettings,
    /// Controller timeouts.
    #[serde(default)]
    pub timing: LinkTiming,
    /// Deskew FIFO depth in octets.
    #[serde(default = "default_deskew_depth")]
    pub deskew_depth: usize,
    /// Compare received ILAS data against `settings` after reset.
    #[serde(default = "default_true")]
    pub ilas_validation: bool,
    /// PHY lane mapping.
    #[serde(default)]
    pub phy: PhyConfig,
    /// SoC identifier string.
    #[serde(default)]
    pub identifier: String,
    /// Clock plan.
    #[serde(default)]
    pub clocks: ClockConfig,
    /// Use the pseudo-random short transport-layer test pattern.
    #[serde(default)]
    pub stpl_random: bool,
}

impl LinkConfig {
    /// Configuration with defaults for everything but the link parameters.
    pub fn new(settings: JesdSettings) -> Self {
        Self {
            settings,
            timing: LinkTiming::default(),
            deskew_depth: DEFAULT_DESKEW_DEPTH,
            ilas_validation: true,
            phy: PhyConfig::default(),
            identifier: String::new(),
            clocks: ClockConfig::default(),
            stpl_random: false,
        }
    }

    /// The ADC08DJ5200RF on the AXAU15 board, with 4 or 8 lanes.
    pub fn adc08dj5200rf(lanes: usize) -> Result<Self, ConfigError> {
        let (rx_order, rx_polarity) = match lanes {
            4 => (vec![3, 0, 2, 1], vec![false; 4]),
            8 => (
                vec![3, 0, 2, 1, 7, 4, 6, 5],
                vec![false, false, false, false, true, true, true, true],
            ),
            other => return Err(ConfigError::UnsupportedLaneCount(other)),
        };

        let settings = JesdSettings {
            did: 0x5a,
            bid: 0x5,
            l: lanes as u8,
            m: lanes as u16,
            n: 8,
            np: 8,
            f: 2,
            s: 1,
            k: 32,
            cs: 0,
            cf: 0,
            hd: false,
            scr: true,
            subclassv: 1,
            jesdv: 1,
        };

        let mut config = Self::new(settings);
        config.phy = PhyConfig {
            rx_order,
            rx_polarity,
            tx_polarity: vec![false; lanes],
        };
        config.identifier = "FastScope Test SoC on AXAU15.".to_string();
        config.stpl_random = true;
        Ok(config)
    }

    /// Parse a JSON configuration and validate it.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of lanes.
    pub fn lanes(&self) -> usize {
        usize::from(self.settings.l)
    }

    /// Check the whole configuration for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        self.phy.validate(self.lanes())?;

        if self.deskew_depth == 0 {
            return Err(ConfigError::DeskewDepth);
        }

        let timing = &self.timing;
        if timing.debounce_cycles == 0 {
            return Err(ConfigError::Timing("debounce_cycles must be non-zero".into()));
        }
        if timing.lane_sync_timeout <= timing.debounce_cycles {
            return Err(ConfigError::Timing(format!(
                "lane_sync_timeout ({}) must exceed debounce_cycles ({})",
                timing.lane_sync_timeout, timing.debounce_cycles
            )));
        }
        // SYNC~ to ILAS start takes up to one multiframe, then four multiframes of ILAS.
        let ilas_min = (ILAS_MULTIFRAMES + 1) * self.settings.multiframe_octets();
        if (timing.ilas_timeout as usize) < ilas_min {
            return Err(ConfigError::Timing(format!(
                "ilas_timeout ({}) shorter than {} ticks of ILAS",
                timing.ilas_timeout, ilas_min
            )));
        }

        for (name, hz) in [
            ("device", self.clocks.device_hz),
            ("control", self.clocks.control_hz),
            ("refclk", self.clocks.refclk_hz),
        ] {
            if hz == 0 {
                return Err(ConfigError::Clock(name));
            }
        }

        if !self.identifier.is_ascii() || self.identifier.contains('\0') {
            return Err(ConfigError::Identifier("must be ASCII without NUL".into()));
        }
        if self.identifier.len() >= IDENTIFIER_MEM_SIZE {
            return Err(ConfigError::Identifier(format!(
                "{} bytes does not fit {} bytes with terminator",
                self.identifier.len(),
                IDENTIFIER_MEM_SIZE
            )));
        }
        Ok(())
    }
}
