//! Control and status registers.
//!
//! Registers are addressed by name, as the board scripts address them through
//! the CSR map:
//!
//! | Register                   | Access | Width |
//! |----------------------------|--------|-------|
//! | `phy{n}_tx_polarity`       | RW     | 1     |
//! | `phy{n}_rx_polarity`       | RW     | 1     |
//! | `phy{n}_tx_enable`         | RW     | 1     |
//! | `phy{n}_rx_enable`         | RW     | 1     |
//! | `phy{n}_tx_ready`          | RO     | 1     |
//! | `phy{n}_rx_ready`          | RO     | 1     |
//! | `link_control`             | RW     | 32    |
//! | `link_status`              | RO     | 32    |
//! | `link_fault`               | RO     | 32    |
//! | `link_stpl_enable`         | RW     | 1     |
//! | `link_stpl_errors`         | RO     | 64    |
//! | `link_frames`              | RO     | 64    |
//! | `refclk_measurement_latch` | WO     | 1     |
//! | `refclk_measurement_value` | RO     | 64    |
//! | `identifier_mem[i]`        | RO     | 8     |

use std::fmt;
use std::str::FromStr;

use crate::config::LinkConfig;
use crate::core::RegisterError;
use crate::core::constants::{CONTROL_ILAS_DISABLE, IDENTIFIER_MEM_SIZE};

/// Register access kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read and write.
    ReadWrite,
    /// Status, written by the core.
    ReadOnly,
    /// Strobe, reads are not defined.
    WriteOnly,
}

/// A control/status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Csr {
    /// Invert the TX line of PHY `n`.
    PhyTxPolarity(usize),
    /// Invert the RX line of PHY `n`.
    PhyRxPolarity(usize),
    /// Enable the transmitter of PHY `n`.
    PhyTxEnable(usize),
    /// Enable the receiver of PHY `n`.
    PhyRxEnable(usize),
    /// Transmitter of PHY `n` is up.
    PhyTxReady(usize),
    /// Receiver of PHY `n` is up.
    PhyRxReady(usize),
    /// Bit 0 enable, bit 8 disable ILAS validation.
    LinkControl,
    /// Bit 0 ready, bit 1 SYNC~ released.
    LinkStatus,
    /// Fault code, 0 if none.
    LinkFault,
    /// Short transport-layer test enable.
    LinkStplEnable,
    /// Short transport-layer test mismatches.
    LinkStplErrors,
    /// Frames delivered since the core came up.
    LinkFrames,
    /// Latch the reference clock counter.
    RefclkMeasurementLatch,
    /// Last latched reference clock count.
    RefclkMeasurementValue,
    /// Byte `i` of the identifier string.
    IdentifierMem(usize),
}

impl Csr {
    /// Access kind.
    pub fn access(&self) -> Access {
        match self {
            Csr::PhyTxPolarity(_)
            | Csr::PhyRxPolarity(_)
            | Csr::PhyTxEnable(_)
            | Csr::PhyRxEnable(_)
            | Csr::LinkControl
            | Csr::LinkStplEnable => Access::ReadWrite,
            Csr::RefclkMeasurementLatch => Access::WriteOnly,
            _ => Access::ReadOnly,
        }
    }

    /// Width in bits.
    pub fn width(&self) -> u32 {
        match self {
            Csr::LinkControl | Csr::LinkStatus | Csr::LinkFault => 32,
            Csr::LinkStplErrors | Csr::LinkFrames | Csr::RefclkMeasurementValue => 64,
            Csr::IdentifierMem(_) => 8,
            _ => 1,
        }
    }

    fn phy(&self) -> Option<usize> {
        match *self {
            Csr::PhyTxPolarity(n)
            | Csr::PhyRxPolarity(n)
            | Csr::PhyTxEnable(n)
            | Csr::PhyRxEnable(n)
            | Csr::PhyTxReady(n)
            | Csr::PhyRxReady(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Csr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Csr::PhyTxPolarity(n) => write!(f, "phy{n}_tx_polarity"),
            Csr::PhyRxPolarity(n) => write!(f, "phy{n}_rx_polarity"),
            Csr::PhyTxEnable(n) => write!(f, "phy{n}_tx_enable"),
            Csr::PhyRxEnable(n) => write!(f, "phy{n}_rx_enable"),
            Csr::PhyTxReady(n) => write!(f, "phy{n}_tx_ready"),
            Csr::PhyRxReady(n) => write!(f, "phy{n}_rx_ready"),
            Csr::LinkControl => f.write_str("link_control"),
            Csr::LinkStatus => f.write_str("link_status"),
            Csr::LinkFault => f.write_str("link_fault"),
            Csr::LinkStplEnable => f.write_str("link_stpl_enable"),
            Csr::LinkStplErrors => f.write_str("link_stpl_errors"),
            Csr::LinkFrames => f.write_str("link_frames"),
            Csr::RefclkMeasurementLatch => f.write_str("refclk_measurement_latch"),
            Csr::RefclkMeasurementValue => f.write_str("refclk_measurement_value"),
            Csr::IdentifierMem(i) => write!(f, "identifier_mem[{i}]"),
        }
    }
}

impl FromStr for Csr {
    type Err = RegisterError;

    /// Parse a register name. `identifier_mem` alone addresses byte 0.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unknown = || RegisterError::Unknown(name.to_string());

        if let Some(rest) = name.strip_prefix("phy") {
            let (index, field) = rest.split_once('_').ok_or_else(unknown)?;
            if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                return Err(unknown());
            }
            let n: usize = index.parse().map_err(|_| unknown())?;
            return match field {
                "tx_polarity" => Ok(Csr::PhyTxPolarity(n)),
                "rx_polarity" => Ok(Csr::PhyRxPolarity(n)),
                "tx_enable" => Ok(Csr::PhyTxEnable(n)),
                "rx_enable" => Ok(Csr::PhyRxEnable(n)),
                "tx_ready" => Ok(Csr::PhyTxReady(n)),
                "rx_ready" => Ok(Csr::PhyRxReady(n)),
                _ => Err(unknown()),
            };
        }

        if let Some(rest) = name.strip_prefix("identifier_mem") {
            if rest.is_empty() {
                return Ok(Csr::IdentifierMem(0));
            }
            let index = rest
                .strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .ok_or_else(unknown)?;
            return index
                .parse()
                .map(Csr::IdentifierMem)
                .map_err(|_| unknown());
        }

        match name {
            "link_control" => Ok(Csr::LinkControl),
            "link_status" => Ok(Csr::LinkStatus),
            "link_fault" => Ok(Csr::LinkFault),
            "link_stpl_enable" => Ok(Csr::LinkStplEnable),
            "link_stpl_errors" => Ok(Csr::LinkStplErrors),
            "link_frames" => Ok(Csr::LinkFrames),
            "refclk_measurement_latch" => Ok(Csr::RefclkMeasurementLatch),
            "refclk_measurement_value" => Ok(Csr::RefclkMeasurementValue),
            _ => Err(unknown()),
        }
    }
}

/// Per-PHY control bits, one bit per physical lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhyControls {
    /// TX polarity inversion.
    pub tx_polarity: u32,
    /// RX polarity inversion.
    pub rx_polarity: u32,
    /// TX enable.
    pub tx_enable: u32,
    /// RX enable.
    pub rx_enable: u32,
}

impl PhyControls {
    /// Whether bit `phy` of `mask` is set.
    pub fn bit(mask: u32, phy: usize) -> bool {
        phy < 32 && mask & (1 << phy) != 0
    }
}

/// Control-domain values that drive the device domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceControls {
    /// `link_control`.
    pub link_control: u32,
    /// `link_stpl_enable`.
    pub stpl_enable: bool,
    /// PHY control bits.
    pub phy: PhyControls,
}

/// Device-domain status mirrored into the control domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    /// `link_status`.
    pub link_status: u32,
    /// `link_fault`.
    pub link_fault: u32,
    /// `link_stpl_errors`.
    pub stpl_errors: u64,
    /// `link_frames`.
    pub frames: u64,
    /// `phy{n}_tx_ready`, one bit per PHY.
    pub tx_ready: u32,
    /// `phy{n}_rx_ready`, one bit per PHY.
    pub rx_ready: u32,
}

fn set_bit(mask: &mut u32, phy: usize, value: bool) {
    if value {
        *mask |= 1 << phy;
    } else {
        *mask &= !(1 << phy);
    }
}

/// The register file, living in the control clock domain.
///
/// Writes land here immediately; the device domain only sees them once they
/// have crossed a synchronizer (see [`Soc`](super::Soc)).
#[derive(Debug, Clone)]
pub struct ControlPlane {
    lanes: usize,
    controls: DeviceControls,
    status: StatusSnapshot,
    refclk_value: u64,
    latch_request: bool,
    identifier: [u8; IDENTIFIER_MEM_SIZE],
}

impl ControlPlane {
    /// Register file for `config`, with polarities taken from the PHY setup.
    pub fn new(config: &LinkConfig) -> Self {
        let lanes = config.lanes();
        let link_control = if config.ilas_validation {
            0
        } else {
            CONTROL_ILAS_DISABLE
        };
        let mut controls = DeviceControls {
            link_control,
            stpl_enable: false,
            phy: PhyControls::default(),
        };
        for phy in 0..lanes {
            set_bit(&mut controls.phy.tx_polarity, phy, config.phy.tx_polarity(phy));
            set_bit(&mut controls.phy.rx_polarity, phy, config.phy.rx_polarity(phy));
        }

        let mut identifier = [0u8; IDENTIFIER_MEM_SIZE];
        let bytes = config.identifier.as_bytes();
        let len = bytes.len().min(IDENTIFIER_MEM_SIZE - 1);
        identifier[..len].copy_from_slice(&bytes[..len]);

        Self {
            lanes,
            controls,
            status: StatusSnapshot::default(),
            refclk_value: 0,
            latch_request: false,
            identifier,
        }
    }

    /// Number of PHYs.
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    fn check(&self, csr: Csr) -> Result<(), RegisterError> {
        if let Some(lane) = csr.phy() {
            if lane >= self.lanes {
                return Err(RegisterError::LaneOutOfRange {
                    lane,
                    lanes: self.lanes,
                });
            }
        }
        if let Csr::IdentifierMem(i) = csr {
            if i >= IDENTIFIER_MEM_SIZE {
                return Err(RegisterError::IndexOutOfRange(i));
            }
        }
        Ok(())
    }

    /// Read a register.
    pub fn read(&self, csr: Csr) -> Result<u64, RegisterError> {
        self.check(csr)?;
        let bit = |mask: u32, n: usize| u64::from(PhyControls::bit(mask, n));
        let value = match csr {
            Csr::PhyTxPolarity(n) => bit(self.controls.phy.tx_polarity, n),
            Csr::PhyRxPolarity(n) => bit(self.controls.phy.rx_polarity, n),
            Csr::PhyTxEnable(n) => bit(self.controls.phy.tx_enable, n),
            Csr::PhyRxEnable(n) => bit(self.controls.phy.rx_enable, n),
            Csr::PhyTxReady(n) => bit(self.status.tx_ready, n),
            Csr::PhyRxReady(n) => bit(self.status.rx_ready, n),
            Csr::LinkControl => u64::from(self.controls.link_control),
            Csr::LinkStatus => u64::from(self.status.link_status),
            Csr::LinkFault => u64::from(self.status.link_fault),
            Csr::LinkStplEnable => u64::from(self.controls.stpl_enable),
            Csr::LinkStplErrors => self.status.stpl_errors,
            Csr::LinkFrames => self.status.frames,
            Csr::RefclkMeasurementLatch => return Err(RegisterError::WriteOnly(csr.to_string())),
            Csr::RefclkMeasurementValue => self.refclk_value,
            Csr::IdentifierMem(i) => u64::from(self.identifier[i]),
        };
        Ok(value)
    }

    /// Write a register.
    pub fn write(&mut self, csr: Csr, value: u64) -> Result<(), RegisterError> {
        self.check(csr)?;
        if csr.access() == Access::ReadOnly {
            return Err(RegisterError::ReadOnly(csr.to_string()));
        }
        let width = csr.width();
        if width < 64 && value >> width != 0 {
            return Err(RegisterError::ValueTooWide {
                name: csr.to_string(),
                value,
                width,
            });
        }

        let on = value != 0;
        match csr {
            Csr::PhyTxPolarity(n) => set_bit(&mut self.controls.phy.tx_polarity, n, on),
            Csr::PhyRxPolarity(n) => set_bit(&mut self.controls.phy.rx_polarity, n, on),
            Csr::PhyTxEnable(n) => set_bit(&mut self.controls.phy.tx_enable, n, on),
            Csr::PhyRxEnable(n) => set_bit(&mut self.controls.phy.rx_enable, n, on),
            // Width was checked above.
            Csr::LinkControl => self.controls.link_control = value as u32,
            Csr::LinkStplEnable => self.controls.stpl_enable = on,
            Csr::RefclkMeasurementLatch => self.latch_request |= on,
            _ => return Err(RegisterError::ReadOnly(csr.to_string())),
        }
        Ok(())
    }

    /// Read a register by name.
    pub fn read_named(&self, name: &str) -> Result<u64, RegisterError> {
        self.read(name.parse()?)
    }

    /// Write a register by name.
    pub fn write_named(&mut self, name: &str, value: u64) -> Result<(), RegisterError> {
        self.write(name.parse()?, value)
    }

    /// Identifier string: bytes up to the first NUL, at most the memory size.
    pub fn identifier(&self) -> String {
        self.identifier
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect()
    }

    /// Values driving the device domain.
    pub fn controls(&self) -> DeviceControls {
        self.controls
    }

    /// Consume a pending `refclk_measurement_latch` strobe.
    pub fn take_latch(&mut self) -> bool {
        std::mem::take(&mut self.latch_request)
    }

    /// Update the status mirrors.
    pub fn update_status(&mut self, status: StatusSnapshot, refclk_value: u64) {
        self.status = status;
        self.refclk_value = refclk_value;
    }

    /// Current status mirror.
    pub fn status(&self) -> StatusSnapshot {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane() -> ControlPlane {
        ControlPlane::new(&LinkConfig::adc08dj5200rf(8).unwrap())
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("phy2_rx_enable".parse::<Csr>(), Ok(Csr::PhyRxEnable(2)));
        assert_eq!("phy13_tx_ready".parse::<Csr>(), Ok(Csr::PhyTxReady(13)));
        assert_eq!("link_control".parse::<Csr>(), Ok(Csr::LinkControl));
        assert_eq!("identifier_mem".parse::<Csr>(), Ok(Csr::IdentifierMem(0)));
        assert_eq!("identifier_mem[12]".parse::<Csr>(), Ok(Csr::IdentifierMem(12)));
        assert_eq!(
            "refclk_measurement_value".parse::<Csr>(),
            Ok(Csr::RefclkMeasurementValue)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for name in ["phy_rx_enable", "phyx_rx_enable", "phy1_rx", "link", "identifier_mem[", "phy+1_tx_enable"] {
            assert_eq!(
                name.parse::<Csr>(),
                Err(RegisterError::Unknown(name.to_string())),
                "{name}"
            );
        }
    }

    #[test]
    fn test_display_round_trips() {
        for csr in [
            Csr::PhyTxPolarity(3),
            Csr::PhyRxReady(7),
            Csr::LinkStplErrors,
            Csr::RefclkMeasurementLatch,
            Csr::IdentifierMem(5),
        ] {
            assert_eq!(csr.to_string().parse::<Csr>(), Ok(csr));
        }
    }

    #[test]
    fn test_preset_polarities() {
        let plane = plane();
        for phy in 0..4 {
            assert_eq!(plane.read(Csr::PhyRxPolarity(phy)), Ok(0));
        }
        for phy in 4..8 {
            assert_eq!(plane.read(Csr::PhyRxPolarity(phy)), Ok(1));
        }
    }

    #[test]
    fn test_write_read_back() {
        let mut plane = plane();
        plane.write(Csr::PhyRxEnable(5), 1).unwrap();
        plane.write_named("link_control", 0x101).unwrap();
        assert_eq!(plane.read(Csr::PhyRxEnable(5)), Ok(1));
        assert_eq!(plane.read(Csr::PhyRxEnable(4)), Ok(0));
        assert_eq!(plane.read_named("link_control"), Ok(0x101));
        assert_eq!(plane.controls().phy.rx_enable, 1 << 5);
    }

    #[test]
    fn test_access_violations() {
        let mut plane = plane();
        assert_eq!(
            plane.write(Csr::LinkStatus, 1),
            Err(RegisterError::ReadOnly("link_status".into()))
        );
        assert_eq!(
            plane.read(Csr::RefclkMeasurementLatch),
            Err(RegisterError::WriteOnly("refclk_measurement_latch".into()))
        );
        assert_eq!(
            plane.write(Csr::PhyTxEnable(8), 1),
            Err(RegisterError::LaneOutOfRange { lane: 8, lanes: 8 })
        );
        assert_eq!(
            plane.read(Csr::IdentifierMem(256)),
            Err(RegisterError::IndexOutOfRange(256))
        );
        assert!(matches!(
            plane.write(Csr::PhyTxEnable(0), 2),
            Err(RegisterError::ValueTooWide { width: 1, .. })
        ));
        assert!(matches!(
            plane.write(Csr::LinkControl, 1 << 32),
            Err(RegisterError::ValueTooWide { width: 32, .. })
        ));
    }

    #[test]
    fn test_latch_strobe_is_consumed() {
        let mut plane = plane();
        assert!(!plane.take_latch());
        plane.write(Csr::RefclkMeasurementLatch, 1).unwrap();
        assert!(plane.take_latch());
        assert!(!plane.take_latch());
    }

    #[test]
    fn test_identifier() {
        let plane = plane();
        assert_eq!(plane.identifier(), "FastScope Test SoC on AXAU15.");
        assert_eq!(plane.read(Csr::IdentifierMem(0)), Ok(u64::from(b'F')));
        assert_eq!(plane.read(Csr::IdentifierMem(29)), Ok(0));
    }

    #[test]
    fn test_status_mirror() {
        let mut plane = plane();
        plane.update_status(
            StatusSnapshot {
                link_status: 3,
                link_fault: 0,
                stpl_errors: 2,
                frames: 1000,
                tx_ready: 0b1010,
                rx_ready: 0b0001,
            },
            4242,
        );
        assert_eq!(plane.read(Csr::LinkStatus), Ok(3));
        assert_eq!(plane.read(Csr::LinkFrames), Ok(1000));
        assert_eq!(plane.read(Csr::PhyTxReady(1)), Ok(1));
        assert_eq!(plane.read(Csr::PhyTxReady(2)), Ok(0));
        assert_eq!(plane.read(Csr::PhyRxReady(0)), Ok(1));
        assert_eq!(plane.read(Csr::RefclkMeasurementValue), Ok(4242));
    }
}
