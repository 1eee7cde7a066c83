//! Error types for the JESD204B receive core.

use std::fmt;

use thiserror::Error;

/// ILAS configuration fields, as they are compared during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IlasField {
    /// Device identifier.
    Did,
    /// Bank identifier.
    Bid,
    /// Lane identifier.
    Lid,
    /// Scrambling enabled.
    Scr,
    /// Lanes per link.
    L,
    /// Octets per frame.
    F,
    /// Frames per multiframe.
    K,
    /// Converters per device.
    M,
    /// Control bits per sample.
    Cs,
    /// Converter resolution.
    N,
    /// Subclass version.
    Subclass,
    /// Bits per sample.
    Np,
    /// JESD204 version.
    Jesdv,
    /// Samples per converter per frame.
    S,
    /// High density format.
    Hd,
    /// Control words per frame.
    Cf,
    /// Configuration checksum.
    Fchk,
}

impl fmt::Display for IlasField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IlasField::Did => "DID",
            IlasField::Bid => "BID",
            IlasField::Lid => "LID",
            IlasField::Scr => "SCR",
            IlasField::L => "L",
            IlasField::F => "F",
            IlasField::K => "K",
            IlasField::M => "M",
            IlasField::Cs => "CS",
            IlasField::N => "N",
            IlasField::Subclass => "SUBCLASSV",
            IlasField::Np => "NP",
            IlasField::Jesdv => "JESDV",
            IlasField::S => "S",
            IlasField::Hd => "HD",
            IlasField::Cf => "CF",
            IlasField::Fchk => "FCHK",
        };
        f.write_str(name)
    }
}

/// A single disagreeing ILAS field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    /// Logical lane whose record disagrees.
    pub lane: usize,
    /// Offending field.
    pub field: IlasField,
    /// Value the field should have had.
    pub expected: u16,
    /// Value received.
    pub actual: u16,
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lane {} {}: expected {}, got {}",
            self.lane, self.field, self.expected, self.actual
        )
    }
}

fn join_mismatches(mismatches: &[FieldMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Faults that move the link controller into its `Error` state.
///
/// Faults are state, not control flow: they are recorded by the controller and
/// exposed through the `link_fault` register until the next reset.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkFault {
    /// Not every lane reached code sync before the LaneSync timeout.
    #[error("PHY timeout: lanes {lanes:?} never held code sync")]
    PhyTimeout {
        /// Logical lanes without code sync when the timeout expired.
        lanes: Vec<usize>,
    },

    /// Not every lane delivered a well-formed ILAS before the timeout.
    #[error("ILAS timeout: lanes {lanes:?} have no complete ILAS")]
    IlasTimeout {
        /// Logical lanes without a complete candidate record.
        lanes: Vec<usize>,
    },

    /// Received configuration disagrees with the expected one or across lanes.
    #[error("configuration mismatch: {}", join_mismatches(.0))]
    ConfigMismatch(Vec<FieldMismatch>),

    /// Inter-lane skew exceeded the deskew buffer depth.
    #[error("skew overflow on lane {lane} (depth {depth})")]
    SkewOverflow {
        /// Lane whose FIFO overflowed.
        lane: usize,
        /// Provisioned depth.
        depth: usize,
    },

    /// Code sync lost after the link was ready.
    #[error("link down: lanes {lanes:?} lost code sync")]
    LinkDown {
        /// Logical lanes that dropped code sync.
        lanes: Vec<usize>,
    },
}

impl LinkFault {
    /// Numeric fault code exposed by the `link_fault` register.
    pub fn code(&self) -> u32 {
        match self {
            LinkFault::PhyTimeout { .. } => 1,
            LinkFault::IlasTimeout { .. } => 2,
            LinkFault::ConfigMismatch(_) => 3,
            LinkFault::SkewOverflow { .. } => 4,
            LinkFault::LinkDown { .. } => 5,
        }
    }

    /// Fields reported by a `ConfigMismatch`, empty for other faults.
    pub fn mismatches(&self) -> &[FieldMismatch] {
        match self {
            LinkFault::ConfigMismatch(m) => m,
            _ => &[],
        }
    }
}

/// Errors in link configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A geometry parameter is outside its legal range.
    #[error("{field} = {value} out of range {min}..={max}")]
    OutOfRange {
        /// Parameter name.
        field: &'static str,
        /// Offending value.
        value: u32,
        /// Minimum legal value.
        min: u32,
        /// Maximum legal value.
        max: u32,
    },

    /// N + CS does not fit in NP.
    #[error("sample does not fit: N ({n}) + CS ({cs}) > NP ({np})")]
    SampleWidth {
        /// Converter resolution.
        n: u8,
        /// Control bits.
        cs: u8,
        /// Bits per sample.
        np: u8,
    },

    /// The frame cannot carry M·S·NP payload bits.
    #[error("frame too small: {frame_bits} bits for {payload_bits} payload bits")]
    FrameTooSmall {
        /// 8·F·L.
        frame_bits: usize,
        /// M·S·NP.
        payload_bits: usize,
    },

    /// F·K is outside the legal multiframe length.
    #[error("multiframe of {octets} octets outside 17..=1024")]
    MultiframeLength {
        /// F·K.
        octets: usize,
    },

    /// A per-lane table has the wrong number of entries.
    #[error("{what} has {actual} entries, expected {expected}")]
    LaneCount {
        /// Table name.
        what: &'static str,
        /// Number of lanes.
        expected: usize,
        /// Entries present.
        actual: usize,
    },

    /// The PHY lane order is not a permutation of the lanes.
    #[error("rx lane order {0:?} is not a permutation")]
    LaneOrder(Vec<usize>),

    /// No preset exists for this lane count.
    #[error("no preset for {0} lanes")]
    UnsupportedLaneCount(usize),

    /// A timing parameter is inconsistent.
    #[error("invalid timing: {0}")]
    Timing(String),

    /// The deskew depth must be at least one octet.
    #[error("deskew depth must be non-zero")]
    DeskewDepth,

    /// A clock frequency is zero.
    #[error("clock {0} has zero frequency")]
    Clock(&'static str),

    /// Identifier is not ASCII or does not fit the identifier memory.
    #[error("invalid identifier: {0}")]
    Identifier(String),

    /// JSON parse error.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// I/O error while reading a configuration file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from control-plane register access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// No register with this name.
    #[error("unknown register: {0}")]
    Unknown(String),

    /// Lane index beyond the configured PHYs.
    #[error("lane {lane} out of range (link has {lanes} lanes)")]
    LaneOutOfRange {
        /// Requested lane.
        lane: usize,
        /// Configured lanes.
        lanes: usize,
    },

    /// Identifier memory index out of range.
    #[error("identifier index {0} out of range")]
    IndexOutOfRange(usize),

    /// Write to a read-only register.
    #[error("register {0} is read-only")]
    ReadOnly(String),

    /// Read from a write-only register.
    #[error("register {0} is write-only")]
    WriteOnly(String),

    /// Value wider than the register.
    #[error("value 0x{value:x} does not fit {width}-bit register {name}")]
    ValueTooWide {
        /// Register name.
        name: String,
        /// Written value.
        value: u64,
        /// Register width in bits.
        width: u32,
    },
}

/// Top-level errors.
#[derive(Debug, Error)]
pub enum Jesd204Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Register access error.
    #[error("register error: {0}")]
    Register(#[from] RegisterError),
}
