//! Link-layer constants from the JESD204B standard and defaults of this core.
//!
//! Control character values are the decoded octets of the 8b/10b K-codes as
//! delivered by the PHY together with its control flag.

// =============================================================================
// CONTROL CHARACTERS (JESD204B 5.3.3)
// =============================================================================

/// /R/ (K28.0): start of an ILAS multiframe.
pub const CHAR_R: u8 = 0x1C;

/// /A/ (K28.3): lane alignment, end of multiframe.
pub const CHAR_A: u8 = 0x7C;

/// /Q/ (K28.4): start of the ILAS configuration data.
pub const CHAR_Q: u8 = 0x9C;

/// /K/ (K28.5): comma, sent during code group synchronization.
pub const CHAR_K: u8 = 0xBC;

/// /F/ (K28.7): frame alignment, end of frame.
pub const CHAR_F: u8 = 0xFC;

// =============================================================================
// ILAS LAYOUT
// =============================================================================

/// Number of multiframes in the initial lane alignment sequence.
pub const ILAS_MULTIFRAMES: usize = 4;

/// Multiframe (0-based) carrying the configuration octets.
pub const ILAS_CONFIG_MULTIFRAME: usize = 1;

/// Octet offset of the /Q/ marker inside the configuration multiframe.
pub const ILAS_Q_OFFSET: usize = 1;

/// Octet offset of the first configuration octet inside the configuration multiframe.
pub const ILAS_CONFIG_OFFSET: usize = 2;

/// Number of link configuration octets.
pub const ILAS_CONFIG_LEN: usize = 14;

/// Smallest multiframe (F·K octets) that can hold /R/, /Q/, the configuration and /A/.
pub const MIN_MULTIFRAME_OCTETS: usize = 17;

/// Largest multiframe allowed by the standard.
pub const MAX_MULTIFRAME_OCTETS: usize = 1024;

// =============================================================================
// SCRAMBLING (JESD204B 5.2)
// =============================================================================

/// Width of the scrambler shift register (x^15 + x^14 + 1).
pub const SCRAMBLER_WIDTH: u32 = 15;

/// Scrambler state at link bring-up.
pub const SCRAMBLER_SEED: u16 = 0x7FFF;

// =============================================================================
// LINK DEFAULTS
// =============================================================================

/// Default deskew FIFO depth in octets per lane.
pub const DEFAULT_DESKEW_DEPTH: usize = 16;

/// Consecutive ticks every lane must hold code sync before ILAS is requested.
pub const DEFAULT_DEBOUNCE_CYCLES: u32 = 16;

/// Ticks allowed in LaneSync before `PhyTimeout`.
pub const DEFAULT_LANE_SYNC_TIMEOUT: u32 = 4096;

/// Ticks allowed in IlasWait before `IlasTimeout`.
pub const DEFAULT_ILAS_TIMEOUT: u32 = 8192;

/// Consecutive misplaced alignment characters that make a framing error.
pub const MISALIGNMENT_LIMIT: u8 = 2;

/// Stages of a bit synchronizer between clock domains.
pub const SYNC_STAGES: usize = 2;

// =============================================================================
// CONTROL PLANE
// =============================================================================

/// `link_control` bit 0: enable the link.
pub const CONTROL_ENABLE: u32 = 1 << 0;

/// `link_control` bit 8: disable ILAS field validation.
pub const CONTROL_ILAS_DISABLE: u32 = 1 << 8;

/// `link_status` bit 0: link ready.
pub const STATUS_READY: u32 = 1 << 0;

/// `link_status` bit 1: SYNC~ released (link synchronized).
pub const STATUS_JSYNC: u32 = 1 << 1;

/// Size of the identifier memory in bytes.
pub const IDENTIFIER_MEM_SIZE: usize = 256;

/// Multiplier of the short transport-layer test PRNG.
pub const STPL_PRNG_MULTIPLIER: u32 = 0x3141_5979;
