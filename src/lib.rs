//! # JESD204B receive link
//!
//! A cycle-level model of a multi-lane **JESD204B Subclass 1** receive core:
//! the logic that turns per-lane 8b/10b-decoded octets from the serial PHYs
//! into aligned converter sample frames.
//!
//! - **Lane alignment**: frame and multiframe phase per lane, framing error monitor
//! - **ILAS**: capture and validation of the initial lane alignment sequence
//! - **Deskew**: per-lane FIFOs released in lockstep from the multiframe marker
//! - **Descrambling**: self-synchronous 1 + x^14 + x^15 descrambler per lane
//! - **Transport**: precomputed offset table mapping frame bits to samples
//! - **Control**: link state machine, register file and clock domain crossings
//!
//! ## Feature Flags
//!
//! - `emulator` (default): ADC transmitter model used as a test bench
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and traits (always included)
//! - [`config`]: link geometry, presets and JSON configuration
//! - [`lane`]: lane receiver, ILAS detector and deskew buffer
//! - [`datapath`]: descrambler, transport decoder, frame assembler, STPL checker
//! - [`link`]: link controller and the per-tick [`Link`]
//! - [`control`]: CDC primitives, clock measurement, registers and [`Soc`](control::Soc)
//! - [`emulator`]: ADC transmitter model (requires `emulator` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use jesd204b_rx::prelude::*;
//!
//! let config = LinkConfig::adc08dj5200rf(4).unwrap();
//! let mut adc = AdcEmulator::new(&config, TestPattern::Ramp);
//! let mut link = Link::new(config).unwrap();
//! let mut frames: Vec<SampleFrame> = Vec::new();
//!
//! link.enable();
//! adc.run(&mut link, &mut frames, 2_000);
//!
//! assert_eq!(*link.state(), LinkState::Ready);
//! assert_eq!(adc.find_window(&frames), Some(0));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod config;
pub mod control;
pub mod datapath;
pub mod lane;
pub mod link;

// ADC model (feature-gated)
#[cfg(feature = "emulator")]
#[cfg_attr(docsrs, doc(cfg(feature = "emulator")))]
pub mod emulator;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::config::{ClockConfig, FrameConfig, JesdSettings, LinkConfig, LinkTiming, PhyConfig};
    pub use crate::control::{ControlPlane, Csr, Soc};
    pub use crate::datapath::{SampleFrame, StplPattern};
    pub use crate::lane::{IlasRecord, LaneInput};
    pub use crate::link::{Link, LinkController, LinkState, TickReport};

    #[cfg(feature = "emulator")]
    pub use crate::emulator::{AdcEmulator, TestPattern};
}

// Re-export commonly used items at crate root
pub use self::core::{ConfigError, Jesd204Error, LinkFault, RegisterError, SampleSink};
pub use link::{Link, LinkState};
