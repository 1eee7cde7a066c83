//! Data path after the lanes: descrambling, transport demapping and frame output.
//!
//! ```text
//!  deskew ─► Descrambler (per lane) ─► TransportDecoder ─► FrameAssembler ─► SampleSink
//!                                                              │
//!                                                         StplChecker
//! ```

mod assembler;
mod descrambler;
mod stpl;
mod transport;

pub use assembler::*;
pub use descrambler::*;
pub use stpl::*;
pub use transport::*;
