//! Core types shared by every layer: constants, errors and the sink trait.

pub mod constants;
mod error;
mod traits;

pub use error::*;
pub use traits::*;
