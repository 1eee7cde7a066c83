//! Control plane: clock domain crossings, reference clock measurement, the
//! register file and the SoC that ties the domains together.

mod cdc;
mod clock;
mod registers;
mod soc;

pub use cdc::*;
pub use clock::*;
pub use registers::*;
pub use soc::*;
