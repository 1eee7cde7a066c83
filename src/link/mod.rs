//! Link layer: the bring-up controller and the per-tick data path.

mod controller;
#[allow(clippy::module_inception)]
mod link;

pub use controller::*;
pub use link::*;
