//! ADC transmitter model used as a test bench for the receive link.

mod adc;

pub use adc::*;
