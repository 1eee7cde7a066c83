//! Reference clock measurement and multi-domain scheduling.

use log::debug;

use super::cdc::{MultiReg, PulseSynchronizer};
use crate::config::ClockConfig;
use crate::core::ConfigError;

/// Free-running counter in the reference clock domain.
///
/// The control domain requests a snapshot with a latch pulse. The pulse crosses
/// into the refclk domain, the counter is captured there, and the captured
/// value crosses back through a [`MultiReg`]. Two snapshots taken a known
/// control-domain interval apart give the reference frequency.
#[derive(Debug, Clone, Default)]
pub struct ClockMeasurement {
    counter: u64,
    latched: u64,
    latch: PulseSynchronizer,
    value: MultiReg<u64>,
}

impl ClockMeasurement {
    /// Create a measurement with the counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Control clock edge. `latch` is the `refclk_measurement_latch` strobe.
    pub fn control_tick(&mut self, latch: bool) {
        self.latch.source_tick(latch);
        self.value.tick(self.latched);
    }

    /// Reference clock edge.
    pub fn refclk_tick(&mut self) {
        self.counter = self.counter.wrapping_add(1);
        if self.latch.destination_tick() {
            self.latched = self.counter;
        }
    }

    /// `refclk_measurement_value` as seen by the control domain.
    pub fn value(&self) -> u64 {
        self.value.output()
    }

    /// Live counter, refclk domain.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// A latch request has not reached the refclk domain yet.
    pub fn latch_pending(&self) -> bool {
        self.latch.in_flight()
    }
}

/// Clock domains of the SoC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// JESD device clock; one link tick per edge.
    Device,
    /// System clock running the control plane.
    Control,
    /// Measured reference clock.
    Refclk,
}

/// Domains clocked on one scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Edges {
    /// Device clock edge.
    pub device: bool,
    /// Control clock edge.
    pub control: bool,
    /// Refclk edge.
    pub refclk: bool,
}

impl Edges {
    /// Whether `domain` has an edge.
    pub fn has(&self, domain: Domain) -> bool {
        match domain {
            Domain::Device => self.device,
            Domain::Control => self.control,
            Domain::Refclk => self.refclk,
        }
    }
}

#[derive(Debug, Clone)]
struct WrapAroundCounter {
    value: u64,
    limit: u64,
}

impl WrapAroundCounter {
    fn new(limit: u64) -> Self {
        Self { value: 0, limit }
    }

    fn remaining(&self) -> u64 {
        self.limit - self.value
    }

    fn advance(&mut self, steps: u64) {
        self.value = (self.value + steps) % self.limit;
    }

    fn test(&self) -> bool {
        self.value == 0
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Interleaves the three clock domains.
///
/// The simulation runs at the least common multiple of the three frequencies,
/// so every domain has an integral period. Steps jump straight to the next
/// simulation cycle on which at least one domain has an edge.
#[derive(Debug, Clone)]
pub struct ClockScheduler {
    frequency: u64,
    counters: [WrapAroundCounter; 3],
    time: u64,
}

impl ClockScheduler {
    /// Build a scheduler for `clocks`.
    pub fn new(clocks: &ClockConfig) -> Result<Self, ConfigError> {
        let rates = [
            ("device", clocks.device_hz),
            ("control", clocks.control_hz),
            ("refclk", clocks.refclk_hz),
        ];
        let mut frequency = 1u64;
        for (name, hz) in rates {
            if hz == 0 {
                return Err(ConfigError::Clock(name));
            }
            frequency = (frequency / gcd(frequency, hz))
                .checked_mul(hz)
                .ok_or_else(|| ConfigError::Timing(format!("no common simulation clock for {name}")))?;
        }
        debug!("clock: simulation frequency {frequency} Hz");

        Ok(Self {
            frequency,
            counters: rates.map(|(_, hz)| WrapAroundCounter::new(frequency / hz)),
            time: 0,
        })
    }

    /// Simulation frequency in Hz.
    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    /// Simulation cycles per edge of `domain`.
    pub fn period(&self, domain: Domain) -> u64 {
        self.counters[domain as usize].limit
    }

    /// Simulation cycles elapsed.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Simulated seconds elapsed.
    pub fn elapsed_secs(&self) -> f64 {
        self.time as f64 / self.frequency as f64
    }

    /// Advance to the next edge of any domain.
    pub fn next(&mut self) -> Edges {
        let steps = self
            .counters
            .iter()
            .map(WrapAroundCounter::remaining)
            .min()
            .unwrap_or(1);
        for counter in &mut self.counters {
            counter.advance(steps);
        }
        self.time += steps;

        Edges {
            device: self.counters[Domain::Device as usize].test(),
            control: self.counters[Domain::Control as usize].test(),
            refclk: self.counters[Domain::Refclk as usize].test(),
        }
    }
}
