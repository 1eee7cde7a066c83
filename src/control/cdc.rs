//! Clock domain crossing primitives.
//!
//! Both primitives are clocked by the destination domain and only ever sample
//! a value the source domain has already settled, so a crossing costs a fixed
//! number of destination ticks.

use crate::core::constants::SYNC_STAGES;

/// Multi-stage register synchronizer for a quasi-static value.
///
/// The output follows the input after [`SYNC_STAGES`] destination ticks.
#[derive(Debug, Clone)]
pub struct MultiReg<T: Copy> {
    stages: [T; SYNC_STAGES],
}

impl<T: Copy> MultiReg<T> {
    /// Create a synchronizer with every stage holding `reset`.
    pub fn new(reset: T) -> Self {
        Self {
            stages: [reset; SYNC_STAGES],
        }
    }

    /// Destination clock edge: shift `input` into the first stage.
    pub fn tick(&mut self, input: T) {
        for i in (1..SYNC_STAGES).rev() {
            self.stages[i] = self.stages[i - 1];
        }
        self.stages[0] = input;
    }

    /// Synchronized value.
    pub fn output(&self) -> T {
        self.stages[SYNC_STAGES - 1]
    }

    /// Force every stage to `value`.
    pub fn reset(&mut self, value: T) {
        self.stages = [value; SYNC_STAGES];
    }
}

impl<T: Copy + Default> Default for MultiReg<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// One-shot pulse crossing between two domains.
///
/// A source pulse flips a toggle flop; the toggle crosses through a
/// [`MultiReg`] and an edge detector in the destination domain turns every
/// change back into a single-cycle pulse. Source pulses must be spaced further
/// apart than the crossing latency or they merge.
#[derive(Debug, Clone, Default)]
pub struct PulseSynchronizer {
    toggle: bool,
    sync: MultiReg<bool>,
    last: bool,
}

impl PulseSynchronizer {
    /// Create an idle synchronizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source clock edge.
    pub fn source_tick(&mut self, pulse: bool) {
        if pulse {
            self.toggle = !self.toggle;
        }
    }

    /// Destination clock edge; returns the recovered pulse.
    pub fn destination_tick(&mut self) -> bool {
        self.sync.tick(self.toggle);
        let now = self.sync.output();
        let pulse = now != self.last;
        self.last = now;
        pulse
    }

    /// A pulse entered the source side and has not come out yet.
    pub fn in_flight(&self) -> bool {
        self.toggle != self.last
    }
}
