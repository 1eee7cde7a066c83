//! Core traits for the receive core.
//!
//! The data plane hands assembled frames to a [`SampleSink`], which models the
//! downstream consumer (DMA engine, FIFO, test harness) and its backpressure.
//! Line octets come from a [`LaneSource`], the PHY side of the link.

use crate::datapath::SampleFrame;
use crate::lane::LaneInput;

/// Consumer of assembled sample frames.
///
/// # Requirements
///
/// - `accept` is only called after `is_ready` returned `true` in the same tick
/// - frames are handed over in order, exactly once
///
/// # Example
///
/// ```ignore
/// struct Counter { frames: u64 }
///
/// impl SampleSink for Counter {
///     fn accept(&mut self, _frame: SampleFrame) {
///         self.frames += 1;
///     }
/// }
/// ```
pub trait SampleSink {
    /// Whether the sink can take a frame this tick.
    ///
    /// Returning `false` stalls the link until the sink drains.
    fn is_ready(&self) -> bool {
        true
    }

    /// Take ownership of one frame.
    fn accept(&mut self, frame: SampleFrame);
}

impl SampleSink for Vec<SampleFrame> {
    fn accept(&mut self, frame: SampleFrame) {
        self.push(frame);
    }
}

/// A sink that discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SampleSink for NullSink {
    fn accept(&mut self, _frame: SampleFrame) {}
}

/// Producer of PHY octets, one per physical lane per device clock.
pub trait LaneSource {
    /// Octets for the next device clock, indexed by physical lane.
    ///
    /// `jsync` is the receiver's SYNC~ output sampled this clock.
    fn next_inputs(&mut self, jsync: bool) -> Vec<LaneInput>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameConfig;

    fn geometry() -> FrameConfig {
        FrameConfig {
            l: 1,
            m: 1,
            n: 8,
            np: 8,
            f: 1,
            s: 1,
            cs: 0,
        }
    }

    struct Gate {
        open: bool,
        taken: usize,
    }

    impl SampleSink for Gate {
        fn is_ready(&self) -> bool {
            self.open
        }

        fn accept(&mut self, _frame: SampleFrame) {
            self.taken += 1;
        }
    }

    #[test]
    fn test_vec_sink_is_always_ready() {
        let mut sink: Vec<SampleFrame> = Vec::new();
        assert!(sink.is_ready());
        sink.accept(SampleFrame::new(&geometry(), 0));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_custom_readiness() {
        let mut gate = Gate { open: false, taken: 0 };
        assert!(!gate.is_ready());
        gate.open = true;
        assert!(gate.is_ready());
        gate.accept(SampleFrame::new(&geometry(), 1));
        assert_eq!(gate.taken, 1);
    }
}
