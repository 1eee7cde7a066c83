//! Short transport-layer test (STPL).
//!
//! With the test enabled the transmitter sends a known value in every sample
//! slot and the receiver counts the samples that differ.

use log::warn;
use serde::{Deserialize, Serialize};

use super::assembler::SampleFrame;
use crate::core::constants::STPL_PRNG_MULTIPLIER;

/// Test pattern selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StplPattern {
    /// `(c << 4) | s`.
    Fixed,
    /// 16-bit PRNG seeded with `(c << 8) | s`.
    Random,
}

impl StplPattern {
    /// Pattern chosen by the `stpl_random` configuration flag.
    pub fn from_random(random: bool) -> Self {
        if random {
            StplPattern::Random
        } else {
            StplPattern::Fixed
        }
    }

    /// Expected N-bit value of sample `sample` of converter `converter`.
    pub fn expected(&self, converter: usize, sample: usize, n: u32) -> u32 {
        let c = converter as u32;
        let s = sample as u32;
        let value = match self {
            StplPattern::Fixed => (c << 4) | s,
            StplPattern::Random => prng((c << 8) | s),
        };
        if n >= 32 { value } else { value & ((1 << n) - 1) }
    }
}

fn prng(seed: u32) -> u32 {
    (seed.wrapping_add(1))
        .wrapping_mul(STPL_PRNG_MULTIPLIER)
        .wrapping_add(1)
        & 0xffff
}

/// Counts samples that differ from the test pattern.
#[derive(Debug, Clone)]
pub struct StplChecker {
    pattern: StplPattern,
    n: u32,
    enabled: bool,
    errors: u64,
}

impl StplChecker {
    /// Checker for N-bit samples, initially disabled.
    pub fn new(pattern: StplPattern, n: u32) -> Self {
        Self {
            pattern,
            n,
            enabled: false,
            errors: 0,
        }
    }

    /// Enable or disable checking. Enabling clears the error count.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.errors = 0;
        }
        self.enabled = enabled;
    }

    /// Whether frames are being checked.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Mismatching samples since the test was enabled.
    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Check one frame. Returns the number of mismatching samples.
    pub fn check(&mut self, frame: &SampleFrame) -> u32 {
        if !self.enabled {
            return 0;
        }
        let mut bad = 0;
        for c in 0..frame.converters() {
            for s in 0..frame.samples_per_converter() {
                if frame.sample(c, s) != self.pattern.expected(c, s, self.n) {
                    bad += 1;
                }
            }
        }
        if bad > 0 {
            warn!("stpl: frame {} has {} bad samples", frame.sequence(), bad);
            self.errors += u64::from(bad);
        }
        bad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameConfig;

    fn geometry() -> FrameConfig {
        FrameConfig {
            l: 4,
            m: 4,
            n: 8,
            np: 8,
            f: 2,
            s: 1,
            cs: 0,
        }
    }

    fn pattern_frame(pattern: StplPattern) -> SampleFrame {
        let words = (0..4).map(|c| pattern.expected(c, 0, 8)).collect();
        SampleFrame::from_words(&geometry(), 0, words)
    }

    #[test]
    fn test_prng_values() {
        assert_eq!(prng(0), 0x597a);
        assert_eq!(StplPattern::Random.expected(0, 0, 8), 0x7a);
        assert_eq!(StplPattern::Fixed.expected(3, 1, 8), 0x31);
        assert_eq!(StplPattern::Fixed.expected(31, 1, 8), 0xf1);
    }

    #[test]
    fn test_checker_counts_mismatches() {
        let mut checker = StplChecker::new(StplPattern::Random, 8);
        let good = pattern_frame(StplPattern::Random);
        assert_eq!(checker.check(&good), 0);

        checker.set_enabled(true);
        assert_eq!(checker.check(&good), 0);
        assert_eq!(checker.check(&pattern_frame(StplPattern::Fixed)), 4);
        assert_eq!(checker.errors(), 4);

        checker.set_enabled(false);
        checker.set_enabled(true);
        assert_eq!(checker.errors(), 0);
    }
}
