//! Self-synchronizing scrambling with polynomial x^15 + x^14 + 1.
//!
//! Bits are processed MSB first. Bit 0 of the 15-bit state is the most recent
//! line bit, so bits 13 and 14 hold the line bits 14 and 15 positions back:
//!
//! ```text
//! out[n] = in[n] ^ line[n-14] ^ line[n-15]
//! ```
//!
//! The scrambler shifts its own output into the state, the descrambler the
//! received bit. With equal seeds the pair is the identity from the first bit;
//! with different seeds the descrambler recovers after 15 bits.

use crate::core::constants::{SCRAMBLER_SEED, SCRAMBLER_WIDTH};

const STATE_MASK: u16 = (1 << SCRAMBLER_WIDTH) - 1;

fn taps(state: u16) -> u8 {
    (((state >> 13) ^ (state >> 14)) & 1) as u8
}

/// Transmit-side scrambler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scrambler {
    state: u16,
}

impl Scrambler {
    /// Scrambler with the standard all-ones seed.
    pub fn new() -> Self {
        Self::with_seed(SCRAMBLER_SEED)
    }

    /// Scrambler with an explicit 15-bit seed.
    pub fn with_seed(seed: u16) -> Self {
        Self {
            state: seed & STATE_MASK,
        }
    }

    /// Current state.
    pub fn state(&self) -> u16 {
        self.state
    }

    /// Scramble one octet.
    pub fn scramble(&mut self, octet: u8) -> u8 {
        let mut out = 0u8;
        for bit in (0..8).rev() {
            let b = ((octet >> bit) & 1) ^ taps(self.state);
            self.state = ((self.state << 1) | u16::from(b)) & STATE_MASK;
            out |= b << bit;
        }
        out
    }
}

impl Default for Scrambler {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive-side descrambler for one lane.
///
/// The state is seeded once at bring-up and then runs freely; it is never
/// reset while the link is up. A bypassed descrambler passes octets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descrambler {
    state: u16,
    enabled: bool,
}

impl Descrambler {
    /// Descrambler with the standard all-ones seed.
    pub fn new(enabled: bool) -> Self {
        Self::with_seed(SCRAMBLER_SEED, enabled)
    }

    /// Descrambler with an explicit 15-bit seed.
    pub fn with_seed(seed: u16, enabled: bool) -> Self {
        Self {
            state: seed & STATE_MASK,
            enabled,
        }
    }

    /// Re-seed to all ones.
    pub fn reset(&mut self) {
        self.state = SCRAMBLER_SEED;
    }

    /// Current state.
    pub fn state(&self) -> u16 {
        self.state
    }

    /// Whether descrambling is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Descramble one octet.
    pub fn descramble(&mut self, octet: u8) -> u8 {
        if !self.enabled {
            return octet;
        }
        let mut out = 0u8;
        for bit in (0..8).rev() {
            let line = (octet >> bit) & 1;
            out |= (line ^ taps(self.state)) << bit;
            self.state = ((self.state << 1) | u16::from(line)) & STATE_MASK;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_round_trip_random() {
        let mut rng = StdRng::seed_from_u64(0x204b);
        let data: Vec<u8> = (0..4096).map(|_| rng.r#gen()).collect();

        let mut tx = Scrambler::new();
        let mut rx = Descrambler::new(true);
        let recovered: Vec<u8> = data
            .iter()
            .map(|&o| rx.descramble(tx.scramble(o)))
            .collect();
        assert_eq!(recovered, data);
        assert_eq!(tx.state(), rx.state());
    }

    #[test]
    fn test_scrambles_constant_input() {
        let mut tx = Scrambler::new();
        let out: Vec<u8> = (0..16).map(|_| tx.scramble(0)).collect();
        assert!(out.iter().any(|&o| o != 0));
    }

    #[test]
    fn test_first_octets_from_seed() {
        // Zero input from the all-ones seed: the taps only differ once 14
        // zeros have been shifted in.
        let mut tx = Scrambler::new();
        assert_eq!(tx.scramble(0x00), 0x00);
        assert_eq!(tx.scramble(0x00), 0x02);
    }

    #[test]
    fn test_self_synchronizes() {
        let mut rng = StdRng::seed_from_u64(7);
        let data: Vec<u8> = (0..64).map(|_| rng.r#gen()).collect();

        let mut tx = Scrambler::with_seed(0x1234);
        let mut rx = Descrambler::with_seed(0x7fff, true);
        let recovered: Vec<u8> = data
            .iter()
            .map(|&o| rx.descramble(tx.scramble(o)))
            .collect();
        // 15 bits of history flush in two octets.
        assert_eq!(recovered[2..], data[2..]);
    }

    #[test]
    fn test_bypass() {
        let mut rx = Descrambler::new(false);
        assert_eq!(rx.descramble(0xa5), 0xa5);
        assert_eq!(rx.state(), SCRAMBLER_SEED);
    }
}
