//! JESD204B link parameters and the frame geometry derived from them.

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;
use crate::core::constants::{MAX_MULTIFRAME_OCTETS, MIN_MULTIFRAME_OCTETS};

/// Link parameters as announced in the ILAS configuration octets.
///
/// Values are the natural ones (`l = 4` means four lanes); the minus-one
/// encoding only exists on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JesdSettings {
    /// Device identifier.
    pub did: u8,
    /// Bank identifier (4 bits).
    pub bid: u8,

    /// Lanes per link.
    pub l: u8,
    /// Converters per device.
    pub m: u16,
    /// Converter resolution in bits.
    pub n: u8,
    /// Bits per sample word, including control and tail bits.
    pub np: u8,

    /// Octets per lane per frame.
    pub f: u16,
    /// Samples per converter per frame.
    pub s: u8,
    /// Frames per multiframe.
    pub k: u8,
    /// Control bits per sample.
    pub cs: u8,
    /// Control words per frame clock per link.
    #[serde(default)]
    pub cf: u8,
    /// High density format.
    #[serde(default)]
    pub hd: bool,

    /// Scrambling enabled.
    pub scr: bool,
    /// Device subclass (1 for this core).
    #[serde(default = "default_subclassv")]
    pub subclassv: u8,
    /// JESD204 version (1 = JESD204B).
    #[serde(default = "default_jesdv")]
    pub jesdv: u8,
}

fn default_subclassv() -> u8 {
    1
}

fn default_jesdv() -> u8 {
    1
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl JesdSettings {
    /// Octets in one multiframe on one lane (F·K).
    pub fn multiframe_octets(&self) -> usize {
        usize::from(self.f) * usize::from(self.k)
    }

    /// Frame geometry used by the transport layer.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            l: usize::from(self.l),
            m: usize::from(self.m),
            n: u32::from(self.n),
            np: u32::from(self.np),
            f: usize::from(self.f),
            s: usize::from(self.s),
            cs: u32::from(self.cs),
        }
    }

    /// Check that the parameters describe a link this core can receive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("L", self.l.into(), 1, 32)?;
        check_range("M", self.m.into(), 1, 256)?;
        check_range("N", self.n.into(), 1, 32)?;
        check_range("NP", self.np.into(), 1, 32)?;
        check_range("F", self.f.into(), 1, 256)?;
        check_range("S", self.s.into(), 1, 32)?;
        check_range("K", self.k.into(), 1, 32)?;
        check_range("CS", self.cs.into(), 0, 3)?;
        check_range("CF", self.cf.into(), 0, 31)?;
        check_range("BID", self.bid.into(), 0, 15)?;
        check_range("SUBCLASSV", self.subclassv.into(), 0, 7)?;
        check_range("JESDV", self.jesdv.into(), 0, 7)?;

        if u32::from(self.n) + u32::from(self.cs) > u32::from(self.np) {
            return Err(ConfigError::SampleWidth {
                n: self.n,
                cs: self.cs,
                np: self.np,
            });
        }

        let octets = self.multiframe_octets();
        if !(MIN_MULTIFRAME_OCTETS..=MAX_MULTIFRAME_OCTETS).contains(&octets) {
            return Err(ConfigError::MultiframeLength { octets });
        }

        let geometry = self.frame_config();
        if geometry.frame_bits() < geometry.payload_bits() {
            return Err(ConfigError::FrameTooSmall {
                frame_bits: geometry.frame_bits(),
                payload_bits: geometry.payload_bits(),
            });
        }
        Ok(())
    }
}

/// Frame geometry: the parameters the transport layer depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameConfig {
    /// Lanes.
    pub l: usize,
    /// Converters.
    pub m: usize,
    /// Converter resolution in bits.
    pub n: u32,
    /// Bits per sample word.
    pub np: u32,
    /// Octets per lane per frame.
    pub f: usize,
    /// Samples per converter per frame.
    pub s: usize,
    /// Control bits per sample.
    pub cs: u32,
}

impl FrameConfig {
    /// Bits carried by one frame across all lanes (8·F·L).
    pub fn frame_bits(&self) -> usize {
        8 * self.f * self.l
    }

    /// Bits occupied by sample words (M·S·NP).
    pub fn payload_bits(&self) -> usize {
        self.m * self.s * self.np as usize
    }

    /// Sample words per frame (M·S).
    pub fn words(&self) -> usize {
        self.m * self.s
    }

    /// Tail bits at the end of each sample word.
    pub fn tail_bits(&self) -> u32 {
        self.np.saturating_sub(self.n + self.cs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_a() -> JesdSettings {
        JesdSettings {
            did: 0x5a,
            bid: 5,
            l: 4,
            m: 4,
            n: 8,
            np: 8,
            f: 2,
            s: 1,
            k: 32,
            cs: 0,
            cf: 0,
            hd: false,
            scr: true,
            subclassv: 1,
            jesdv: 1,
        }
    }

    #[test]
    fn test_valid_settings() {
        let settings = scenario_a();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.multiframe_octets(), 64);

        let geometry = settings.frame_config();
        assert_eq!(geometry.frame_bits(), 64);
        assert_eq!(geometry.payload_bits(), 32);
        assert_eq!(geometry.words(), 4);
        assert_eq!(geometry.tail_bits(), 0);
    }

    #[test]
    fn test_sample_width_rejected() {
        let settings = JesdSettings {
            n: 14,
            cs: 3,
            np: 16,
            ..scenario_a()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::SampleWidth { n: 14, cs: 3, np: 16 })
        ));
    }

    #[test]
    fn test_frame_too_small_rejected() {
        let settings = JesdSettings {
            l: 1,
            f: 2,
            k: 16,
            m: 4,
            ..scenario_a()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::FrameTooSmall {
                frame_bits: 16,
                payload_bits: 32
            })
        ));
    }

    #[test]
    fn test_multiframe_length_rejected() {
        let settings = JesdSettings {
            f: 1,
            k: 16,
            l: 4,
            m: 4,
            ..scenario_a()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MultiframeLength { octets: 16 })
        ));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let settings = JesdSettings {
            l: 0,
            ..scenario_a()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::OutOfRange { field: "L", .. })
        ));

        let settings = JesdSettings {
            bid: 16,
            ..scenario_a()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::OutOfRange { field: "BID", .. })
        ));
    }
}
