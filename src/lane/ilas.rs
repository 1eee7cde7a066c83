//! Initial lane alignment sequence: capture, decoding and validation.
//!
//! The ILAS is four multiframes. Each starts with /R/ and ends with /A/; the
//! second one carries /Q/ at octet 1 followed by the 14 link configuration
//! octets. The detector checks that structure while capturing and yields an
//! [`IlasRecord`]; [`validate_records`] compares records against the expected
//! settings and against each other.

use log::{debug, warn};
use thiserror::Error;

use super::receiver::LaneOctet;
use crate::config::JesdSettings;
use crate::core::constants::{
    CHAR_A, CHAR_Q, CHAR_R, ILAS_CONFIG_LEN, ILAS_CONFIG_MULTIFRAME, ILAS_CONFIG_OFFSET,
    ILAS_MULTIFRAMES, ILAS_Q_OFFSET,
};
use crate::core::{FieldMismatch, IlasField};

/// Link configuration received on one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IlasRecord {
    /// Link parameters.
    pub settings: JesdSettings,
    /// Lane identifier.
    pub lid: u8,
    /// Phase adjustment count (subclass 2 only).
    pub adjcnt: u8,
    /// Phase adjustment direction (subclass 2 only).
    pub adjdir: bool,
    /// Phase adjustment request (subclass 2 only).
    pub phadj: bool,
    /// Checksum as transmitted.
    pub fchk: u8,
}

impl IlasRecord {
    /// Record a transmitter with `settings` sends on lane `lid`.
    pub fn expected(settings: &JesdSettings, lid: u8) -> Self {
        let mut record = Self {
            settings: *settings,
            lid,
            adjcnt: 0,
            adjdir: false,
            phadj: false,
            fchk: 0,
        };
        record.fchk = record.checksum();
        record
    }

    /// Sum of all encoded field values modulo 256.
    pub fn checksum(&self) -> u8 {
        let s = &self.settings;
        let fields: [u32; 19] = [
            s.did.into(),
            self.adjcnt.into(),
            s.bid.into(),
            self.adjdir.into(),
            self.phadj.into(),
            self.lid.into(),
            s.scr.into(),
            u32::from(s.l.wrapping_sub(1) & 0x1f),
            u32::from(s.f.wrapping_sub(1) & 0xff),
            u32::from(s.k.wrapping_sub(1) & 0x1f),
            u32::from(s.m.wrapping_sub(1) & 0xff),
            s.cs.into(),
            u32::from(s.n.wrapping_sub(1) & 0x1f),
            s.subclassv.into(),
            u32::from(s.np.wrapping_sub(1) & 0x1f),
            s.jesdv.into(),
            u32::from(s.s.wrapping_sub(1) & 0x1f),
            s.hd.into(),
            s.cf.into(),
        ];
        (fields.iter().sum::<u32>() & 0xff) as u8
    }

    /// Whether the transmitted checksum matches the received fields.
    pub fn checksum_valid(&self) -> bool {
        self.fchk == self.checksum()
    }

    /// Wire encoding of the 14 configuration octets.
    pub fn encode(&self) -> [u8; ILAS_CONFIG_LEN] {
        let s = &self.settings;
        [
            s.did,
            (self.adjcnt & 0xf) << 4 | (s.bid & 0xf),
            u8::from(self.adjdir) << 6 | u8::from(self.phadj) << 5 | (self.lid & 0x1f),
            u8::from(s.scr) << 7 | (s.l.wrapping_sub(1) & 0x1f),
            (s.f.wrapping_sub(1) & 0xff) as u8,
            s.k.wrapping_sub(1) & 0x1f,
            (s.m.wrapping_sub(1) & 0xff) as u8,
            (s.cs & 0x3) << 6 | (s.n.wrapping_sub(1) & 0x1f),
            (s.subclassv & 0x7) << 5 | (s.np.wrapping_sub(1) & 0x1f),
            (s.jesdv & 0x7) << 5 | (s.s.wrapping_sub(1) & 0x1f),
            u8::from(s.hd) << 7 | (s.cf & 0x1f),
            0,
            0,
            self.fchk,
        ]
    }

    /// Decode the 14 configuration octets.
    pub fn decode(octets: &[u8; ILAS_CONFIG_LEN]) -> Self {
        let settings = JesdSettings {
            did: octets[0],
            bid: octets[1] & 0xf,
            l: (octets[3] & 0x1f) + 1,
            m: u16::from(octets[6]) + 1,
            n: (octets[7] & 0x1f) + 1,
            np: (octets[8] & 0x1f) + 1,
            f: u16::from(octets[4]) + 1,
            s: (octets[9] & 0x1f) + 1,
            k: (octets[5] & 0x1f) + 1,
            cs: octets[7] >> 6,
            cf: octets[10] & 0x1f,
            hd: octets[10] & 0x80 != 0,
            scr: octets[3] & 0x80 != 0,
            subclassv: octets[8] >> 5,
            jesdv: octets[9] >> 5,
        };
        Self {
            settings,
            lid: octets[2] & 0x1f,
            adjcnt: octets[1] >> 4,
            adjdir: octets[2] & 0x40 != 0,
            phadj: octets[2] & 0x20 != 0,
            fchk: octets[13],
        }
    }

    /// Lane-independent fields, in octet order.
    pub fn link_fields(&self) -> [(IlasField, u16); 15] {
        let s = &self.settings;
        [
            (IlasField::Did, s.did.into()),
            (IlasField::Bid, s.bid.into()),
            (IlasField::Scr, s.scr.into()),
            (IlasField::L, s.l.into()),
            (IlasField::F, s.f),
            (IlasField::K, s.k.into()),
            (IlasField::M, s.m),
            (IlasField::Cs, s.cs.into()),
            (IlasField::N, s.n.into()),
            (IlasField::Subclass, s.subclassv.into()),
            (IlasField::Np, s.np.into()),
            (IlasField::Jesdv, s.jesdv.into()),
            (IlasField::S, s.s.into()),
            (IlasField::Hd, s.hd.into()),
            (IlasField::Cf, s.cf.into()),
        ]
    }
}

/// Structural ILAS errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IlasViolation {
    /// Multiframe did not start with /R/.
    #[error("multiframe {multiframe} does not start with /R/")]
    MissingStart {
        /// Multiframe index, 0..4.
        multiframe: usize,
    },

    /// Multiframe did not end with /A/.
    #[error("multiframe {multiframe} does not end with /A/")]
    MissingEnd {
        /// Multiframe index, 0..4.
        multiframe: usize,
    },

    /// Second multiframe has no /Q/ at octet 1.
    #[error("configuration multiframe has no /Q/")]
    MissingConfigStart,

    /// Control character where data was expected.
    #[error("unexpected control character 0x{octet:02x} at multiframe {multiframe} octet {phase}")]
    UnexpectedControl {
        /// Multiframe index.
        multiframe: usize,
        /// Octet index.
        phase: usize,
        /// Character.
        octet: u8,
    },
}

/// Capture progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IlasState {
    /// Waiting for the first /R/.
    Idle,
    /// Inside multiframe `multiframe` of the sequence.
    Capturing {
        /// Multiframe index, 0..4.
        multiframe: usize,
    },
    /// The fourth /A/ was received.
    Complete,
    /// The sequence was malformed; no record until the lane is reset.
    Rejected(IlasViolation),
}

/// Captures the ILAS of one lane.
#[derive(Debug, Clone)]
pub struct IlasDetector {
    lane: usize,
    multiframe_octets: usize,
    state: IlasState,
    config: [u8; ILAS_CONFIG_LEN],
    record: Option<IlasRecord>,
}

impl IlasDetector {
    /// Detector for logical lane `lane` with F·K octets per multiframe.
    pub fn new(lane: usize, multiframe_octets: usize) -> Self {
        Self {
            lane,
            multiframe_octets,
            state: IlasState::Idle,
            config: [0; ILAS_CONFIG_LEN],
            record: None,
        }
    }

    /// Forget any captured record.
    pub fn reset(&mut self) {
        self.state = IlasState::Idle;
        self.config = [0; ILAS_CONFIG_LEN];
        self.record = None;
    }

    /// Current state.
    pub fn state(&self) -> IlasState {
        self.state
    }

    /// The captured record, once complete.
    pub fn record(&self) -> Option<&IlasRecord> {
        self.record.as_ref()
    }

    /// Whether a complete, well-formed sequence was captured.
    pub fn is_complete(&self) -> bool {
        self.state == IlasState::Complete
    }

    /// Feed one aligned octet. Returns `true` on the octet that completes the ILAS.
    pub fn push(&mut self, octet: &LaneOctet) -> bool {
        let multiframe = match self.state {
            IlasState::Idle => {
                if octet.multiframe_start && octet.is_control && octet.octet == CHAR_R {
                    self.state = IlasState::Capturing { multiframe: 0 };
                }
                return false;
            }
            IlasState::Capturing { multiframe } => {
                if octet.multiframe_start {
                    multiframe + 1
                } else {
                    multiframe
                }
            }
            IlasState::Complete | IlasState::Rejected(_) => return false,
        };

        match self.check(multiframe, octet) {
            Err(violation) => {
                warn!("lane {}: malformed ILAS, {}", self.lane, violation);
                self.state = IlasState::Rejected(violation);
                false
            }
            Ok(()) if multiframe == ILAS_MULTIFRAMES - 1 && octet.phase == self.multiframe_octets - 1 => {
                let record = IlasRecord::decode(&self.config);
                debug!("lane {}: ILAS complete, config {:02x?}", self.lane, self.config);
                self.record = Some(record);
                self.state = IlasState::Complete;
                true
            }
            Ok(()) => {
                self.state = IlasState::Capturing { multiframe };
                false
            }
        }
    }

    fn check(&mut self, multiframe: usize, octet: &LaneOctet) -> Result<(), IlasViolation> {
        let phase = octet.phase;
        let control = |c: u8| octet.is_control && octet.octet == c;

        if phase == 0 {
            return if control(CHAR_R) {
                Ok(())
            } else {
                Err(IlasViolation::MissingStart { multiframe })
            };
        }
        if phase == self.multiframe_octets - 1 {
            return if control(CHAR_A) {
                Ok(())
            } else {
                Err(IlasViolation::MissingEnd { multiframe })
            };
        }
        if multiframe == ILAS_CONFIG_MULTIFRAME && phase == ILAS_Q_OFFSET {
            return if control(CHAR_Q) {
                Ok(())
            } else {
                Err(IlasViolation::MissingConfigStart)
            };
        }
        if octet.is_control {
            return Err(IlasViolation::UnexpectedControl {
                multiframe,
                phase,
                octet: octet.octet,
            });
        }
        if multiframe == ILAS_CONFIG_MULTIFRAME
            && (ILAS_CONFIG_OFFSET..ILAS_CONFIG_OFFSET + ILAS_CONFIG_LEN).contains(&phase)
        {
            self.config[phase - ILAS_CONFIG_OFFSET] = octet.octet;
        }
        Ok(())
    }
}

/// Compare received records with the expected settings.
///
/// `records[i]` is the record of logical lane `i`. Every field is checked
/// against the settings, LID against the lane index and FCHK against the
/// received fields. The lane-independent fields of the expected record are the
/// same for every lane, so records that all match it also match each other and
/// a lane that disagrees with another is reported once, against the settings.
pub fn validate_records(expected: &JesdSettings, records: &[IlasRecord]) -> Vec<FieldMismatch> {
    let mut mismatches = Vec::new();

    for (lane, record) in records.iter().enumerate() {
        let reference = IlasRecord::expected(expected, lane as u8);
        for ((field, want), (_, got)) in reference.link_fields().iter().zip(record.link_fields()) {
            if *want != got {
                mismatches.push(FieldMismatch {
                    lane,
                    field: *field,
                    expected: *want,
                    actual: got,
                });
            }
        }
        if usize::from(record.lid) != lane {
            mismatches.push(FieldMismatch {
                lane,
                field: IlasField::Lid,
                expected: lane as u16,
                actual: record.lid.into(),
            });
        }
        if !record.checksum_valid() {
            mismatches.push(FieldMismatch {
                lane,
                field: IlasField::Fchk,
                expected: record.checksum().into(),
                actual: record.fchk.into(),
            });
        }
    }

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> JesdSettings {
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

    fn octet(value: u8, is_control: bool, phase: usize, f: usize) -> LaneOctet {
        LaneOctet {
            octet: value,
            is_control,
            phase,
            frame_start: phase % f == 0,
            multiframe_start: phase == 0,
        }
    }

    /// Octets of a well-formed ILAS for `record`.
    fn ilas_octets(record: &IlasRecord, f: usize, k: usize) -> Vec<LaneOctet> {
        let len = f * k;
        let config = record.encode();
        let mut out = Vec::new();
        for mf in 0..ILAS_MULTIFRAMES {
            for phase in 0..len {
                let o = if phase == 0 {
                    octet(CHAR_R, true, phase, f)
                } else if phase == len - 1 {
                    octet(CHAR_A, true, phase, f)
                } else if mf == 1 && phase == 1 {
                    octet(CHAR_Q, true, phase, f)
                } else if mf == 1 && (2..16).contains(&phase) {
                    octet(config[phase - 2], false, phase, f)
                } else {
                    octet((mf * len + phase) as u8, false, phase, f)
                };
                out.push(o);
            }
        }
        out
    }

    #[test]
    fn test_checksum_matches_field_sum() {
        // Same field sum a host computes for the AD9154-style settings table.
        let mut s = settings();
        s.scr = false;
        let record = IlasRecord::expected(&s, 0);
        assert_eq!(record.fchk, 0x95);

        let scrambled = IlasRecord::expected(&settings(), 3);
        assert_eq!(scrambled.fchk, 0x95 + 1 + 3);
    }

    #[test]
    fn test_encode_layout() {
        let record = IlasRecord::expected(&settings(), 2);
        let octets = record.encode();
        assert_eq!(hex::encode(octets), "5a050283011f0307272000000098");
        assert_eq!(IlasRecord::decode(&octets), record);
    }

    #[test]
    fn test_decode_extremes() {
        let s = JesdSettings {
            m: 256,
            f: 256,
            l: 32,
            k: 32,
            n: 32,
            np: 32,
            s: 32,
            cs: 3,
            cf: 31,
            hd: true,
            ..settings()
        };
        let mut record = IlasRecord::expected(&s, 31);
        record.adjcnt = 0xf;
        record.adjdir = true;
        record.phadj = true;
        record.fchk = record.checksum();
        assert_eq!(IlasRecord::decode(&record.encode()), record);
        assert!(record.checksum_valid());
    }

    #[test]
    fn test_detector_captures_record() {
        let record = IlasRecord::expected(&settings(), 1);
        let mut det = IlasDetector::new(1, 64);
        let octets = ilas_octets(&record, 2, 32);
        let completions: Vec<bool> = octets.iter().map(|o| det.push(o)).collect();

        assert_eq!(completions.iter().filter(|c| **c).count(), 1);
        assert!(*completions.last().unwrap());
        assert!(det.is_complete());
        assert_eq!(det.record(), Some(&record));
    }

    #[test]
    fn test_detector_rejects_missing_q() {
        let record = IlasRecord::expected(&settings(), 0);
        let mut octets = ilas_octets(&record, 2, 32);
        octets[64 + 1] = octet(0x00, false, 1, 2);

        let mut det = IlasDetector::new(0, 64);
        for o in &octets {
            det.push(o);
        }
        assert_eq!(
            det.state(),
            IlasState::Rejected(IlasViolation::MissingConfigStart)
        );
        assert!(det.record().is_none());
    }

    #[test]
    fn test_detector_rejects_missing_a() {
        let record = IlasRecord::expected(&settings(), 0);
        let mut octets = ilas_octets(&record, 2, 32);
        octets[2 * 64 + 63] = octet(0x00, false, 63, 2);

        let mut det = IlasDetector::new(0, 64);
        for o in &octets {
            det.push(o);
        }
        assert_eq!(
            det.state(),
            IlasState::Rejected(IlasViolation::MissingEnd { multiframe: 2 })
        );
    }

    #[test]
    fn test_detector_rejects_stray_control() {
        let record = IlasRecord::expected(&settings(), 0);
        let mut octets = ilas_octets(&record, 2, 32);
        octets[30] = octet(CHAR_Q, true, 30, 2);

        let mut det = IlasDetector::new(0, 64);
        for o in &octets {
            det.push(o);
        }
        assert!(matches!(
            det.state(),
            IlasState::Rejected(IlasViolation::UnexpectedControl { phase: 30, .. })
        ));
    }

    fn mutate(field: IlasField, r: &mut IlasRecord) {
        let s = &mut r.settings;
        match field {
            IlasField::Did => s.did ^= 1,
            IlasField::Bid => s.bid ^= 1,
            IlasField::Scr => s.scr = !s.scr,
            IlasField::L => s.l = 2,
            IlasField::F => s.f = 1,
            IlasField::K => s.k = 16,
            IlasField::M => s.m = 2,
            IlasField::Cs => s.cs = 1,
            IlasField::N => s.n = 7,
            IlasField::Subclass => s.subclassv = 0,
            IlasField::Np => s.np = 16,
            IlasField::Jesdv => s.jesdv = 0,
            IlasField::S => s.s = 2,
            IlasField::Hd => s.hd = true,
            IlasField::Cf => s.cf = 1,
            IlasField::Lid => r.lid = 0,
            IlasField::Fchk => r.fchk ^= 1,
        }
    }

    #[test]
    fn test_validate_equal_records() {
        let s = settings();
        let records: Vec<IlasRecord> = (0..4).map(|lane| IlasRecord::expected(&s, lane)).collect();
        assert!(validate_records(&s, &records).is_empty());
    }

    #[test]
    fn test_validate_each_single_field() {
        let s = settings();
        let fields = [
            IlasField::Did,
            IlasField::Bid,
            IlasField::Scr,
            IlasField::L,
            IlasField::F,
            IlasField::K,
            IlasField::M,
            IlasField::Cs,
            IlasField::N,
            IlasField::Subclass,
            IlasField::Np,
            IlasField::Jesdv,
            IlasField::S,
            IlasField::Hd,
            IlasField::Cf,
            IlasField::Lid,
        ];

        for field in fields {
            let mut records: Vec<IlasRecord> =
                (0..4).map(|lane| IlasRecord::expected(&s, lane)).collect();
            mutate(field, &mut records[3]);
            records[3].fchk = records[3].checksum();

            let mismatches = validate_records(&s, &records);
            assert_eq!(mismatches.len(), 1, "field {field}: {mismatches:?}");
            assert_eq!(mismatches[0].field, field);
            assert_eq!(mismatches[0].lane, 3);
        }
    }

    #[test]
    fn test_validate_bad_checksum() {
        let s = settings();
        let mut records: Vec<IlasRecord> = (0..2).map(|lane| IlasRecord::expected(&s, lane)).collect();
        records[1].fchk = records[1].fchk.wrapping_add(1);
        let mismatches = validate_records(&s, &records);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].field, IlasField::Fchk);
        assert_eq!(mismatches[0].actual, u16::from(records[1].fchk));
    }

    #[test]
    fn test_validate_wrong_lane_zero_not_duplicated() {
        let s = settings();
        let mut records: Vec<IlasRecord> = (0..4).map(|lane| IlasRecord::expected(&s, lane)).collect();
        records[0].settings.did = 0x11;
        records[0].fchk = records[0].checksum();
        let mismatches = validate_records(&s, &records);
        // Lane 0 is wrong against the settings; lanes 1..3 are not reported again.
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].lane, 0);
    }

    #[test]
    fn test_validate_lanes_disagreeing_reported_once_each() {
        let s = settings();
        let mut records: Vec<IlasRecord> = (0..4).map(|lane| IlasRecord::expected(&s, lane)).collect();
        records[1].settings.m = 2;
        records[1].fchk = records[1].checksum();
        records[2].settings.m = 3;
        records[2].fchk = records[2].checksum();

        let mismatches = validate_records(&s, &records);
        let lanes: Vec<(usize, IlasField, u16, u16)> = mismatches
            .iter()
            .map(|m| (m.lane, m.field, m.expected, m.actual))
            .collect();
        assert_eq!(lanes, vec![(1, IlasField::M, 4, 2), (2, IlasField::M, 4, 3)]);
    }
}
