//! Per-lane frame and multiframe alignment.
//!
//! The receiver takes decoded octets from the PHY and establishes the
//! multiframe phase from the first /R/ it sees after code group sync. From then
//! on it counts octets modulo F·K, checks that alignment characters arrive
//! where they belong and, once the lane has left ILAS, restores the data octets
//! the transmitter replaced with /A/ and /F/.

use log::{debug, warn};

use crate::core::constants::{CHAR_A, CHAR_F, CHAR_K, CHAR_R, MISALIGNMENT_LIMIT};

/// One tick of PHY output for one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneInput {
    /// Decoded octet.
    pub octet: u8,
    /// The octet is a control character (K-code).
    pub is_control: bool,
    /// PHY code group synchronization.
    pub code_sync: bool,
}

impl LaneInput {
    /// A data octet on a synchronized lane.
    pub fn data(octet: u8) -> Self {
        Self {
            octet,
            is_control: false,
            code_sync: true,
        }
    }

    /// A control character on a synchronized lane.
    pub fn control(octet: u8) -> Self {
        Self {
            octet,
            is_control: true,
            code_sync: true,
        }
    }

    /// /K/ comma on a synchronized lane.
    pub fn comma() -> Self {
        Self::control(CHAR_K)
    }

    /// A lane without code sync.
    pub fn idle() -> Self {
        Self::default()
    }
}

/// An octet with its position inside the multiframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneOctet {
    /// Octet value, after character replacement in the data phase.
    pub octet: u8,
    /// Still a control character (only before the data phase).
    pub is_control: bool,
    /// Octet index inside the multiframe, `0..F·K`.
    pub phase: usize,
    /// First octet of a frame.
    pub frame_start: bool,
    /// First octet of a multiframe.
    pub multiframe_start: bool,
}

/// Frame/multiframe alignment for one lane.
#[derive(Debug, Clone)]
pub struct LaneReceiver {
    lane: usize,
    f: usize,
    multiframe_octets: usize,
    scrambling: bool,

    phase: Option<usize>,
    data_phase: bool,
    misaligned: u8,
    framing_error: bool,
    last_frame_octet: u8,
}

impl LaneReceiver {
    /// Receiver for logical lane `lane` with F octets per frame and K frames per multiframe.
    pub fn new(lane: usize, f: usize, k: usize, scrambling: bool) -> Self {
        Self {
            lane,
            f: f.max(1),
            multiframe_octets: (f * k).max(1),
            scrambling,
            phase: None,
            data_phase: false,
            misaligned: 0,
            framing_error: false,
            last_frame_octet: 0,
        }
    }

    /// Drop alignment; the next /R/ starts a new multiframe count.
    pub fn reset(&mut self) {
        self.phase = None;
        self.data_phase = false;
        self.misaligned = 0;
        self.framing_error = false;
        self.last_frame_octet = 0;
    }

    /// Switch to the data phase: /A/ and /F/ now stand for replaced data octets.
    pub fn enter_data_phase(&mut self) {
        self.data_phase = true;
    }

    /// Whether the receiver has left ILAS.
    pub fn in_data_phase(&self) -> bool {
        self.data_phase
    }

    /// Multiframe phase of the last octet, if aligned.
    pub fn phase(&self) -> Option<usize> {
        self.phase
    }

    /// A framing error is latched until the PHY drops code sync.
    pub fn framing_error(&self) -> bool {
        self.framing_error
    }

    /// Process one input octet.
    ///
    /// Returns the octet with its multiframe position once the phase is
    /// known. Returns `None` before the first /R/, without PHY code sync, and
    /// while a framing error is latched.
    pub fn tick(&mut self, input: &LaneInput) -> Option<LaneOctet> {
        if !input.code_sync {
            if self.framing_error {
                debug!("lane {}: PHY lost code sync, framing error cleared", self.lane);
            }
            self.reset();
            return None;
        }
        if self.framing_error {
            return None;
        }

        let phase = match self.phase {
            Some(p) => (p + 1) % self.multiframe_octets,
            None => {
                if input.is_control && input.octet == CHAR_R {
                    0
                } else {
                    return None;
                }
            }
        };
        self.phase = Some(phase);

        if input.is_control && !self.check_alignment(input.octet, phase) {
            return None;
        }

        let frame_end = phase % self.f == self.f - 1;
        let mut out = LaneOctet {
            octet: input.octet,
            is_control: input.is_control,
            phase,
            frame_start: phase % self.f == 0,
            multiframe_start: phase == 0,
        };

        if self.data_phase && input.is_control {
            out.octet = match input.octet {
                CHAR_A | CHAR_F if self.scrambling => input.octet,
                CHAR_A | CHAR_F => self.last_frame_octet,
                other => other,
            };
            out.is_control = false;
        }

        if frame_end {
            self.last_frame_octet = out.octet;
        }
        Some(out)
    }

    /// Track misplaced alignment characters; latch a framing error on the limit.
    fn check_alignment(&mut self, octet: u8, phase: usize) -> bool {
        let placed = match octet {
            CHAR_A => phase == self.multiframe_octets - 1,
            CHAR_F => phase % self.f == self.f - 1,
            CHAR_R => phase == 0 && !self.data_phase,
            _ => return true,
        };

        if placed {
            self.misaligned = 0;
            return true;
        }

        self.misaligned += 1;
        if self.misaligned >= MISALIGNMENT_LIMIT {
            warn!(
                "lane {}: framing error, {} misplaced alignment characters (last 0x{:02x} at phase {})",
                self.lane, self.misaligned, octet, phase
            );
            self.framing_error = true;
            self.phase = None;
            return false;
        }
        true
    }
}
