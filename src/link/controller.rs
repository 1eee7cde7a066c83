//! Link bring-up state machine.
//!
//! ```text
//!  Reset ─► LaneSync ─► IlasWait ─► IlasValidate ─► Deskew ─► Ready
//!              │            │            │             │         │
//!              └────────────┴────────────┴─────────────┴─────────┴──► Error(fault)
//! ```
//!
//! The controller advances at most one state per tick. It does not touch the
//! data path itself: it reads a [`LinkObservation`] assembled by the link and
//! reports whether it moved, so the link can apply the entry actions.

use std::fmt;

use log::{info, warn};

use crate::config::{JesdSettings, LinkConfig, LinkTiming};
use crate::core::LinkFault;
use crate::lane::{IlasRecord, validate_records};

/// Controller state, with per-state counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Lanes held in reset.
    Reset,
    /// Waiting for every lane to hold code group sync.
    LaneSync {
        /// Consecutive ticks with all lanes synced.
        stable: u32,
        /// Ticks spent in this state.
        elapsed: u32,
    },
    /// SYNC~ released, waiting for ILAS on every lane.
    IlasWait {
        /// Ticks spent in this state.
        elapsed: u32,
    },
    /// Comparing the received link configuration.
    IlasValidate,
    /// Waiting for the deskew buffer to align.
    Deskew,
    /// Frames are delivered.
    Ready,
    /// Terminal until reset.
    Error(LinkFault),
}

impl LinkState {
    /// Short state name.
    pub fn name(&self) -> &'static str {
        match self {
            LinkState::Reset => "Reset",
            LinkState::LaneSync { .. } => "LaneSync",
            LinkState::IlasWait { .. } => "IlasWait",
            LinkState::IlasValidate => "IlasValidate",
            LinkState::Deskew => "Deskew",
            LinkState::Ready => "Ready",
            LinkState::Error(_) => "Error",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Error(fault) => write!(f, "Error({fault})"),
            other => f.write_str(other.name()),
        }
    }
}

/// What the controller sees of the data path on one tick.
#[derive(Debug, Clone, Default)]
pub struct LinkObservation {
    /// `link_control` enable bit.
    pub enabled: bool,
    /// `link_control` ILAS validation disable bit.
    pub ilas_check_disabled: bool,
    /// Code sync per logical lane.
    pub code_sync: Vec<bool>,
    /// Captured ILAS record per logical lane.
    pub ilas: Vec<Option<IlasRecord>>,
    /// Deskew buffer aligned.
    pub deskew_aligned: bool,
    /// Lane whose deskew FIFO overflowed.
    pub deskew_overflow: Option<usize>,
}

impl LinkObservation {
    fn lanes_without_sync(&self) -> Vec<usize> {
        self.code_sync
            .iter()
            .enumerate()
            .filter_map(|(lane, synced)| (!synced).then_some(lane))
            .collect()
    }

    fn lanes_without_ilas(&self) -> Vec<usize> {
        self.ilas
            .iter()
            .enumerate()
            .filter_map(|(lane, record)| record.is_none().then_some(lane))
            .collect()
    }
}

/// Link controller state machine.
#[derive(Debug, Clone)]
pub struct LinkController {
    state: LinkState,
    timing: LinkTiming,
    expected: JesdSettings,
    deskew_depth: usize,
}

impl LinkController {
    /// Controller in `Reset` for `config`.
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            state: LinkState::Reset,
            timing: config.timing,
            expected: config.settings,
            deskew_depth: config.deskew_depth,
        }
    }

    /// Current state.
    pub fn state(&self) -> &LinkState {
        &self.state
    }

    /// Fault of the `Error` state.
    pub fn fault(&self) -> Option<&LinkFault> {
        match &self.state {
            LinkState::Error(fault) => Some(fault),
            _ => None,
        }
    }

    /// Frames are delivered in this state.
    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready
    }

    /// Lanes are out of reset.
    pub fn lanes_active(&self) -> bool {
        self.state != LinkState::Reset
    }

    /// SYNC~ released towards the transmitter.
    pub fn jsync(&self) -> bool {
        matches!(
            self.state,
            LinkState::IlasWait { .. } | LinkState::IlasValidate | LinkState::Deskew | LinkState::Ready
        )
    }

    /// Force the `Reset` state.
    pub fn reset(&mut self) {
        self.enter(LinkState::Reset);
    }

    /// Advance one tick. Returns `true` if the state changed.
    pub fn step(&mut self, obs: &LinkObservation) -> bool {
        if !obs.enabled {
            if self.state == LinkState::Reset {
                return false;
            }
            self.enter(LinkState::Reset);
            return true;
        }

        let next = match &self.state {
            LinkState::Reset => Some(LinkState::LaneSync {
                stable: 0,
                elapsed: 0,
            }),
            LinkState::LaneSync { stable, elapsed } => {
                let elapsed = elapsed + 1;
                let unsynced = obs.lanes_without_sync();
                let stable = if unsynced.is_empty() { stable + 1 } else { 0 };
                if stable >= self.timing.debounce_cycles {
                    Some(LinkState::IlasWait { elapsed: 0 })
                } else if elapsed >= self.timing.lane_sync_timeout {
                    Some(LinkState::Error(LinkFault::PhyTimeout { lanes: unsynced }))
                } else {
                    self.state = LinkState::LaneSync { stable, elapsed };
                    None
                }
            }
            LinkState::IlasWait { elapsed } => {
                let elapsed = elapsed + 1;
                let missing = obs.lanes_without_ilas();
                if missing.is_empty() {
                    Some(LinkState::IlasValidate)
                } else if elapsed >= self.timing.ilas_timeout {
                    Some(LinkState::Error(LinkFault::IlasTimeout { lanes: missing }))
                } else {
                    self.state = LinkState::IlasWait { elapsed };
                    None
                }
            }
            LinkState::IlasValidate => self.link_down(obs).or_else(|| {
                if obs.ilas_check_disabled {
                    return Some(LinkState::Deskew);
                }
                let records: Vec<IlasRecord> = obs.ilas.iter().flatten().copied().collect();
                let mismatches = validate_records(&self.expected, &records);
                if mismatches.is_empty() {
                    Some(LinkState::Deskew)
                } else {
                    Some(LinkState::Error(LinkFault::ConfigMismatch(mismatches)))
                }
            }),
            LinkState::Deskew => self
                .link_down(obs)
                .or_else(|| self.skew_overflow(obs))
                .or_else(|| obs.deskew_aligned.then_some(LinkState::Ready)),
            LinkState::Ready => self.link_down(obs).or_else(|| self.skew_overflow(obs)),
            LinkState::Error(_) => None,
        };

        match next {
            Some(state) => {
                self.enter(state);
                true
            }
            None => false,
        }
    }

    fn link_down(&self, obs: &LinkObservation) -> Option<LinkState> {
        let lanes = obs.lanes_without_sync();
        (!lanes.is_empty()).then_some(LinkState::Error(LinkFault::LinkDown { lanes }))
    }

    fn skew_overflow(&self, obs: &LinkObservation) -> Option<LinkState> {
        obs.deskew_overflow.map(|lane| {
            LinkState::Error(LinkFault::SkewOverflow {
                lane,
                depth: self.deskew_depth,
            })
        })
    }

    fn enter(&mut self, state: LinkState) {
        if let LinkState::Error(fault) = &state {
            warn!("link: {} -> Error, {}", self.state.name(), fault);
        } else {
            info!("link: {} -> {}", self.state.name(), state.name());
        }
        self.state = state;
    }
}
