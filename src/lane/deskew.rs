//! Inter-lane deskew.
//!
//! Each lane writes its post-ILAS octets into its own FIFO. The first octet a
//! lane writes is phase 0 of a multiframe and acts as its marker. Once every
//! lane has written its marker, all FIFOs are read in lockstep, one octet per
//! lane per tick, so the early lanes are delayed by exactly their skew.

use std::collections::VecDeque;

use log::{debug, trace, warn};

/// An octet read out of the deskew buffer, tagged with its multiframe phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeskewEntry {
    /// Octet value.
    pub octet: u8,
    /// Multiframe phase.
    pub phase: usize,
}

/// Per-lane elastic buffers aligning lanes on a common multiframe boundary.
#[derive(Debug, Clone)]
pub struct DeskewBuffer {
    depth: usize,
    fifos: Vec<VecDeque<DeskewEntry>>,
    started: Vec<bool>,
    aligned: bool,
    overflow: Option<usize>,
}

impl DeskewBuffer {
    /// Buffer for `lanes` lanes of `depth` octets each.
    pub fn new(lanes: usize, depth: usize) -> Self {
        Self {
            depth,
            fifos: vec![VecDeque::with_capacity(depth); lanes],
            started: vec![false; lanes],
            aligned: false,
            overflow: None,
        }
    }

    /// Empty every FIFO and wait for new markers.
    pub fn reset(&mut self) {
        for fifo in &mut self.fifos {
            fifo.clear();
        }
        self.started.fill(false);
        self.aligned = false;
        self.overflow = None;
    }

    /// FIFO depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// All lanes have written their marker.
    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    /// Lane whose FIFO overflowed, if any. Latched until reset.
    pub fn overflow(&self) -> Option<usize> {
        self.overflow
    }

    /// Octets currently held for `lane`.
    pub fn occupancy(&self, lane: usize) -> usize {
        self.fifos.get(lane).map_or(0, VecDeque::len)
    }

    /// Write one post-ILAS octet of `lane`.
    ///
    /// Octets before the lane's marker (phase 0) are dropped. Writing into a
    /// full FIFO before alignment latches an overflow.
    pub fn write(&mut self, lane: usize, octet: u8, phase: usize) {
        if self.overflow.is_some() || lane >= self.fifos.len() {
            return;
        }
        if !self.started[lane] {
            if phase != 0 {
                return;
            }
            self.started[lane] = true;
        }

        let fifo = &mut self.fifos[lane];
        if fifo.len() >= self.depth {
            warn!(
                "deskew: lane {} overflowed {} octets, skew exceeds buffer",
                lane, self.depth
            );
            self.overflow = Some(lane);
            return;
        }
        fifo.push_back(DeskewEntry { octet, phase });
    }

    /// Read one octet per lane once aligned.
    ///
    /// Returns `None` before alignment, after an overflow, or when a lane has
    /// nothing to give this tick.
    pub fn read(&mut self) -> Option<Vec<DeskewEntry>> {
        if self.overflow.is_some() {
            return None;
        }
        if !self.aligned {
            if self.started.iter().all(|s| *s) {
                self.aligned = true;
                debug!(
                    "deskew: aligned, occupancy {:?}",
                    self.fifos.iter().map(VecDeque::len).collect::<Vec<_>>()
                );
            } else {
                return None;
            }
        }

        trace!(
            "deskew: occupancy {:?}",
            self.fifos.iter().map(VecDeque::len).collect::<Vec<_>>()
        );
        if self.fifos.iter().any(VecDeque::is_empty) {
            return None;
        }
        self.fifos.iter_mut().map(VecDeque::pop_front).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run two lanes where lane 1 starts `skew` ticks after lane 0.
    fn run_skewed(depth: usize, skew: usize, ticks: usize) -> (DeskewBuffer, Vec<Vec<DeskewEntry>>) {
        let mut buf = DeskewBuffer::new(2, depth);
        let mut out = Vec::new();
        for t in 0..ticks {
            buf.write(0, t as u8, t % 64);
            if t >= skew {
                let i = t - skew;
                buf.write(1, i as u8, i % 64);
            }
            if let Some(row) = buf.read() {
                out.push(row);
            }
        }
        (buf, out)
    }

    #[test]
    fn test_no_skew_passes_through() {
        let (buf, out) = run_skewed(16, 0, 8);
        assert!(buf.is_aligned());
        assert_eq!(out.len(), 8);
        assert_eq!(out[0][0], DeskewEntry { octet: 0, phase: 0 });
        assert_eq!(out[0][1], DeskewEntry { octet: 0, phase: 0 });
    }

    #[test]
    fn test_skew_below_depth_aligns() {
        for skew in 0..16 {
            let (buf, out) = run_skewed(16, skew, 64);
            assert!(buf.overflow().is_none(), "skew {skew}");
            assert_eq!(out.len(), 64 - skew);
            for row in &out {
                assert_eq!(row[0], row[1], "skew {skew}");
            }
            assert_eq!(buf.occupancy(0), skew);
        }
    }

    #[test]
    fn test_skew_at_depth_overflows() {
        let (buf, out) = run_skewed(16, 16, 64);
        assert_eq!(buf.overflow(), Some(0));
        assert!(!buf.is_aligned());
        assert!(out.is_empty());
    }

    #[test]
    fn test_writes_before_marker_dropped() {
        let mut buf = DeskewBuffer::new(1, 4);
        buf.write(0, 0xaa, 5);
        assert_eq!(buf.occupancy(0), 0);
        buf.write(0, 0xbb, 0);
        assert_eq!(buf.read(), Some(vec![DeskewEntry { octet: 0xbb, phase: 0 }]));
    }

    #[test]
    fn test_reset_clears_overflow() {
        let (mut buf, _) = run_skewed(4, 10, 20);
        assert!(buf.overflow().is_some());
        buf.reset();
        assert!(buf.overflow().is_none());
        assert_eq!(buf.occupancy(0), 0);
        assert!(buf.read().is_none());
    }
}
