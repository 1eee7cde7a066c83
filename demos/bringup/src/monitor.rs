//! Periodic board monitor: PHY and core state, and the reference clock
//! frequency from successive latched measurements.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use jesd204b_rx::control::Csr;
use jesd204b_rx::core::RegisterError;
use jesd204b_rx::core::constants::{STATUS_JSYNC, STATUS_READY};
use log::info;
use tokio::sync::Mutex;

use crate::board::Board;

/// Control clocks for a latch strobe to reach the refclk domain and the
/// latched count to come back.
const LATCH_SETTLE_TICKS: u64 = 16;

/// One refclk counter reading, stamped with the simulated time of its latch.
#[derive(Debug, Clone, Copy)]
struct Sample {
    count: u64,
    secs: f64,
}

/// Reference clock frequency from two successive latched counts.
#[derive(Debug, Default)]
pub struct RefclkEstimator {
    last: Option<Sample>,
}

impl RefclkEstimator {
    /// Create an estimator with no previous reading.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the counter, wait for the value to cross, and return the
    /// frequency in Hz since the previous call.
    pub fn measure(&mut self, board: &mut Board) -> Result<Option<f64>, RegisterError> {
        let secs = board.elapsed_secs();
        board.soc.write(Csr::RefclkMeasurementLatch, 1)?;
        board.settle(LATCH_SETTLE_TICKS);
        let sample = Sample {
            count: board.soc.read(Csr::RefclkMeasurementValue)?,
            secs,
        };

        let hz = match self.last {
            Some(prev) if sample.secs > prev.secs && sample.count >= prev.count => {
                Some((sample.count - prev.count) as f64 / (sample.secs - prev.secs))
            }
            _ => None,
        };
        self.last = Some(sample);
        Ok(hz)
    }
}

fn bits(board: &Board, csr: impl Fn(usize) -> Csr) -> Result<String, RegisterError> {
    (0..board.lanes())
        .map(|n| board.soc.read(csr(n)).map(|v| if v != 0 { '1' } else { '0' }))
        .collect()
}

fn report(board: &mut Board, refclk: &mut RefclkEstimator) -> Result<(), RegisterError> {
    let hz = refclk.measure(board)?;
    let refclk = hz.map_or_else(|| "-".to_string(), |hz| format!("{:.3} MHz", hz / 1e6));

    let status = board.soc.read(Csr::LinkStatus)? as u32;
    info!(
        "monitor: t={:.1}us tx={} rx={} ready={} jsync={} fault={} frames={} stpl_errors={} refclk={}",
        board.elapsed_secs() * 1e6,
        bits(board, Csr::PhyTxReady)?,
        bits(board, Csr::PhyRxReady)?,
        status & STATUS_READY != 0,
        status & STATUS_JSYNC != 0,
        board.soc.read(Csr::LinkFault)?,
        board.soc.read(Csr::LinkFrames)?,
        board.soc.read(Csr::LinkStplErrors)?,
        refclk,
    );
    Ok(())
}

/// Print board state every `period` until `done` is set.
pub async fn run(board: Arc<Mutex<Board>>, period: Duration, done: Arc<AtomicBool>) -> Result<(), RegisterError> {
    let mut interval = tokio::time::interval(period);
    let mut refclk = RefclkEstimator::new();
    loop {
        interval.tick().await;
        let finished = done.load(Ordering::Acquire);
        report(&mut *board.lock().await, &mut refclk)?;
        if finished {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jesd204b_rx::config::LinkConfig;

    fn board() -> Board {
        Board::new(LinkConfig::adc08dj5200rf(4).unwrap()).unwrap()
    }

    fn assert_close(hz: f64, want: f64) {
        assert!((hz - want).abs() / want < 2e-3, "measured {hz} Hz, want {want} Hz");
    }

    #[test]
    fn test_first_measurement_has_no_estimate() {
        let mut board = board();
        board.run(20_000);
        let mut refclk = RefclkEstimator::new();
        assert_eq!(refclk.measure(&mut board).unwrap(), None);
    }

    #[test]
    fn test_estimates_track_refclk_over_uneven_intervals() {
        let mut board = board();
        let want = board.soc.link().config().clocks.refclk_hz as f64;
        let mut refclk = RefclkEstimator::new();

        board.run(20_000);
        assert_eq!(refclk.measure(&mut board).unwrap(), None);
        for ticks in [5_000, 8_000, 13_000, 30_000] {
            board.run(ticks);
            let hz = refclk.measure(&mut board).unwrap().unwrap();
            assert_close(hz, want);
        }
    }

    #[test]
    fn test_estimate_after_bring_up() {
        let mut board = board();
        let want = board.soc.link().config().clocks.refclk_hz as f64;
        let mut refclk = RefclkEstimator::new();

        refclk.measure(&mut board).unwrap();
        board.bring_up().unwrap();
        board.run(10_000);
        let hz = refclk.measure(&mut board).unwrap().unwrap();
        assert_close(hz, want);
    }
}
