//! JESD204B bring-up demo
//!
//! Builds the SoC around the receive link, replays the board bring-up
//! sequence against an emulated ADC and monitors the link while the
//! simulation runs.
//!
//! Environment variables:
//! - BRINGUP_CONFIG: path to a JSON link configuration (default: ADC08DJ5200RF preset)
//! - BRINGUP_LANES: preset lane count, 4 or 8 (default 8)
//! - BRINGUP_SIM_US: simulated time to run after bring-up, in microseconds (default 200)
//! - BRINGUP_MONITOR_MS: monitor period in milliseconds (default 100)
//! - RUST_LOG: log filter (default info)

mod board;
mod monitor;

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use jesd204b_rx::config::LinkConfig;
use jesd204b_rx::core::{ConfigError, RegisterError};
use log::{error, info};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::board::Board;

/// Device clocks simulated per lock of the board.
const SLICE_TICKS: u64 = 2_000;

#[derive(Debug, Error)]
enum DemoError {
    #[error("environment: {0}")]
    Env(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Register(#[from] RegisterError),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("report: {0}")]
    Json(#[from] serde_json::Error),
}

struct Settings {
    config: Option<String>,
    lanes: usize,
    sim_us: u64,
    monitor: Duration,
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, DemoError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| DemoError::Env(format!("{name}={value} is not valid"))),
        Err(_) => Ok(default),
    }
}

impl Settings {
    fn from_env() -> Result<Self, DemoError> {
        Ok(Self {
            config: std::env::var("BRINGUP_CONFIG").ok(),
            lanes: env_or("BRINGUP_LANES", 8)?,
            sim_us: env_or("BRINGUP_SIM_US", 200)?,
            monitor: Duration::from_millis(env_or("BRINGUP_MONITOR_MS", 100)?),
        })
    }

    fn link_config(&self) -> Result<LinkConfig, ConfigError> {
        match &self.config {
            Some(path) => LinkConfig::from_file(path),
            None => LinkConfig::adc08dj5200rf(self.lanes),
        }
    }
}

fn simulate(board: Arc<Mutex<Board>>, sim_us: u64, done: Arc<AtomicBool>) -> Result<(), RegisterError> {
    let start = {
        let mut board = board.blocking_lock();
        board.bring_up()?;
        board.elapsed_secs()
    };
    let end = start + sim_us as f64 * 1e-6;

    loop {
        {
            let mut board = board.blocking_lock();
            board.run(SLICE_TICKS);
            if board.elapsed_secs() >= end {
                break;
            }
        }
        std::thread::yield_now();
    }
    done.store(true, Ordering::Release);
    Ok(())
}

async fn run() -> Result<(), DemoError> {
    let settings = Settings::from_env()?;
    let config = settings.link_config()?;
    info!(
        "L={} M={} F={} K={} N={} NP={} S={} scrambling={}",
        config.settings.l,
        config.settings.m,
        config.settings.f,
        config.settings.k,
        config.settings.n,
        config.settings.np,
        config.settings.s,
        config.settings.scr,
    );

    let board = Arc::new(Mutex::new(Board::new(config)?));
    let done = Arc::new(AtomicBool::new(false));

    let sim = tokio::task::spawn_blocking({
        let board = board.clone();
        let done = done.clone();
        let sim_us = settings.sim_us;
        move || simulate(board, sim_us, done)
    });
    let monitor = tokio::spawn(monitor::run(board.clone(), settings.monitor, done.clone()));

    let simulated = sim.await?;
    // Unblock the monitor even if the simulation failed.
    done.store(true, Ordering::Release);
    simulated?;
    monitor.await??;

    let board = board.lock().await;
    let link = board.soc.link();
    let summary = serde_json::json!({
        "identifier": board.soc.identifier(),
        "state": link.state().name(),
        "fault": link.fault().map(|f| f.to_string()),
        "device_ticks": board.soc.device_ticks(),
        "frames": link.frames_delivered(),
        "stpl_errors": link.stpl_errors(),
        "first_frame": board.adc.find_window(&board.frames),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        error!("bring-up failed: {e}");
        std::process::exit(1);
    }
}
