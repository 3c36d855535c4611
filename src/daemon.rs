//! Long-running rescan loop.
//!
//! One full scan, then sleep in one-second steps so SIGINT/SIGTERM stay
//! responsive. A signal arriving mid-scan lets the scan finish; the loop
//! then exits cleanly with a `daemon_stopped` event.

use crate::config::Config;
use crate::events::Emitter;
use crate::scanner;
use crate::tools::ToolRunner;
use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RESCAN_INTERVAL_SECS: u64 = 3600;

pub fn run_daemon(cfg: &Config, emitter: &Emitter, tools: &dyn ToolRunner) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&stop)).context("registering SIGINT")?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&stop)).context("registering SIGTERM")?;

    emitter.daemon_started();

    'daemon: loop {
        if let Err(e) = scanner::run_scan(cfg, emitter, tools) {
            tracing::error!("scan failed: {e:#}");
        }
        if stop.load(Ordering::Relaxed) {
            break;
        }
        for _ in 0..RESCAN_INTERVAL_SECS {
            if stop.load(Ordering::Relaxed) {
                break 'daemon;
            }
            thread::sleep(Duration::from_secs(1));
        }
    }

    emitter.daemon_stopped();
    Ok(())
}
