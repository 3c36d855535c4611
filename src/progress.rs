//! Scan progress accounting.
//!
//! Counters only ever grow. Progress frames are throttled to one per 100 ms,
//! the scan rate is averaged over a ring of the last 20 samples, and a
//! one-shot low-disk warning fires when free space drops under 1 GiB.

use crate::events::{Emitter, ProgressEvent};
use crate::probe::FsErrorKind;
use crate::types::ErrorTally;
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

const EMIT_INTERVAL: Duration = Duration::from_millis(100);
const RATE_WINDOW: usize = 20;
const DISK_CHECK_EVERY: u64 = 100;
const DISK_WARN_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Root volume figures, taken fresh from the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSpace {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Total/used/free for the volume mounted at `/`.
pub fn disk_space() -> DiskSpace {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    for disk in disks.list() {
        if disk.mount_point() == Path::new("/") {
            let total = disk.total_space();
            let free = disk.available_space();
            return DiskSpace {
                total,
                used: total.saturating_sub(free),
                free,
            };
        }
    }
    // No root mount found (containers, odd setups): fall back to the largest disk.
    disks
        .list()
        .iter()
        .max_by_key(|d| d.total_space())
        .map(|d| DiskSpace {
            total: d.total_space(),
            used: d.total_space().saturating_sub(d.available_space()),
            free: d.available_space(),
        })
        .unwrap_or_default()
}

pub struct ProgressTracker {
    start: Instant,
    last_emit: Option<Instant>,
    phase: &'static str,
    current_path: String,
    pub files_processed: u64,
    pub bytes_scanned: u64,
    pub errors: ErrorTally,
    last_error: Option<String>,
    rate_samples: VecDeque<f64>,
    last_bytes: u64,
    last_sample: Instant,
    items_since_disk_check: u64,
    disk_warned: bool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_emit: None,
            phase: "fast",
            current_path: String::new(),
            files_processed: 0,
            bytes_scanned: 0,
            errors: ErrorTally::default(),
            last_error: None,
            rate_samples: VecDeque::with_capacity(RATE_WINDOW),
            last_bytes: 0,
            last_sample: now,
            items_since_disk_check: 0,
            disk_warned: false,
        }
    }

    pub fn set_phase(&mut self, phase: &'static str) {
        self.phase = phase;
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Record progress against `current` and emit a throttled frame.
    pub fn update(&mut self, emitter: &Emitter, current: &Path, files: u64, bytes_added: u64) {
        self.current_path = current.to_string_lossy().into_owned();
        self.files_processed += files;
        self.bytes_scanned += bytes_added;

        if files > 0 {
            self.items_since_disk_check += files;
            if self.items_since_disk_check >= DISK_CHECK_EVERY {
                self.items_since_disk_check = 0;
                self.check_disk(emitter);
            }
        }

        let now = Instant::now();
        let due = match self.last_emit {
            Some(last) => now.duration_since(last) >= EMIT_INTERVAL,
            None => true,
        };
        if !due {
            return;
        }

        let dt = now.duration_since(self.last_sample).as_secs_f64();
        if dt > 0.0 {
            let rate = (self.bytes_scanned - self.last_bytes) as f64 / dt;
            if self.rate_samples.len() == RATE_WINDOW {
                self.rate_samples.pop_front();
            }
            self.rate_samples.push_back(rate);
            self.last_bytes = self.bytes_scanned;
            self.last_sample = now;
        }
        let avg_rate = if self.rate_samples.is_empty() {
            0.0
        } else {
            self.rate_samples.iter().sum::<f64>() / self.rate_samples.len() as f64
        };

        emitter.progress(&ProgressEvent {
            event: "progress",
            phase: self.phase,
            current_path: &self.current_path,
            files_processed: self.files_processed,
            bytes_scanned: self.bytes_scanned,
            scan_rate_mbps: round2(avg_rate / (1024.0 * 1024.0)),
            elapsed: round1(self.start.elapsed().as_secs_f64()),
            error_count: self.errors.total(),
            errors: self.errors,
            last_error: self.last_error.as_deref(),
        });
        self.last_emit = Some(now);
    }

    /// Count a recovered filesystem failure; the message shows up on the next
    /// progress frame.
    pub fn record_error(&mut self, kind: FsErrorKind, message: String) {
        match kind {
            FsErrorKind::Permission => self.errors.permission += 1,
            FsErrorKind::Symlink => self.errors.symlink += 1,
            FsErrorKind::Missing => self.errors.missing += 1,
            FsErrorKind::Other => self.errors.other += 1,
        }
        self.last_error = Some(message);
    }

    fn check_disk(&mut self, emitter: &Emitter) {
        if self.disk_warned {
            return;
        }
        let space = disk_space();
        if space.total > 0 && space.free < DISK_WARN_THRESHOLD {
            self.disk_warned = true;
            emitter.warning_low_disk(space.free);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Emitter;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_counters_are_monotonic_and_throttled() {
        let buf = SharedBuf::default();
        let em = Emitter::new(Box::new(buf.clone()));
        let mut tracker = ProgressTracker::new();

        // Many rapid updates: the counters all land, but at most a couple of
        // frames get through the 100ms throttle.
        for i in 0..50 {
            tracker.update(&em, Path::new("/tmp/x"), 1, 10 * i);
        }
        assert_eq!(tracker.files_processed, 50);

        let raw = buf.0.lock().unwrap();
        let frames = String::from_utf8(raw.clone()).unwrap().lines().count();
        assert!(frames >= 1 && frames < 5, "got {frames} frames");
    }

    #[test]
    fn test_error_classification() {
        let buf = SharedBuf::default();
        let em = Emitter::new(Box::new(buf.clone()));
        let mut tracker = ProgressTracker::new();

        tracker.record_error(FsErrorKind::Permission, "denied: /x".into());
        tracker.record_error(FsErrorKind::Missing, "vanished: /y".into());
        tracker.record_error(FsErrorKind::Missing, "vanished: /z".into());
        assert_eq!(tracker.errors.permission, 1);
        assert_eq!(tracker.errors.missing, 2);
        assert_eq!(tracker.errors.total(), 3);

        tracker.update(&em, Path::new("/tmp"), 0, 0);
        let raw = buf.0.lock().unwrap();
        let text = String::from_utf8(raw.clone()).unwrap();
        let frame: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(frame["error_count"], 3);
        assert_eq!(frame["last_error"], "vanished: /z");
    }
}
