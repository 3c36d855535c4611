//! # Store Module
//!
//! SQLite-backed scan history in the process-owned state directory.
//!
//! ## Features
//!
//! - Persists each completed scan; only the 10 most recent rows are kept
//! - Serves the `status` entrypoint from the latest row
//! - Per-path checkpoints for cheap rescan skipping (0.01 s mtime tolerance)
//! - Fits a linear growth rate over history to predict days-until-full

use crate::config::Config;
use crate::types::{GrowthPrediction, Item, ScanMetrics, TreeNode};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;

/// Scans retained in `scan_results`.
const HISTORY_LIMIT: u32 = 10;

/// Checkpoint mtimes within this many seconds count as unchanged.
const MTIME_TOLERANCE: f64 = 0.01;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scan_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_time TEXT NOT NULL,
    items_json TEXT NOT NULL,
    tree_json TEXT NOT NULL,
    metrics_json TEXT NOT NULL,
    total_bytes INTEGER NOT NULL,
    duration REAL NOT NULL,
    signature TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS scan_state (
    path TEXT PRIMARY KEY,
    crawl_status TEXT NOT NULL,
    last_mtime REAL NOT NULL,
    size_bytes INTEGER NOT NULL,
    last_scan_ts TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS scan_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// One persisted scan, deserialized back from the database.
pub struct StoredScan {
    pub scan_time: String,
    pub items: Vec<Item>,
    pub tree: Option<TreeNode>,
    pub metrics: ScanMetrics,
    pub total_bytes: u64,
    pub duration: f64,
    pub signature: String,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the store in the process state directory.
    pub fn open(cfg: &Config) -> Result<Self> {
        fs::create_dir_all(&cfg.state_root)
            .with_context(|| format!("creating state dir {}", cfg.state_root.display()))?;
        Self::open_at(&cfg.db_path())
    }

    /// Open a store at an explicit database path.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening {}", db_path.display()))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert one scan row and evict everything beyond the newest ten.
    pub fn save_scan(
        &self,
        items: &[Item],
        tree: Option<&TreeNode>,
        metrics: &ScanMetrics,
        signature: &str,
    ) -> Result<()> {
        let items_json = serde_json::to_string(items)?;
        let tree_json = match tree {
            Some(t) => serde_json::to_string(t)?,
            None => "null".to_string(),
        };
        let metrics_json = serde_json::to_string(metrics)?;
        self.conn.execute(
            "INSERT INTO scan_results
             (scan_time, items_json, tree_json, metrics_json, total_bytes, duration, signature)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Utc::now().to_rfc3339(),
                items_json,
                tree_json,
                metrics_json,
                metrics.total_bytes as i64,
                metrics.duration_seconds,
                signature,
            ],
        )?;
        self.conn.execute(
            "DELETE FROM scan_results WHERE id NOT IN
             (SELECT id FROM scan_results ORDER BY id DESC LIMIT ?1)",
            params![HISTORY_LIMIT],
        )?;
        Ok(())
    }

    /// Most recent scan, if any.
    pub fn latest(&self) -> Result<Option<StoredScan>> {
        let row = self
            .conn
            .query_row(
                "SELECT scan_time, items_json, tree_json, metrics_json, total_bytes, duration, signature
                 FROM scan_results ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((scan_time, items_json, tree_json, metrics_json, total_bytes, duration, signature)) =
            row
        else {
            return Ok(None);
        };

        Ok(Some(StoredScan {
            scan_time,
            items: serde_json::from_str(&items_json)?,
            tree: serde_json::from_str(&tree_json)?,
            metrics: serde_json::from_str(&metrics_json)?,
            total_bytes: total_bytes.max(0) as u64,
            duration,
            signature,
        }))
    }

    pub fn scan_count(&self) -> Result<u32> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM scan_results", [], |r| r.get(0))?)
    }

    /// Linear growth fit over the retained history.
    ///
    /// Needs at least two rows; rate is `(last − first) / days`, and the
    /// prediction is only produced when the rate is positive.
    pub fn predict_growth(&self, disk_free: u64) -> Result<Option<GrowthPrediction>> {
        let mut stmt = self
            .conn
            .prepare("SELECT scan_time, total_bytes FROM scan_results ORDER BY id ASC")?;
        let rows: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        if rows.len() < 2 {
            return Ok(None);
        }
        let (first_time, first_bytes) = &rows[0];
        let (last_time, last_bytes) = &rows[rows.len() - 1];

        let first = DateTime::parse_from_rfc3339(first_time).map(DateTime::<Utc>::from);
        let last = DateTime::parse_from_rfc3339(last_time).map(DateTime::<Utc>::from);
        let (Ok(first), Ok(last)) = (first, last) else {
            return Ok(None);
        };

        let days_span = (last - first).num_milliseconds() as f64 / 86_400_000.0;
        if days_span <= 0.0 {
            return Ok(None);
        }
        let rate = (*last_bytes - *first_bytes) as f64 / days_span;
        if rate <= 0.0 {
            return Ok(None);
        }
        Ok(Some(GrowthPrediction {
            bytes_per_day: rate,
            days_until_full: disk_free as f64 / rate,
        }))
    }

    /// Record a per-path checkpoint after sizing it.
    pub fn checkpoint(&self, path: &Path, mtime: f64, size_bytes: u64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO scan_state (path, crawl_status, last_mtime, size_bytes, last_scan_ts)
             VALUES (?1, 'done', ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
               crawl_status = 'done', last_mtime = ?2, size_bytes = ?3, last_scan_ts = ?4",
            params![
                path.to_string_lossy(),
                mtime,
                size_bytes as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// If the path's recorded mtime matches the current one (tolerance
    /// 0.01 s), return the size recorded last time so the probe can be
    /// skipped.
    pub fn unchanged_size(&self, path: &Path, current_mtime: f64) -> Result<Option<u64>> {
        let row = self
            .conn
            .query_row(
                "SELECT last_mtime, size_bytes FROM scan_state WHERE path = ?1",
                params![path.to_string_lossy()],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        Ok(row.and_then(|(last_mtime, size)| {
            if (last_mtime - current_mtime).abs() <= MTIME_TOLERANCE {
                Some(size.max(0) as u64)
            } else {
                None
            }
        }))
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO scan_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM scan_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    #[cfg(test)]
    fn backdate_row(&self, id: i64, scan_time: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE scan_results SET scan_time = ?2 WHERE id = ?1",
            params![id, scan_time],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorTally, ItemCategory};
    use crate::utils::format_size;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn metrics(total: u64) -> ScanMetrics {
        ScanMetrics {
            total_bytes: total,
            total_formatted: format_size(total),
            files_scanned: 10,
            items_found: 1,
            duration_seconds: 1.5,
            disk_total: 0,
            disk_used: 0,
            disk_free: 0,
            errors: ErrorTally::default(),
        }
    }

    fn item() -> Item {
        Item::new(
            PathBuf::from("/Users/a/Library/Caches/x"),
            2048,
            ItemCategory::GeneralCache,
            "Cache: x".into(),
            String::new(),
        )
    }

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(&Config::with_home(dir.path())).unwrap();
        (dir, store)
    }

    #[test]
    fn test_save_and_latest_roundtrip() {
        let (_dir, store) = open_store();
        store
            .save_scan(&[item()], None, &metrics(2048), "sig-abc")
            .unwrap();

        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.items.len(), 1);
        assert_eq!(latest.items[0].size, 2048);
        assert_eq!(latest.signature, "sig-abc");
        assert_eq!(latest.total_bytes, 2048);
        assert!(latest.tree.is_none());
    }

    #[test]
    fn test_empty_store_has_no_latest() {
        let (_dir, store) = open_store();
        assert!(store.latest().unwrap().is_none());
    }

    #[test]
    fn test_history_evicts_beyond_ten() {
        let (_dir, store) = open_store();
        for i in 0..13 {
            store
                .save_scan(&[], None, &metrics(i), &format!("sig-{i}"))
                .unwrap();
        }
        assert_eq!(store.scan_count().unwrap(), 10);
        // Newest row survived.
        assert_eq!(store.latest().unwrap().unwrap().signature, "sig-12");
    }

    #[test]
    fn test_growth_prediction_needs_two_rows() {
        let (_dir, store) = open_store();
        store.save_scan(&[], None, &metrics(100), "s").unwrap();
        assert!(store.predict_growth(1000).unwrap().is_none());
    }

    #[test]
    fn test_growth_prediction_linear_rate() {
        let gib = 1024u64 * 1024 * 1024;
        let (_dir, store) = open_store();
        store.save_scan(&[], None, &metrics(10 * gib), "a").unwrap();
        store.save_scan(&[], None, &metrics(11 * gib), "b").unwrap();
        // Pin the rows exactly one day apart.
        store.backdate_row(1, "2024-05-01T00:00:00+00:00").unwrap();
        store.backdate_row(2, "2024-05-02T00:00:00+00:00").unwrap();

        let pred = store.predict_growth(50 * gib).unwrap().unwrap();
        assert!((pred.bytes_per_day - gib as f64).abs() < 1.0);
        assert!((pred.days_until_full - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_prediction_when_shrinking() {
        let (_dir, store) = open_store();
        store.save_scan(&[], None, &metrics(2000), "a").unwrap();
        store.save_scan(&[], None, &metrics(1000), "b").unwrap();
        store.backdate_row(1, "2024-05-01T00:00:00+00:00").unwrap();
        store.backdate_row(2, "2024-05-02T00:00:00+00:00").unwrap();
        assert!(store.predict_growth(1000).unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_mtime_tolerance() {
        let (_dir, store) = open_store();
        let p = Path::new("/Users/a/Library/Caches/x");
        store.checkpoint(p, 1000.0, 777).unwrap();

        assert_eq!(store.unchanged_size(p, 1000.005).unwrap(), Some(777));
        assert_eq!(store.unchanged_size(p, 1000.5).unwrap(), None);
        assert_eq!(
            store.unchanged_size(Path::new("/other"), 1000.0).unwrap(),
            None
        );
    }

    #[test]
    fn test_meta_upsert() {
        let (_dir, store) = open_store();
        store.set_meta("last_daemon_run", "x").unwrap();
        store.set_meta("last_daemon_run", "y").unwrap();
        assert_eq!(store.get_meta("last_daemon_run").unwrap().unwrap(), "y");
        assert!(store.get_meta("absent").unwrap().is_none());
    }
}
