//! # Events Module
//!
//! The streaming output contract: one JSON object per line on stdout,
//! flushed after every write, with an `event` discriminator on each object.
//!
//! All writes go through a single [`Emitter`] guarding the stream with a
//! mutex, so swarm workers and the main thread never interleave partial
//! lines. A broken pipe means the consumer went away, which is normal
//! termination: the process exits 0 on the spot.

use crate::types::{
    Attestation, CategorySummary, DiskMap, ErrorTally, GrowthPrediction, Item, ScanMetrics,
    StaleProject, TreeNode,
};
use crate::utils::format_size;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Mutex;

/// `item` event envelope. Carries camelCase aliases for three fields to stay
/// compatible with the UI boundary.
#[derive(Serialize)]
pub struct ItemEvent<'a> {
    event: &'static str,
    #[serde(flatten)]
    item: &'a Item,
    #[serde(rename = "sizeBytes")]
    size_bytes: u64,
    #[serde(rename = "sizeFormatted")]
    size_formatted: &'a str,
    #[serde(rename = "lastUsed")]
    last_used: &'a str,
}

impl<'a> ItemEvent<'a> {
    pub fn new(item: &'a Item) -> Self {
        Self {
            event: "item",
            size_bytes: item.size,
            size_formatted: &item.size_formatted,
            last_used: &item.last_accessed,
            item,
        }
    }
}

#[derive(Serialize)]
struct BatchEvent<'a> {
    event: &'static str,
    items: Vec<ItemEvent<'a>>,
}

#[derive(Serialize)]
pub struct ProgressEvent<'a> {
    pub event: &'static str,
    pub phase: &'a str,
    pub current_path: &'a str,
    pub files_processed: u64,
    pub bytes_scanned: u64,
    pub scan_rate_mbps: f64,
    pub elapsed: f64,
    pub error_count: u64,
    pub errors: ErrorTally,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<&'a str>,
}

#[derive(Serialize)]
struct FoundEvent {
    event: &'static str,
    category: &'static str,
    name: &'static str,
    count: usize,
    total_bytes: u64,
    total_formatted: String,
}

#[derive(Serialize)]
struct WarningEvent<'a> {
    event: &'static str,
    kind: &'a str,
    message: String,
    free_bytes: u64,
}

#[derive(Serialize)]
struct AgentStatusEvent<'a> {
    event: &'static str,
    agent_id: &'a str,
    status: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct InsightEvent<'a> {
    event: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    project_name: &'a str,
    days_stale: u64,
    reclaimable_bytes: u64,
    reclaimable_formatted: String,
    path: &'a std::path::Path,
}

#[derive(Serialize)]
struct MessageEvent<'a> {
    event: &'static str,
    message: &'a str,
}

#[derive(Serialize)]
struct PhaseEvent<'a> {
    event: &'static str,
    phase: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct BareEvent {
    event: &'static str,
}

/// Terminal event for a scan. Also reconstructed by `status` from the store,
/// with `cached` flipped on.
#[derive(Serialize)]
pub struct CompleteEvent {
    event: &'static str,
    pub cached: bool,
    pub total_items: usize,
    pub total_bytes: u64,
    pub total_formatted: String,
    pub duration: f64,
    pub items: Vec<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<TreeNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_map: Option<DiskMap>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stale_projects: Vec<StaleProject>,
    pub recommendations: Vec<crate::types::Recommendation>,
    pub categories: Vec<CategorySummary>,
    pub metrics: ScanMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Attestation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<GrowthPrediction>,
    pub disk_total: u64,
    pub disk_used: u64,
    pub disk_free: u64,
}

impl CompleteEvent {
    pub fn new(items: Vec<Item>, metrics: ScanMetrics) -> Self {
        let categories = crate::types::summarize_categories(&items);
        Self {
            event: "complete",
            cached: false,
            total_items: items.len(),
            total_bytes: metrics.total_bytes,
            total_formatted: metrics.total_formatted.clone(),
            duration: metrics.duration_seconds,
            items,
            tree: None,
            disk_map: None,
            stale_projects: Vec::new(),
            recommendations: Vec::new(),
            categories,
            disk_total: metrics.disk_total,
            disk_used: metrics.disk_used,
            disk_free: metrics.disk_free,
            metrics,
            attestation: None,
            prediction: None,
        }
    }
}

/// Serialized writer for the event stream.
pub struct Emitter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Emitter {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }

    fn write_event(&self, event: &impl Serialize) {
        let line = match serde_json::to_string(event) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!("failed to serialize event: {e}");
                return;
            }
        };
        let mut out = match self.out.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = writeln!(out, "{line}").and_then(|_| out.flush());
        if let Err(e) = result {
            if e.kind() == io::ErrorKind::BrokenPipe {
                // Consumer closed the stream; not an error.
                std::process::exit(0);
            }
            tracing::warn!("event write failed: {e}");
        }
    }

    pub fn item(&self, item: &Item) {
        self.write_event(&ItemEvent::new(item));
    }

    pub fn batch(&self, items: &[Item]) {
        if items.is_empty() {
            return;
        }
        self.write_event(&BatchEvent {
            event: "batch",
            items: items.iter().map(ItemEvent::new).collect(),
        });
    }

    pub fn progress(&self, frame: &ProgressEvent<'_>) {
        self.write_event(frame);
    }

    pub fn found(&self, category: &'static str, name: &'static str, count: usize, total_bytes: u64) {
        self.write_event(&FoundEvent {
            event: "found",
            category,
            name,
            count,
            total_bytes,
            total_formatted: format_size(total_bytes),
        });
    }

    pub fn warning_low_disk(&self, free_bytes: u64) {
        self.write_event(&WarningEvent {
            event: "warning",
            kind: "low_disk_space",
            message: format!("Disk space is low: {} remaining", format_size(free_bytes)),
            free_bytes,
        });
    }

    pub fn agent_status(&self, agent_id: &str, status: &str, kind: &str) {
        self.write_event(&AgentStatusEvent {
            event: "agent_status",
            agent_id,
            status,
            kind,
        });
    }

    pub fn insight_stale_project(&self, project: &StaleProject) {
        self.write_event(&InsightEvent {
            event: "insight",
            kind: "stale_project",
            project_name: &project.name,
            days_stale: project.days_stale,
            reclaimable_bytes: project.reclaimable_bytes,
            reclaimable_formatted: format_size(project.reclaimable_bytes),
            path: &project.path,
        });
    }

    pub fn swarm_init(&self, message: &str) {
        self.write_event(&MessageEvent {
            event: "swarm_init",
            message,
        });
    }

    pub fn swarm_phase(&self, phase: &str, message: &str) {
        self.write_event(&PhaseEvent {
            event: "swarm_phase",
            phase,
            message,
        });
    }

    pub fn daemon_started(&self) {
        self.write_event(&BareEvent { event: "daemon_started" });
    }

    pub fn daemon_stopped(&self) {
        self.write_event(&BareEvent { event: "daemon_stopped" });
    }

    pub fn complete(&self, event: &CompleteEvent) {
        self.write_event(event);
    }

    pub fn error(&self, message: &str) {
        self.write_event(&MessageEvent { event: "error", message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemCategory;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture() -> (Emitter, SharedBuf) {
        let buf = SharedBuf::default();
        (Emitter::new(Box::new(buf.clone())), buf)
    }

    fn lines(buf: &SharedBuf) -> Vec<serde_json::Value> {
        let raw = buf.0.lock().unwrap();
        String::from_utf8(raw.clone())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn sample_item() -> Item {
        Item::new(
            PathBuf::from("/Users/a/.npm"),
            3_000_000,
            ItemCategory::DevCache,
            "NPM Cache (~/.npm)".to_string(),
            "Global NPM package cache".to_string(),
        )
    }

    #[test]
    fn test_item_event_carries_camelcase_aliases() {
        let (em, buf) = capture();
        em.item(&sample_item());

        let events = lines(&buf);
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e["event"], "item");
        assert_eq!(e["size"], 3_000_000);
        assert_eq!(e["sizeBytes"], 3_000_000);
        assert_eq!(e["sizeFormatted"], e["size_formatted"]);
        assert_eq!(e["lastUsed"], e["last_accessed"]);
        assert_eq!(e["risk"], "safe");
        assert_eq!(e["category"], "dev_cache");
    }

    #[test]
    fn test_batch_items_are_full_item_events() {
        let (em, buf) = capture();
        em.batch(&[sample_item(), sample_item()]);

        let events = lines(&buf);
        assert_eq!(events[0]["event"], "batch");
        let items = events[0]["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["event"], "item");
        assert_eq!(items[0]["sizeBytes"], 3_000_000);
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let (em, buf) = capture();
        em.batch(&[]);
        assert!(buf.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_found_and_error_events() {
        let (em, buf) = capture();
        em.found("dev_cache", "Developer Tools", 3, 2048);
        em.error("no cached scan results");

        let events = lines(&buf);
        assert_eq!(events[0]["event"], "found");
        assert_eq!(events[0]["total_bytes"], 2048);
        assert_eq!(events[0]["total_formatted"], "2.00 KB");
        assert_eq!(events[1]["event"], "error");
    }

    #[test]
    fn test_one_json_object_per_line() {
        let (em, buf) = capture();
        em.daemon_started();
        em.warning_low_disk(123);
        em.daemon_stopped();

        let raw = buf.0.lock().unwrap();
        let text = String::from_utf8(raw.clone()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with('\n'));
    }
}
