//! Phased scan orchestration.
//!
//! Phase order: known locations (fast), deep walk + leftover caches (deep),
//! full-disk map, stale projects. One growing item set feeds the
//! recommender, the signer, and the store, and everything lands in the
//! terminal `complete` event.

pub mod diskmap;
pub mod known;
pub mod stale;
pub mod walker;

use crate::attest;
use crate::config::Config;
use crate::events::{CompleteEvent, Emitter};
use crate::progress::{disk_space, ProgressTracker};
use crate::recommend::recommendations;
use crate::store::Store;
use crate::tools::ToolRunner;
use crate::types::{Attestation, Item, ScanMetrics};
use crate::utils::format_size;
use anyhow::Result;
use known::ScanCtx;

fn build_metrics(tracker: &ProgressTracker, items: &[Item], duration: f64) -> ScanMetrics {
    let total_bytes: u64 = items.iter().map(|i| i.size).sum();
    let space = disk_space();
    ScanMetrics {
        total_bytes,
        total_formatted: format_size(total_bytes),
        files_scanned: tracker.files_processed,
        items_found: items.len(),
        duration_seconds: (duration * 100.0).round() / 100.0,
        disk_total: space.total,
        disk_used: space.used,
        disk_free: space.free,
        errors: tracker.errors,
    }
}

/// Sign the item set and persist the scan; neither failure aborts the scan.
pub fn finalize_scan(
    cfg: &Config,
    store: Option<&Store>,
    items: &[Item],
    tree: Option<&crate::types::TreeNode>,
    metrics: &ScanMetrics,
) -> (Option<Attestation>, Option<crate::types::GrowthPrediction>) {
    let attestation = match attest::sign_items(cfg, items) {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::warn!("attestation failed: {e:#}");
            None
        }
    };

    let mut prediction = None;
    if let Some(store) = store {
        let signature = attestation
            .as_ref()
            .and_then(|a| serde_json::to_string(a).ok())
            .unwrap_or_default();
        if let Err(e) = store.save_scan(items, tree, metrics, &signature) {
            tracing::warn!("persisting scan failed: {e:#}");
        }
        // Lifetime scan counter; the history table only keeps the last ten.
        let total = store
            .get_meta("total_scans")
            .ok()
            .flatten()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        let _ = store.set_meta("total_scans", &total.to_string());
        prediction = store
            .predict_growth(metrics.disk_free)
            .unwrap_or_default();
    }
    (attestation, prediction)
}

/// Full discovery pass: stream events, then emit the terminal `complete`.
pub fn run_scan(cfg: &Config, emitter: &Emitter, tools: &dyn ToolRunner) -> Result<()> {
    // The store is an accelerator; a broken database never blocks a scan.
    let store = match Store::open(cfg) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("result store unavailable: {e:#}");
            None
        }
    };

    let mut tracker = ProgressTracker::new();
    let ctx = ScanCtx {
        cfg,
        emitter,
        store: store.as_ref(),
    };
    let mut items: Vec<Item> = Vec::new();

    tracker.set_phase("fast");
    tracker.update(emitter, &cfg.home, 0, 0);
    items.extend(known::scan_browser_caches(&ctx, &mut tracker));
    items.extend(known::scan_app_caches(&ctx, &mut tracker));
    items.extend(known::scan_system_logs(&ctx, &mut tracker));
    items.extend(known::scan_mail_and_backups(&ctx, &mut tracker, tools));

    tracker.set_phase("deep");
    items.extend(walker::scan_dev_caches(&ctx, &mut tracker, tools));
    items.extend(known::scan_general_caches(&ctx, &mut tracker));

    tracker.set_phase("map");
    let disk_map = diskmap::build_disk_map(&ctx, &mut tracker, tools);
    let tree = diskmap::disk_map_tree(&disk_map);

    tracker.set_phase("stale");
    let stale_projects = stale::detect_stale_projects(&ctx, &mut tracker);

    items.sort_by(|a, b| b.size.cmp(&a.size));
    let metrics = build_metrics(&tracker, &items, tracker.elapsed_seconds());
    let recs = recommendations(
        &items,
        &stale_projects,
        metrics.disk_total,
        metrics.disk_free,
    );
    let (attestation, prediction) =
        finalize_scan(cfg, store.as_ref(), &items, Some(&tree), &metrics);

    let mut complete = CompleteEvent::new(items, metrics);
    complete.tree = Some(tree);
    complete.disk_map = Some(disk_map);
    complete.stale_projects = stale_projects;
    complete.recommendations = recs;
    complete.attestation = attestation;
    complete.prediction = prediction;
    emitter.complete(&complete);
    Ok(())
}

/// `status`: re-emit the latest persisted scan as a cached `complete` event.
pub fn emit_cached_status(cfg: &Config, emitter: &Emitter) -> Result<()> {
    let store = Store::open(cfg)?;
    let Some(scan) = store.latest()? else {
        emitter.error("No cached scan results available. Run a scan first.");
        return Ok(());
    };
    tracing::debug!("serving cached scan ({} in history)", store.scan_count()?);

    let attestation: Option<Attestation> = serde_json::from_str(&scan.signature).ok();
    if let Some(att) = &attestation {
        if att.content_hash != attest::content_hash(&scan.items) {
            tracing::warn!("cached scan items do not match their attestation");
        }
    }
    let prediction = store
        .predict_growth(disk_space().free)
        .unwrap_or_default();

    let mut complete = CompleteEvent::new(scan.items, scan.metrics);
    complete.cached = true;
    complete.tree = scan.tree;
    complete.attestation = attestation;
    complete.prediction = prediction;
    emitter.complete(&complete);
    Ok(())
}
