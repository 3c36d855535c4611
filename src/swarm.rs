//! Swarm scan: explorer/analyzer worker pools.
//!
//! Explorers each take one starting directory and walk it sequentially,
//! streaming plain file finds and collecting deep-analysis targets
//! (`node_modules`, `.git`). Once every explorer is done, analyzers take the
//! targets and produce sized, staleness-annotated items. Worker items flow
//! through a channel into a single batching emitter task that flushes a
//! `batch` event every 150 ms, keeping stdout contention off the workers.

use crate::config::Config;
use crate::events::{CompleteEvent, Emitter};
use crate::probe::classify_io_error;
use crate::progress::ProgressTracker;
use crate::recommend::recommendations;
use crate::scanner::finalize_scan;
use crate::store::Store;
use crate::types::{Item, ItemCategory, ItemTraits, ScanMetrics, StaleProject};
use crate::utils::{format_size, format_timestamp, parent_name};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use walkdir::WalkDir;

const WORKERS_PER_PHASE: usize = 4;
const BATCH_FLUSH_INTERVAL: Duration = Duration::from_millis(150);
const MIN_ITEM_SIZE: u64 = crate::config::MIN_ITEM_SIZE;
const INSIGHT_STALE_DAYS: u64 = 30;
const INSIGHT_MIN_BYTES: u64 = 10 * 1024 * 1024;

/// Version-control and cache directories explorers never walk into.
const ALWAYS_SKIP_DIRS: &[&str] = &[".git", ".hg", ".svn", "node_modules", "__pycache__"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    DevProject,
    GitRepo,
}

impl TargetKind {
    fn label(self) -> &'static str {
        match self {
            TargetKind::DevProject => "dev_project",
            TargetKind::GitRepo => "git_repo",
        }
    }
}

#[derive(Debug, Clone)]
struct DeepTarget {
    kind: TargetKind,
    path: PathBuf,
}

enum SwarmMsg {
    Item(Item),
    AgentStatus {
        agent_id: String,
        status: String,
        kind: &'static str,
    },
    Insight(StaleProject),
}

/// Drain worker messages into batched writes.
fn emitter_task(emitter: Arc<Emitter>, rx: mpsc::Receiver<SwarmMsg>) {
    let mut buffer: Vec<Item> = Vec::new();
    let mut last_flush = Instant::now();

    let flush = |buffer: &mut Vec<Item>, last_flush: &mut Instant, emitter: &Emitter| {
        if !buffer.is_empty() {
            emitter.batch(buffer);
            buffer.clear();
        }
        *last_flush = Instant::now();
    };

    loop {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(SwarmMsg::Item(item)) => buffer.push(item),
            Ok(SwarmMsg::AgentStatus {
                agent_id,
                status,
                kind,
            }) => {
                flush(&mut buffer, &mut last_flush, &emitter);
                emitter.agent_status(&agent_id, &status, kind);
            }
            Ok(SwarmMsg::Insight(project)) => {
                flush(&mut buffer, &mut last_flush, &emitter);
                emitter.insight_stale_project(&project);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                flush(&mut buffer, &mut last_flush, &emitter);
                return;
            }
        }
        if last_flush.elapsed() >= BATCH_FLUSH_INTERVAL {
            flush(&mut buffer, &mut last_flush, &emitter);
        }
    }
}

/// Real path of this binary's own bundled `node_modules`, if any. The swarm
/// must never walk or target it.
fn own_node_modules() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?.canonicalize().ok()?;
    Some(dir.join("node_modules"))
}

fn categorize_extension(name: &str) -> ItemCategory {
    let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("tmp") | Some("temp") | Some("cache") => ItemCategory::GeneralCache,
        Some("log") | Some("out") | Some("err") => ItemCategory::SystemLogs,
        _ => ItemCategory::Other,
    }
}

struct ExploreResult {
    items: Vec<Item>,
    targets: Vec<DeepTarget>,
    files: u64,
    bytes: u64,
    errors: Vec<crate::probe::FsErrorKind>,
}

fn send_status(tx: &Sender<SwarmMsg>, agent_id: &str, status: String, kind: &'static str) {
    let _ = tx.send(SwarmMsg::AgentStatus {
        agent_id: agent_id.to_string(),
        status,
        kind,
    });
}

fn explore(
    root: &Path,
    agent_id: &str,
    tx: &Sender<SwarmMsg>,
    excluded_nm: Option<&Path>,
) -> ExploreResult {
    send_status(tx, agent_id, format!("Exploring {}", root.display()), "explorer");

    let mut result = ExploreResult {
        items: Vec::new(),
        targets: Vec::new(),
        files: 0,
        bytes: 0,
        errors: Vec::new(),
    };

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !ALWAYS_SKIP_DIRS.contains(&e.file_name().to_string_lossy().as_ref())
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                result.errors.push(
                    e.io_error()
                        .map(classify_io_error)
                        .unwrap_or(crate::probe::FsErrorKind::Other),
                );
                continue;
            }
        };

        if entry.file_type().is_dir() {
            // Pruned names never show up as entries, so probe for them as
            // children of each visited directory.
            let nm = entry.path().join("node_modules");
            if nm.is_dir() {
                let is_own = excluded_nm
                    .is_some_and(|own| nm.canonicalize().map(|real| real == own).unwrap_or(false));
                if !is_own {
                    result.targets.push(DeepTarget {
                        kind: TargetKind::DevProject,
                        path: nm,
                    });
                }
            }
            let git = entry.path().join(".git");
            if git.is_dir() {
                result.targets.push(DeepTarget {
                    kind: TargetKind::GitRepo,
                    path: git,
                });
            }
            continue;
        }

        if !entry.file_type().is_file() {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                result.errors.push(
                    e.io_error()
                        .map(classify_io_error)
                        .unwrap_or(crate::probe::FsErrorKind::Other),
                );
                continue;
            }
        };
        if meta.len() <= MIN_ITEM_SIZE {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let category = categorize_extension(&file_name);
        let item = Item::new(
            entry.path().to_path_buf(),
            meta.len(),
            category,
            file_name,
            "Discovered by Explorer Agent".to_string(),
        );
        result.files += 1;
        result.bytes += item.size;
        let _ = tx.send(SwarmMsg::Item(item.clone()));
        result.items.push(item);
    }

    send_status(tx, agent_id, "Finished exploring".to_string(), "explorer");
    result
}

fn analyze(target: &DeepTarget, agent_id: &str, tx: &Sender<SwarmMsg>) -> Option<Item> {
    send_status(
        tx,
        agent_id,
        format!(
            "Deep analyzing {}",
            target.path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        ),
        "analyzer",
    );

    let mut oldest_access: Option<SystemTime> = None;
    let mut size = 0u64;
    for entry in WalkDir::new(&target.path).follow_links(false) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        size += meta.len();
        if let Ok(atime) = meta.accessed() {
            oldest_access = Some(match oldest_access {
                Some(prev) if prev < atime => prev,
                _ => atime,
            });
        }
    }

    send_status(tx, agent_id, "Idle".to_string(), "analyzer");
    if size <= MIN_ITEM_SIZE {
        return None;
    }

    let oldest = oldest_access.unwrap_or_else(SystemTime::now);
    let stale_days = SystemTime::now()
        .duration_since(oldest)
        .map(|d| d.as_secs() / 86_400)
        .unwrap_or(0);
    let project_name = match target.kind {
        TargetKind::DevProject => parent_name(&target.path),
        TargetKind::GitRepo => target
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown".to_string()),
    };

    let item = Item::new(
        target.path.clone(),
        size,
        ItemCategory::DevCache,
        format!("{project_name} ({})", target.kind.label()),
        format!("Analyzed by {agent_id}. Stale for ~{stale_days} days."),
    )
    .with_traits(ItemTraits { stale_days });

    if stale_days > INSIGHT_STALE_DAYS && size > INSIGHT_MIN_BYTES {
        let _ = tx.send(SwarmMsg::Insight(StaleProject {
            path: target.path.clone(),
            name: project_name,
            markers: Vec::new(),
            last_active: format_timestamp(oldest),
            days_stale: stale_days,
            artifacts: Vec::new(),
            reclaimable_bytes: size,
        }));
    }

    let _ = tx.send(SwarmMsg::Item(item.clone()));
    Some(item)
}

/// Deploy the explorer and analyzer pools over the scan roots.
pub fn run_swarm_scan(
    cfg: &Config,
    emitter: Arc<Emitter>,
    target_path: Option<PathBuf>,
) -> Result<()> {
    let store = match Store::open(cfg) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("result store unavailable: {e:#}");
            None
        }
    };

    let scan_roots: Vec<PathBuf> = match target_path {
        Some(p) => vec![p],
        None => cfg.swarm_roots(),
    };
    let scan_roots: Vec<PathBuf> = scan_roots.into_iter().filter(|p| p.exists()).collect();
    let excluded_nm = own_node_modules();

    let mut tracker = ProgressTracker::new();
    tracker.set_phase("swarm_scanning");

    let (tx, rx) = mpsc::channel::<SwarmMsg>();
    let emitter_thread = {
        let emitter = Arc::clone(&emitter);
        thread::spawn(move || emitter_task(emitter, rx))
    };

    emitter.swarm_init("Deploying Explorer Agents...");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(WORKERS_PER_PHASE)
        .build()
        .context("building swarm pool")?;

    // Phase 1: explorers map the territory.
    let explore_results: Vec<ExploreResult> = pool.install(|| {
        scan_roots
            .par_iter()
            .enumerate()
            .map_with(tx.clone(), |tx, (i, root)| {
                explore(root, &format!("Exp-{}", i + 1), tx, excluded_nm.as_deref())
            })
            .collect()
    });

    let mut all_items: Vec<Item> = Vec::new();
    let mut deep_targets: Vec<DeepTarget> = Vec::new();
    for (result, root) in explore_results.into_iter().zip(&scan_roots) {
        for kind in result.errors {
            tracker.record_error(kind, format!("explorer error under {}", root.display()));
        }
        tracker.update(&emitter, root, result.files, result.bytes);
        all_items.extend(result.items);
        deep_targets.extend(result.targets);
    }

    emitter.swarm_phase(
        "Deep Analysis",
        &format!("Found {} complex targets.", deep_targets.len()),
    );

    // Phase 2: analyzers deep-dive the discovered targets.
    let analyzed: Vec<Option<Item>> = pool.install(|| {
        deep_targets
            .par_iter()
            .enumerate()
            .map_with(tx.clone(), |tx, (i, target)| {
                analyze(target, &format!("Ana-{}", i + 1), tx)
            })
            .collect()
    });
    for item in analyzed.into_iter().flatten() {
        tracker.update(&emitter, &item.path, 1, item.size);
        all_items.push(item);
    }

    // Close the channel so the emitter task final-flushes before `complete`.
    drop(tx);
    let _ = emitter_thread.join();

    let total_bytes: u64 = all_items.iter().map(|i| i.size).sum();
    let space = crate::progress::disk_space();
    let metrics = ScanMetrics {
        total_bytes,
        total_formatted: format_size(total_bytes),
        files_scanned: tracker.files_processed,
        items_found: all_items.len(),
        duration_seconds: (tracker.elapsed_seconds() * 100.0).round() / 100.0,
        disk_total: space.total,
        disk_used: space.used,
        disk_free: space.free,
        errors: tracker.errors,
    };

    let recs = recommendations(&all_items, &[], metrics.disk_total, metrics.disk_free);
    let (attestation, prediction) = finalize_scan(cfg, store.as_ref(), &all_items, None, &metrics);

    let mut complete = CompleteEvent::new(all_items, metrics);
    complete.recommendations = recs;
    complete.attestation = attestation;
    complete.prediction = prediction;
    emitter.complete(&complete);
    Ok(())
}
