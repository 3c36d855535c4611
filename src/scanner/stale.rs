//! Phase 4: stale dev project detection.
//!
//! A direct child of a search root counts as a project when it carries a
//! recognized marker (`.git`, `Cargo.toml`, `package.json`, ...). The
//! project is stale when nothing among its direct children has been touched
//! for 90 days, and each one reports the cleanable artifact directories
//! (`node_modules`, `target`, `build`, ...) worth at least 1 MiB.

use crate::probe::dir_size_with;
use crate::progress::ProgressTracker;
use crate::scanner::known::ScanCtx;
use crate::types::{project_markers_in, CleanableArtifact, StaleProject};
use crate::utils::format_timestamp;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const STALE_DAYS: u64 = 90;

const ARTIFACT_MIN: u64 = 1024 * 1024;

/// Artifact directory names worth reclaiming, with UI descriptions.
const CLEANABLE_ARTIFACTS: &[(&str, &str)] = &[
    ("node_modules", "Node.js dependencies"),
    (".venv", "Python virtual environment"),
    ("venv", "Python virtual environment"),
    ("__pycache__", "Python bytecode cache"),
    ("target", "Rust build artifacts"),
    ("build", "Build output"),
    ("dist", "Distribution bundle"),
    (".next", "Next.js build cache"),
    (".nuxt", "Nuxt build cache"),
    (".cache", "Tool cache"),
    ("coverage", "Coverage reports"),
    (".tox", "Tox environments"),
    (".gradle", "Gradle caches"),
    ("Pods", "CocoaPods dependencies"),
    ("DerivedData", "Xcode build artifacts"),
    (".dart_tool", "Dart tool cache"),
];

/// Newest `max(atime, mtime)` across the direct children of a directory,
/// falling back to the directory's own times when it has none.
fn most_recent_activity(dir: &Path) -> Option<SystemTime> {
    let own = fs::symlink_metadata(dir)
        .ok()
        .and_then(|m| newest_of(&m))?;
    let mut newest = None;
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.filter_map(|e| e.ok()) {
            if let Ok(meta) = entry.metadata() {
                if let Some(t) = newest_of(&meta) {
                    newest = Some(match newest {
                        Some(prev) if prev > t => prev,
                        _ => t,
                    });
                }
            }
        }
    }
    Some(newest.unwrap_or(own))
}

fn newest_of(meta: &fs::Metadata) -> Option<SystemTime> {
    let mtime = meta.modified().ok();
    let atime = meta.accessed().ok();
    match (atime, mtime) {
        (Some(a), Some(m)) => Some(a.max(m)),
        (Some(a), None) => Some(a),
        (None, Some(m)) => Some(m),
        (None, None) => None,
    }
}

fn inspect_project(
    ctx: &ScanCtx<'_>,
    tracker: &mut ProgressTracker,
    path: &Path,
    markers: Vec<String>,
) -> Option<StaleProject> {
    let last = most_recent_activity(path)?;
    let idle = SystemTime::now().duration_since(last).ok()?;
    let days_stale = idle.as_secs() / 86_400;
    if days_stale < STALE_DAYS {
        return None;
    }

    let mut artifacts = Vec::new();
    for (name, description) in CLEANABLE_ARTIFACTS {
        let artifact_path = path.join(name);
        if !artifact_path.is_dir() {
            continue;
        }
        tracker.update(ctx.emitter, &artifact_path, 0, 0);
        let mut recovered = Vec::new();
        let size = dir_size_with(&artifact_path, &mut |kind| recovered.push(kind));
        for kind in recovered {
            tracker.record_error(
                kind,
                format!("skipped entries under {}", artifact_path.display()),
            );
        }
        if size >= ARTIFACT_MIN {
            artifacts.push(CleanableArtifact {
                name: (*name).to_string(),
                description: (*description).to_string(),
                size,
            });
        }
    }
    if artifacts.is_empty() {
        return None;
    }

    let reclaimable_bytes = artifacts.iter().map(|a| a.size).sum();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Some(StaleProject {
        path: path.to_path_buf(),
        name,
        markers,
        last_active: format_timestamp(last),
        days_stale,
        artifacts,
        reclaimable_bytes,
    })
}

/// Scan the search roots for stale projects, emitting an `insight` event per
/// hit.
pub fn detect_stale_projects(
    ctx: &ScanCtx<'_>,
    tracker: &mut ProgressTracker,
) -> Vec<StaleProject> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut projects = Vec::new();

    for root in ctx.cfg.stale_roots() {
        if !root.is_dir() {
            continue;
        }
        tracker.update(ctx.emitter, &root, 0, 0);
        let entries = match fs::read_dir(&root) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_dir() || !seen.insert(path.clone()) {
                continue;
            }
            let markers = project_markers_in(&path);
            if markers.is_empty() {
                continue;
            }
            if let Some(project) = inspect_project(ctx, tracker, &path, markers) {
                ctx.emitter.insight_stale_project(&project);
                projects.push(project);
            }
        }
    }

    projects.sort_by(|a, b| b.reclaimable_bytes.cmp(&a.reclaimable_bytes));
    projects
}
