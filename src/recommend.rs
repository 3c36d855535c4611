//! Cleanup recommendation engine.
//!
//! Turns the discovered item set, detected stale projects, and current disk
//! pressure into a ranked action list. Ordering is category priority first
//! (urgent, quick wins, dev cleanup, maintenance, media management), then
//! impact descending. Ids are stable short hashes of each recommendation's
//! target path set, so the UI can track them across scans.

use crate::types::{
    Item, ItemCategory, Recommendation, RecommendationCategory, Risk, StaleProject,
};
use crate::utils::format_size;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

const QUICK_WIN_MIN: u64 = 500 * 1024 * 1024;
const DEV_CLEANUP_MIN: u64 = 50 * 1024 * 1024;
const MAINTENANCE_GROUP_MIN: u64 = 100 * 1024 * 1024;

/// Stable id over a target path set: hex SHA-256 of the sorted paths,
/// truncated to 12 chars.
fn recommendation_id(paths: &[PathBuf]) -> String {
    let mut sorted: Vec<String> = paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    for p in &sorted {
        hasher.update(p.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())[..12].to_string()
}

fn build(
    category: RecommendationCategory,
    title: String,
    description: String,
    impact_bytes: u64,
    confidence: f64,
    risk: Risk,
    paths: Vec<PathBuf>,
) -> Recommendation {
    Recommendation {
        id: recommendation_id(&paths),
        title,
        description,
        category,
        impact_bytes,
        confidence,
        risk,
        paths,
        action_type: "delete",
    }
}

/// Produce the ranked recommendation list.
///
/// `disk_total`/`disk_free` drive the urgency rule: free space under 10% of
/// the volume prepends an all-safe-items recommendation at full confidence.
pub fn recommendations(
    items: &[Item],
    stale_projects: &[StaleProject],
    disk_total: u64,
    disk_free: u64,
) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    let safe_items: Vec<&Item> = items.iter().filter(|i| i.risk == Risk::Safe).collect();

    // Urgent: disk nearly full.
    if disk_total > 0 && (disk_free as f64) < disk_total as f64 * 0.10 && !safe_items.is_empty() {
        let total: u64 = safe_items.iter().map(|i| i.size).sum();
        let paths: Vec<PathBuf> = safe_items.iter().map(|i| i.path.clone()).collect();
        recs.push(build(
            RecommendationCategory::Urgent,
            "Free up disk space now".to_string(),
            format!(
                "Disk space is critically low ({} free). Removing all safe items reclaims {}.",
                format_size(disk_free),
                format_size(total)
            ),
            total,
            1.0,
            Risk::Safe,
            paths,
        ));
    }

    // Quick wins: each large safe item on its own.
    for item in safe_items.iter().filter(|i| i.size > QUICK_WIN_MIN) {
        recs.push(build(
            RecommendationCategory::QuickWins,
            format!("Remove {}", item.name),
            format!("{} ({})", item.description, item.size_formatted),
            item.size,
            0.95,
            Risk::Safe,
            vec![item.path.clone()],
        ));
    }

    // Dev cleanup: stale projects with meaningful reclaimable artifacts.
    for project in stale_projects
        .iter()
        .filter(|p| p.reclaimable_bytes > DEV_CLEANUP_MIN)
    {
        let artifact_names: Vec<&str> =
            project.artifacts.iter().map(|a| a.name.as_str()).collect();
        let paths: Vec<PathBuf> = project
            .artifacts
            .iter()
            .map(|a| project.path.join(&a.name))
            .collect();
        recs.push(build(
            RecommendationCategory::DevCleanup,
            format!("Clean stale project: {}", project.name),
            format!(
                "Untouched for {} days; {} reclaimable across {}.",
                project.days_stale,
                format_size(project.reclaimable_bytes),
                artifact_names.join(", ")
            ),
            project.reclaimable_bytes,
            0.85,
            Risk::Safe,
            paths,
        ));
    }

    // Maintenance: batch the remaining small safe items per category. Items
    // already targeted by a dev-cleanup recommendation don't count again.
    let covered: std::collections::HashSet<PathBuf> = recs
        .iter()
        .filter(|r| r.category == RecommendationCategory::DevCleanup)
        .flat_map(|r| r.paths.iter().cloned())
        .collect();
    for category in [
        ItemCategory::BrowserCache,
        ItemCategory::DevCache,
        ItemCategory::AppCache,
        ItemCategory::SystemLogs,
        ItemCategory::MailBackups,
        ItemCategory::GeneralCache,
        ItemCategory::Other,
    ] {
        let group: Vec<&&Item> = safe_items
            .iter()
            .filter(|i| {
                i.category == category && i.size <= QUICK_WIN_MIN && !covered.contains(i.path.as_path())
            })
            .collect();
        let total: u64 = group.iter().map(|i| i.size).sum();
        if total > MAINTENANCE_GROUP_MIN {
            let paths: Vec<PathBuf> = group.iter().map(|i| i.path.clone()).collect();
            recs.push(build(
                RecommendationCategory::Maintenance,
                format!("Clear {}", category.name().to_lowercase()),
                format!(
                    "{} spread across {} locations.",
                    format_size(total),
                    group.len()
                ),
                total,
                0.9,
                Risk::Safe,
                paths,
            ));
        }
    }

    recs.sort_by(|a, b| {
        a.category
            .priority()
            .cmp(&b.category.priority())
            .then(b.impact_bytes.cmp(&a.impact_bytes))
    });
    recs
}
