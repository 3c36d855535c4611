//! # Types Module
//!
//! Core data structures used throughout Diskwise.
//!
//! This module defines the primary types for representing discovered
//! reclaimable items, the full-disk usage map, stale projects, cleanup
//! recommendations, and the signed scan attestation.

use crate::risk::classify_risk;
use crate::utils::{format_size, last_accessed_string};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Deletion safety classification derived from path patterns.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    Safe,
    Caution,
    Critical,
}

/// Producer-assigned bucket for a discovered item.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    BrowserCache,
    DevCache,
    AppCache,
    SystemLogs,
    MailBackups,
    GeneralCache,
    Other,
}

impl ItemCategory {
    pub const fn name(&self) -> &'static str {
        match self {
            ItemCategory::BrowserCache => "Browser Caches",
            ItemCategory::DevCache => "Developer Tools",
            ItemCategory::AppCache => "Application Caches",
            ItemCategory::SystemLogs => "System Logs",
            ItemCategory::MailBackups => "Mail & Backups",
            ItemCategory::GeneralCache => "Other Caches",
            ItemCategory::Other => "Other",
        }
    }

    pub const fn id(&self) -> &'static str {
        match self {
            ItemCategory::BrowserCache => "browser_cache",
            ItemCategory::DevCache => "dev_cache",
            ItemCategory::AppCache => "app_cache",
            ItemCategory::SystemLogs => "system_logs",
            ItemCategory::MailBackups => "mail_backups",
            ItemCategory::GeneralCache => "general_cache",
            ItemCategory::Other => "other",
        }
    }
}

/// Extra analyzer-derived facts attached to swarm items.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ItemTraits {
    pub stale_days: u64,
}

/// Represents one discovered reclaimable artifact.
///
/// Contains everything the UI needs to identify, rank, and display a
/// deletion candidate. Immutable once constructed; the risk field is always
/// the classifier's verdict on the path.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Item {
    /// Absolute filesystem path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Human-readable size
    pub size_formatted: String,
    /// Last access time, `YYYY-MM-DD HH:MM:SS` or `Unknown`
    pub last_accessed: String,
    /// Deletion risk derived from the path
    pub risk: Risk,
    /// Category assigned by the producing scanner
    pub category: ItemCategory,
    /// Display name
    pub name: String,
    /// One-line description
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits: Option<ItemTraits>,
}

impl Item {
    pub fn new(
        path: PathBuf,
        size: u64,
        category: ItemCategory,
        name: String,
        description: String,
    ) -> Self {
        let risk = classify_risk(&path);
        Self {
            size_formatted: format_size(size),
            last_accessed: last_accessed_string(&path),
            path,
            size,
            risk,
            category,
            name,
            description,
            traits: None,
        }
    }

    pub fn with_traits(mut self, traits: ItemTraits) -> Self {
        self.traits = Some(traits);
        self
    }
}

/// Display bucket for the full-disk usage map.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiskCategoryId {
    Applications,
    Developer,
    Documents,
    Media,
    Photos,
    MailMessages,
    AppData,
    SystemData,
    Other,
    Cleanable,
}

impl DiskCategoryId {
    pub const fn name(&self) -> &'static str {
        match self {
            DiskCategoryId::Applications => "Applications",
            DiskCategoryId::Developer => "Developer",
            DiskCategoryId::Documents => "Documents",
            DiskCategoryId::Media => "Media",
            DiskCategoryId::Photos => "Photos",
            DiskCategoryId::MailMessages => "Mail & Messages",
            DiskCategoryId::AppData => "App Data",
            DiskCategoryId::SystemData => "System Data",
            DiskCategoryId::Other => "Other",
            DiskCategoryId::Cleanable => "Cleanable",
        }
    }

    /// Stable color token for the UI.
    pub const fn color(&self) -> &'static str {
        match self {
            DiskCategoryId::Applications => "#4C8DFF",
            DiskCategoryId::Developer => "#9B59B6",
            DiskCategoryId::Documents => "#F5A623",
            DiskCategoryId::Media => "#E74C3C",
            DiskCategoryId::Photos => "#FF6FAE",
            DiskCategoryId::MailMessages => "#16A085",
            DiskCategoryId::AppData => "#7F8C8D",
            DiskCategoryId::SystemData => "#95A5A6",
            DiskCategoryId::Other => "#BDC3C7",
            DiskCategoryId::Cleanable => "#2ECC71",
        }
    }

    pub const fn all() -> &'static [DiskCategoryId] {
        &[
            DiskCategoryId::Applications,
            DiskCategoryId::Developer,
            DiskCategoryId::Documents,
            DiskCategoryId::Media,
            DiskCategoryId::Photos,
            DiskCategoryId::MailMessages,
            DiskCategoryId::AppData,
            DiskCategoryId::SystemData,
            DiskCategoryId::Other,
            DiskCategoryId::Cleanable,
        ]
    }
}

/// One directory entry inside a disk-map category.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DirSummary {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Aggregated usage for one display category.
#[derive(Debug, Serialize, Clone)]
pub struct DiskCategory {
    pub id: DiskCategoryId,
    pub name: &'static str,
    pub color: &'static str,
    pub total_bytes: u64,
    pub count: usize,
    pub dirs: Vec<DirSummary>,
}

impl DiskCategory {
    pub fn new(id: DiskCategoryId) -> Self {
        Self {
            id,
            name: id.name(),
            color: id.color(),
            total_bytes: 0,
            count: 0,
            dirs: Vec::new(),
        }
    }
}

/// Space the OS can reclaim on demand plus whatever the mapper could not
/// attribute to a category.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HiddenSpace {
    pub purgeable_bytes: u64,
    pub snapshot_count: usize,
    pub unaccounted_bytes: u64,
}

/// Full-disk decomposition produced by the mapper (phase 3).
#[derive(Debug, Serialize, Clone)]
pub struct DiskMap {
    pub categories: Vec<DiskCategory>,
    pub hidden: HiddenSpace,
    pub disk_total: u64,
    pub disk_used: u64,
    pub disk_free: u64,
}

/// Node of the hierarchical usage tree embedded in the `complete` event.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TreeNode {
    pub name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<TreeNode>,
}

/// A cleanable artifact directory inside a stale project.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CleanableArtifact {
    pub name: String,
    pub description: String,
    pub size: u64,
}

/// A dev project untouched for at least 90 days.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StaleProject {
    pub path: PathBuf,
    pub name: String,
    pub markers: Vec<String>,
    pub last_active: String,
    pub days_stale: u64,
    pub artifacts: Vec<CleanableArtifact>,
    pub reclaimable_bytes: u64,
}

/// Ranking bucket for recommendations; lower sorts first.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Urgent,
    QuickWins,
    DevCleanup,
    Maintenance,
    MediaManagement,
}

impl RecommendationCategory {
    pub const fn priority(&self) -> u8 {
        match self {
            RecommendationCategory::Urgent => 0,
            RecommendationCategory::QuickWins => 1,
            RecommendationCategory::DevCleanup => 2,
            RecommendationCategory::Maintenance => 3,
            RecommendationCategory::MediaManagement => 4,
        }
    }
}

/// A ranked cleanup action over a concrete set of target paths.
#[derive(Debug, Serialize, Clone)]
pub struct Recommendation {
    /// Stable short hash of the target path set
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: RecommendationCategory,
    pub impact_bytes: u64,
    pub confidence: f64,
    pub risk: Risk,
    pub paths: Vec<PathBuf>,
    pub action_type: &'static str,
}

/// Signed digest over the canonicalized item set.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Attestation {
    pub algorithm: String,
    pub content_hash: String,
    pub signature: String,
    pub timestamp: String,
    pub key_id: String,
}

/// Error tallies kept by the progress tracker.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct ErrorTally {
    pub permission: u64,
    pub symlink: u64,
    pub missing: u64,
    pub other: u64,
}

impl ErrorTally {
    pub fn total(&self) -> u64 {
        self.permission + self.symlink + self.missing + self.other
    }
}

/// Summary metrics embedded in the terminal event and the store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScanMetrics {
    pub total_bytes: u64,
    pub total_formatted: String,
    pub files_scanned: u64,
    pub items_found: usize,
    pub duration_seconds: f64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub disk_free: u64,
    pub errors: ErrorTally,
}

/// Linear growth projection fitted over scan history.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GrowthPrediction {
    pub bytes_per_day: f64,
    pub days_until_full: f64,
}

/// Per-category roll-up for the `complete` event.
#[derive(Debug, Serialize, Clone)]
pub struct CategorySummary {
    pub id: &'static str,
    pub name: &'static str,
    pub count: usize,
    pub total_bytes: u64,
    pub total_formatted: String,
}

/// Build sorted per-category summaries from an item list.
pub fn summarize_categories(items: &[Item]) -> Vec<CategorySummary> {
    let mut summaries: Vec<CategorySummary> = Vec::new();
    for item in items {
        match summaries.iter_mut().find(|s| s.id == item.category.id()) {
            Some(s) => {
                s.count += 1;
                s.total_bytes += item.size;
            }
            None => summaries.push(CategorySummary {
                id: item.category.id(),
                name: item.category.name(),
                count: 1,
                total_bytes: item.size,
                total_formatted: String::new(),
            }),
        }
    }
    for s in &mut summaries {
        s.total_formatted = format_size(s.total_bytes);
    }
    summaries.sort_by(|a, b| b.total_bytes.cmp(&a.total_bytes));
    summaries
}

/// Recognized project marker files/directories.
pub const PROJECT_MARKERS: &[&str] = &[
    ".git",
    "package.json",
    "Cargo.toml",
    "go.mod",
    "setup.py",
    "pyproject.toml",
    "Gemfile",
    "Makefile",
    "CMakeLists.txt",
    "pom.xml",
    "build.gradle",
    ".xcodeproj",
];

/// Markers present as direct children of `dir`; `.xcodeproj` matches as a
/// name suffix.
pub fn project_markers_in(dir: &Path) -> Vec<String> {
    let mut found = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return found,
    };
    let names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    for marker in PROJECT_MARKERS {
        let hit = if *marker == ".xcodeproj" {
            names.iter().any(|n| n.ends_with(".xcodeproj"))
        } else {
            names.iter().any(|n| n == marker)
        };
        if hit {
            found.push((*marker).to_string());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_item_derives_risk_from_path() {
        let item = Item::new(
            PathBuf::from("/Users/alice/Library/Caches/com.example"),
            4096,
            ItemCategory::GeneralCache,
            "Cache: com.example".to_string(),
            "Application cache for com.example".to_string(),
        );
        assert_eq!(item.risk, Risk::Safe);
        assert_eq!(item.size_formatted, "4.00 KB");
    }

    #[test]
    fn test_category_roundtrip_ids() {
        for cat in [
            ItemCategory::BrowserCache,
            ItemCategory::DevCache,
            ItemCategory::MailBackups,
        ] {
            let json = serde_json::to_string(&cat).unwrap();
            assert_eq!(json.trim_matches('"'), cat.id());
        }
    }

    #[test]
    fn test_project_markers() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        fs::create_dir(dir.path().join("Thing.xcodeproj")).unwrap();

        let markers = project_markers_in(dir.path());
        assert!(markers.contains(&".git".to_string()));
        assert!(markers.contains(&"Cargo.toml".to_string()));
        assert!(markers.contains(&".xcodeproj".to_string()));
        assert!(project_markers_in(&dir.path().join(".git")).is_empty());
    }

    #[test]
    fn test_summarize_categories_sorted_by_size() {
        let a = Item::new(
            PathBuf::from("/tmp/x/Caches/a"),
            10_000,
            ItemCategory::AppCache,
            "a".into(),
            String::new(),
        );
        let b = Item::new(
            PathBuf::from("/tmp/x/Caches/b"),
            50_000,
            ItemCategory::DevCache,
            "b".into(),
            String::new(),
        );
        let summaries = summarize_categories(&[a, b]);
        assert_eq!(summaries[0].id, "dev_cache");
        assert_eq!(summaries[0].total_bytes, 50_000);
        assert_eq!(summaries[1].count, 1);
    }
}
