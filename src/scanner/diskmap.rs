//! Phase 3: full-disk usage decomposition.
//!
//! Categorizes the home volume into ten display buckets: top-level home
//! entries by a name table (with a project-marker fallback), `~/Library`
//! children by a second table, and `/Applications` bundles. Also detects
//! hidden space: purgeable bytes, local snapshots, and whatever the mapper
//! could not attribute.

use crate::probe::dir_size_with;
use crate::progress::{disk_space, ProgressTracker};
use crate::scanner::known::ScanCtx;
use crate::tools::{purgeable_bytes, snapshot_count, ToolRunner};
use crate::types::{DirSummary, DiskCategory, DiskCategoryId, DiskMap, HiddenSpace, TreeNode};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Entries per category shown in full; the rest collapse into one tail row.
const MAX_DIRS_PER_CATEGORY: usize = 50;

const APPLICATIONS_MIN: u64 = 1024 * 1024;

/// Markers that promote an unrecognized top-level home directory to the
/// `developer` bucket. Narrower than the stale-project marker set on
/// purpose.
const HOME_FALLBACK_MARKERS: &[&str] = &[
    ".git",
    "package.json",
    "Cargo.toml",
    "go.mod",
    "setup.py",
    "Makefile",
    "CMakeLists.txt",
];

fn looks_like_project(dir: &Path) -> bool {
    HOME_FALLBACK_MARKERS
        .iter()
        .any(|marker| dir.join(marker).exists())
}

fn categorize_home_entry(name: &str, path: &Path) -> DiskCategoryId {
    match name {
        "Desktop" | "Documents" | "Downloads" => DiskCategoryId::Documents,
        "Movies" | "Music" => DiskCategoryId::Media,
        "Pictures" | "Photos" => DiskCategoryId::Photos,
        "Applications" => DiskCategoryId::Applications,
        "Public" | "Sites" => DiskCategoryId::Other,
        "Developer" | "Projects" | "dev" | "code" | "repos" | "workspace" | "src" => {
            DiskCategoryId::Developer
        }
        _ => {
            if path.is_dir() && looks_like_project(path) {
                DiskCategoryId::Developer
            } else {
                DiskCategoryId::Other
            }
        }
    }
}

fn categorize_library_entry(name: &str) -> DiskCategoryId {
    match name {
        "Caches" | "Logs" | "Saved Application State" => DiskCategoryId::Cleanable,
        "Mail" | "Messages" => DiskCategoryId::MailMessages,
        "Application Support" | "Containers" | "Group Containers" | "Preferences" => {
            DiskCategoryId::AppData
        }
        "Developer" => DiskCategoryId::Developer,
        _ => DiskCategoryId::SystemData,
    }
}

struct CategoryAccumulator {
    buckets: HashMap<DiskCategoryId, DiskCategory>,
}

impl CategoryAccumulator {
    fn new() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    fn add(&mut self, id: DiskCategoryId, name: String, path: PathBuf, size: u64) {
        let bucket = self
            .buckets
            .entry(id)
            .or_insert_with(|| DiskCategory::new(id));
        bucket.total_bytes += size;
        bucket.count += 1;
        bucket.dirs.push(DirSummary { name, path, size });
    }

    fn finish(mut self) -> Vec<DiskCategory> {
        let mut categories: Vec<DiskCategory> = DiskCategoryId::all()
            .iter()
            .filter_map(|id| self.buckets.remove(id))
            .collect();
        for cat in &mut categories {
            cat.dirs.sort_by(|a, b| b.size.cmp(&a.size));
            if cat.dirs.len() > MAX_DIRS_PER_CATEGORY {
                let tail: Vec<DirSummary> = cat.dirs.split_off(MAX_DIRS_PER_CATEGORY);
                let rest: u64 = tail.iter().map(|d| d.size).sum();
                cat.dirs.push(DirSummary {
                    name: format!("More items ({})", tail.len()),
                    path: PathBuf::new(),
                    size: rest,
                });
            }
        }
        categories.sort_by(|a, b| b.total_bytes.cmp(&a.total_bytes));
        categories
    }
}

fn sized(ctx: &ScanCtx<'_>, tracker: &mut ProgressTracker, path: &Path) -> u64 {
    tracker.update(ctx.emitter, path, 0, 0);
    let mut recovered = Vec::new();
    let size = dir_size_with(path, &mut |kind| recovered.push(kind));
    for kind in recovered {
        tracker.record_error(kind, format!("skipped entries under {}", path.display()));
    }
    tracker.update(ctx.emitter, path, 1, size);
    size
}

fn entries(path: &Path) -> Vec<(String, PathBuf)> {
    match fs::read_dir(path) {
        Ok(read) => read
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                Some((name, e.path()))
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Build the home-volume usage map.
pub fn build_disk_map(
    ctx: &ScanCtx<'_>,
    tracker: &mut ProgressTracker,
    tools: &dyn ToolRunner,
) -> DiskMap {
    let mut acc = CategoryAccumulator::new();

    // Top-level home entries; Library is handled by its own table below.
    for (name, path) in entries(&ctx.cfg.home) {
        if name == "Library" {
            continue;
        }
        let id = categorize_home_entry(&name, &path);
        let size = sized(ctx, tracker, &path);
        acc.add(id, name, path, size);
    }

    for (name, path) in entries(&ctx.cfg.library) {
        let id = categorize_library_entry(&name);
        let size = sized(ctx, tracker, &path);
        acc.add(id, format!("Library/{name}"), path, size);
    }

    for (name, path) in entries(Path::new("/Applications")) {
        let size = sized(ctx, tracker, &path);
        if size >= APPLICATIONS_MIN {
            acc.add(DiskCategoryId::Applications, name, path, size);
        }
    }

    let categories = acc.finish();
    let total_mapped: u64 = categories.iter().map(|c| c.total_bytes).sum();
    let space = disk_space();

    DiskMap {
        hidden: HiddenSpace {
            purgeable_bytes: purgeable_bytes(tools),
            snapshot_count: snapshot_count(tools),
            unaccounted_bytes: space.used.saturating_sub(total_mapped),
        },
        categories,
        disk_total: space.total,
        disk_used: space.used,
        disk_free: space.free,
    }
}

/// Render the map as the hierarchical tree the UI draws.
pub fn disk_map_tree(map: &DiskMap) -> TreeNode {
    let children: Vec<TreeNode> = map
        .categories
        .iter()
        .map(|cat| TreeNode {
            name: cat.name.to_string(),
            size: cat.total_bytes,
            path: None,
            children: cat
                .dirs
                .iter()
                .map(|d| TreeNode {
                    name: d.name.clone(),
                    size: d.size,
                    path: if d.path.as_os_str().is_empty() {
                        None
                    } else {
                        Some(d.path.clone())
                    },
                    children: Vec::new(),
                })
                .collect(),
        })
        .collect();

    TreeNode {
        name: "Storage".to_string(),
        size: children.iter().map(|c| c.size).sum(),
        path: None,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::Emitter;
    use crate::tools::fake::FakeRunner;
    use crate::tools::ToolOutput;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

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

    fn write_file(path: &Path, n: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; n]).unwrap();
    }

    #[test]
    fn test_home_name_table() {
        let dir = tempdir().unwrap();
        assert_eq!(
            categorize_home_entry("Downloads", dir.path()),
            DiskCategoryId::Documents
        );
        assert_eq!(
            categorize_home_entry("Movies", dir.path()),
            DiskCategoryId::Media
        );
        assert_eq!(
            categorize_home_entry("Projects", dir.path()),
            DiskCategoryId::Developer
        );
    }

    #[test]
    fn test_marker_fallback_promotes_to_developer() {
        let dir = tempdir().unwrap();
        assert_eq!(
            categorize_home_entry("my-stuff", dir.path()),
            DiskCategoryId::Other
        );
        write_file(&dir.path().join("Cargo.toml"), 10);
        assert_eq!(
            categorize_home_entry("my-stuff", dir.path()),
            DiskCategoryId::Developer
        );
    }

    #[test]
    fn test_fallback_marker_set_is_narrower_than_stale_detection() {
        // Stale-project markers that are NOT in the mapper's fallback table
        // leave the directory in `other`.
        for marker in ["Gemfile", "pyproject.toml", "pom.xml", "build.gradle"] {
            let dir = tempdir().unwrap();
            write_file(&dir.path().join(marker), 10);
            assert_eq!(
                categorize_home_entry("my-stuff", dir.path()),
                DiskCategoryId::Other,
                "{marker} should not promote to developer"
            );
        }
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("Thing.xcodeproj")).unwrap();
        assert_eq!(
            categorize_home_entry("my-stuff", dir.path()),
            DiskCategoryId::Other
        );
    }

    #[test]
    fn test_library_table() {
        assert_eq!(categorize_library_entry("Caches"), DiskCategoryId::Cleanable);
        assert_eq!(categorize_library_entry("Mail"), DiskCategoryId::MailMessages);
        assert_eq!(
            categorize_library_entry("Application Support"),
            DiskCategoryId::AppData
        );
        assert_eq!(
            categorize_library_entry("WebKit"),
            DiskCategoryId::SystemData
        );
    }

    #[test]
    fn test_no_entry_lands_in_two_categories() {
        let home = tempdir().unwrap();
        let cfg = Config::with_home(home.path());
        write_file(&cfg.home.join("Documents/a.txt"), 2000);
        write_file(&cfg.home.join("Movies/b.mov"), 3000);
        write_file(&cfg.library.join("Caches/app/blob"), 4000);

        let buf = SharedBuf::default();
        let emitter = Emitter::new(Box::new(buf));
        let ctx = ScanCtx {
            cfg: &cfg,
            emitter: &emitter,
            store: None,
        };
        let mut tracker = ProgressTracker::new();
        let map = build_disk_map(&ctx, &mut tracker, &FakeRunner::default());

        let mut seen = std::collections::HashSet::new();
        for cat in &map.categories {
            for d in &cat.dirs {
                if !d.path.as_os_str().is_empty() {
                    assert!(seen.insert(d.path.clone()), "{:?} mapped twice", d.path);
                }
            }
        }

        let docs = map
            .categories
            .iter()
            .find(|c| c.id == DiskCategoryId::Documents)
            .unwrap();
        assert_eq!(docs.total_bytes, 2000);
        let cleanable = map
            .categories
            .iter()
            .find(|c| c.id == DiskCategoryId::Cleanable)
            .unwrap();
        assert_eq!(cleanable.total_bytes, 4000);
    }

    #[test]
    fn test_truncation_with_aggregate_tail() {
        let mut acc = CategoryAccumulator::new();
        for i in 0..60 {
            acc.add(
                DiskCategoryId::Documents,
                format!("d{i}"),
                PathBuf::from(format!("/h/d{i}")),
                1000 + i,
            );
        }
        let cats = acc.finish();
        let docs = &cats[0];
        assert_eq!(docs.count, 60);
        assert_eq!(docs.dirs.len(), MAX_DIRS_PER_CATEGORY + 1);
        let tail = docs.dirs.last().unwrap();
        assert_eq!(tail.name, "More items (10)");
        // Tail sums exactly the 10 smallest entries.
        let expected: u64 = (0..10).map(|i| 1000 + i).sum();
        assert_eq!(tail.size, expected);
    }

    #[test]
    fn test_hidden_space_from_tools() {
        let home = tempdir().unwrap();
        let cfg = Config::with_home(home.path());
        let buf = SharedBuf::default();
        let emitter = Emitter::new(Box::new(buf));
        let ctx = ScanCtx {
            cfg: &cfg,
            emitter: &emitter,
            store: None,
        };
        let mut tracker = ProgressTracker::new();
        let tools = FakeRunner::default()
            .with(
                "diskutil info /",
                ToolOutput::Ok("   Purgeable Space: 1.0 GB (1073741824 Bytes)\n".into()),
            )
            .with(
                "tmutil listlocalsnapshots /",
                ToolOutput::Ok("com.apple.TimeMachine.1\ncom.apple.TimeMachine.2\n".into()),
            );
        let map = build_disk_map(&ctx, &mut tracker, &tools);
        assert_eq!(map.hidden.purgeable_bytes, 1073741824);
        assert_eq!(map.hidden.snapshot_count, 2);
    }

    #[test]
    fn test_tree_shape() {
        let map = DiskMap {
            categories: vec![DiskCategory {
                id: DiskCategoryId::Documents,
                name: DiskCategoryId::Documents.name(),
                color: DiskCategoryId::Documents.color(),
                total_bytes: 100,
                count: 1,
                dirs: vec![DirSummary {
                    name: "Documents".into(),
                    path: PathBuf::from("/h/Documents"),
                    size: 100,
                }],
            }],
            hidden: HiddenSpace::default(),
            disk_total: 0,
            disk_used: 0,
            disk_free: 0,
        };
        let tree = disk_map_tree(&map);
        assert_eq!(tree.name, "Storage");
        assert_eq!(tree.size, 100);
        assert_eq!(tree.children[0].children[0].path.as_deref(), Some(Path::new("/h/Documents")));
    }
}
