//! Phase 2: deep walk of likely project directories plus global dev caches.
//!
//! The walk is bounded to five levels below each root and never enters
//! hidden or known-noise directories. A `node_modules` child prunes its
//! branch: it gets sized and reported under its parent project's name, and
//! the walk moves on.

use crate::config::MIN_ITEM_SIZE;
use crate::probe::dir_size_with;
use crate::progress::ProgressTracker;
use crate::scanner::known::{emit_sized_item, ScanCtx};
use crate::tools::{docker_reclaimable, ToolRunner};
use crate::types::{Item, ItemCategory};
use crate::utils::{format_size, parent_name};
use std::path::Path;
use walkdir::WalkDir;

const MAX_WALK_DEPTH: usize = 5;

/// Directory names never worth descending into.
const NOISE_DIRS: &[&str] = &["node_modules", "__pycache__", ".git", "venv", ".venv"];

fn keep_entry(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !(name.starts_with('.') || NOISE_DIRS.contains(&name.as_ref()))
}

fn harvest_node_modules(
    ctx: &ScanCtx<'_>,
    tracker: &mut ProgressTracker,
    project_dir: &Path,
    items: &mut Vec<Item>,
) {
    let nm_path = project_dir.join("node_modules");
    if !nm_path.is_dir() {
        return;
    }
    let mut recovered = Vec::new();
    let size = dir_size_with(&nm_path, &mut |kind| recovered.push(kind));
    for kind in recovered {
        tracker.record_error(kind, format!("skipped entries under {}", nm_path.display()));
    }
    if size <= MIN_ITEM_SIZE {
        return;
    }
    let project = parent_name(&nm_path);
    let item = Item::new(
        nm_path,
        size,
        ItemCategory::DevCache,
        format!("node_modules ({project})"),
        format!("Node.js dependencies for {project}"),
    );
    ctx.emitter.item(&item);
    tracker.update(ctx.emitter, &item.path, 1, size);
    items.push(item);
}

/// Developer caches: Docker Desktop, the project-directory `node_modules`
/// walk, and the global package-manager caches.
pub fn scan_dev_caches(
    ctx: &ScanCtx<'_>,
    tracker: &mut ProgressTracker,
    tools: &dyn ToolRunner,
) -> Vec<Item> {
    let mut items = Vec::new();

    // Docker Desktop keeps everything inside one VM disk image. Only worth
    // reporting when docker itself is installed.
    if let Some(reclaimable) = docker_reclaimable(tools) {
        let docker_vm = ctx.cfg.library.join("Containers/com.docker.docker/Data");
        if docker_vm.is_dir() {
            let description = if reclaimable > 0 {
                format!(
                    "Docker Desktop VM disk image, containers, volumes, and build cache ({} reclaimable via docker system prune)",
                    format_size(reclaimable)
                )
            } else {
                "Docker Desktop VM disk image, containers, volumes, and build cache".to_string()
            };
            items.extend(emit_sized_item(
                ctx,
                tracker,
                docker_vm,
                ItemCategory::DevCache,
                "Docker Desktop Data".to_string(),
                description,
            ));
        }
    }

    let npm_cache = ctx.cfg.home.join(".npm");
    if npm_cache.is_dir() {
        items.extend(emit_sized_item(
            ctx,
            tracker,
            npm_cache,
            ItemCategory::DevCache,
            "NPM Cache (~/.npm)".to_string(),
            "Global NPM package cache".to_string(),
        ));
    }

    // Nested node_modules across the likely project roots.
    for root in ctx.cfg.walker_roots() {
        if !root.is_dir() {
            continue;
        }
        tracker.update(ctx.emitter, &root, 0, 0);
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .max_depth(MAX_WALK_DEPTH)
            .into_iter()
            .filter_entry(keep_entry);
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let kind = e
                        .io_error()
                        .map(crate::probe::classify_io_error)
                        .unwrap_or(crate::probe::FsErrorKind::Other);
                    tracker.record_error(kind, e.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            tracker.update(ctx.emitter, entry.path(), 0, 0);
            harvest_node_modules(ctx, tracker, entry.path(), &mut items);
        }
    }

    let global_caches: Vec<(&str, std::path::PathBuf, &str)> = vec![
        (
            "Python pip Cache",
            ctx.cfg.caches_dir().join("pip"),
            "Cached pip package downloads",
        ),
        (
            "Homebrew Cache",
            ctx.cfg.caches_dir().join("Homebrew"),
            "Homebrew downloaded packages and build artifacts",
        ),
        (
            "Cargo Registry Cache",
            ctx.cfg.home.join(".cargo/registry"),
            "Rust crate registry cache and source downloads",
        ),
        (
            "Go Module Cache",
            ctx.cfg.go_mod_cache(),
            "Go module download cache",
        ),
    ];
    for (name, path, description) in global_caches {
        if !path.is_dir() {
            continue;
        }
        items.extend(emit_sized_item(
            ctx,
            tracker,
            path,
            ItemCategory::DevCache,
            name.to_string(),
            description.to_string(),
        ));
    }

    if !items.is_empty() {
        let total: u64 = items.iter().map(|i| i.size).sum();
        ctx.emitter
            .found(ItemCategory::DevCache.id(), "Developer Caches", items.len(), total);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::Emitter;
    use crate::tools::fake::FakeRunner;
    use crate::types::Risk;
    use std::fs;
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

    fn scan(cfg: &Config) -> Vec<Item> {
        let buf = SharedBuf::default();
        let emitter = Emitter::new(Box::new(buf));
        let ctx = ScanCtx {
            cfg,
            emitter: &emitter,
            store: None,
        };
        let mut tracker = ProgressTracker::new();
        scan_dev_caches(&ctx, &mut tracker, &FakeRunner::default())
    }

    #[test]
    fn test_npm_cache_item_shape() {
        let home = tempdir().unwrap();
        let cfg = Config::with_home(home.path());
        write_file(&cfg.home.join(".npm/_cacache/blob"), 3_000_000);

        let items = scan(&cfg);
        assert_eq!(items.len(), 1);
        let npm = &items[0];
        assert_eq!(npm.name, "NPM Cache (~/.npm)");
        assert_eq!(npm.category, ItemCategory::DevCache);
        assert_eq!(npm.risk, Risk::Safe);
        assert_eq!(npm.size, 3_000_000);
    }

    #[test]
    fn test_node_modules_named_after_project_and_pruned() {
        let home = tempdir().unwrap();
        let cfg = Config::with_home(home.path());
        let project = cfg.home.join("Projects/webapp");
        write_file(&project.join("node_modules/react/index.js"), 400_000);
        // Nested project inside node_modules must not be double-reported.
        write_file(
            &project.join("node_modules/dep/node_modules/x/i.js"),
            50_000,
        );

        let items = scan(&cfg);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "node_modules (webapp)");
        assert_eq!(items[0].size, 450_000);
    }

    #[test]
    fn test_hidden_and_noise_dirs_not_walked() {
        let home = tempdir().unwrap();
        let cfg = Config::with_home(home.path());
        write_file(
            &cfg.home.join("Projects/.hidden/app/node_modules/x.js"),
            500_000,
        );
        write_file(
            &cfg.home.join("Projects/app/venv/other/node_modules/x.js"),
            500_000,
        );
        assert!(scan(&cfg).is_empty());
    }

    #[test]
    fn test_depth_bound() {
        let home = tempdir().unwrap();
        let cfg = Config::with_home(home.path());
        // Project dir at depth 6 below the root is beyond the walk.
        write_file(
            &cfg.home
                .join("Projects/a/b/c/d/e/f/node_modules/x.js"),
            500_000,
        );
        // At depth 5 the project dir is still visited.
        write_file(
            &cfg.home.join("Projects/a/b/c/d/e/node_modules/x.js"),
            500_000,
        );

        let items = scan(&cfg);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "node_modules (e)");
    }
}
