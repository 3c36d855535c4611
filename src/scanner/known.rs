//! Phase 1: known macOS cache/log/backup locations.
//!
//! A static sweep of the places that reliably hold reclaimable space:
//! browser caches (with per-profile enumeration), well-known application
//! caches, log directories, and the mail/backup/trash corner. Each sized
//! path streams out as an `item` event and every category block closes with
//! a `found` summary.

use crate::config::{Config, MIN_ITEM_SIZE};
use crate::events::Emitter;
use crate::probe::dir_size_with;
use crate::progress::ProgressTracker;
use crate::store::Store;
use crate::tools::{du_bytes, ToolRunner};
use crate::types::{Item, ItemCategory};
use crate::utils::epoch_seconds;
use std::fs;
use std::path::{Path, PathBuf};

/// Shared scanning context threaded through every phase.
pub struct ScanCtx<'a> {
    pub cfg: &'a Config,
    pub emitter: &'a Emitter,
    pub store: Option<&'a Store>,
}

/// Chromium-family per-profile cache subdirectories.
const CHROMIUM_CACHE_SUBDIRS: &[&str] = &[
    "Cache",
    "Code Cache",
    "GPUCache",
    "Service Worker",
    "ShaderCache",
    "GrShaderCache",
    "ScriptCache",
];

const FIREFOX_CACHE_SUBDIRS: &[&str] = &["cache2", "startupCache", "thumbnails"];

/// `~/Library/Caches` entries already covered by the dedicated scanners.
const GENERAL_SWEEP_EXCLUDED: &[&str] = &[
    "com.spotify.client",
    "com.apple.Safari",
    "com.apple.Safari.SafeBrowsing",
    "Adobe",
    "pip",
    "Homebrew",
    "com.apple.dt.Xcode",
    "com.google.Chrome",
    "com.microsoft.Edge",
    "com.brave.Browser",
];

const GENERAL_SWEEP_MIN: u64 = 5 * 1024 * 1024;

/// Size a path, preferring the stored checkpoint when its mtime is
/// unchanged, and emit it as an item if it clears the reporting floor.
pub fn emit_sized_item(
    ctx: &ScanCtx<'_>,
    tracker: &mut ProgressTracker,
    path: PathBuf,
    category: ItemCategory,
    name: String,
    description: String,
) -> Option<Item> {
    tracker.update(ctx.emitter, &path, 0, 0);
    let size = checkpointed_size(ctx, tracker, &path)?;
    if size <= MIN_ITEM_SIZE {
        return None;
    }
    let item = Item::new(path, size, category, name, description);
    ctx.emitter.item(&item);
    tracker.update(ctx.emitter, &item.path, 1, size);
    Some(item)
}

fn checkpointed_size(ctx: &ScanCtx<'_>, tracker: &mut ProgressTracker, path: &Path) -> Option<u64> {
    let meta = fs::symlink_metadata(path).ok()?;
    let mtime = meta.modified().ok().map(epoch_seconds);

    if let (Some(store), Some(mtime)) = (ctx.store, mtime) {
        if let Ok(Some(size)) = store.unchanged_size(path, mtime) {
            return Some(size);
        }
    }

    let mut recovered = Vec::new();
    let size = dir_size_with(path, &mut |kind| recovered.push(kind));
    for kind in recovered {
        tracker.record_error(kind, format!("skipped entries under {}", path.display()));
    }

    if let (Some(store), Some(mtime)) = (ctx.store, mtime) {
        if let Err(e) = store.checkpoint(path, mtime, size) {
            tracing::debug!("checkpoint failed for {}: {e}", path.display());
        }
    }
    Some(size)
}

fn emit_found(ctx: &ScanCtx<'_>, category: ItemCategory, name: &'static str, items: &[Item]) {
    if items.is_empty() {
        return;
    }
    let total: u64 = items.iter().map(|i| i.size).sum();
    ctx.emitter.found(category.id(), name, items.len(), total);
}

fn subdirs(path: &Path) -> Vec<String> {
    match fs::read_dir(path) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Browser caches with profile detection (Chromium family, Firefox, Safari).
pub fn scan_browser_caches(ctx: &ScanCtx<'_>, tracker: &mut ProgressTracker) -> Vec<Item> {
    let library = &ctx.cfg.library;
    let app_support = ctx.cfg.app_support();
    let mut items = Vec::new();

    let chromium_browsers: [(&str, PathBuf); 4] = [
        ("Chrome", app_support.join("Google").join("Chrome")),
        ("Chrome Canary", app_support.join("Google").join("Chrome Canary")),
        ("Edge", app_support.join("Microsoft Edge")),
        (
            "Brave",
            app_support.join("BraveSoftware").join("Brave-Browser"),
        ),
    ];

    for (browser, base) in &chromium_browsers {
        if !base.is_dir() {
            continue;
        }
        tracker.update(ctx.emitter, base, 0, 0);
        let mut profiles = vec!["Default".to_string()];
        profiles.extend(
            subdirs(base)
                .into_iter()
                .filter(|d| d.starts_with("Profile ")),
        );
        for profile in &profiles {
            for sub in CHROMIUM_CACHE_SUBDIRS {
                let cache_path = base.join(profile).join(sub);
                if !cache_path.is_dir() {
                    continue;
                }
                items.extend(emit_sized_item(
                    ctx,
                    tracker,
                    cache_path,
                    ItemCategory::BrowserCache,
                    format!("{browser} {sub} ({profile})"),
                    format!("{browser} {sub} for {profile}"),
                ));
            }
        }
    }

    // Firefox keeps its caches inside per-profile directories.
    let firefox_profiles = app_support.join("Firefox").join("Profiles");
    if firefox_profiles.is_dir() {
        tracker.update(ctx.emitter, &firefox_profiles, 0, 0);
        for profile in subdirs(&firefox_profiles) {
            for sub in FIREFOX_CACHE_SUBDIRS {
                let cache_path = firefox_profiles.join(&profile).join(sub);
                if !cache_path.is_dir() {
                    continue;
                }
                items.extend(emit_sized_item(
                    ctx,
                    tracker,
                    cache_path,
                    ItemCategory::BrowserCache,
                    format!("Firefox Cache ({profile})"),
                    format!("Firefox browser cache for profile {profile}"),
                ));
            }
        }
    }

    // Safari: single cache directory plus the safe-browsing blob.
    let safari_cache = library.join("Caches").join("com.apple.Safari");
    if safari_cache.is_dir() {
        items.extend(emit_sized_item(
            ctx,
            tracker,
            safari_cache,
            ItemCategory::BrowserCache,
            "Safari Cache".to_string(),
            "Safari browser cache and website data".to_string(),
        ));
    }
    let safe_browsing = library.join("Caches").join("com.apple.Safari.SafeBrowsing");
    if safe_browsing.is_dir() {
        items.extend(emit_sized_item(
            ctx,
            tracker,
            safe_browsing,
            ItemCategory::BrowserCache,
            "Safari Safe Browsing Data".to_string(),
            "Safari safe browsing database cache".to_string(),
        ));
    }

    emit_found(ctx, ItemCategory::BrowserCache, "Browser Caches", &items);
    items
}

/// Well-known application caches: media apps, chat apps, Adobe, the Xcode
/// suite, editors, and conferencing tools.
pub fn scan_app_caches(ctx: &ScanCtx<'_>, tracker: &mut ProgressTracker) -> Vec<Item> {
    let library = &ctx.cfg.library;
    let app_support = ctx.cfg.app_support();

    let targets: Vec<(&str, PathBuf, &str)> = vec![
        (
            "Spotify Cache",
            library.join("Caches/com.spotify.client"),
            "Spotify streaming cache and offline data",
        ),
        (
            "Spotify App Support",
            app_support.join("Spotify/PersistentCache"),
            "Spotify persistent cache data",
        ),
        (
            "Slack Cache",
            app_support.join("Slack/Cache"),
            "Slack cached conversations and media",
        ),
        (
            "Slack Service Worker",
            app_support.join("Slack/Service Worker"),
            "Slack service worker cache",
        ),
        (
            "Discord Cache",
            app_support.join("discord/Cache"),
            "Discord cached messages and media",
        ),
        (
            "Discord Code Cache",
            app_support.join("discord/Code Cache"),
            "Discord compiled code cache",
        ),
        (
            "Adobe Creative Cloud Cache",
            library.join("Caches/Adobe"),
            "Adobe application caches",
        ),
        (
            "Adobe CC App Data",
            app_support.join("Adobe/Common/Media Cache Files"),
            "Adobe media cache files",
        ),
        (
            "Xcode DerivedData",
            library.join("Developer/Xcode/DerivedData"),
            "Compiled Xcode project build artifacts",
        ),
        (
            "Xcode Archives",
            library.join("Developer/Xcode/Archives"),
            "Xcode archived app builds",
        ),
        (
            "Xcode Device Logs",
            library.join("Developer/Xcode/iOS DeviceSupport"),
            "iOS device support files and symbols",
        ),
        (
            "Xcode Simulators",
            library.join("Developer/CoreSimulator/Devices"),
            "iOS Simulator installations and data",
        ),
        (
            "Xcode Caches",
            library.join("Caches/com.apple.dt.Xcode"),
            "Xcode internal caches",
        ),
        (
            "VS Code Cache",
            app_support.join("Code/Cache"),
            "VS Code editor cache",
        ),
        (
            "VS Code Cached Extensions",
            app_support.join("Code/CachedExtensionVSIXs"),
            "VS Code extension installation cache",
        ),
        (
            "Teams Cache",
            app_support.join("Microsoft Teams/Cache"),
            "Microsoft Teams cache data",
        ),
        (
            "Zoom Cache",
            app_support.join("zoom.us/data"),
            "Zoom cached data",
        ),
    ];

    let mut items = Vec::new();
    for (name, path, description) in targets {
        if !path.is_dir() {
            continue;
        }
        items.extend(emit_sized_item(
            ctx,
            tracker,
            path,
            ItemCategory::AppCache,
            name.to_string(),
            description.to_string(),
        ));
    }

    emit_found(ctx, ItemCategory::AppCache, "Application Caches", &items);
    items
}

/// System and user log locations.
pub fn scan_system_logs(ctx: &ScanCtx<'_>, tracker: &mut ProgressTracker) -> Vec<Item> {
    let library = &ctx.cfg.library;
    let targets: Vec<(&str, PathBuf, &str)> = vec![
        (
            "User Logs",
            library.join("Logs"),
            "Application and system log files in ~/Library/Logs",
        ),
        (
            "System Logs",
            PathBuf::from("/var/log"),
            "macOS system log files",
        ),
        (
            "ASL Logs",
            PathBuf::from("/private/var/log/asl"),
            "Apple System Log files",
        ),
        (
            "Diagnostic Reports",
            library.join("Logs/DiagnosticReports"),
            "Crash reports and diagnostic data",
        ),
        (
            "CoreSimulator Logs",
            library.join("Logs/CoreSimulator"),
            "iOS Simulator log files",
        ),
    ];

    let mut items = Vec::new();
    for (name, path, description) in targets {
        if !path.is_dir() && !path.is_file() {
            continue;
        }
        items.extend(emit_sized_item(
            ctx,
            tracker,
            path,
            ItemCategory::SystemLogs,
            name.to_string(),
            description.to_string(),
        ));
    }

    emit_found(ctx, ItemCategory::SystemLogs, "System Logs", &items);
    items
}

/// Mail downloads, iOS device backups, and the Trash.
pub fn scan_mail_and_backups(
    ctx: &ScanCtx<'_>,
    tracker: &mut ProgressTracker,
    tools: &dyn ToolRunner,
) -> Vec<Item> {
    let library = &ctx.cfg.library;
    let mut items = Vec::new();

    // Sandboxed Mail keeps downloads in its container; fall back to the
    // legacy location.
    let mut mail_downloads =
        library.join("Containers/com.apple.mail/Data/Library/Mail Downloads");
    if !mail_downloads.is_dir() {
        mail_downloads = library.join("Mail Downloads");
    }
    if mail_downloads.is_dir() {
        items.extend(emit_sized_item(
            ctx,
            tracker,
            mail_downloads,
            ItemCategory::MailBackups,
            "Mail Downloads".to_string(),
            "Email attachment downloads cached by Apple Mail".to_string(),
        ));
    }

    let ios_backups = ctx.cfg.app_support().join("MobileSync/Backup");
    if ios_backups.is_dir() {
        let backup_count = subdirs(&ios_backups).len();
        let plural = if backup_count == 1 { "" } else { "s" };
        tracker.update(ctx.emitter, &ios_backups, 0, 0);
        let mut size = checkpointed_size(ctx, tracker, &ios_backups).unwrap_or(0);
        if size == 0 {
            // Backup trees are often unreadable to a plain walk; du may
            // still see them.
            size = du_bytes(tools, &ios_backups);
        }
        if size > MIN_ITEM_SIZE {
            let item = Item::new(
                ios_backups,
                size,
                ItemCategory::MailBackups,
                format!("iOS Device Backups ({backup_count} backup{plural})"),
                "Local backups of iPhones and iPads via Finder/iTunes".to_string(),
            );
            ctx.emitter.item(&item);
            tracker.update(ctx.emitter, &item.path, 1, size);
            items.push(item);
        }
    }

    let trash = ctx.cfg.trash_dir();
    if trash.is_dir() {
        let trash_count = fs::read_dir(&trash).map(|e| e.count()).unwrap_or(0);
        items.extend(emit_sized_item(
            ctx,
            tracker,
            trash,
            ItemCategory::MailBackups,
            format!("Trash ({trash_count} items)"),
            "Items in the macOS Trash that haven't been permanently deleted".to_string(),
        ));
    }

    emit_found(ctx, ItemCategory::MailBackups, "Mail, Backups & Trash", &items);
    items
}

/// Leftover sweep of `~/Library/Caches`, skipping prefixes the dedicated
/// scanners already visited. Only caches above 5 MiB are worth reporting
/// here.
pub fn scan_general_caches(ctx: &ScanCtx<'_>, tracker: &mut ProgressTracker) -> Vec<Item> {
    let caches_root = ctx.cfg.caches_dir();
    let mut items = Vec::new();
    let entries = match fs::read_dir(&caches_root) {
        Ok(e) => e,
        Err(_) => return items,
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if GENERAL_SWEEP_EXCLUDED
            .iter()
            .any(|prefix| name == *prefix || name.starts_with(prefix))
        {
            continue;
        }
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        tracker.update(ctx.emitter, &path, 0, 0);
        let Some(size) = checkpointed_size(ctx, tracker, &path) else {
            continue;
        };
        if size <= GENERAL_SWEEP_MIN {
            continue;
        }
        let item = Item::new(
            path,
            size,
            ItemCategory::GeneralCache,
            format!("Cache: {name}"),
            format!("Application cache for {name}"),
        );
        ctx.emitter.item(&item);
        tracker.update(ctx.emitter, &item.path, 1, size);
        items.push(item);
    }

    emit_found(
        ctx,
        ItemCategory::GeneralCache,
        "Other Application Caches",
        &items,
    );
    items
}
