//! Safe purge executor.
//!
//! Reads `{"target_paths": [...]}` from stdin, validates every candidate
//! against real paths only, deletes the survivors, and writes one JSON
//! report to stdout. The correctness bound: nothing outside an explicitly
//! whitelisted zone is ever opened for deletion. Symlink escapes are dead on
//! arrival because validation happens after full path resolution.

use crate::config::Config;
use crate::probe::dir_size;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Directory basenames deletable anywhere under the user's home.
const ALWAYS_SAFE_BASENAMES: &[&str] = &[
    "node_modules",
    ".venv",
    "venv",
    "__pycache__",
    ".next",
    ".nuxt",
    ".cache",
    ".tox",
    ".gradle",
    "Pods",
    "DerivedData",
    ".dart_tool",
    "coverage",
    ".parcel-cache",
    ".turbo",
];

const REFUSAL_MESSAGE: &str = "No valid or safe paths provided for deletion.";

#[derive(Debug, Deserialize)]
pub struct PurgeRequest {
    #[serde(default)]
    pub target_paths: Vec<String>,
}

/// Result document. Error reports carry only `status` and `message`; success
/// reports carry the deletion tally instead.
#[derive(Debug, Serialize)]
pub struct PurgeReport {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths_to_delete: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freed_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<Vec<PathBuf>>,
}

impl PurgeReport {
    fn error(message: String) -> Self {
        Self {
            status: "error",
            message: Some(message),
            paths_to_delete: None,
            freed_bytes: None,
            deleted: None,
        }
    }

    fn refusal() -> Self {
        Self::error(REFUSAL_MESSAGE.to_string())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Rejection {
    Missing,
    Forbidden,
    OutsideSafeZones,
}

/// Real-path-resolved validation tables.
pub struct PurgePolicy {
    home: PathBuf,
    forbidden: Vec<PathBuf>,
    safe_zones: Vec<PathBuf>,
}

fn resolve(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl PurgePolicy {
    pub fn new(cfg: &Config) -> Self {
        let home = resolve(&cfg.home);

        let mut forbidden: Vec<PathBuf> = vec![
            cfg.home.clone(),
            cfg.home.join("Desktop"),
            cfg.home.join("Documents"),
            cfg.home.join("Downloads"),
            cfg.home.join("Pictures"),
            cfg.home.join("Music"),
            cfg.home.join("Movies"),
            cfg.library.clone(),
        ];
        forbidden.extend(
            [
                "/", "/System", "/Applications", "/Users", "/var", "/private", "/usr", "/bin",
                "/sbin", "/tmp",
            ]
            .iter()
            .map(PathBuf::from),
        );
        let forbidden = forbidden.iter().map(|p| resolve(p)).collect();

        let library = &cfg.library;
        let app_support = cfg.app_support();
        let zone_candidates: Vec<PathBuf> = vec![
            // ~/Library cache and junk space
            library.join("Caches"),
            library.join("Logs"),
            library.join("Saved Application State"),
            library.join("Audio/Apple Loops"),
            library.join("Mail Downloads"),
            library.join("Containers/com.apple.mail/Data/Library/Mail Downloads"),
            // Xcode state
            library.join("Developer/Xcode/DerivedData"),
            library.join("Developer/Xcode/Archives"),
            library.join("Developer/Xcode/iOS DeviceSupport"),
            library.join("Developer/CoreSimulator/Devices"),
            library.join("Developer/CoreSimulator/Caches"),
            // Backups
            app_support.join("MobileSync/Backup"),
            // Browser application-support roots
            app_support.join("Google/Chrome"),
            app_support.join("Google/Chrome Canary"),
            app_support.join("Microsoft Edge"),
            app_support.join("BraveSoftware/Brave-Browser"),
            app_support.join("Firefox/Profiles"),
            // App caches under Application Support
            app_support.join("Spotify/PersistentCache"),
            app_support.join("Slack/Cache"),
            app_support.join("Slack/Service Worker"),
            app_support.join("discord/Cache"),
            app_support.join("discord/Code Cache"),
            app_support.join("Code/Cache"),
            app_support.join("Code/CachedExtensionVSIXs"),
            app_support.join("Microsoft Teams/Cache"),
            app_support.join("zoom.us/data"),
            app_support.join("Adobe/Common/Media Cache Files"),
            // Dev-tool caches and the Trash
            cfg.trash_dir(),
            cfg.home.join(".npm"),
            cfg.home.join(".cargo/registry"),
            cfg.go_mod_cache(),
        ];
        // A zone that does not exist cannot contain a real path.
        let safe_zones = zone_candidates
            .into_iter()
            .filter(|z| z.exists())
            .map(|z| resolve(&z))
            .collect();

        Self {
            home,
            forbidden,
            safe_zones,
        }
    }

    /// Resolve and validate one candidate; `Ok` returns the real path that
    /// is safe to delete.
    fn validate(&self, candidate: &Path) -> Result<PathBuf, Rejection> {
        let real = fs::canonicalize(candidate).map_err(|_| Rejection::Missing)?;

        if self.forbidden.iter().any(|f| *f == real) {
            return Err(Rejection::Forbidden);
        }

        let basename_allowed = real
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| ALWAYS_SAFE_BASENAMES.contains(&n))
            && real.starts_with(&self.home)
            && real != self.home;

        let in_safe_zone = self.safe_zones.iter().any(|zone| real.starts_with(zone));

        if basename_allowed || in_safe_zone {
            Ok(real)
        } else {
            Err(Rejection::OutsideSafeZones)
        }
    }
}

/// Validate and delete the requested paths.
pub fn execute(policy: &PurgePolicy, request: &PurgeRequest) -> PurgeReport {
    let mut validated = Vec::new();
    for raw in &request.target_paths {
        let candidate = Path::new(raw);
        match policy.validate(candidate) {
            Ok(real) => validated.push(real),
            Err(rejection) => {
                tracing::warn!("refusing {raw}: {rejection:?}");
            }
        }
    }
    if validated.is_empty() {
        return PurgeReport::refusal();
    }

    let mut freed_bytes = 0u64;
    let mut deleted = Vec::new();
    for path in validated {
        let size = dir_size(&path);
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                freed_bytes += size;
                deleted.push(path);
            }
            Err(e) => {
                tracing::warn!("failed to delete {}: {e}", path.display());
            }
        }
    }

    PurgeReport {
        status: "success",
        message: None,
        paths_to_delete: Some(deleted.len()),
        freed_bytes: Some(freed_bytes),
        deleted: Some(deleted),
    }
}

/// Purge entrypoint: stdin request, stdout report, exit 0 either way.
pub fn run_purge(cfg: &Config) -> anyhow::Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let report = match serde_json::from_str::<PurgeRequest>(&input) {
        Ok(request) => execute(&PurgePolicy::new(cfg), &request),
        Err(e) => PurgeReport::error(e.to_string()),
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_file(path: &Path, n: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; n]).unwrap();
    }

    fn request(paths: &[&Path]) -> PurgeRequest {
        PurgeRequest {
            target_paths: paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        }
    }

    fn setup() -> (tempfile::TempDir, Config) {
        let dir = tempdir().unwrap();
        let cfg = Config::with_home(dir.path());
        (dir, cfg)
    }

    #[test]
    fn test_forbidden_roots_refused() {
        let (_dir, cfg) = setup();
        let docs = cfg.home.join("Documents");
        write_file(&docs.join("thesis.txt"), 4000);
        let policy = PurgePolicy::new(&cfg);

        for target in [Path::new("/"), &cfg.home, &docs] {
            let report = execute(&policy, &request(&[target]));
            assert_eq!(report.status, "error");
            assert_eq!(report.message.as_deref(), Some(REFUSAL_MESSAGE));
            assert!(report.paths_to_delete.is_none());
        }
        assert!(docs.join("thesis.txt").exists());
    }

    #[test]
    fn test_missing_path_refused() {
        let (_dir, cfg) = setup();
        let policy = PurgePolicy::new(&cfg);
        let report = execute(&policy, &request(&[&cfg.home.join("no-such-dir")]));
        assert_eq!(report.status, "error");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_refused() {
        let (_dir, cfg) = setup();
        let docs = cfg.home.join("Documents");
        write_file(&docs.join("thesis.txt"), 4000);

        let outside = tempdir().unwrap();
        let link = outside.path().join("innocent-cache");
        std::os::unix::fs::symlink(&docs, &link).unwrap();

        let policy = PurgePolicy::new(&cfg);
        let report = execute(&policy, &request(&[&link]));
        assert_eq!(report.status, "error");
        assert!(docs.join("thesis.txt").exists());
    }

    #[test]
    fn test_safe_zone_deletion_succeeds() {
        let (_dir, cfg) = setup();
        let target = cfg.caches_dir().join("com.example");
        write_file(&target.join("blob.bin"), 5000);

        let policy = PurgePolicy::new(&cfg);
        let report = execute(&policy, &request(&[&target]));
        assert_eq!(report.status, "success");
        assert_eq!(report.paths_to_delete, Some(1));
        assert_eq!(report.freed_bytes, Some(5000));
        assert!(!target.exists());
        // The zone root itself survives.
        assert!(cfg.caches_dir().exists());
    }

    #[test]
    fn test_always_safe_basename_under_home() {
        let (_dir, cfg) = setup();
        let nm = cfg.home.join("Projects/webapp/node_modules");
        write_file(&nm.join("react/index.js"), 3000);

        let policy = PurgePolicy::new(&cfg);
        let report = execute(&policy, &request(&[&nm]));
        assert_eq!(report.status, "success");
        assert!(!nm.exists());
        assert!(cfg.home.join("Projects/webapp").exists());
    }

    #[test]
    fn test_always_safe_basename_outside_home_refused() {
        let (_dir, cfg) = setup();
        let elsewhere = tempdir().unwrap();
        let nm = elsewhere.path().join("node_modules");
        write_file(&nm.join("react/index.js"), 3000);

        let policy = PurgePolicy::new(&cfg);
        let report = execute(&policy, &request(&[&nm]));
        assert_eq!(report.status, "error");
        assert!(nm.exists());
    }

    #[test]
    fn test_unknown_home_dir_refused() {
        let (_dir, cfg) = setup();
        let project = cfg.home.join("Projects/webapp/src");
        write_file(&project.join("main.rs"), 3000);

        let policy = PurgePolicy::new(&cfg);
        let report = execute(&policy, &request(&[&project]));
        assert_eq!(report.status, "error");
        assert!(project.exists());
    }

    #[test]
    fn test_mixed_batch_deletes_only_valid() {
        let (_dir, cfg) = setup();
        let cache = cfg.caches_dir().join("com.example");
        write_file(&cache.join("a.bin"), 2000);
        let docs = cfg.home.join("Documents");
        write_file(&docs.join("keep.txt"), 100);

        let policy = PurgePolicy::new(&cfg);
        let report = execute(&policy, &request(&[&docs, &cache]));
        assert_eq!(report.status, "success");
        assert_eq!(report.paths_to_delete, Some(1));
        assert_eq!(report.deleted.as_ref().map(Vec::len), Some(1));
        assert!(!cache.exists());
        assert!(docs.join("keep.txt").exists());
    }

    #[test]
    fn test_empty_request_is_refusal_document() {
        let (_dir, cfg) = setup();
        let policy = PurgePolicy::new(&cfg);
        let report = execute(&policy, &PurgeRequest { target_paths: vec![] });
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(
            json,
            format!("{{\"status\":\"error\",\"message\":\"{REFUSAL_MESSAGE}\"}}")
        );
    }

    #[test]
    fn test_validate_rejection_kinds() {
        let (_dir, cfg) = setup();
        write_file(&cfg.home.join("Documents/x.txt"), 10);
        let policy = PurgePolicy::new(&cfg);

        assert_eq!(
            policy.validate(&cfg.home.join("gone")),
            Err(Rejection::Missing)
        );
        assert_eq!(
            policy.validate(&cfg.home.join("Documents")),
            Err(Rejection::Forbidden)
        );
        assert_eq!(
            policy.validate(&cfg.home.join("Documents/x.txt")),
            Err(Rejection::OutsideSafeZones)
        );
    }
}
