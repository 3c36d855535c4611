//! # Config Module
//!
//! Process-wide configuration resolved once at startup.
//!
//! Everything path-shaped the engine touches hangs off the user's home
//! directory, so the scanners, the purge executor, and the result store all
//! receive a `&Config` instead of reading the environment themselves.

use std::env;
use std::path::PathBuf;

/// Smallest artifact worth reporting (1 KiB).
pub const MIN_ITEM_SIZE: u64 = 1024;

/// Project directories likely to live directly under HOME.
const WALKER_ROOT_NAMES: &[&str] = &[
    "Desktop",
    "Documents",
    "Projects",
    "Developer",
    "dev",
    "code",
    "repos",
    "workspace",
    "src",
];

/// Resolved filesystem layout for one engine invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// User home directory (from `$HOME`, falling back to the OS lookup).
    pub home: PathBuf,
    /// `~/Library`
    pub library: PathBuf,
    /// Process-owned state directory holding the store and the keystore.
    pub state_root: PathBuf,
    /// `$GOPATH`, if set.
    pub gopath: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let home = env::var_os("HOME")
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"));
        let gopath = env::var_os("GOPATH").map(PathBuf::from);
        Self::new(home, gopath)
    }

    /// Build a config rooted at an arbitrary home directory. Tests use this
    /// to point every path table into a scratch directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self::new(home.into(), None)
    }

    fn new(home: PathBuf, gopath: Option<PathBuf>) -> Self {
        let library = home.join("Library");
        let state_root = library.join("Application Support").join("DiskWise");
        Self {
            home,
            library,
            state_root,
            gopath,
        }
    }

    pub fn caches_dir(&self) -> PathBuf {
        self.library.join("Caches")
    }

    pub fn app_support(&self) -> PathBuf {
        self.library.join("Application Support")
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.home.join(".Trash")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.state_root.join("keys")
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_root.join("scan_cache.db")
    }

    /// Likely project roots for the deep walker (phase 2).
    pub fn walker_roots(&self) -> Vec<PathBuf> {
        WALKER_ROOT_NAMES.iter().map(|n| self.home.join(n)).collect()
    }

    /// Roots whose direct children are checked for stale projects (phase 4).
    /// HOME itself is included so projects parked directly under the home
    /// directory are not missed.
    pub fn stale_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.home.clone()];
        roots.extend(self.walker_roots());
        roots
    }

    /// Starting directories for swarm explorer agents when no target path
    /// was given.
    pub fn swarm_roots(&self) -> Vec<PathBuf> {
        vec![
            self.home.join("Desktop"),
            self.home.join("Documents"),
            self.home.join("Downloads"),
            self.caches_dir(),
            self.app_support(),
            self.home.join(".npm"),
        ]
    }

    /// Go module download cache: `~/go/pkg/mod/cache`, or `$GOPATH/pkg/mod/cache`.
    pub fn go_mod_cache(&self) -> PathBuf {
        let default = self.home.join("go").join("pkg").join("mod").join("cache");
        if default.is_dir() {
            return default;
        }
        match &self.gopath {
            Some(gopath) => gopath.join("pkg").join("mod").join("cache"),
            None => default,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_hangs_off_home() {
        let cfg = Config::with_home("/Users/alice");
        assert_eq!(cfg.library, PathBuf::from("/Users/alice/Library"));
        assert_eq!(
            cfg.db_path(),
            PathBuf::from("/Users/alice/Library/Application Support/DiskWise/scan_cache.db")
        );
        assert!(cfg.walker_roots().contains(&PathBuf::from("/Users/alice/Projects")));
    }

    #[test]
    fn test_stale_roots_include_home() {
        let cfg = Config::with_home("/Users/alice");
        assert_eq!(cfg.stale_roots()[0], PathBuf::from("/Users/alice"));
    }
}
