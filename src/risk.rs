//! Path-pattern risk classification.
//!
//! A total function over paths: the first matching pattern wins, checked in
//! priority order critical > caution > safe, and unknown paths default to
//! caution.

use crate::types::Risk;
use std::path::Path;

const CRITICAL_PATTERNS: &[&str] = &[
    "/System/",
    "/usr/",
    "/bin/",
    "/sbin/",
    "/private/var/db/",
    "/Library/LaunchDaemons/",
    "/Library/LaunchAgents/",
    "/System/Library/",
    "/private/etc/",
];

const CAUTION_PATTERNS: &[&str] = &[
    "/Application Support/",
    "/Containers/",
    "/Preferences/",
    "/Saved Application State/",
    "/Homebrew/",
    "/Docker/",
    "/MobileSync/Backup/",
    "/Mail Downloads/",
    "/.venv/",
    "/venv/",
    "/.virtualenv/",
];

const SAFE_PATTERNS: &[&str] = &[
    "/Caches/",
    "/cache/",
    "/Cache/",
    "/tmp/",
    "/Temp/",
    "/DerivedData/",
    "/node_modules/",
    "/.npm/",
    "/__pycache__/",
    "/target/debug/",
    "/target/release/",
    "/.cargo/registry/",
    "/pkg/mod/cache/",
    "/.Trash/",
    "/Logs/",
    "/log/",
    "/Code Cache/",
    "/Service Worker/",
    "/GPUCache/",
    "/ShaderCache/",
    "/GrShaderCache/",
    "/ScriptCache/",
];

/// Classify deletion risk for a path.
///
/// The patterns all carry trailing separators so a directory matches its own
/// pattern; a separator is appended before matching to make the function
/// total over directory paths as well as their contents.
pub fn classify_risk(path: &Path) -> Risk {
    let mut haystack = path.to_string_lossy().into_owned();
    if !haystack.ends_with('/') {
        haystack.push('/');
    }

    for pattern in CRITICAL_PATTERNS {
        if haystack.contains(pattern) {
            return Risk::Critical;
        }
    }
    for pattern in CAUTION_PATTERNS {
        if haystack.contains(pattern) {
            return Risk::Caution;
        }
    }
    for pattern in SAFE_PATTERNS {
        if haystack.contains(pattern) {
            return Risk::Safe;
        }
    }
    Risk::Caution
}
