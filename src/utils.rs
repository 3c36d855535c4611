use chrono::{DateTime, Local};
use std::env;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Human-readable byte size in binary units, two decimals above bytes.
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size < 1024 {
        return format!("{size} B");
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Render a timestamp the way the UI expects it: `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(t: SystemTime) -> String {
    DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Last-accessed time of a path, or `"Unknown"` when stat fails.
pub fn last_accessed_string(path: &Path) -> String {
    std::fs::symlink_metadata(path)
        .and_then(|m| m.accessed())
        .map(format_timestamp)
        .unwrap_or_else(|_| "Unknown".to_string())
}

/// Seconds since the epoch as a float, for mtime checkpoint comparisons.
pub fn epoch_seconds(t: SystemTime) -> f64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Get the owning project name for an artifact path (its parent's basename)
#[inline]
pub fn parent_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(String::from)
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Resolve a leading `~` against `$HOME`. Backslash-escaped spaces, as
/// shells paste them, are unescaped first; `~user` forms pass through
/// untouched.
pub fn expand_tilde(raw: &str) -> PathBuf {
    let cleaned = raw.replace("\\ ", " ");
    let Some(rest) = cleaned.strip_prefix('~') else {
        return PathBuf::from(cleaned);
    };
    let Ok(home) = env::var("HOME") else {
        return PathBuf::from(cleaned);
    };
    if rest.is_empty() {
        return PathBuf::from(home);
    }
    match rest.strip_prefix('/') {
        Some(tail) => PathBuf::from(home).join(tail),
        None => PathBuf::from(cleaned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_walks_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(999), "999 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(1536 * 1024 * 1024), "1.50 GB");
        assert_eq!(format_size(2 * 1024_u64.pow(4)), "2.00 TB");
    }

    #[test]
    fn test_expand_tilde_forms() {
        if let Ok(home) = env::var("HOME") {
            assert_eq!(expand_tilde("~"), PathBuf::from(&home));
            assert_eq!(expand_tilde("~/a/b"), PathBuf::from(&home).join("a/b"));
        }
        // Absolute paths and ~user forms pass through; escapes are dropped.
        assert_eq!(expand_tilde("/usr/local/bin"), PathBuf::from("/usr/local/bin"));
        assert_eq!(expand_tilde("~alice/x"), PathBuf::from("~alice/x"));
        assert_eq!(
            expand_tilde("/a/My\\ Folder"),
            PathBuf::from("/a/My Folder")
        );
    }

    #[test]
    fn test_parent_name() {
        assert_eq!(parent_name(Path::new("/a/myproj/node_modules")), "myproj");
        assert_eq!(parent_name(Path::new("/")), "Unknown");
    }
}
