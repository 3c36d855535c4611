//! Recursive size probe.
//!
//! Called millions of times per scan, so it keeps per-entry work minimal:
//! one metadata read per entry, no path buffering beyond what the walker
//! already does. Symlinked subtrees are never entered and symlinked files are
//! never counted.

use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Recoverable filesystem failure classes. Every probe failure maps onto one
/// of these and scanning continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorKind {
    Permission,
    Symlink,
    Missing,
    Other,
}

// ELOOP on macOS is 62, on Linux 40.
const ELOOP_CODES: [i32; 2] = [62, 40];

pub fn classify_io_error(err: &io::Error) -> FsErrorKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied => FsErrorKind::Permission,
        io::ErrorKind::NotFound => FsErrorKind::Missing,
        _ => {
            if err.raw_os_error().is_some_and(|c| ELOOP_CODES.contains(&c)) {
                FsErrorKind::Symlink
            } else {
                FsErrorKind::Other
            }
        }
    }
}

fn classify_walkdir_error(err: &walkdir::Error) -> FsErrorKind {
    if err.loop_ancestor().is_some() {
        return FsErrorKind::Symlink;
    }
    match err.io_error() {
        Some(io_err) => classify_io_error(io_err),
        None => FsErrorKind::Other,
    }
}

/// Total size of `path` without following symbolic links, silently skipping
/// anything unreadable.
pub fn dir_size(path: &Path) -> u64 {
    dir_size_with(path, &mut |_| {})
}

/// Same as [`dir_size`], reporting each recovered failure to `on_error`.
///
/// For a plain file the file's own length is returned. A symlink contributes
/// nothing, whatever it points at.
pub fn dir_size_with(path: &Path, on_error: &mut dyn FnMut(FsErrorKind)) -> u64 {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) => {
            on_error(classify_io_error(&e));
            return 0;
        }
    };
    if meta.file_type().is_symlink() {
        return 0;
    }
    if meta.is_file() {
        return meta.len();
    }

    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                on_error(classify_walkdir_error(&e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(m) => total += m.len(),
            Err(e) => on_error(classify_walkdir_error(&e)),
        }
    }
    total
}
