// src/path_utils.rs

//! Utility functions for relating paths to a sync base directory.

use std::path::{Path, PathBuf};

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again.
///
/// Returns `None` if the path cannot be reasonably related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slash(rel));
    }

    // Helps on platforms (notably macOS) where different absolute prefixes
    // may be used for the same directory (/private/var/...).
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(to_slash(rel));
        }
    }

    None
}

fn to_slash(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// Normalize a relative path string coming from config or from the wire:
/// backslashes become slashes, `.` and empty segments are dropped.
///
/// `"./src//main.go"` becomes `"src/main.go"`; `"./"` becomes `""`.
pub fn normalize_rel(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// True if `path` is relative and has no `..` segment.
pub fn is_contained_rel(path: &str) -> bool {
    let slashed = path.replace('\\', "/");
    if slashed.starts_with('/') || Path::new(path).is_absolute() {
        return false;
    }
    !slashed.split('/').any(|seg| seg == "..")
}

/// Resolve a client-supplied relative path under `base`.
///
/// Either separator is accepted and a leading slash is ignored. Paths that
/// would climb out of `base` (`..` segments) resolve to `None`.
pub fn resolve_under(base: &Path, rel: &str) -> Option<PathBuf> {
    let normalized = normalize_rel(rel);
    if normalized.is_empty() || normalized.split('/').any(|seg| seg == "..") {
        return None;
    }
    Some(
        normalized
            .split('/')
            .fold(base.to_path_buf(), |acc, seg| acc.join(seg)),
    )
}
