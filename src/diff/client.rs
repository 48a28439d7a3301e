// src/diff/client.rs

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::diff::fingerprint::fingerprint_file;
use crate::fs::FileSystem;
use crate::path_utils::resolve_under;
use crate::protocol::DiffResponse;
use crate::types::ChangeRecord;

/// Fill in fingerprints for every Write record.
///
/// Remove records pass through untouched. A Write whose file can't be read
/// (vanished, permissions) is skipped with a warning.
pub fn fingerprint_changes(
    fs: &dyn FileSystem,
    base: &Path,
    changes: Vec<ChangeRecord>,
) -> Vec<ChangeRecord> {
    changes
        .into_iter()
        .filter_map(|rec| {
            if rec.is_remove() {
                return Some(rec);
            }
            let Some(abs) = resolve_under(base, &rec.path) else {
                warn!(path = %rec.path, "refusing to hash path outside base dir");
                return None;
            };
            match fingerprint_file(fs, &abs) {
                Ok(fp) => Some(rec.with_fingerprint(fp)),
                Err(err) => {
                    warn!(path = %rec.path, error = %err, "skipping unreadable file");
                    None
                }
            }
        })
        .collect()
}

/// Drop the records the server reported as already identical.
///
/// Removes are always kept.
pub fn retain_differing(changes: Vec<ChangeRecord>, response: &DiffResponse) -> Vec<ChangeRecord> {
    let same: HashSet<&str> = response.no_diff.iter().map(String::as_str).collect();
    changes
        .into_iter()
        .filter(|rec| {
            let keep = rec.is_remove() || !same.contains(rec.path.as_str());
            if !keep {
                debug!(path = %rec.path, "server copy identical; not sending");
            }
            keep
        })
        .collect()
}
