// src/diff/engine.rs

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{debug, warn};

use crate::diff::cache::FingerprintCache;
use crate::diff::fingerprint::fingerprint_file;
use crate::fs::FileSystem;
use crate::path_utils::resolve_under;
use crate::protocol::{DiffRequest, DiffResponse};

/// Server half of the diff: which requested files do we already have?
///
/// Shared across connections; the cache sits behind its own lock and is
/// never held while hashing.
#[derive(Debug)]
pub struct DiffEngine {
    fs: Arc<dyn FileSystem>,
    base: PathBuf,
    cache: Mutex<FingerprintCache>,
}

impl DiffEngine {
    pub fn new(fs: Arc<dyn FileSystem>, base: impl Into<PathBuf>, cache_capacity: usize) -> Self {
        Self {
            fs,
            base: base.into(),
            cache: Mutex::new(FingerprintCache::new(cache_capacity)),
        }
    }

    /// Fingerprint of `path`, reusing the cached value while the file's
    /// mtime is unchanged.
    pub fn fingerprint(&self, path: &Path) -> Result<String> {
        let modified = self.fs.modified(path)?;

        if let Some(fp) = self.lock_cache().get(path, modified) {
            debug!(path = ?path, "fingerprint cache hit");
            return Ok(fp);
        }

        let fp = fingerprint_file(&*self.fs, path)?;
        self.lock_cache().insert(path, fp.clone(), modified);
        Ok(fp)
    }

    /// Answer a diff request with the paths whose server copy matches the
    /// requested fingerprint.
    ///
    /// Removes, records without a fingerprint, unsafe paths and files we
    /// can't read are all treated as differing.
    pub fn no_diff(&self, request: &DiffRequest) -> DiffResponse {
        let mut no_diff = Vec::new();

        for rec in &request.changes {
            if rec.is_remove() {
                continue;
            }
            let Some(wanted) = rec.fingerprint.as_deref() else {
                continue;
            };
            let Some(abs) = resolve_under(&self.base, &rec.path) else {
                warn!(path = %rec.path, "rejecting path outside base dir");
                continue;
            };
            if !self.fs.is_file(&abs) {
                continue;
            }
            match self.fingerprint(&abs) {
                Ok(have) if have == wanted => no_diff.push(rec.path.clone()),
                Ok(_) => {}
                Err(err) => debug!(path = %rec.path, error = %err, "cannot fingerprint server copy"),
            }
        }

        debug!(
            id = request.id,
            requested = request.changes.len(),
            identical = no_diff.len(),
            "diff computed"
        );
        DiffResponse {
            id: request.id,
            no_diff,
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, FingerprintCache> {
        // A panic while holding the lock can't leave an entry half-written.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
