// src/diff/cache.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: String,
    modified: SystemTime,
    hits: u64,
    /// Insertion order, breaks ties between equally used entries.
    seq: u64,
}

/// Bounded `path -> (fingerprint, mtime)` cache with least-frequently-used
/// eviction.
///
/// An entry is only handed out while the caller's observed modification
/// time equals the cached one. A mismatch drops the entry.
#[derive(Debug)]
pub struct FingerprintCache {
    capacity: usize,
    entries: HashMap<PathBuf, CacheEntry>,
    seq: u64,
}

impl FingerprintCache {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Cached fingerprint for `path` if it was recorded at `modified`.
    pub fn get(&mut self, path: &Path, modified: SystemTime) -> Option<String> {
        match self.entries.get_mut(path) {
            Some(entry) if entry.modified == modified => {
                entry.hits += 1;
                Some(entry.fingerprint.clone())
            }
            Some(_) => {
                trace!(path = ?path, "fingerprint cache entry stale");
                self.entries.remove(path);
                None
            }
            None => None,
        }
    }

    /// Record a fresh fingerprint, evicting the least used entry if full.
    pub fn insert(&mut self, path: impl Into<PathBuf>, fingerprint: String, modified: SystemTime) {
        let path = path.into();
        self.seq += 1;

        let hits = match self.entries.remove(&path) {
            Some(old) => old.hits,
            None => {
                if self.entries.len() >= self.capacity {
                    self.evict_one();
                }
                0
            }
        };

        self.entries.insert(
            path,
            CacheEntry {
                fingerprint,
                modified,
                hits,
                seq: self.seq,
            },
        );
    }

    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.hits, e.seq))
            .map(|(p, _)| p.clone());
        if let Some(victim) = victim {
            trace!(path = ?victim, "evicting fingerprint cache entry");
            self.entries.remove(&victim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn hit_only_on_matching_mtime() {
        let mut c = FingerprintCache::new(4);
        c.insert("/a", "fa".into(), t(1));
        assert_eq!(c.get(Path::new("/a"), t(1)).as_deref(), Some("fa"));
        assert_eq!(c.get(Path::new("/a"), t(2)), None);
        // stale entry is gone
        assert!(!c.contains(Path::new("/a")));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut c = FingerprintCache::new(3);
        for i in 0..10 {
            c.insert(format!("/f{i}"), format!("h{i}"), t(i));
        }
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn evicts_least_frequently_used() {
        let mut c = FingerprintCache::new(2);
        c.insert("/hot", "h".into(), t(1));
        c.insert("/cold", "c".into(), t(1));
        c.get(Path::new("/hot"), t(1));
        c.get(Path::new("/hot"), t(1));

        c.insert("/new", "n".into(), t(1));
        assert!(c.contains(Path::new("/hot")));
        assert!(!c.contains(Path::new("/cold")));
        assert!(c.contains(Path::new("/new")));
    }

    #[test]
    fn ties_evict_oldest_insert() {
        let mut c = FingerprintCache::new(2);
        c.insert("/first", "1".into(), t(1));
        c.insert("/second", "2".into(), t(1));
        c.insert("/third", "3".into(), t(1));
        assert!(!c.contains(Path::new("/first")));
        assert!(c.contains(Path::new("/second")));
    }

    #[test]
    fn reinsert_replaces_without_eviction() {
        let mut c = FingerprintCache::new(1);
        c.insert("/a", "old".into(), t(1));
        c.insert("/a", "new".into(), t(2));
        assert_eq!(c.len(), 1);
        assert_eq!(c.get(Path::new("/a"), t(2)).as_deref(), Some("new"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(FingerprintCache::new(0).capacity(), 1);
    }
}
