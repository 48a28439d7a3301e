// src/server/materializer.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::fs::FileSystem;
use crate::path_utils::resolve_under;
use crate::protocol::FileOutcome;
use crate::types::{ChangeOp, ChangeRecord};

/// Applies synced records under the server's base directory.
///
/// Best effort: each record succeeds or fails on its own and nothing is
/// rolled back.
#[derive(Debug, Clone)]
pub struct Materializer {
    fs: Arc<dyn FileSystem>,
    base: PathBuf,
}

impl Materializer {
    pub fn new(fs: Arc<dyn FileSystem>, base: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            base: base.into(),
        }
    }

    /// Apply every record in order and report one outcome per record.
    pub fn apply(&self, changes: &[ChangeRecord]) -> Vec<FileOutcome> {
        changes.iter().map(|rec| self.apply_one(rec)).collect()
    }

    fn apply_one(&self, rec: &ChangeRecord) -> FileOutcome {
        let Some(abs) = resolve_under(&self.base, &rec.path) else {
            warn!(path = %rec.path, "rejecting path outside base dir");
            return FileOutcome::failed(&rec.path, rec.op, "path escapes base directory");
        };

        let res = match rec.op {
            ChangeOp::Remove => {
                if !self.fs.exists(&abs) {
                    info!(path = %rec.path, "file already absent");
                    return FileOutcome::ok(&rec.path, rec.op);
                }
                self.fs.remove_file(&abs)
            }
            ChangeOp::Write => match rec.payload.as_deref() {
                Some(payload) => self.fs.write(&abs, payload),
                None => {
                    warn!(path = %rec.path, "write record without payload");
                    return FileOutcome::failed(&rec.path, rec.op, "missing payload");
                }
            },
        };

        match res {
            Ok(()) => {
                info!(path = %rec.path, op = %rec.op, "file synced");
                FileOutcome::ok(&rec.path, rec.op)
            }
            Err(err) => {
                warn!(path = %rec.path, op = %rec.op, error = %format!("{err:#}"), "file sync failed");
                FileOutcome::failed(&rec.path, rec.op, format!("{err:#}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn write(path: &str, data: &str) -> ChangeRecord {
        let mut rec = ChangeRecord::write(path);
        rec.payload = Some(data.as_bytes().to_vec());
        rec
    }

    #[test]
    fn one_failure_does_not_abort_the_batch() {
        let fs = MockFileSystem::new();
        fs.fail_on("srv/b.txt");
        let m = Materializer::new(Arc::new(fs.clone()), "srv");

        let out = m.apply(&[write("a.txt", "A"), write("b.txt", "B"), write("c.txt", "C")]);

        assert_eq!(out.len(), 3);
        assert!(out[0].is_ok());
        assert!(!out[1].is_ok());
        assert!(out[2].is_ok());
        assert_eq!(fs.content("srv/c.txt").as_deref(), Some(&b"C"[..]));
    }

    #[test]
    fn parent_escape_is_rejected() {
        let fs = MockFileSystem::new();
        let m = Materializer::new(Arc::new(fs.clone()), "srv");
        let out = m.apply(&[write("../outside.txt", "x")]);
        assert!(!out[0].is_ok());
        assert_eq!(fs.content("outside.txt"), None);
    }

    #[test]
    fn write_without_payload_fails() {
        let m = Materializer::new(Arc::new(MockFileSystem::new()), "srv");
        let out = m.apply(&[ChangeRecord::write("a.txt")]);
        assert_eq!(out[0].error.as_deref(), Some("missing payload"));
    }
}
