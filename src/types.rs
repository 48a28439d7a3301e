// src/types.rs

use std::fmt;

use bincode::{Decode, Encode};

/// What happened to a path, as far as the server is concerned.
///
/// Renames and moves are observed as a `Remove` of the old path plus a
/// `Write` of the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum ChangeOp {
    Write,
    Remove,
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOp::Write => f.write_str("write"),
            ChangeOp::Remove => f.write_str("remove"),
        }
    }
}

/// One changed file, relative to the synced base directory.
///
/// The collector produces records with only `path` and `op`; the diff engine
/// fills `fingerprint` and the client session fills `payload` right before
/// the record goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ChangeRecord {
    /// Forward-slash path relative to the base directory.
    pub path: String,
    pub op: ChangeOp,
    /// Hex MD5 of the file content (`Write` only).
    pub fingerprint: Option<String>,
    /// Full file content (`Write` only, sync requests only).
    pub payload: Option<Vec<u8>>,
}

impl ChangeRecord {
    pub fn new(path: impl Into<String>, op: ChangeOp) -> Self {
        Self {
            path: path.into(),
            op,
            fingerprint: None,
            payload: None,
        }
    }

    pub fn write(path: impl Into<String>) -> Self {
        Self::new(path, ChangeOp::Write)
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::new(path, ChangeOp::Remove)
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn is_remove(&self) -> bool {
        self.op == ChangeOp::Remove
    }
}
