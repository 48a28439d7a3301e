// src/protocol/mod.rs

//! Messages exchanged over the sync connection.
//!
//! Every websocket binary message carries exactly one [`Frame`], encoded
//! with bincode's standard configuration capped at [`MAX_FRAME_SIZE`].

use std::fmt;

use bincode::config::{Config, standard};
use bincode::{Decode, Encode};

use crate::errors::Result;
use crate::types::{ChangeOp, ChangeRecord};

/// Upgrade path the server accepts connections on.
pub const WS_PATH: &str = "/ws";

/// Largest encoded frame either side produces or accepts. Length prefixes
/// claiming more than this fail to decode instead of being allocated.
pub const MAX_FRAME_SIZE: usize = 256 << 20;

fn wire_config() -> impl Config {
    standard().with_limit::<MAX_FRAME_SIZE>()
}

/// Per-connection request counter, allocated by the client and echoed back.
pub type RequestId = u64;

/// "Which of these do you already have?"
///
/// Write records carry a fingerprint; Remove records don't.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DiffRequest {
    pub id: RequestId,
    pub changes: Vec<ChangeRecord>,
}

/// Paths the server already holds byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DiffResponse {
    pub id: RequestId,
    pub no_diff: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SyncBatch {
    pub id: RequestId,
    /// Write records carry their payload.
    pub changes: Vec<ChangeRecord>,
    /// Set only when the batch should (re)start the deploy.
    pub deploy_cmd: Option<String>,
    pub deploy_kill_cmd: Option<String>,
}

/// Result of applying one record on the server.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FileOutcome {
    pub path: String,
    pub op: ChangeOp,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn ok(path: impl Into<String>, op: ChangeOp) -> Self {
        Self {
            path: path.into(),
            op,
            error: None,
        }
    }

    pub fn failed(path: impl Into<String>, op: ChangeOp, error: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            op,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SyncAck {
    pub id: RequestId,
    pub outcomes: Vec<FileOutcome>,
}

impl SyncAck {
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }
}

/// Deploy supervisor state changes reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum DeployStatus {
    KillSucceeded,
    KillFailed { error: String },
    Started { command: String },
    StartFailed { error: String },
    Exited { code: Option<i32>, success: bool },
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStatus::KillSucceeded => f.write_str("previous deploy process killed"),
            DeployStatus::KillFailed { error } => {
                write!(f, "failed to kill previous deploy process: {error}")
            }
            DeployStatus::Started { command } => write!(f, "deploy started: {command}"),
            DeployStatus::StartFailed { error } => write!(f, "deploy failed to start: {error}"),
            DeployStatus::Exited { code, success } => match (code, success) {
                (_, true) => f.write_str("deploy exited successfully"),
                (Some(code), false) => write!(f, "deploy exited with code {code}"),
                (None, false) => f.write_str("deploy terminated by signal"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum Frame {
    Diff(DiffRequest),
    DiffResult(DiffResponse),
    Sync(SyncBatch),
    SyncResult(SyncAck),
    DeployStdout(String),
    DeployStderr(String),
    DeployStatus(DeployStatus),
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::encode_to_vec(self, wire_config())?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (frame, _) = bincode::decode_from_slice(bytes, wire_config())?;
        Ok(frame)
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Diff(_) => "diff",
            Frame::DiffResult(_) => "diff-result",
            Frame::Sync(_) => "sync",
            Frame::SyncResult(_) => "sync-result",
            Frame::DeployStdout(_) => "deploy-stdout",
            Frame::DeployStderr(_) => "deploy-stderr",
            Frame::DeployStatus(_) => "deploy-status",
        }
    }

    /// True for frames the server pushes on its own, outside any request.
    pub fn is_deploy_stream(&self) -> bool {
        matches!(
            self,
            Frame::DeployStdout(_) | Frame::DeployStderr(_) | Frame::DeployStatus(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_frame_keeps_binary_payload_intact() {
        let mut rec = ChangeRecord::write("bin/app.jar").with_fingerprint("abc");
        rec.payload = Some((0u8..=255).collect());
        let frame = Frame::Sync(SyncBatch {
            id: 7,
            changes: vec![rec, ChangeRecord::remove("old.txt")],
            deploy_cmd: Some("java -jar bin/app.jar".into()),
            deploy_kill_cmd: None,
        });

        let bytes = frame.encode().unwrap();
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(Frame::decode(&[0xff, 0xff, 0xff, 0xff]).is_err());
        assert!(Frame::decode(&[]).is_err());
    }

    #[test]
    fn oversized_length_prefix_is_rejected_without_allocating() {
        // Sync { id: 0, changes: [1 record] } whose path claims 1 TiB.
        let mut bytes = vec![2, 0, 1, 0xfd];
        bytes.extend_from_slice(&(1u64 << 40).to_le_bytes());
        assert!(matches!(
            Frame::decode(&bytes),
            Err(crate::errors::SyncdsError::DecodeError(_))
        ));

        // Same for a payload just over the cap.
        let mut bytes = vec![2, 0, 1, 0xfc];
        bytes.extend_from_slice(&((MAX_FRAME_SIZE as u32) + 1).to_le_bytes());
        assert!(Frame::decode(&bytes).is_err());
    }

    #[test]
    fn ack_failures_lists_only_errors() {
        let ack = SyncAck {
            id: 1,
            outcomes: vec![
                FileOutcome::ok("a", ChangeOp::Write),
                FileOutcome::failed("b", ChangeOp::Remove, "permission denied"),
            ],
        };
        let failed: Vec<_> = ack.failures().map(|o| o.path.as_str()).collect();
        assert_eq!(failed, vec!["b"]);
    }

    #[test]
    fn deploy_frames_are_stream_frames() {
        assert!(Frame::DeployStdout("x".into()).is_deploy_stream());
        assert!(Frame::DeployStatus(DeployStatus::KillSucceeded).is_deploy_stream());
        assert!(!Frame::DiffResult(DiffResponse { id: 1, no_diff: vec![] }).is_deploy_stream());
    }
}
