// src/client/session.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::config::model::WatchRule;
use crate::diff::{fingerprint_bytes, fingerprint_changes, retain_differing};
use crate::errors::{Result, SyncdsError};
use crate::fs::FileSystem;
use crate::path_utils::resolve_under;
use crate::protocol::{
    DeployStatus, DiffRequest, DiffResponse, Frame, RequestId, SyncAck, SyncBatch,
};
use crate::transport::Connection;
use crate::types::ChangeRecord;
use crate::watch::WatchFilter;

/// Client end of one sync connection.
///
/// Runs diff and sync round trips one at a time. Deploy output that arrives
/// in between is printed as it comes.
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    fs: Arc<dyn FileSystem>,
    base: PathBuf,
    next_id: RequestId,
}

impl Session {
    pub fn new(conn: Connection, fs: Arc<dyn FileSystem>, base: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            fs,
            base: base.into(),
            next_id: 1,
        }
    }

    /// Next frame pushed by the server, `None` once the connection is gone.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.conn.inbound.recv().await
    }

    /// Split a collected batch by watch rule and sync each group.
    ///
    /// Paths no rule covers are dropped.
    pub async fn sync_batch(
        &mut self,
        changes: Vec<ChangeRecord>,
        filter: &WatchFilter,
    ) -> Result<Vec<SyncAck>> {
        let mut groups: BTreeMap<usize, Vec<ChangeRecord>> = BTreeMap::new();
        for rec in changes {
            match filter.rule_for(&rec.path) {
                Some(idx) => groups.entry(idx).or_default().push(rec),
                None => debug!(path = %rec.path, "no watch rule covers path; dropping"),
            }
        }

        let mut acks = Vec::new();
        for (idx, group) in groups {
            let Some(rule) = filter.rule(idx) else {
                continue;
            };
            if let Some(ack) = self.sync_changes(group, rule).await? {
                acks.push(ack);
            }
        }
        Ok(acks)
    }

    /// Diff `changes` against the server and push what differs.
    ///
    /// Returns `None` if nothing needed sending.
    pub async fn sync_changes(
        &mut self,
        changes: Vec<ChangeRecord>,
        rule: &WatchRule,
    ) -> Result<Option<SyncAck>> {
        let fs = Arc::clone(&self.fs);
        let base = self.base.clone();
        let changes =
            tokio::task::spawn_blocking(move || fingerprint_changes(&*fs, &base, changes))
                .await
                .map_err(|e| SyncdsError::Other(anyhow!("fingerprint task failed: {e}")))?;
        if changes.is_empty() {
            return Ok(None);
        }

        let response = self.diff(changes.clone()).await?;
        let changes = retain_differing(changes, &response);
        if changes.is_empty() {
            info!("server already up to date");
            return Ok(None);
        }

        let fs = Arc::clone(&self.fs);
        let base = self.base.clone();
        let changes = tokio::task::spawn_blocking(move || load_payloads(&*fs, &base, changes))
            .await
            .map_err(|e| SyncdsError::Other(anyhow!("payload task failed: {e}")))?;
        if changes.is_empty() {
            return Ok(None);
        }

        let deploy = rule.deploy_triggered_by(changes.iter().map(|c| c.path.as_str()));
        let id = self.allocate_id();
        let batch = SyncBatch {
            id,
            changes,
            deploy_cmd: rule.deploy_cmd.clone().filter(|_| deploy),
            deploy_kill_cmd: rule.deploy_kill_cmd.clone().filter(|_| deploy),
        };
        info!(
            id,
            files = batch.changes.len(),
            deploy = batch.deploy_cmd.is_some(),
            "sending sync batch"
        );
        self.conn.outbound.send(Frame::Sync(batch)).await?;

        let ack = self.wait_for_ack(id).await?;
        for outcome in &ack.outcomes {
            match &outcome.error {
                None => info!(path = %outcome.path, op = %outcome.op, "synced"),
                Some(err) => warn!(path = %outcome.path, op = %outcome.op, error = %err, "sync failed on server"),
            }
        }
        Ok(Some(ack))
    }

    /// One diff round trip.
    pub async fn diff(&mut self, changes: Vec<ChangeRecord>) -> Result<DiffResponse> {
        let id = self.allocate_id();
        debug!(id, files = changes.len(), "sending diff request");
        self.conn
            .outbound
            .send(Frame::Diff(DiffRequest { id, changes }))
            .await?;

        loop {
            match self.recv().await? {
                Frame::DiffResult(resp) if resp.id == id => return Ok(resp),
                other => self.handle_frame(other),
            }
        }
    }

    async fn wait_for_ack(&mut self, id: RequestId) -> Result<SyncAck> {
        loop {
            match self.recv().await? {
                Frame::SyncResult(ack) if ack.id == id => return Ok(ack),
                other => self.handle_frame(other),
            }
        }
    }

    async fn recv(&mut self) -> Result<Frame> {
        self.next_frame()
            .await
            .ok_or_else(|| SyncdsError::ConnectionClosed("server went away".into()))
    }

    /// Handle a frame outside a round trip: deploy output and status.
    pub fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::DeployStdout(line) => println!("[stdout] {line}"),
            Frame::DeployStderr(line) => println!("[stderr] {line}"),
            Frame::DeployStatus(status) => match status {
                DeployStatus::KillFailed { .. } | DeployStatus::StartFailed { .. } => {
                    warn!(%status, "deploy")
                }
                DeployStatus::Exited { success: false, .. } => warn!(%status, "deploy"),
                _ => info!(%status, "deploy"),
            },
            other => warn!(kind = other.kind(), "unexpected frame; ignoring"),
        }
    }

    /// Stop the connection loops.
    pub async fn close(self) {
        self.conn.shutdown().await;
    }

    fn allocate_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Read the content of every Write record.
///
/// The fingerprint is refreshed from the bytes actually sent. Files that
/// can no longer be read are skipped.
pub fn load_payloads(
    fs: &dyn FileSystem,
    base: &Path,
    changes: Vec<ChangeRecord>,
) -> Vec<ChangeRecord> {
    changes
        .into_iter()
        .filter_map(|mut rec| {
            if rec.is_remove() {
                return Some(rec);
            }
            let abs = resolve_under(base, &rec.path)?;
            match fs.read(&abs) {
                Ok(bytes) => {
                    rec.fingerprint = Some(fingerprint_bytes(&bytes));
                    rec.payload = Some(bytes);
                    Some(rec)
                }
                Err(err) => {
                    warn!(path = %rec.path, error = %err, "skipping unreadable file");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn payloads_loaded_for_writes_only() {
        let fs = MockFileSystem::new();
        fs.add_file("b/x.txt", "hello");
        let out = load_payloads(
            &fs,
            Path::new("b"),
            vec![
                ChangeRecord::write("x.txt"),
                ChangeRecord::remove("y.txt"),
                ChangeRecord::write("missing.txt"),
            ],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload.as_deref(), Some(&b"hello"[..]));
        assert_eq!(out[0].fingerprint, Some(fingerprint_bytes(b"hello")));
        assert_eq!(out[1].payload, None);
    }
}
