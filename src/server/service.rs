// src/server/service.rs

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, info};

use crate::config::ServerConfig;
use crate::deploy::DeploySupervisor;
use crate::diff::DiffEngine;
use crate::fs::{FileSystem, RealFileSystem};
use crate::protocol::{DiffRequest, DiffResponse, FileOutcome, SyncAck, SyncBatch};
use crate::server::materializer::Materializer;
use crate::transport::Outbound;

/// Everything the server shares between connections.
#[derive(Debug)]
pub struct SyncService {
    diff: DiffEngine,
    materializer: Materializer,
    deployer: DeploySupervisor,
    /// Outbound queue of the most recent connection, for shutdown reports.
    active: Mutex<Option<Outbound>>,
}

impl SyncService {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_fs(
            Arc::new(RealFileSystem),
            config.base_dir.clone(),
            config.fingerprint_cache_capacity,
            config.deploy_cooldown,
        )
    }

    pub fn with_fs(
        fs: Arc<dyn FileSystem>,
        base: PathBuf,
        cache_capacity: usize,
        deploy_cooldown: Duration,
    ) -> Self {
        Self {
            diff: DiffEngine::new(fs.clone(), base.clone(), cache_capacity),
            materializer: Materializer::new(fs, base.clone()),
            deployer: DeploySupervisor::new(deploy_cooldown).with_workdir(base),
            active: Mutex::new(None),
        }
    }

    pub fn deployer(&self) -> &DeploySupervisor {
        &self.deployer
    }

    /// Answer a diff request on the blocking pool.
    pub async fn diff(self: &Arc<Self>, request: DiffRequest) -> DiffResponse {
        let id = request.id;
        let this = Arc::clone(self);
        match tokio::task::spawn_blocking(move || this.diff.no_diff(&request)).await {
            Ok(resp) => resp,
            Err(err) => {
                // Nothing known to be identical: the client sends everything.
                error!(id, error = %err, "diff task failed");
                DiffResponse {
                    id,
                    no_diff: Vec::new(),
                }
            }
        }
    }

    /// Materialize a batch on the blocking pool.
    pub async fn apply(self: &Arc<Self>, batch: SyncBatch) -> SyncAck {
        let id = batch.id;
        let index: Vec<_> = batch.changes.iter().map(|c| (c.path.clone(), c.op)).collect();
        let this = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || this.materializer.apply(&batch.changes));

        let outcomes = match task.await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                error!(id, error = %err, "sync task failed");
                index
                    .into_iter()
                    .map(|(path, op)| FileOutcome::failed(path, op, "internal server error"))
                    .collect()
            }
        };

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        info!(id, files = outcomes.len(), failed, "sync batch applied");
        SyncAck { id, outcomes }
    }

    pub fn set_active(&self, outbound: Outbound) {
        *self.lock_active() = Some(outbound);
    }

    /// Forget `outbound` if it is still the active connection.
    pub fn clear_active(&self, outbound: &Outbound) {
        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|a| a.same_channel(outbound)) {
            *active = None;
        }
    }

    pub fn active(&self) -> Option<Outbound> {
        self.lock_active().clone()
    }

    /// Stop the running deploy, telling the active client how it went.
    ///
    /// The report is only queued; the connection's writer flushes it when
    /// the connection is cancelled.
    pub async fn shutdown(&self) {
        let active = self.active();
        self.deployer.shutdown(active.as_ref()).await;
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<Outbound>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
