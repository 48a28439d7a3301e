// src/deploy/supervisor.rs

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::deploy::process::{DeployHandle, shell_command};
use crate::protocol::{DeployStatus, Frame};
use crate::transport::Outbound;

/// Owns the one deploy process a server may run.
///
/// `deploy` holds the slot for the whole kill, cool-down and start sequence,
/// so overlapping triggers run one after the other instead of racing.
#[derive(Debug)]
pub struct DeploySupervisor {
    current: Mutex<Option<DeployHandle>>,
    cooldown: Duration,
    workdir: Option<PathBuf>,
}

impl DeploySupervisor {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            current: Mutex::new(None),
            cooldown,
            workdir: None,
        }
    }

    /// Run deploy and fallback kill commands from `dir`.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Replace the running deploy (if any) with `cmd`.
    ///
    /// If the old process can't be killed and `kill_cmd` is set, it is run
    /// through the shell without waiting for it. Progress is reported on
    /// `outbound`; nothing here fails the caller.
    pub async fn deploy(&self, cmd: &str, kill_cmd: Option<&str>, outbound: &Outbound) {
        let mut current = self.current.lock().await;

        if let Some(mut old) = current.take() {
            if old.is_live() {
                info!(cmd = %old.command(), "killing previous deploy");
                match old.kill().await {
                    Ok(()) => report(outbound, DeployStatus::KillSucceeded).await,
                    Err(err) => {
                        report(
                            outbound,
                            DeployStatus::KillFailed {
                                error: err.to_string(),
                            },
                        )
                        .await;
                        if let Some(kill_cmd) = kill_cmd {
                            self.run_fallback_kill(kill_cmd);
                        }
                    }
                }
            }
        }

        debug!(cooldown_ms = self.cooldown.as_millis() as u64, "deploy cool-down");
        sleep(self.cooldown).await;

        match DeployHandle::spawn(cmd, self.workdir.as_deref(), outbound.clone()) {
            // The runner reports `Started` itself, ahead of any output.
            Ok(handle) => *current = Some(handle),
            Err(err) => {
                report(
                    outbound,
                    DeployStatus::StartFailed {
                        error: err.to_string(),
                    },
                )
                .await;
            }
        }
    }

    /// Kill the running deploy, if any. Used on server shutdown.
    pub async fn shutdown(&self, outbound: Option<&Outbound>) {
        let mut current = self.current.lock().await;
        let Some(mut handle) = current.take() else {
            return;
        };
        if !handle.is_live() {
            return;
        }

        let status = match handle.kill().await {
            Ok(()) => DeployStatus::KillSucceeded,
            Err(err) => DeployStatus::KillFailed {
                error: err.to_string(),
            },
        };
        match outbound {
            Some(outbound) => report(outbound, status).await,
            None => info!(%status, "deploy stopped"),
        }
    }

    /// Whether a deploy process is currently running.
    pub async fn is_running(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(DeployHandle::is_live)
    }

    /// Fire-and-forget fallback kill.
    fn run_fallback_kill(&self, kill_cmd: &str) {
        info!(cmd = %kill_cmd, "running fallback kill command");
        let mut cmd = shell_command(kill_cmd);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(false);
        match cmd.spawn() {
            Ok(mut child) => {
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) => debug!(success = status.success(), "fallback kill finished"),
                        Err(err) => warn!(error = %err, "fallback kill failed"),
                    }
                });
            }
            Err(err) => warn!(error = %err, "failed to start fallback kill command"),
        }
    }

    #[doc(hidden)]
    pub async fn install(&self, handle: DeployHandle) {
        *self.current.lock().await = Some(handle);
    }
}

async fn report(outbound: &Outbound, status: DeployStatus) {
    match &status {
        DeployStatus::KillFailed { .. } | DeployStatus::StartFailed { .. } => {
            warn!(%status, "deploy")
        }
        _ => info!(%status, "deploy"),
    }
    if outbound.send(Frame::DeployStatus(status)).await.is_err() {
        debug!("client gone; deploy status not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn failed_kill_runs_fallback_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("fallback-ran");

        let (kill_tx, kill_rx) = oneshot::channel::<oneshot::Sender<io::Result<()>>>();
        let task = tokio::spawn(async move {
            if let Ok(reply) = kill_rx.await {
                let _ = reply.send(Err(io::Error::other("operation not permitted")));
            }
        });

        let sup = DeploySupervisor::new(Duration::from_millis(10));
        sup.install(DeployHandle::from_parts("stubborn", kill_tx, task))
            .await;

        let (outbound, mut rx) = Outbound::channel(16);
        let kill_cmd = format!("touch '{}'", marker.display());
        sup.deploy("true", Some(&kill_cmd), &outbound).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            Frame::DeployStatus(DeployStatus::KillFailed {
                error: "operation not permitted".into()
            })
        );

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !marker.exists() {
            assert!(tokio::time::Instant::now() < deadline, "fallback kill never ran");
            sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn finished_handle_is_not_killed() {
        let (kill_tx, _kill_rx) = oneshot::channel();
        let task = tokio::spawn(async {});
        // let the task finish
        sleep(Duration::from_millis(20)).await;

        let sup = DeploySupervisor::new(Duration::from_millis(1));
        sup.install(DeployHandle::from_parts("done", kill_tx, task)).await;

        let (outbound, mut rx) = Outbound::channel(16);
        sup.deploy("true", None, &outbound).await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            Frame::DeployStatus(DeployStatus::Started { .. })
        ));
    }
}
