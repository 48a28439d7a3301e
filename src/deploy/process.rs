// src/deploy/process.rs

use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{DeployStatus, Frame};
use crate::transport::Outbound;

/// Reply channel for a kill request.
pub type KillRequest = oneshot::Sender<io::Result<()>>;

/// Build a shell invocation for `cmd` appropriate for the platform.
pub fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

/// A launched deploy process.
///
/// The OS process and its pipes belong to a runner task; the handle can
/// only ask that task to kill it.
#[derive(Debug)]
pub struct DeployHandle {
    command: String,
    kill_tx: Option<oneshot::Sender<KillRequest>>,
    task: JoinHandle<()>,
}

impl DeployHandle {
    /// Launch `cmd` through the shell and start streaming its output to
    /// `outbound`.
    pub fn spawn(cmd: &str, workdir: Option<&Path>, outbound: Outbound) -> io::Result<Self> {
        let mut command = shell_command(cmd);
        if let Some(dir) = workdir {
            command.current_dir(dir);
        }
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        info!(cmd = %cmd, pid = ?child.id(), "deploy process started");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (kill_tx, kill_rx) = oneshot::channel();
        let task = tokio::spawn(run_process(
            cmd.to_string(),
            child,
            stdout,
            stderr,
            outbound,
            kill_rx,
        ));

        Ok(Self {
            command: cmd.to_string(),
            kill_tx: Some(kill_tx),
            task,
        })
    }

    /// Build a handle around an arbitrary runner task. Used to exercise the
    /// supervisor without real processes.
    #[doc(hidden)]
    pub fn from_parts(
        command: impl Into<String>,
        kill_tx: oneshot::Sender<KillRequest>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            command: command.into(),
            kill_tx: Some(kill_tx),
            task,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// True until the process has exited and its output has been drained.
    pub fn is_live(&self) -> bool {
        !self.task.is_finished()
    }

    /// Kill the process and wait until it is gone.
    ///
    /// A process that already exited counts as killed.
    pub async fn kill(&mut self) -> io::Result<()> {
        let Some(kill_tx) = self.kill_tx.take() else {
            return Ok(());
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if kill_tx.send(reply_tx).is_err() {
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }
}

/// Report the start, then forward stdout lines, stderr lines and the exit
/// status, in that order.
///
/// A kill request is honoured at any point.
async fn run_process<O, E>(
    command: String,
    mut child: Child,
    stdout: Option<O>,
    stderr: Option<E>,
    outbound: Outbound,
    mut kill_rx: oneshot::Receiver<KillRequest>,
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let started = Frame::DeployStatus(DeployStatus::Started { command });
    if outbound.send(started).await.is_err() {
        debug!("client gone; deploy start not delivered");
    }

    if let Some(stdout) = stdout {
        let reader = BufReader::new(stdout);
        if let Some(req) = pump(reader, Stream::Stdout, &outbound, &mut kill_rx).await {
            return kill_child(child, req).await;
        }
    }

    if let Some(stderr) = stderr {
        let reader = BufReader::new(stderr);
        if let Some(req) = pump(reader, Stream::Stderr, &outbound, &mut kill_rx).await {
            return kill_child(child, req).await;
        }
    }

    let status = tokio::select! {
        status = child.wait() => status,
        req = &mut kill_rx => return kill_child(child, req.ok()).await,
    };

    let status = match status {
        Ok(status) => status,
        Err(err) => {
            warn!(error = %err, "waiting for deploy process failed");
            return;
        }
    };

    info!(
        exit_code = ?status.code(),
        success = status.success(),
        "deploy process exited"
    );
    let frame = Frame::DeployStatus(DeployStatus::Exited {
        code: status.code(),
        success: status.success(),
    });
    if outbound.send(frame).await.is_err() {
        debug!("client gone; exit status not delivered");
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Forward lines until EOF. Returns early with the kill request if one
/// arrives (`None` inside means the handle was dropped).
///
/// Lines are split on `\n` and decoded lossily, so binary output never
/// stops the stream.
async fn pump<R>(
    mut reader: BufReader<R>,
    stream: Stream,
    outbound: &Outbound,
    kill_rx: &mut oneshot::Receiver<KillRequest>,
) -> Option<Option<KillRequest>>
where
    R: AsyncRead + Unpin,
{
    let mut delivering = true;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            req = &mut *kill_rx => return Some(req.ok()),
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => return None,
            Ok(_) => {}
            Err(err) => {
                warn!(?stream, error = %err, "reading deploy output failed");
                return None;
            }
        }

        let line = String::from_utf8_lossy(trim_newline(&buf)).into_owned();
        let frame = match stream {
            Stream::Stdout => {
                info!("[stdout] {}", line);
                Frame::DeployStdout(line)
            }
            Stream::Stderr => {
                info!("[stderr] {}", line);
                Frame::DeployStderr(line)
            }
        };

        // Keep draining after the client is gone so the pipe never fills.
        if delivering {
            tokio::select! {
                req = &mut *kill_rx => return Some(req.ok()),
                sent = outbound.send(frame) => {
                    if sent.is_err() {
                        debug!("client gone; deploy output no longer forwarded");
                        delivering = false;
                    }
                }
            }
        }
    }
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

async fn kill_child(mut child: Child, req: Option<KillRequest>) {
    let res = match child.try_wait() {
        Ok(Some(_)) => Ok(()),
        _ => child.kill().await,
    };
    match &res {
        Ok(()) => info!("deploy process killed"),
        Err(err) => warn!(error = %err, "failed to kill deploy process"),
    }
    if let Some(reply) = req {
        let _ = reply.send(res);
    }
}

#[cfg(test)]
mod tests {
    use super::trim_newline;

    #[test]
    fn trims_unix_and_windows_line_endings() {
        assert_eq!(trim_newline(b"abc\n"), b"abc");
        assert_eq!(trim_newline(b"abc\r\n"), b"abc");
        assert_eq!(trim_newline(b"abc"), b"abc");
        assert_eq!(trim_newline(b"\n"), b"");
    }
}
