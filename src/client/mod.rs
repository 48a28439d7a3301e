// src/client/mod.rs

//! Client side: watch, collect, diff and push.

pub mod session;

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async_with_config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::collect::spawn_collector;
use crate::config::ClientConfig;
use crate::errors::{Result, SyncdsError};
use crate::fs::RealFileSystem;
use crate::protocol::WS_PATH;
use crate::transport::{Connection, ws_config};
use crate::types::ChangeRecord;
use crate::watch::{RecursiveWatcher, WatchFilter};

pub use session::Session;

/// Watch and sync until Ctrl-C (`Ok`) or until the connection or the
/// watcher fails (`Err`). There is no reconnect.
pub async fn start_client(config: ClientConfig) -> Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("interrupt received, shutting down");
            shutdown.cancel();
        });
    }
    run_client(config, shutdown).await
}

/// Like [`start_client`], but stops when `shutdown` is cancelled instead of
/// on Ctrl-C.
pub async fn run_client(config: ClientConfig, shutdown: CancellationToken) -> Result<()> {
    let filter = WatchFilter::new(config.rules.clone());
    let (watcher, events) = RecursiveWatcher::start(&config.base_dir, filter.predicate())?;

    let url = format!("ws://{}{}", config.server, WS_PATH);
    let (ws, _) = match connect_async_with_config(url.as_str(), Some(ws_config()), false).await {
        Ok(connected) => connected,
        Err(err) => {
            watcher.stop().await;
            return Err(err.into());
        }
    };
    info!(%url, base_dir = ?config.base_dir, "connected to sync server");

    let conn = Connection::spawn(ws, shutdown.child_token());
    let mut session = Session::new(conn, Arc::new(RealFileSystem), config.base_dir.clone());

    let (batch_tx, mut batches) = mpsc::channel(8);
    let collector = spawn_collector(events, config.interval, batch_tx, shutdown.child_token());

    let result = run_loop(&mut session, &mut batches, &filter, &shutdown).await;
    let interrupted = shutdown.is_cancelled();

    shutdown.cancel();
    watcher.stop().await;
    let collected = collector.await;
    session.close().await;

    if interrupted {
        info!("client stopped");
        return Ok(());
    }
    match (result, collected) {
        // The collector knows why the batch stream ended.
        (Err(_), Ok(Err(err))) => Err(err),
        (result, _) => result,
    }
}

async fn run_loop(
    session: &mut Session,
    batches: &mut mpsc::Receiver<Vec<ChangeRecord>>,
    filter: &WatchFilter,
    shutdown: &CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            frame = session.next_frame() => match frame {
                Some(frame) => session.handle_frame(frame),
                None => {
                    return Err(SyncdsError::ConnectionClosed("server went away".into()));
                }
            },
            batch = batches.recv() => match batch {
                Some(batch) => {
                    info!(files = batch.len(), "changes detected");
                    session.sync_batch(batch, filter).await?;
                }
                None => return Err(SyncdsError::Other(anyhow!("change collector stopped"))),
            },
        }
    }
}
