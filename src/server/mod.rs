// src/server/mod.rs

//! Server side: accept sync connections, apply batches, run deploys.

pub mod connection;
pub mod materializer;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::errors::Result;

pub use connection::handle_connection;
pub use materializer::Materializer;
pub use service::SyncService;

/// Bind the configured address and serve until Ctrl-C.
///
/// On Ctrl-C the running deploy process is killed before returning.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.listen).await?;
    info!(
        addr = %listener.local_addr()?,
        base_dir = ?config.base_dir,
        "sync server listening"
    );

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

    let service = Arc::new(SyncService::new(&config));
    serve(listener, service, shutdown).await
}

/// Accept connections on `listener` until `shutdown` is cancelled, then
/// stop the deploy and close every connection.
pub async fn serve(
    listener: TcpListener,
    service: Arc<SyncService>,
    shutdown: CancellationToken,
) -> Result<()> {
    let connections = CancellationToken::new();
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                debug!(%peer, "incoming connection");
                let service = Arc::clone(&service);
                let cancel = connections.child_token();
                tasks.spawn(async move {
                    if let Err(err) = handle_connection(stream, service, cancel).await {
                        warn!(%peer, error = %err, "connection failed");
                    }
                });
            }
            Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(err) = res {
                    warn!(error = %err, "connection task panicked");
                }
            }
        }
    }

    service.shutdown().await;
    connections.cancel();

    let drain = async {
        while tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(Duration::from_secs(2), drain).await.is_err() {
        warn!("connections did not close in time");
        tasks.abort_all();
    }

    info!("sync server stopped");
    Ok(())
}
