// src/server/connection.rs

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::protocol::{Frame, WS_PATH};
use crate::server::service::SyncService;
use crate::transport::{Connection, ws_config};

/// Upgrade `stream` and serve frames until the client leaves or `cancel`
/// fires.
pub async fn handle_connection(
    stream: TcpStream,
    service: Arc<SyncService>,
    cancel: CancellationToken,
) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let ws = accept_hdr_async_with_config(stream, check_path, Some(ws_config())).await?;
    info!(?peer, "client connected");

    let mut conn = Connection::spawn(ws, cancel);
    service.set_active(conn.outbound.clone());

    loop {
        let frame = tokio::select! {
            _ = conn.cancel.cancelled() => break,
            frame = conn.inbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        debug!(kind = frame.kind(), "received frame");

        match frame {
            Frame::Diff(request) => {
                let response = service.diff(request).await;
                if conn.outbound.send(Frame::DiffResult(response)).await.is_err() {
                    break;
                }
            }
            Frame::Sync(batch) => {
                let deploy = batch
                    .deploy_cmd
                    .clone()
                    .map(|cmd| (cmd, batch.deploy_kill_cmd.clone()));

                let ack = service.apply(batch).await;
                if conn.outbound.send(Frame::SyncResult(ack)).await.is_err() {
                    break;
                }

                if let Some((cmd, kill_cmd)) = deploy {
                    let service = Arc::clone(&service);
                    let outbound = conn.outbound.clone();
                    tokio::spawn(async move {
                        service
                            .deployer()
                            .deploy(&cmd, kill_cmd.as_deref(), &outbound)
                            .await;
                    });
                }
            }
            other => warn!(kind = other.kind(), "unexpected frame from client; ignoring"),
        }
    }

    info!(?peer, "client disconnected");
    service.clear_active(&conn.outbound);
    conn.shutdown().await;
    Ok(())
}

/// Handshake callback: only the sync path may upgrade.
fn check_path(req: &Request, resp: Response) -> std::result::Result<Response, ErrorResponse> {
    if req.uri().path() == WS_PATH {
        return Ok(resp);
    }
    warn!(path = %req.uri().path(), "rejecting upgrade on unknown path");
    let mut err = ErrorResponse::new(Some(format!("no websocket endpoint at {}", req.uri().path())));
    *err.status_mut() = StatusCode::NOT_FOUND;
    Err(err)
}
