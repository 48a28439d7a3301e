// src/transport/mod.rs

//! Frame plumbing over one websocket connection.
//!
//! Each connection gets exactly one writer task draining a bounded outbound
//! queue, and one reader task decoding incoming frames. Producers only ever
//! touch the queue, so frames can't interleave on the wire.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, SyncdsError};
use crate::protocol::{Frame, MAX_FRAME_SIZE};

/// Largest websocket message either side accepts; one message is one frame.
pub const MAX_MESSAGE_SIZE: usize = MAX_FRAME_SIZE;

/// How long a cancelled writer keeps flushing frames queued before the
/// cancel.
const FLUSH_ON_CANCEL: Duration = Duration::from_secs(1);

const OUTBOUND_QUEUE: usize = 64;
const INBOUND_QUEUE: usize = 64;

/// Websocket settings shared by client and server.
pub fn ws_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_MESSAGE_SIZE);
    config.max_frame_size = Some(MAX_MESSAGE_SIZE);
    config
}

/// Cloneable handle onto a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Frame>,
}

impl Outbound {
    /// New handle plus the receiving end the writer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a frame; waits while the queue is full.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| SyncdsError::ConnectionClosed("outbound queue closed".into()))
    }

    /// True if both handles feed the same connection.
    pub fn same_channel(&self, other: &Outbound) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// Drain `rx` into `sink`, one websocket binary message per frame.
///
/// Stops when every [`Outbound`] is dropped or on the first write error
/// (which cancels `cancel`). On cancel, frames queued before it are still
/// written for up to [`FLUSH_ON_CANCEL`] so final status reports reach the
/// peer.
pub fn spawn_writer<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    rx.close();
                    let flush = async {
                        while let Some(frame) = rx.recv().await {
                            if write_frame(&mut sink, frame).await.is_err() {
                                break;
                            }
                        }
                    };
                    if timeout(FLUSH_ON_CANCEL, flush).await.is_err() {
                        debug!("queued frames not flushed before timeout");
                    }
                    break;
                }
                frame = rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            if let Err(err) = write_frame(&mut sink, frame).await {
                warn!(error = %err, "websocket write failed");
                cancel.cancel();
                break;
            }
        }

        if let Err(err) = sink.close().await {
            debug!(error = %err, "websocket close failed");
        }
        debug!("writer loop finished");
    })
}

/// Encode and send one frame. Frames that fail to encode are dropped.
async fn write_frame<S>(sink: &mut S, frame: Frame) -> std::result::Result<(), tungstenite::Error>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match frame.encode() {
        Ok(bytes) => sink.send(Message::Binary(bytes)).await,
        Err(err) => {
            error!(kind = frame.kind(), error = %err, "failed to encode frame; dropping");
            Ok(())
        }
    }
}

/// Decode binary messages from `stream` into `tx`.
///
/// Undecodable frames are skipped. A read error, a close frame, or the end
/// of the stream cancels `cancel`, which is how the owning side learns the
/// connection is gone.
pub fn spawn_reader<S>(
    mut stream: S,
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = stream.next() => msg,
            };

            match msg {
                Some(Ok(Message::Binary(bytes))) => match Frame::decode(&bytes) {
                    Ok(frame) => {
                        let delivered = tokio::select! {
                            _ = cancel.cancelled() => false,
                            res = tx.send(frame) => res.is_ok(),
                        };
                        if !delivered {
                            break;
                        }
                    }
                    Err(err) => warn!(len = bytes.len(), error = %err, "skipping undecodable frame"),
                },
                Some(Ok(Message::Text(text))) => {
                    debug!(len = text.len(), "ignoring text message");
                }
                Some(Ok(Message::Close(reason))) => {
                    info!(?reason, "connection closed by peer");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "websocket read failed");
                    break;
                }
                None => {
                    info!("connection stream ended");
                    break;
                }
            }
        }

        cancel.cancel();
        debug!("reader loop finished");
    })
}

/// An established connection: outbound queue, inbound frames and the two
/// loops serving them.
#[derive(Debug)]
pub struct Connection {
    pub outbound: Outbound,
    pub inbound: mpsc::Receiver<Frame>,
    /// Cancelled when either loop fails or the peer goes away.
    pub cancel: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Split `ws` and start its reader and writer loops.
    ///
    /// `cancel` is typically a child of a process-wide token.
    pub fn spawn<T>(ws: WebSocketStream<T>, cancel: CancellationToken) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let (outbound, out_rx) = Outbound::channel(OUTBOUND_QUEUE);
        let (in_tx, inbound) = mpsc::channel(INBOUND_QUEUE);

        let writer = spawn_writer(sink, out_rx, cancel.clone());
        let reader = spawn_reader(stream, in_tx, cancel.clone());

        Self {
            outbound,
            inbound,
            cancel,
            reader,
            writer,
        }
    }

    /// Stop both loops and wait for them.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        drop(self.outbound);
        for (name, task) in [("reader", self.reader), ("writer", self.writer)] {
            if let Err(err) = task.await {
                warn!(task = name, error = %err, "connection task failed");
            }
        }
    }
}
