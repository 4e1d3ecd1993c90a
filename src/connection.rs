//! Connection lifecycle
//!
//! Drives one client connection from accept to close: split the stream, spawn
//! the write task, run the login handshake, then loop reading framed records
//! and handing chat lines to the dispatcher. Every exit path (peer EOF, read
//! failure, server shutdown) funnels into the same cleanup sequence.
//!
//! Generic over the stream type so tests can drive a connection over an
//! in-memory duplex pipe instead of a TCP socket.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::broadcast::Broadcaster;
use crate::dispatch::Dispatcher;
use crate::envelope::{self, DecodeError, Envelope};
use crate::error::AppError;
use crate::handshake;
use crate::registry::Registry;
use crate::types::ConnectionId;

/// Per-connection outbound channel capacity
const OUTBOUND_BUFFER: usize = 32;

/// Shared handles every connection task needs
#[derive(Clone)]
pub struct ServerContext {
    pub registry: Arc<Registry>,
    pub broadcaster: Broadcaster,
    pub dispatcher: Arc<Dispatcher>,
    pub shutdown: watch::Receiver<bool>,
}

/// Handle one client connection for its whole lifetime
///
/// Returns an error only when the login handshake is rejected; a normal
/// disconnect of an active session is a state transition, not an error.
pub async fn handle_connection<S>(
    stream: S,
    peer: String,
    ctx: ServerContext,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let id = ConnectionId::new();
    debug!("Connection {} opened from {}", id, peer);

    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut lines = BufReader::new(read_half).lines();

    // Write task: drain the outbound channel onto the socket. Exits when all
    // senders are dropped or the socket dies; the closed channel is how the
    // rest of the server discovers this connection is gone.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(OUTBOUND_BUFFER);
    let write_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let record = match envelope::encode(&msg) {
                Ok(record) => record,
                Err(e) => {
                    error!("Failed to encode envelope: {}", e);
                    continue;
                }
            };
            if write_half.write_all(record.as_bytes()).await.is_err() {
                break;
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut shutdown = ctx.shutdown.clone();

    // Handshake gate: nothing reaches the dispatcher before a valid login
    let session = tokio::select! {
        result = handshake::handshake(&mut lines, id, &outbound_tx, &ctx.registry, &ctx.broadcaster) => {
            match result {
                Ok(session) => session,
                Err(e) => {
                    info!("Connection {} from {} rejected: {}", id, peer, e);
                    let _ = outbound_tx.send(Envelope::error(format!("Login failed: {}", e))).await;
                    drop(outbound_tx);
                    let _ = write_task.await;
                    return Err(e.into());
                }
            }
        }
        _ = shutdown.changed() => {
            debug!("Connection {} closed before login: server shutting down", id);
            drop(outbound_tx);
            let _ = write_task.await;
            return Ok(());
        }
    };

    info!("Session active: {} ({})", session.username, id);

    // Read loop: one framed record per iteration until EOF, read failure, or
    // server shutdown.
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match envelope::decode(&line) {
                            Ok(Envelope::ChatMessage { message, .. }) => {
                                ctx.dispatcher.dispatch(&session, &message).await;
                            }
                            Ok(_) => {
                                let _ = session.send(Envelope::error("Unexpected message type")).await;
                            }
                            Err(DecodeError::MissingType) => {
                                debug!("Ignoring untyped record from {}", session.username);
                            }
                            Err(e) => {
                                warn!("Malformed record from {}: {}", session.username, e);
                                let _ = session
                                    .send(Envelope::error(format!("Malformed message: {}", e)))
                                    .await;
                            }
                        }
                    }
                    Ok(None) => {
                        debug!("Peer {} closed the connection", session.username);
                        break;
                    }
                    Err(e) => {
                        debug!("Read failed for {}: {}", session.username, e);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("Closing connection {}: server shutting down", id);
                break;
            }
        }
    }

    // Cleanup, identical for every exit cause. The username is captured from
    // our own session record before removal so the departure notice carries
    // the real name even if a broadcast path already removed us.
    let username = session.username.clone();
    ctx.registry.remove(id).await;
    drop(session);
    drop(outbound_tx);
    let _ = write_task.await;

    info!("Session closed: {} ({})", username, id);
    ctx.broadcaster
        .broadcast(
            &Envelope::notification(format!("{} has left the chat", username)),
            None,
        )
        .await;

    Ok(())
}
