//! Session handshake
//!
//! The first record from a new connection must be a `login` envelope with a
//! non-empty username, arriving within the handshake window. Nothing else is
//! accepted: a wrong type, malformed bytes, a closed stream, or a timeout
//! all reject the connection before it ever enters the registry.
//!
//! State machine: CONNECTED → AWAITING_LOGIN → {ACTIVE | REJECTED}; only an
//! ACTIVE session runs the message loop, and a rejected connection generates
//! no departure notice.

use std::time::Duration;

use tokio::io::{AsyncBufRead, Lines};
use tokio::sync::mpsc;
use tracing::info;

use crate::broadcast::Broadcaster;
use crate::envelope::{self, Envelope};
use crate::error::HandshakeError;
use crate::registry::Registry;
use crate::session::Session;
use crate::types::ConnectionId;

/// How long a new connection may take to present its login
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Read the first record and validate it as a login
///
/// Returns the trimmed username on success.
pub async fn await_login<R>(
    lines: &mut Lines<R>,
    timeout: Duration,
) -> Result<String, HandshakeError>
where
    R: AsyncBufRead + Unpin,
{
    let line = match tokio::time::timeout(timeout, lines.next_line()).await {
        Err(_) => return Err(HandshakeError::TimedOut),
        Ok(Err(_)) => return Err(HandshakeError::ConnectionClosed),
        Ok(Ok(None)) => return Err(HandshakeError::ConnectionClosed),
        Ok(Ok(Some(line))) => line,
    };

    match envelope::decode(&line) {
        Ok(Envelope::Login { username }) => {
            let username = username.trim().to_string();
            if username.is_empty() {
                Err(HandshakeError::EmptyUsername)
            } else {
                Ok(username)
            }
        }
        Ok(_) => Err(HandshakeError::NotLogin),
        Err(e) => Err(HandshakeError::Malformed(e)),
    }
}

/// Run the full login sequence for a new connection
///
/// On success the new connection is welcomed directly, its arrival is
/// broadcast to all existing sessions, and the session is registered. On
/// failure the connection never touches the registry; the caller notifies
/// the peer and closes.
pub async fn handshake<R>(
    lines: &mut Lines<R>,
    id: ConnectionId,
    outbound: &mpsc::Sender<Envelope>,
    registry: &Registry,
    broadcaster: &Broadcaster,
) -> Result<Session, HandshakeError>
where
    R: AsyncBufRead + Unpin,
{
    let username = await_login(lines, LOGIN_TIMEOUT).await?;
    let session = Session::new(id, username.clone(), outbound.clone());

    info!("Connection {} logged in as '{}'", id, username);

    let _ = session
        .send(Envelope::notification(format!(
            "Welcome to the chat, {}!",
            username
        )))
        .await;

    // Broadcast before inserting so the newcomer is naturally excluded
    broadcaster
        .broadcast(
            &Envelope::notification(format!("{} has joined the chat", username)),
            None,
        )
        .await;

    registry.add(session.clone()).await;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::DecodeError;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn lines_from(input: &str) -> Lines<BufReader<tokio::io::DuplexStream>> {
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(input.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);
        BufReader::new(server).lines()
    }

    #[tokio::test]
    async fn test_valid_login() {
        let mut lines = lines_from("{\"type\": \"login\", \"username\": \"alice\"}\n").await;
        let username = await_login(&mut lines, LOGIN_TIMEOUT).await.unwrap();
        assert_eq!(username, "alice");
    }

    #[tokio::test]
    async fn test_username_is_trimmed() {
        let mut lines = lines_from("{\"type\": \"login\", \"username\": \"  alice \"}\n").await;
        let username = await_login(&mut lines, LOGIN_TIMEOUT).await.unwrap();
        assert_eq!(username, "alice");
    }

    #[tokio::test]
    async fn test_empty_username_rejected() {
        let mut lines = lines_from("{\"type\": \"login\", \"username\": \"   \"}\n").await;
        let result = await_login(&mut lines, LOGIN_TIMEOUT).await;
        assert!(matches!(result, Err(HandshakeError::EmptyUsername)));
    }

    #[tokio::test]
    async fn test_non_login_first_message_rejected() {
        let mut lines =
            lines_from("{\"type\": \"chat_message\", \"message\": \"hi\"}\n").await;
        let result = await_login(&mut lines, LOGIN_TIMEOUT).await;
        assert!(matches!(result, Err(HandshakeError::NotLogin)));
    }

    #[tokio::test]
    async fn test_malformed_first_message_rejected() {
        let mut lines = lines_from("this is not json\n").await;
        let result = await_login(&mut lines, LOGIN_TIMEOUT).await;
        assert!(matches!(
            result,
            Err(HandshakeError::Malformed(DecodeError::Syntax(_)))
        ));
    }

    #[tokio::test]
    async fn test_closed_stream_rejected() {
        let mut lines = lines_from("").await;
        let result = await_login(&mut lines, LOGIN_TIMEOUT).await;
        assert!(matches!(result, Err(HandshakeError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_login_timeout() {
        // Keep the client end open but silent
        let (_client, server) = tokio::io::duplex(1024);
        let mut lines = BufReader::new(server).lines();
        let result = await_login(&mut lines, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(HandshakeError::TimedOut)));
    }

    #[tokio::test]
    async fn test_handshake_welcomes_and_registers() {
        let registry = Arc::new(Registry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        // An existing session that should hear the join notice
        let (existing_tx, mut existing_rx) = mpsc::channel(8);
        let existing = Session::new(ConnectionId::new(), "bob".to_string(), existing_tx);
        registry.add(existing).await;

        let mut lines = lines_from("{\"type\": \"login\", \"username\": \"alice\"}\n").await;
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let id = ConnectionId::new();

        let session = handshake(&mut lines, id, &outbound_tx, &registry, &broadcaster)
            .await
            .unwrap();

        assert_eq!(session.username, "alice");
        assert!(registry.contains(id).await);

        match outbound_rx.try_recv().unwrap() {
            Envelope::ServerNotification { message, .. } => {
                assert!(message.contains("Welcome"));
                assert!(message.contains("alice"));
            }
            other => panic!("Unexpected envelope: {:?}", other),
        }
        // The newcomer does not receive its own join notice
        assert!(outbound_rx.try_recv().is_err());

        match existing_rx.try_recv().unwrap() {
            Envelope::ServerNotification { message, .. } => {
                assert_eq!(message, "alice has joined the chat");
            }
            other => panic!("Unexpected envelope: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_handshake_never_registers() {
        let registry = Arc::new(Registry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        let mut lines = lines_from("{\"type\": \"chat_message\", \"message\": \"hi\"}\n").await;
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);

        let result = handshake(
            &mut lines,
            ConnectionId::new(),
            &outbound_tx,
            &registry,
            &broadcaster,
        )
        .await;

        assert!(result.is_err());
        assert!(registry.is_empty().await);
    }
}
