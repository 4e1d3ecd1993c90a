//! Session struct definition
//!
//! Server-side record of an authenticated, live connection: the connection
//! id, the username fixed at login, and the channel to that connection's
//! write task.

use tokio::sync::mpsc;

use crate::envelope::Envelope;
use crate::error::SendError;
use crate::types::ConnectionId;

/// Authenticated connection information
///
/// Created only after a successful handshake. The username is immutable for
/// the life of the session. Cloning is cheap (the sender is a channel
/// handle), which is what makes registry snapshots possible.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique identifier of the underlying connection
    pub id: ConnectionId,
    /// Username fixed at login
    pub username: String,
    /// Session → write task message channel
    sender: mpsc::Sender<Envelope>,
}

impl Session {
    /// Create a new session for a connection that completed the handshake
    pub fn new(id: ConnectionId, username: String, sender: mpsc::Sender<Envelope>) -> Self {
        Self {
            id,
            username,
            sender,
        }
    }

    /// Send an envelope to this session's connection
    ///
    /// Returns an error if the channel is closed, which means the write task
    /// exited because the socket died.
    pub async fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.sender
            .send(envelope)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_send() {
        let (tx, mut rx) = mpsc::channel(8);
        let session = Session::new(ConnectionId::new(), "alice".to_string(), tx);

        session.send(Envelope::error("test")).await.unwrap();

        match rx.recv().await {
            Some(Envelope::Error { message }) => assert_eq!(message, "test"),
            other => panic!("Unexpected envelope: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_send_closed_channel() {
        let (tx, rx) = mpsc::channel(8);
        let session = Session::new(ConnectionId::new(), "alice".to_string(), tx);
        drop(rx);

        let result = session.send(Envelope::error("test")).await;
        assert!(matches!(result, Err(SendError::ChannelClosed)));
    }
}
