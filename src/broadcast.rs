//! Broadcast router
//!
//! Fans an envelope out to every session in a registry snapshot except an
//! optional excluded sender. Per-recipient failure is expected under churn:
//! a recipient whose channel is closed is removed from the registry and
//! delivery continues to the rest.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::registry::Registry;
use crate::types::ConnectionId;

/// Fan-out handle over the shared registry
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// Create a broadcaster over the given registry
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Send an envelope to every live session except `exclude`
    ///
    /// Only `chat_message` and `server_notification` envelopes are eligible;
    /// direct-addressed types are refused. Returns the number of successful
    /// deliveries. A recipient whose write channel is closed is removed from
    /// the registry as a side effect (the removal is idempotent, so racing
    /// cleanup paths are fine).
    pub async fn broadcast(&self, envelope: &Envelope, exclude: Option<ConnectionId>) -> usize {
        if !envelope.is_broadcastable() {
            warn!("Refusing to broadcast direct-addressed envelope: {:?}", envelope);
            return 0;
        }

        let mut delivered = 0;
        for session in self.registry.snapshot().await {
            if Some(session.id) == exclude {
                continue;
            }
            if session.send(envelope.clone()).await.is_ok() {
                delivered += 1;
            } else {
                // Closed channel: the write task is gone, the peer is dead.
                if self.registry.remove(session.id).await.is_some() {
                    debug!(
                        "Removed dead session {} ({}) during broadcast",
                        session.id, session.username
                    );
                }
            }
        }
        delivered
    }
}
