//! Real-Time Chat Hub Library
//!
//! A TCP chat hub exchanging newline-delimited JSON envelopes, with chat
//! lines optionally routed through external NLP collaborators before
//! broadcast.
//!
//! # Features
//! - Login handshake (username required before any chat traffic)
//! - Line-framed, tagged-envelope wire protocol
//! - Sentiment-tagged broadcast of plain chat messages
//! - `!translate`, `!generate`, and `!ner` commands answered directly
//! - Join/leave notifications
//! - Graceful shutdown interrupting every connection's read loop
//!
//! # Architecture
//! One task per connection plus a write task per connection:
//! - The `Registry` is the only shared mutable state; broadcast paths
//!   iterate over atomic snapshots of it
//! - Each connection owns its socket; everyone else reaches it through its
//!   mpsc write channel, and a closed channel is how peer death is
//!   discovered
//! - NLP collaborators are trait objects behind a narrow request/response
//!   contract; their failures degrade to `error` envelopes
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::watch;
//! use chathub::{handle_connection, Broadcaster, Dispatcher, NlpServices, Registry, ServerContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8888").await.unwrap();
//!     let registry = Arc::new(Registry::new());
//!     let broadcaster = Broadcaster::new(registry.clone());
//!     let nlp = NlpServices::over_http("http://127.0.0.1:8000", std::time::Duration::from_secs(30));
//!     let dispatcher = Arc::new(Dispatcher::new(nlp, broadcaster.clone()));
//!     let (_shutdown_tx, shutdown) = watch::channel(false);
//!     let ctx = ServerContext { registry, broadcaster, dispatcher, shutdown };
//!
//!     while let Ok((stream, peer)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, peer.to_string(), ctx.clone()));
//!     }
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod nlp;
pub mod registry;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use broadcast::Broadcaster;
pub use config::ServerConfig;
pub use connection::{handle_connection, ServerContext};
pub use dispatch::Dispatcher;
pub use envelope::{decode, encode, DecodeError, Envelope, Sentiment};
pub use error::{AppError, HandshakeError, SendError};
pub use nlp::{Entity, HttpNlpService, NlpError, NlpServices};
pub use registry::Registry;
pub use session::Session;
pub use types::ConnectionId;
