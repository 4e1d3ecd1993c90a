//! Error types for the chat hub
//!
//! Defines connection-level errors, handshake rejections, and message send
//! errors. Uses thiserror for ergonomic error definitions.
//!
//! The split follows the protocol's recovery rules: a `DecodeError` is
//! recoverable and reported to the originating connection only, a
//! `HandshakeError` is fatal for that one connection, and a closed channel or
//! IO failure triggers session cleanup without touching other sessions.

use thiserror::Error;

use crate::envelope::DecodeError;

/// Connection-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the underlying stream (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed inbound record (recoverable)
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Login handshake rejected (fatal for the connection)
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
}

/// Reasons a login handshake can be rejected
///
/// Any of these closes the connection before it ever enters the registry.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// First record decoded to something other than a login envelope
    #[error("first message must be a login")]
    NotLogin,

    /// Login carried an empty (or whitespace-only) username
    #[error("username must not be empty")]
    EmptyUsername,

    /// First record did not decode at all
    #[error("malformed login record: {0}")]
    Malformed(#[from] DecodeError),

    /// Stream closed before a login arrived
    #[error("connection closed before login")]
    ConnectionClosed,

    /// No login arrived within the handshake window
    #[error("login timed out")]
    TimedOut,
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels; the
/// receiving write task exits when its socket dies, so a closed channel is
/// how peer death is discovered lazily.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("channel closed")]
    ChannelClosed,
}
