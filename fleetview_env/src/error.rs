//! Error types for the FleetView environment abstraction.

use thiserror::Error;

/// Errors that can occur in the channel layer.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel has been closed; no further events can be sent.
    #[error("Channel closed")]
    Closed,

    /// Transport-level send failure (buffer full, connection lost, etc.)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Payload serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ChannelError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a serialization error.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }
}
