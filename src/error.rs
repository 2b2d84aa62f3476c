//! Error types for the relay
//!
//! Defines application-level errors and outbound queue errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Transport errors and timeouts are fatal to a single connection only.
/// Nothing here is ever reported to a client over the wire.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error, including oversized frames (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The room registry actor is gone
    #[error("Room registry closed")]
    RegistryClosed,

    /// The room actor stopped before handling the request
    #[error("Room closed: {0}")]
    RoomClosed(String),

    /// No pong arrived within the read deadline
    #[error("Read deadline exceeded")]
    ReadTimeout,

    /// A frame could not be written within the write deadline
    #[error("Write deadline exceeded")]
    WriteTimeout,

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Outbound queue errors
///
/// Occurs when enqueueing onto a connection's outbound queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The queue has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The queue is at capacity
    #[error("Queue full")]
    QueueFull,
}
