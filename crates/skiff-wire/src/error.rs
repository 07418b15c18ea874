//! Errors from the wire layer.

use thiserror::Error;

/// Errors from the transport and envelope codec.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Send failed: {0}")]
    Send(#[source] std::io::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Payload contains a zero byte")]
    NulInPayload,
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
    #[error("Unknown message kind: {0}")]
    UnknownMessage(String),
    #[error("Message server closed")]
    ServerClosed,
}

/// Alias for wire results.
pub type WireResult<T> = Result<T, WireError>;
