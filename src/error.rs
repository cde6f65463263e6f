//! Error types
//!
//! Registry and publisher operations never fail; errors here come from the
//! transport (socket, WebSocket handshake, JSON framing).

use thiserror::Error;

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    /// Socket I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection rejected because `max_connections` was reached
    #[error("Connection limit reached ({0})")]
    ConnectionLimit(usize),
}

/// Result alias for transport operations
pub type Result<T> = std::result::Result<T, Error>;
