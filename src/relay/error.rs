//! Error types for the relays

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON encoding or parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The connection is closed
    #[error("Connection closed")]
    Closed,
}
