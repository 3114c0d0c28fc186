//! Connection error types
//!
//! All client-side failures are wrapped in the ConnectionError enum.
//! Most of them never reach the caller: the connection task logs them and
//! schedules a reconnect instead.

use thiserror::Error;

/// Errors produced while opening or driving a WebSocket connection
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Connection to the server failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Network operation timed out
    #[error("Network timeout after {0}ms")]
    NetworkTimeout(u64),

    /// URL could not be parsed or has an unsupported scheme
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A configured header name or value is not valid HTTP
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    /// WebSocket protocol error (boxed to reduce enum size)
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// The connection task has shut down and no longer accepts commands
    #[error("Client is closed")]
    ClientClosed,

    /// Outbound payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectionError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ConnectionError::WebSocket(Box::new(e))
    }
}

/// Result type alias for client operations
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;
