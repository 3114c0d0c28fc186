//! dashlink - resilient WebSocket link for dashboard backends
//!
//! Holds a live connection to an event feed or MCP server endpoint:
//! - Automatic reconnect with capped exponential backoff
//! - Heartbeat probing to detect half-open sockets
//! - Listener registry for inbound messages
//! - YAML configuration with environment overrides

pub mod client;
pub mod config;
pub mod error;

pub use client::ResilientClient;
pub use config::ClientConfig;
pub use error::AppError;
