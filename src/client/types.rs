//! Common types for the resilient client
//!
//! Connection settings, lifecycle state, events and message payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::client::errors::ConnectionResult;
use crate::config::constants;

// =============================================================================
// Connection Settings
// =============================================================================

/// Where and how to open the socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Name used in logs (e.g., "mcp-feed")
    #[serde(default = "default_name")]
    pub name: String,
    /// WebSocket endpoint (ws:// or wss://)
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` on the upgrade request
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Extra HTTP headers for the upgrade request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// TCP + TLS + upgrade handshake timeout
    #[serde(default = "constants::ws_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_name() -> String {
    "dashlink".to_string()
}

impl ConnectionConfig {
    /// Settings for `url` with every other field at its default
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            url: url.into(),
            auth_token: None,
            headers: BTreeMap::new(),
            connect_timeout_ms: constants::ws_connect_timeout_ms(),
        }
    }
}

/// What happens to a message sent while the socket is not open
///
/// One policy per client, applied to every send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SendPolicy {
    /// Hold in a bounded FIFO and flush in order once open
    #[default]
    Queue,
    /// Log a warning and discard
    Drop,
}

/// Outbound buffering settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendConfig {
    #[serde(default)]
    pub policy: SendPolicy,
    /// Maximum queued messages; the oldest is evicted on overflow
    #[serde(default = "constants::ws_send_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            policy: SendPolicy::default(),
            queue_capacity: constants::ws_send_queue_capacity(),
        }
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    /// Never connected, or intentionally disconnected
    #[default]
    Idle,
    /// First connection attempt in flight
    Connecting,
    /// Socket open and healthy
    Open,
    /// Waiting for or running reconnect attempt `attempt`
    Reconnecting { attempt: u32 },
    /// Peer closed the socket normally; no reconnect
    Closed,
    /// Reconnect cap reached; stays here until `connect()` is called again
    Failed,
}

impl ConnectionState {
    /// True while a socket is open or being opened
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Reconnecting { .. }
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle notification published on the event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum EventKind {
    #[serde(rename = "connecting")]
    Connecting,
    #[serde(rename = "opened")]
    Opened { session: uuid::Uuid },
    #[serde(rename = "closed")]
    Closed { code: Option<u16>, reason: String, normal: bool },
    #[serde(rename = "reconnect_scheduled")]
    ReconnectScheduled { attempt: u32, delay_ms: u64 },
    #[serde(rename = "heartbeat_timeout")]
    HeartbeatTimeout,
    #[serde(rename = "message_dropped")]
    MessageDropped { reason: String },
    #[serde(rename = "failed")]
    Failed { attempts: u32 },
    #[serde(rename = "disconnected")]
    Disconnected,
}

/// Timestamped lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ConnectionEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Data frame received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl InboundMessage {
    /// Text content, if this is a text frame
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InboundMessage::Text(t) => Some(t),
            InboundMessage::Binary(_) => None,
        }
    }

    /// Raw payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            InboundMessage::Text(t) => t.as_bytes(),
            InboundMessage::Binary(b) => b,
        }
    }

    /// Parse the payload as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> ConnectionResult<T> {
        Ok(serde_json::from_slice(self.as_bytes())?)
    }
}

/// Data frame to send to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl OutboundMessage {
    /// Serialize `value` as a JSON text frame
    pub fn from_json<T: Serialize>(value: &T) -> ConnectionResult<Self> {
        Ok(OutboundMessage::Text(serde_json::to_string(value)?))
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        OutboundMessage::Text(s)
    }
}

impl From<&str> for OutboundMessage {
    fn from(s: &str) -> Self {
        OutboundMessage::Text(s.to_string())
    }
}

impl From<Vec<u8>> for OutboundMessage {
    fn from(b: Vec<u8>) -> Self {
        OutboundMessage::Binary(b)
    }
}

impl From<OutboundMessage> for Message {
    fn from(m: OutboundMessage) -> Self {
        match m {
            OutboundMessage::Text(t) => Message::Text(t),
            OutboundMessage::Binary(b) => Message::Binary(b),
        }
    }
}
