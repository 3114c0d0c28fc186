//! Resilient WebSocket client
//!
//! Keeps one live connection to a server endpoint and recovers from drops
//! without the caller managing retry state:
//! - exponential backoff with jitter and a capped number of attempts
//! - heartbeat probes that close half-open sockets
//! - listener fan-out for inbound messages
//! - best-effort sends with an explicit queue-or-drop policy

pub mod backoff;
mod connection;
pub mod errors;
mod handle;
pub mod heartbeat;
pub mod listeners;
pub mod outbox;
pub mod types;
pub mod websocket;

pub use backoff::{backoff_delay, delay_with_jitter, reconnect_with_backoff, ReconnectConfig};
pub use connection::HEARTBEAT_TIMEOUT_CLOSE_CODE;
pub use errors::{ConnectionError, ConnectionResult};
pub use handle::ResilientClient;
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, HeartbeatProbe};
pub use listeners::{Listener, ListenerId};
pub use types::{
    ConnectionConfig, ConnectionEvent, ConnectionState, EventKind, InboundMessage,
    OutboundMessage, SendConfig, SendPolicy,
};
pub use websocket::{connect_tls, WsStream};
