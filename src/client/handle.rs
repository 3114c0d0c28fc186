//! Public client handle
//!
//! `ResilientClient` is a cheap, cloneable handle to one connection task.
//! Dropping the last handle shuts the task down and closes the socket.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::client::connection::{Command, ConnectionTask, Shared};
use crate::client::errors::{ConnectionError, ConnectionResult};
use crate::client::listeners::ListenerId;
use crate::client::types::{ConnectionEvent, ConnectionState, InboundMessage, OutboundMessage};
use crate::config::logging::redact_headers;
use crate::config::{constants, sanitize, ClientConfig};
use crate::error::Result;

/// Self-healing WebSocket client
///
/// ```ignore
/// let client = ResilientClient::spawn(ClientConfig::new("wss://mcp.example.com/events"))?;
/// client.add_listener(|msg| tracing::info!(?msg, "inbound")).await?;
/// client.send_json(&serde_json::json!({"type": "subscribe", "topic": "okrs"}))?;
/// ```
#[derive(Clone)]
pub struct ResilientClient {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    config: Arc<ClientConfig>,
}

impl ResilientClient {
    /// Validate `config` and start the connection task. Nothing is opened
    /// until `connect()` or `add_listener()` is called.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let config = Arc::new(config);
        let shared = Arc::new(Shared::new(constants::ws_event_channel_capacity()));
        let (commands, rx) = mpsc::unbounded_channel();

        let token = config
            .connection
            .auth_token
            .as_deref()
            .map(|t| sanitize(t).to_string())
            .unwrap_or_else(|| "none".to_string());

        tracing::info!(
            name = %config.connection.name,
            url = %config.connection.url,
            auth_token = %token,
            headers = ?redact_headers(&config.connection.headers),
            policy = ?config.send.policy,
            max_attempts = config.reconnect.max_attempts,
            "Spawning resilient client"
        );

        let task = ConnectionTask::new(Arc::clone(&config), Arc::clone(&shared), rx);
        tokio::spawn(task.run());

        Ok(Self {
            commands,
            shared,
            config,
        })
    }

    /// Open the connection; no-op while connecting, open or reconnecting
    ///
    /// From `Failed` or `Closed` this starts over with a fresh attempt budget.
    pub fn connect(&self) -> ConnectionResult<()> {
        self.command(Command::Connect)
    }

    /// Close the socket, cancel pending reconnect/heartbeat timers, and
    /// drop all listeners and queued messages
    pub async fn disconnect(&self) -> ConnectionResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.command(Command::Disconnect(done_tx))?;
        done_rx.await.map_err(|_| ConnectionError::ClientClosed)
    }

    /// Best-effort send
    ///
    /// Delivered immediately when open; otherwise queued or dropped per
    /// the configured `SendPolicy`. Transport errors are never returned here.
    pub fn send(&self, msg: impl Into<OutboundMessage>) -> ConnectionResult<()> {
        self.command(Command::Send(msg.into()))
    }

    /// Serialize `value` as JSON and `send` it
    pub fn send_json<T: Serialize>(&self, value: &T) -> ConnectionResult<()> {
        self.send(OutboundMessage::from_json(value)?)
    }

    /// Register a listener for inbound data messages and make sure a
    /// connection is active
    pub async fn add_listener<F>(&self, listener: F) -> ConnectionResult<ListenerId>
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let id = self.shared.listeners.add(Arc::new(listener)).await;
        // The task ignores this while a connection is already active
        self.connect()?;
        Ok(id)
    }

    /// Returns false if `id` was not registered. Does not affect the connection.
    pub async fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id).await
    }

    pub async fn listener_count(&self) -> usize {
        self.shared.listeners.len().await
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Watch receiver for state changes (only the latest state is retained)
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for_state<P>(&self, predicate: P) -> ConnectionResult<ConnectionState>
    where
        P: FnMut(&ConnectionState) -> bool,
    {
        let mut rx = self.watch_state();
        let state = rx
            .wait_for(predicate)
            .await
            .map_err(|_| ConnectionError::ClientClosed)?;
        Ok(*state)
    }

    /// Every lifecycle event from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Messages waiting for the socket to open
    pub fn queued_messages(&self) -> usize {
        self.shared.queued.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn command(&self, cmd: Command) -> ConnectionResult<()> {
        self.commands
            .send(cmd)
            .map_err(|_| ConnectionError::ClientClosed)
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("name", &self.config.connection.name)
            .field("state", &self.state())
            .finish()
    }
}
