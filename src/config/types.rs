//! Configuration types for the resilient client
//!
//! The root `ClientConfig` is loaded from YAML and handed to
//! `ResilientClient::spawn`. Every section except `connection` is optional
//! and falls back to the defaults in `constants`.

use serde::{Deserialize, Serialize};

use crate::client::backoff::ReconnectConfig;
use crate::client::heartbeat::{HeartbeatConfig, HeartbeatProbe};
use crate::client::types::{ConnectionConfig, SendConfig, SendPolicy};
use crate::client::websocket::validate_url;
use crate::error::AppError;

/// Root client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Endpoint and upgrade request settings
    pub connection: ConnectionConfig,
    /// Backoff and retry cap
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Liveness probing
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Behaviour of sends while the socket is down
    #[serde(default)]
    pub send: SendConfig,
}

impl ClientConfig {
    /// Config for `url` with every other setting at its default
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            connection: ConnectionConfig::new(url),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            send: SendConfig::default(),
        }
    }

    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        let name = &self.connection.name;

        // Rule: name cannot be empty
        if name.trim().is_empty() {
            return Err(AppError::Config("Connection name cannot be empty".to_string()));
        }

        // Rule: ws:// or wss:// with a host
        validate_url(&self.connection.url)
            .map_err(|e| AppError::Config(format!("Connection '{}': {}", name, e)))?;

        if self.connection.connect_timeout_ms == 0 {
            return Err(AppError::Config(format!(
                "Connection '{}': connect_timeout_ms must be > 0",
                name
            )));
        }

        // Rule: auth_token, if present, cannot be blank
        if let Some(token) = &self.connection.auth_token {
            if token.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "Connection '{}': auth_token cannot be empty (omit it instead)",
                    name
                )));
            }
        }

        self.validate_reconnect()?;
        self.validate_heartbeat()?;

        // Rule: queue needs room for at least one message
        if self.send.policy == SendPolicy::Queue && self.send.queue_capacity == 0 {
            return Err(AppError::Config(format!(
                "Connection '{}': send.queue_capacity must be >= 1 with the queue policy",
                name
            )));
        }

        Ok(())
    }

    fn validate_reconnect(&self) -> Result<(), AppError> {
        let name = &self.connection.name;
        let r = &self.reconnect;

        if r.max_attempts == 0 {
            return Err(AppError::Config(format!(
                "Connection '{}': reconnect.max_attempts must be >= 1",
                name
            )));
        }

        if r.initial_delay_ms == 0 {
            return Err(AppError::Config(format!(
                "Connection '{}': reconnect.initial_delay_ms must be > 0",
                name
            )));
        }

        // Rule: cap cannot sit below the starting delay
        if r.max_delay_ms < r.initial_delay_ms {
            return Err(AppError::Config(format!(
                "Connection '{}': reconnect.max_delay_ms ({}) must be >= initial_delay_ms ({})",
                name, r.max_delay_ms, r.initial_delay_ms
            )));
        }

        Ok(())
    }

    fn validate_heartbeat(&self) -> Result<(), AppError> {
        let name = &self.connection.name;
        let hb = &self.heartbeat;

        if !hb.enabled {
            return Ok(());
        }

        if hb.interval_ms == 0 || hb.timeout_ms == 0 {
            return Err(AppError::Config(format!(
                "Connection '{}': heartbeat interval_ms and timeout_ms must be > 0",
                name
            )));
        }

        // Rule: a probe must time out before the next one is due
        if hb.timeout_ms >= hb.interval_ms {
            return Err(AppError::Config(format!(
                "Connection '{}': heartbeat timeout_ms ({}) must be < interval_ms ({})",
                name, hb.timeout_ms, hb.interval_ms
            )));
        }

        if let HeartbeatProbe::Text { payload, ack } = &hb.probe {
            if payload.is_empty() || ack.is_empty() {
                return Err(AppError::Config(format!(
                    "Connection '{}': heartbeat text probe needs a payload and an ack",
                    name
                )));
            }
        }

        Ok(())
    }
}
