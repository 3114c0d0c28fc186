//! Connection defaults with environment variable overrides
//!
//! Every default used by the config layer lives here so it can be tuned
//! per deployment without touching the YAML file.

use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

// =============================================================================
// Heartbeat
// =============================================================================

/// Interval between liveness probes (default: 30 seconds)
///
/// Environment variable: `WS_HEARTBEAT_INTERVAL_SECS`
pub fn ws_heartbeat_interval() -> Duration {
    Duration::from_secs(env_or("WS_HEARTBEAT_INTERVAL_SECS", 30))
}

/// How long to wait for a probe acknowledgement (default: 5000ms)
///
/// Environment variable: `WS_HEARTBEAT_TIMEOUT_MS`
pub fn ws_heartbeat_timeout() -> Duration {
    Duration::from_millis(env_or("WS_HEARTBEAT_TIMEOUT_MS", 5000))
}

// =============================================================================
// Reconnect
// =============================================================================

/// Consecutive reconnect attempts before giving up (default: 5)
///
/// Environment variable: `WS_MAX_RECONNECT_ATTEMPTS`
pub fn max_reconnect_attempts() -> u32 {
    env_or("WS_MAX_RECONNECT_ATTEMPTS", 5)
}

/// Delay before the first reconnect attempt (default: 1000ms)
///
/// Environment variable: `WS_RECONNECT_INITIAL_DELAY_MS`
pub fn reconnect_initial_delay_ms() -> u64 {
    env_or("WS_RECONNECT_INITIAL_DELAY_MS", 1000)
}

/// Upper bound for the backoff delay (default: 30000ms)
///
/// Environment variable: `WS_RECONNECT_MAX_DELAY_MS`
pub fn reconnect_max_delay_ms() -> u64 {
    env_or("WS_RECONNECT_MAX_DELAY_MS", 30_000)
}

/// Random jitter added on top of each backoff delay (default: 200ms)
///
/// Environment variable: `WS_RECONNECT_JITTER_MS`
pub fn reconnect_jitter_ms() -> u64 {
    env_or("WS_RECONNECT_JITTER_MS", 200)
}

/// Uptime after which a connection counts as stable and the reconnect
/// budget is refilled (default: 5000ms)
///
/// Environment variable: `WS_RECONNECT_STABLE_AFTER_MS`
pub fn reconnect_stable_after_ms() -> u64 {
    env_or("WS_RECONNECT_STABLE_AFTER_MS", 5000)
}

// =============================================================================
// Connection & channels
// =============================================================================

/// Timeout for the TCP + TLS + upgrade handshake (default: 10000ms)
///
/// Environment variable: `WS_CONNECT_TIMEOUT_MS`
pub fn ws_connect_timeout_ms() -> u64 {
    env_or("WS_CONNECT_TIMEOUT_MS", 10_000)
}

/// Messages held while the socket is down (default: 256)
///
/// Environment variable: `WS_SEND_QUEUE_CAPACITY`
pub fn ws_send_queue_capacity() -> usize {
    env_or("WS_SEND_QUEUE_CAPACITY", 256)
}

/// Connection event broadcast capacity (default: 64)
///
/// Environment variable: `WS_EVENT_CHANNEL_CAPACITY`
pub fn ws_event_channel_capacity() -> usize {
    env_or("WS_EVENT_CHANNEL_CAPACITY", 64)
}

/// Print all configuration defaults (for startup logs)
pub fn log_configuration() {
    tracing::info!("=== Connection Defaults ===");
    tracing::info!("Heartbeat:");
    tracing::info!("  - Interval: {:?}", ws_heartbeat_interval());
    tracing::info!("  - Ack timeout: {:?}", ws_heartbeat_timeout());

    tracing::info!("Reconnect:");
    tracing::info!("  - Max attempts: {}", max_reconnect_attempts());
    tracing::info!("  - Initial delay: {}ms", reconnect_initial_delay_ms());
    tracing::info!("  - Max delay: {}ms", reconnect_max_delay_ms());
    tracing::info!("  - Jitter: 0-{}ms", reconnect_jitter_ms());
    tracing::info!("  - Stable after: {}ms", reconnect_stable_after_ms());

    tracing::info!("Connection:");
    tracing::info!("  - Connect timeout: {}ms", ws_connect_timeout_ms());
    tracing::info!("  - Send queue capacity: {}", ws_send_queue_capacity());
    tracing::info!("  - Event channel capacity: {}", ws_event_channel_capacity());
    tracing::info!("===========================");
}
