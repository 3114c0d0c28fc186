//! Heartbeat monitoring
//!
//! Guards against half-open sockets: a probe goes out every `interval_ms`,
//! and if the acknowledgement has not arrived `timeout_ms` later the
//! connection task closes the socket so the reconnect path takes over.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

use crate::config::constants;

/// Liveness probe flavour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatProbe {
    /// WebSocket Ping frame, acknowledged by a Pong frame
    #[default]
    Frame,
    /// Application-level text probe, acknowledged by an inbound text equal to `ack`
    Text { payload: String, ack: String },
}

/// Heartbeat settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// `frame`, or `text: { payload, ack }`
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub probe: HeartbeatProbe,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    constants::ws_heartbeat_interval().as_millis() as u64
}

fn default_timeout_ms() -> u64 {
    constants::ws_heartbeat_timeout().as_millis() as u64
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            probe: HeartbeatProbe::default(),
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl HeartbeatProbe {
    /// Frame to send as a probe
    pub fn message(&self) -> Message {
        match self {
            HeartbeatProbe::Frame => Message::Ping(b"dashlink".to_vec()),
            HeartbeatProbe::Text { payload, .. } => Message::Text(payload.clone()),
        }
    }

    /// Whether `msg` acknowledges a probe of this flavour
    pub fn is_ack(&self, msg: &Message) -> bool {
        match (self, msg) {
            (HeartbeatProbe::Frame, Message::Pong(_)) => true,
            (HeartbeatProbe::Text { ack, .. }, Message::Text(text)) => text.trim() == ack,
            _ => false,
        }
    }
}

/// Outstanding-probe bookkeeping for one open socket
#[derive(Debug)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    awaiting_since: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            awaiting_since: None,
        }
    }

    /// True when no probe is outstanding
    pub fn should_probe(&self) -> bool {
        self.awaiting_since.is_none()
    }

    /// True while a probe is outstanding; only then can an inbound frame be its ack
    pub fn awaiting_ack(&self) -> bool {
        self.awaiting_since.is_some()
    }

    /// Record that a probe went out at `now`
    pub fn probe_sent(&mut self, now: Instant) {
        self.awaiting_since = Some(now);
    }

    /// Record an acknowledgement; returns the round-trip time if a probe was outstanding
    pub fn acknowledge(&mut self, now: Instant) -> Option<Duration> {
        self.awaiting_since
            .take()
            .map(|sent| now.saturating_duration_since(sent))
    }

    /// When the outstanding probe times out, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.awaiting_since.map(|sent| sent + self.timeout)
    }

    pub fn is_overdue(&self, now: Instant) -> bool {
        self.deadline().map_or(false, |d| now >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_starts_idle() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(5));
        assert!(monitor.should_probe());
        assert!(monitor.deadline().is_none());
        assert!(!monitor.is_overdue(Instant::now()));
    }

    #[test]
    fn test_monitor_overdue_after_timeout() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_secs(5));
        let sent = Instant::now();
        monitor.probe_sent(sent);

        assert!(!monitor.should_probe());
        assert_eq!(monitor.deadline(), Some(sent + Duration::from_secs(5)));
        assert!(!monitor.is_overdue(sent + Duration::from_secs(4)));
        assert!(monitor.is_overdue(sent + Duration::from_secs(5)));
    }

    #[test]
    fn test_ack_clears_outstanding_probe() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_secs(5));
        let sent = Instant::now();
        monitor.probe_sent(sent);

        let rtt = monitor.acknowledge(sent + Duration::from_millis(40));
        assert_eq!(rtt, Some(Duration::from_millis(40)));
        assert!(monitor.should_probe());
        assert!(!monitor.is_overdue(sent + Duration::from_secs(60)));
    }

    #[test]
    fn test_awaiting_ack_tracks_outstanding_probe() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_secs(5));
        assert!(!monitor.awaiting_ack());
        monitor.probe_sent(Instant::now());
        assert!(monitor.awaiting_ack());
        monitor.acknowledge(Instant::now());
        assert!(!monitor.awaiting_ack());
    }

    #[test]
    fn test_unsolicited_ack_is_ignored() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_secs(5));
        assert_eq!(monitor.acknowledge(Instant::now()), None);
    }

    #[test]
    fn test_frame_probe_ack() {
        let probe = HeartbeatProbe::Frame;
        assert!(matches!(probe.message(), Message::Ping(_)));
        assert!(probe.is_ack(&Message::Pong(vec![])));
        assert!(!probe.is_ack(&Message::Text("pong".into())));
    }

    #[test]
    fn test_text_probe_ack() {
        let probe = HeartbeatProbe::Text {
            payload: r#"{"type":"ping"}"#.into(),
            ack: r#"{"type":"pong"}"#.into(),
        };
        assert_eq!(probe.message(), Message::Text(r#"{"type":"ping"}"#.into()));
        assert!(probe.is_ack(&Message::Text("{\"type\":\"pong\"}\n".into())));
        assert!(!probe.is_ack(&Message::Pong(vec![])));
        assert!(!probe.is_ack(&Message::Text(r#"{"type":"insight"}"#.into())));
    }

    #[test]
    fn test_heartbeat_config_from_yaml() {
        let yaml = r#"
interval_ms: 1000
timeout_ms: 200
probe:
  text:
    payload: ping
    ack: pong
"#;
        let config: HeartbeatConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(
            config.probe,
            HeartbeatProbe::Text {
                payload: "ping".into(),
                ack: "pong".into()
            }
        );
    }
}
