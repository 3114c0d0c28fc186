//! Connection task
//!
//! One task per client owns the socket, the backoff sleep, the heartbeat
//! timer and the send queue. Every caller operation arrives as a `Command`
//! over an mpsc channel, so there is never more than one socket per client
//! and intentional teardown cancels whatever timer is pending simply by
//! dropping the future that owns it.
//!
//! Lifecycle:
//!
//! ```text
//! Idle ──Connect──► Connecting ──ok──► Open ──normal close──► Closed
//!                       │               │
//!                     error      abnormal close / heartbeat timeout
//!                       ▼               ▼
//!                  Reconnecting { attempt 1..=max } ──ok──► Open
//!                       │
//!             budget exhausted (refilled after a stable session)
//!                       ▼
//!                     Failed
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::client::backoff::reconnect_with_backoff;
use crate::client::errors::ConnectionResult;
use crate::client::heartbeat::{HeartbeatMonitor, HeartbeatProbe};
use crate::client::listeners::ListenerRegistry;
use crate::client::outbox::{Offer, Outbox};
use crate::client::types::{
    ConnectionEvent, ConnectionState, EventKind, InboundMessage, OutboundMessage,
};
use crate::client::websocket::{connect_tls, WsStream};
use crate::config::ClientConfig;

/// Close code sent when the heartbeat acknowledgement is overdue
pub const HEARTBEAT_TIMEOUT_CLOSE_CODE: u16 = 4000;

/// Upper bound on how long a closing handshake may block teardown
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Caller operations forwarded to the task
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Send(OutboundMessage),
    Disconnect(oneshot::Sender<()>),
}

/// State shared between the handle and the task
#[derive(Debug)]
pub(crate) struct Shared {
    pub state_tx: watch::Sender<ConnectionState>,
    pub events_tx: broadcast::Sender<ConnectionEvent>,
    pub listeners: ListenerRegistry,
    pub queued: AtomicUsize,
}

impl Shared {
    pub fn new(event_capacity: usize) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (events_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state_tx,
            events_tx,
            listeners: ListenerRegistry::new(),
            queued: AtomicUsize::new(0),
        }
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    pub fn emit(&self, kind: EventKind) {
        // No subscribers is fine
        let _ = self.events_tx.send(ConnectionEvent::now(kind));
    }
}

/// Why the connect/backoff/session phase stopped early
#[derive(Debug)]
enum Interrupt {
    /// Caller asked for teardown
    Disconnect(oneshot::Sender<()>),
    /// Every handle was dropped
    Shutdown,
}

/// How an open session ended
#[derive(Debug)]
enum SessionEnd {
    Closed {
        code: Option<u16>,
        reason: String,
        normal: bool,
    },
    Interrupted(Interrupt),
}

impl SessionEnd {
    fn abnormal(reason: impl Into<String>) -> Self {
        SessionEnd::Closed {
            code: None,
            reason: reason.into(),
            normal: false,
        }
    }
}

enum Control {
    Continue,
    Shutdown,
}

pub(crate) struct ConnectionTask {
    config: Arc<ClientConfig>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    outbox: Outbox,
}

impl ConnectionTask {
    pub fn new(
        config: Arc<ClientConfig>,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let outbox = Outbox::new(&config.send);
        Self {
            config,
            shared,
            commands,
            outbox,
        }
    }

    /// Idle loop: wait for commands until every handle is dropped
    pub async fn run(mut self) {
        let name = self.config.connection.name.clone();
        debug!(name = %name, "Connection task started");

        while let Some(cmd) = self.commands.recv().await {
            match cmd {
                Command::Connect => {
                    if let Control::Shutdown = self.drive().await {
                        break;
                    }
                }
                Command::Send(msg) => self.hold(msg),
                Command::Disconnect(done) => {
                    self.teardown().await;
                    let _ = done.send(());
                }
            }
        }

        self.shared.set_state(ConnectionState::Idle);
        debug!(name = %name, "Connection task stopped");
    }

    /// Connect, keep the socket alive and reconnect until disconnected,
    /// closed normally by the peer, or out of attempts
    ///
    /// Failed handshakes and abnormal closures share one budget of
    /// `max_attempts` reconnects. It is refilled only after a connection has
    /// stayed open for `stable_after_ms`, so a peer that accepts and then
    /// immediately drops us still ends in `Failed`.
    async fn drive(&mut self) -> Control {
        let config = Arc::clone(&self.config);
        let name = config.connection.name.as_str();
        let max_attempts = config.reconnect.max_attempts;

        info!(name = name, url = %config.connection.url, "Connecting");
        self.shared.set_state(ConnectionState::Connecting);
        self.shared.emit(EventKind::Connecting);

        // Reconnect attempts spent since the last stable connection
        let mut spent = 0u32;
        let mut outcome = self.race_commands(connect_tls(&config.connection)).await;

        loop {
            let stream = match outcome {
                Err(interrupt) => return self.interrupted(interrupt).await,
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!(name = name, attempt = spent, error = %e, "Connection attempt failed");
                    if spent >= max_attempts {
                        return self.give_up();
                    }
                    outcome = self.reconnect(&config, &mut spent).await;
                    continue;
                }
            };

            let opened = Instant::now();
            match self.session(stream).await {
                SessionEnd::Closed {
                    code,
                    reason,
                    normal: true,
                } => {
                    info!(name = name, code = ?code, reason = %reason, "Connection closed by peer");
                    self.shared.set_state(ConnectionState::Closed);
                    self.shared.emit(EventKind::Closed {
                        code,
                        reason,
                        normal: true,
                    });
                    return Control::Continue;
                }
                SessionEnd::Closed { code, reason, .. } => {
                    warn!(name = name, code = ?code, reason = %reason, "Connection lost");
                    self.shared.emit(EventKind::Closed {
                        code,
                        reason,
                        normal: false,
                    });
                    if opened.elapsed() >= config.reconnect.stable_after() {
                        spent = 0;
                    }
                    if spent >= max_attempts {
                        return self.give_up();
                    }
                    outcome = self.reconnect(&config, &mut spent).await;
                }
                SessionEnd::Interrupted(interrupt) => return self.interrupted(interrupt).await,
            }
        }
    }

    /// Backoff-driven reconnect continuing from attempt `*spent + 1`
    async fn reconnect(
        &mut self,
        config: &ClientConfig,
        spent: &mut u32,
    ) -> Result<ConnectionResult<WsStream>, Interrupt> {
        let shared = Arc::clone(&self.shared);
        let connection = &config.connection;
        let first_attempt = *spent + 1;

        let retry = reconnect_with_backoff(
            &config.reconnect,
            &connection.name,
            first_attempt,
            move |attempt, delay| {
                *spent = attempt;
                shared.set_state(ConnectionState::Reconnecting { attempt });
                shared.emit(EventKind::ReconnectScheduled {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
            },
            |_| connect_tls(connection),
        );

        self.race_commands(retry).await
    }

    fn give_up(&self) -> Control {
        let attempts = self.config.reconnect.max_attempts;
        error!(
            name = %self.config.connection.name,
            attempts = attempts,
            "Reconnect attempts exhausted, giving up"
        );
        self.shared.set_state(ConnectionState::Failed);
        self.shared.emit(EventKind::Failed { attempts });
        Control::Continue
    }

    /// Drive `fut` to completion while still serving commands
    ///
    /// Sends are held per the send policy, repeated connects are ignored,
    /// and a disconnect (or all handles dropping) abandons `fut`, which
    /// cancels any sleep or handshake it owns.
    async fn race_commands<F, T>(&mut self, fut: F) -> Result<T, Interrupt>
    where
        F: Future<Output = T>,
    {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Ok(out),
                cmd = self.commands.recv() => match cmd {
                    None => return Err(Interrupt::Shutdown),
                    Some(Command::Connect) => debug!("Connect ignored: connection attempt in progress"),
                    Some(Command::Send(msg)) => self.hold(msg),
                    Some(Command::Disconnect(done)) => return Err(Interrupt::Disconnect(done)),
                },
            }
        }
    }

    /// Serve one open socket until it closes or the caller intervenes
    ///
    /// Writes go through a `Writer` task, so this loop keeps serving
    /// commands and the heartbeat deadline even when the peer stops reading.
    async fn session(&mut self, stream: WsStream) -> SessionEnd {
        let config = Arc::clone(&self.config);
        let session = Uuid::new_v4();
        let (sink, mut source) = stream.split();
        let mut writer = Writer::spawn(sink);

        info!(name = %config.connection.name, session = %session, "Connection open");
        self.shared.set_state(ConnectionState::Open);
        self.shared.emit(EventKind::Opened { session });

        // Flush anything queued while we were down, oldest first
        let mut flushed = 0usize;
        while let Some(msg) = self.outbox.pop() {
            if writer.send(msg.clone().into()).is_err() {
                self.outbox.requeue_front(msg);
                break;
            }
            flushed += 1;
        }
        self.sync_queued();
        if flushed > 0 {
            debug!(session = %session, count = flushed, "Flushed queued messages");
        }

        let heartbeat = &config.heartbeat;
        let mut monitor = HeartbeatMonitor::new(heartbeat.timeout());
        // interval_at panics on a zero period; validation only allows one when disabled
        let period = heartbeat.interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = monitor.deadline();

            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    None => {
                        writer.close(CloseCode::Normal, "client dropped").await;
                        return SessionEnd::Interrupted(Interrupt::Shutdown);
                    }
                    Some(Command::Connect) => debug!(session = %session, "Connect ignored: already open"),
                    Some(Command::Send(msg)) => {
                        if writer.send(msg.clone().into()).is_err() {
                            self.hold(msg);
                        }
                    }
                    Some(Command::Disconnect(done)) => {
                        writer.close(CloseCode::Normal, "client disconnect").await;
                        return SessionEnd::Interrupted(Interrupt::Disconnect(done));
                    }
                },
                stopped = &mut writer.task => {
                    let reason = match stopped {
                        Ok(Ok(())) => "writer stopped".to_string(),
                        Ok(Err(e)) => format!("send failed: {}", e),
                        Err(e) => format!("writer task failed: {}", e),
                    };
                    return SessionEnd::abnormal(reason);
                },
                frame = source.next() => match frame {
                    Some(Ok(msg)) => {
                        if let Some(end) = self.on_frame(msg, &heartbeat.probe, &mut monitor).await {
                            return end;
                        }
                    }
                    Some(Err(e)) => return SessionEnd::abnormal(e.to_string()),
                    None => return SessionEnd::abnormal("stream ended without close frame"),
                },
                _ = ticker.tick(), if heartbeat.enabled => {
                    if monitor.should_probe() {
                        if writer.send(heartbeat.probe.message()).is_err() {
                            return SessionEnd::abnormal("heartbeat send failed: writer stopped");
                        }
                        monitor.probe_sent(Instant::now());
                        trace!(session = %session, "Heartbeat probe queued");
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!(
                        session = %session,
                        timeout_ms = heartbeat.timeout_ms,
                        "Heartbeat acknowledgement overdue, closing socket"
                    );
                    self.shared.emit(EventKind::HeartbeatTimeout);
                    writer
                        .close(CloseCode::from(HEARTBEAT_TIMEOUT_CLOSE_CODE), "heartbeat timeout")
                        .await;
                    return SessionEnd::Closed {
                        code: Some(HEARTBEAT_TIMEOUT_CLOSE_CODE),
                        reason: "heartbeat timeout".to_string(),
                        normal: false,
                    };
                },
            }
        }
    }

    /// Handle one inbound frame; returns Some when the session is over
    async fn on_frame(
        &mut self,
        msg: Message,
        probe: &HeartbeatProbe,
        monitor: &mut HeartbeatMonitor,
    ) -> Option<SessionEnd> {
        if monitor.awaiting_ack() && probe.is_ack(&msg) {
            if let Some(rtt) = monitor.acknowledge(Instant::now()) {
                trace!(rtt_ms = rtt.as_millis() as u64, "Heartbeat acknowledged");
            }
            return None;
        }

        match msg {
            Message::Text(text) => {
                self.shared.listeners.dispatch(&InboundMessage::Text(text)).await;
            }
            Message::Binary(data) => {
                self.shared.listeners.dispatch(&InboundMessage::Binary(data)).await;
            }
            Message::Close(frame) => {
                let (code, reason) = match frame {
                    Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                    None => (None, String::new()),
                };
                return Some(SessionEnd::Closed {
                    code,
                    reason,
                    normal: code == Some(u16::from(CloseCode::Normal)),
                });
            }
            // Pings are answered by tungstenite; stray pongs and raw frames carry no data
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }

        None
    }

    async fn interrupted(&mut self, interrupt: Interrupt) -> Control {
        match interrupt {
            Interrupt::Disconnect(done) => {
                self.teardown().await;
                let _ = done.send(());
                Control::Continue
            }
            Interrupt::Shutdown => Control::Shutdown,
        }
    }

    /// Intentional disconnect: forget listeners and queued messages
    async fn teardown(&mut self) {
        self.outbox.clear();
        self.sync_queued();
        self.shared.listeners.clear().await;
        self.shared.set_state(ConnectionState::Idle);
        self.shared.emit(EventKind::Disconnected);
        info!(name = %self.config.connection.name, "Disconnected");
    }

    /// Apply the send policy to a message that cannot go out right now
    fn hold(&mut self, msg: OutboundMessage) {
        match self.outbox.offer(msg) {
            Offer::Queued => {
                debug!(queued = self.outbox.len(), "Socket not open, message queued");
            }
            Offer::QueuedEvictedOldest => {
                warn!(
                    capacity = self.config.send.queue_capacity,
                    "Send queue full, oldest message dropped"
                );
                self.shared.emit(EventKind::MessageDropped {
                    reason: "send queue full".to_string(),
                });
            }
            Offer::Dropped => {
                warn!("Socket not open, message dropped");
                self.shared.emit(EventKind::MessageDropped {
                    reason: "not connected".to_string(),
                });
            }
        }
        self.sync_queued();
    }

    fn sync_queued(&self) {
        self.shared.queued.store(self.outbox.len(), Ordering::Relaxed);
    }
}

/// Write half of one open socket
///
/// Frames are queued on an unbounded channel and written by a dedicated
/// task. The task ends after writing a close frame, when the channel is
/// dropped, or on the first write error.
struct Writer {
    frames: mpsc::UnboundedSender<Message>,
    task: JoinHandle<Result<(), WsError>>,
}

impl Writer {
    fn spawn(mut sink: SplitSink<WsStream, Message>) -> Self {
        let (frames, mut rx) = mpsc::unbounded_channel::<Message>();
        let task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                sink.send(msg).await?;
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
            Ok::<(), WsError>(())
        });
        Self { frames, task }
    }

    /// Queue a frame; hands it back once the writer has stopped
    fn send(&self, msg: Message) -> Result<(), Message> {
        self.frames.send(msg).map_err(|e| e.0)
    }

    /// Best-effort closing handshake, bounded so a dead peer cannot stall teardown
    async fn close(&mut self, code: CloseCode, reason: &'static str) {
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        if self.send(Message::Close(Some(frame))).is_ok() {
            let _ = tokio::time::timeout(CLOSE_GRACE, &mut self.task).await;
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        // A write stuck on a peer that stopped reading must not outlive the session
        self.task.abort();
    }
}
