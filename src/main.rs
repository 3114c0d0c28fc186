//! dashlink - connection monitor entry point
//!
//! 1. Loads `.env` and the YAML config
//! 2. Initializes logging
//! 3. Opens the resilient connection and logs every inbound message
//! 4. Forwards stdin lines as text messages
//! 5. Ctrl+C: graceful disconnect. Exits non-zero if reconnects are exhausted.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

use dashlink::client::{ConnectionState, EventKind, InboundMessage, ResilientClient};
use dashlink::config::{self, constants, init_logging};

/// Config path: first CLI argument, then `DASHLINK_CONFIG`, then `config.yaml`
fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DASHLINK_CONFIG").ok())
        .unwrap_or_else(|| "config.yaml".to_string())
        .into()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    info!("=== dashlink ===");
    constants::log_configuration();

    let path = config_path();
    let client_config = match config::load_config(&path) {
        Ok(cfg) => {
            info!(path = %path.display(), name = %cfg.connection.name, "Config loaded");
            cfg
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Configuration failed");
            std::process::exit(1);
        }
    };

    let client = ResilientClient::spawn(client_config)?;
    let mut events = client.subscribe_events();

    client
        .add_listener(|msg: &InboundMessage| match msg {
            InboundMessage::Text(text) => info!(len = text.len(), message = %text, "Inbound text"),
            InboundMessage::Binary(data) => info!(len = data.len(), "Inbound binary"),
        })
        .await?;

    // stdin -> socket
    let sender = client.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if sender.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    let outcome = loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("[SHUTDOWN] Graceful shutdown initiated");
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => {
                    info!(event = ?event.kind, "Connection event");
                    if let EventKind::Failed { attempts } = event.kind {
                        break Err(anyhow::anyhow!(
                            "gave up after {} reconnect attempts",
                            attempts
                        ));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event receiver lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break Ok(());
                }
            }
        }
    };

    if client.state() != ConnectionState::Failed {
        client.disconnect().await?;
    }

    info!("[SHUTDOWN] Clean exit");
    outcome
}
