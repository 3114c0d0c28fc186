//! WebSocket connection helpers
//!
//! Builds the upgrade request from `ConnectionConfig` and opens the socket
//! with TLS (TLSv1.2 minimum) for wss:// endpoints.

use std::time::Duration;

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, Request, Uri};
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};

use crate::client::errors::{ConnectionError, ConnectionResult};
use crate::client::types::ConnectionConfig;

/// Type alias for the WebSocket stream with optional TLS
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Check that `url` parses and uses the ws or wss scheme
pub fn validate_url(url: &str) -> ConnectionResult<()> {
    let uri = url.parse::<Uri>().map_err(|e| ConnectionError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match uri.scheme_str() {
        Some("ws") | Some("wss") => {}
        other => {
            return Err(ConnectionError::InvalidUrl {
                url: url.to_string(),
                reason: format!("scheme must be ws or wss (got {})", other.unwrap_or("none")),
            })
        }
    }

    if uri.host().map_or(true, str::is_empty) {
        return Err(ConnectionError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(())
}

/// Build the HTTP upgrade request with configured headers and bearer token
pub fn build_request(config: &ConnectionConfig) -> ConnectionResult<Request<()>> {
    validate_url(&config.url)?;

    let mut request = config.url.as_str().into_client_request()?;
    let headers = request.headers_mut();

    for (name, value) in &config.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConnectionError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| ConnectionError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        headers.insert(header_name, header_value);
    }

    if let Some(token) = &config.auth_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
            ConnectionError::InvalidHeader {
                name: "Authorization".to_string(),
                reason: e.to_string(),
            }
        })?;
        value.set_sensitive(true);
        headers.insert(tokio_tungstenite::tungstenite::http::header::AUTHORIZATION, value);
    }

    Ok(request)
}

/// Open a WebSocket connection, TLS for wss:// (TLSv1.2 minimum)
///
/// The whole handshake is bounded by `connect_timeout_ms`.
pub async fn connect_tls(config: &ConnectionConfig) -> ConnectionResult<WsStream> {
    let request = build_request(config)?;

    let tls = native_tls::TlsConnector::builder()
        .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
        .build()
        .map_err(|e| ConnectionError::ConnectionFailed(format!("TLS error: {}", e)))?;

    let handshake =
        connect_async_tls_with_config(request, None, false, Some(Connector::NativeTls(tls)));

    let (ws_stream, _response) =
        tokio::time::timeout(Duration::from_millis(config.connect_timeout_ms), handshake)
            .await
            .map_err(|_| ConnectionError::NetworkTimeout(config.connect_timeout_ms))??;

    Ok(ws_stream)
}
