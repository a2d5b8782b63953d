//! # Socket Transport
//!
//! The seam between the connection state machine and the physical socket.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Transport Seam                                  │
//! │                                                                         │
//! │   SyncClient actor                                                      │
//! │        │  Connector::open(target)                                       │
//! │        ▼                                                                │
//! │   ┌──────────────┐   send(text) / recv() / close(code, reason)         │
//! │   │  Connection  │◄──────────────────────────────────────────────────  │
//! │   └──────┬───────┘                                                      │
//! │          │                                                              │
//! │   WsConnector ── tokio-tungstenite ── wss://…?token=…&restaurant_id=…  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the actor ever holds a [`Connection`]. Swapping the transport never
//! touches dispatch or reconciliation.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::auth::ConnectTarget;
use crate::error::{SyncError, SyncResult};

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Application close code used when the heartbeat declares the peer dead.
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4000;

/// What a connection yields when read.
#[derive(Debug)]
pub enum TransportEvent {
    /// One text frame.
    Frame(String),
    /// Peer closed the connection (or the stream ended).
    Closed { code: Option<u16>, reason: String },
    /// Socket-level failure. The connection is unusable afterwards.
    Error(SyncError),
}

/// Opens physical connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, target: &ConnectTarget) -> SyncResult<Box<dyn Connection>>;
}

/// One live physical connection.
///
/// `recv` must be cancel-safe: the actor polls it inside `select!`.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, frame: String) -> SyncResult<()>;

    async fn recv(&mut self) -> TransportEvent;

    async fn close(&mut self, code: u16, reason: &str) -> SyncResult<()>;
}

/// Sends one frame, failing with [`SyncError::Timeout`] if the write stalls
/// past `limit`.
pub async fn send_within(
    connection: &mut dyn Connection,
    frame: String,
    limit: Duration,
) -> SyncResult<()> {
    match timeout(limit, connection.send(frame)).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout(limit.as_secs())),
    }
}

/// Best-effort close handshake. The connection is dropped either way.
pub async fn close_within(
    mut connection: Box<dyn Connection>,
    code: u16,
    reason: &str,
    limit: Duration,
) {
    match timeout(limit, connection.close(code, reason)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Close handshake failed"),
        Err(_) => warn!(code, timeout_secs = limit.as_secs(), "Close handshake timed out"),
    }
}

// =============================================================================
// WebSocket Implementation
// =============================================================================

/// Opens WebSocket connections with a connect timeout.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        WsConnector { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        WsConnector::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, target: &ConnectTarget) -> SyncResult<Box<dyn Connection>> {
        let connect_future = connect_async(target.url.as_str());

        match timeout(self.connect_timeout, connect_future).await {
            Ok(Ok((stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(Box::new(WsConnection { stream }))
            }
            Ok(Err(e)) => Err(SyncError::from(e)),
            Err(_) => Err(SyncError::Timeout(self.connect_timeout.as_secs())),
        }
    }
}

/// A tungstenite stream behind the [`Connection`] seam.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, frame: String) -> SyncResult<()> {
        self.stream.send(WsMessage::Text(frame.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return TransportEvent::Frame(text.as_str().to_owned());
                }
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return TransportEvent::Frame(text),
                    Err(_) => warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                },
                // Protocol-level pings are answered by tungstenite itself.
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                Some(Ok(WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return TransportEvent::Closed { code, reason };
                }
                Some(Err(e)) => return TransportEvent::Error(SyncError::from(e)),
                None => {
                    return TransportEvent::Closed {
                        code: None,
                        reason: "stream ended".into(),
                    }
                }
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> SyncResult<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_connector_default_timeout() {
        let connector = WsConnector::default();
        assert_eq!(connector.connect_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_ws_connector_reports_refused_connection() {
        let settings = crate::config::ConnectionSettings {
            // Port 9 (discard) is closed on test hosts.
            url: "ws://127.0.0.1:9/ws".into(),
            allow_anonymous: true,
            ..Default::default()
        };
        let target = ConnectTarget::resolve(&settings, None).unwrap();
        let result = WsConnector::new(Duration::from_secs(2)).open(&target).await;
        assert!(result.is_err());
    }
}
