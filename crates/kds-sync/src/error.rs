//! # Sync Error Types
//!
//! Error types for order sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidMessage         │ │
//! │  │  InvalidUrl     │  │  Disconnected   │  │  Serialization          │ │
//! │  │  ConfigLoad     │  │  Timeout        │  │  Deserialization        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │ Authentication  │  │    Orders API   │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  MissingToken   │  │  ApiRequest     │  │  ShuttingDown           │ │
//! │  │  AuthFailed     │  │  OrderDomain    │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these cross the public `send`/`subscribe` surface. The connection
//! actor handles them locally and reports through state and notices.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid socket URL.
    #[error("Invalid socket URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Authentication Errors
    // =========================================================================
    /// No token available and anonymous connections are not allowed.
    #[error("No authentication token available")]
    MissingToken,

    /// The auth collaborator failed.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to establish the connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection dropped unexpectedly.
    #[error("Disconnected from order server")]
    Disconnected,

    /// Connection timeout.
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Frame decoded but its payload did not match the message type.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Failed to serialize an outbound frame.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to decode an inbound frame.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Orders API Errors
    // =========================================================================
    /// The full-state HTTP collaborator failed.
    #[error("Orders API request failed: {0}")]
    ApiRequestFailed(String),

    /// Order domain rule violated.
    #[error(transparent)]
    OrderDomain(#[from] kds_core::CoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The client task has stopped.
    #[error("Sync client is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            SyncError::DeserializationFailed(err.to_string())
        } else {
            SyncError::SerializationFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => SyncError::Disconnected,
            WsError::AlreadyClosed => SyncError::Disconnected,
            WsError::Protocol(p) => SyncError::WebSocketError(p.to_string()),
            WsError::Io(io) => SyncError::ConnectionFailed(io.to_string()),
            WsError::Tls(tls) => SyncError::TlsError(tls.to_string()),
            WsError::Url(url) => SyncError::InvalidUrl(url.to_string()),
            other => SyncError::WebSocketError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for reconnect logic)
// =============================================================================

impl SyncError {
    /// Returns true if the reconnection policy may retry after this error.
    ///
    /// Authentication failures are retryable too, but only under the
    /// reconnect ceiling.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_)
                | SyncError::Disconnected
                | SyncError::Timeout(_)
                | SyncError::WebSocketError(_)
                | SyncError::TlsError(_)
                | SyncError::MissingToken
                | SyncError::AuthFailed(_)
        )
    }

    /// Returns true if this error comes from the auth collaborator.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, SyncError::MissingToken | SyncError::AuthFailed(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error is isolated to a single frame.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidMessage(_)
                | SyncError::SerializationFailed(_)
                | SyncError::DeserializationFailed(_)
                | SyncError::OrderDomain(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Disconnected.is_retryable());
        assert!(SyncError::Timeout(10).is_retryable());
        assert!(SyncError::MissingToken.is_retryable());

        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::DeserializationFailed("eof".into()).is_retryable());
    }

    #[test]
    fn test_categories() {
        assert!(SyncError::MissingToken.is_auth_error());
        assert!(SyncError::InvalidUrl("http://x".into()).is_config_error());
        assert!(SyncError::InvalidMessage("no order".into()).is_protocol_error());
        assert!(SyncError::from(kds_core::CoreError::MissingOrderId).is_protocol_error());
    }

    #[test]
    fn test_json_error_maps_to_deserialization() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(
            SyncError::from(err),
            SyncError::DeserializationFailed(_)
        ));
    }
}
