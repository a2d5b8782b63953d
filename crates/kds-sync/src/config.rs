//! # Sync Configuration
//!
//! Configuration management for the order sync client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KDS_WS_URL=wss://orders.example.com/ws                             │
//! │     KDS_MAX_RECONNECT_ATTEMPTS=15                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/expo-kds/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/com.kds.expo-kds/sync.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [connection]
//! url = "wss://orders.example.com/ws"
//! tenant_id = "restaurant-001"
//! allow_anonymous = false
//! connect_timeout_secs = 10
//! write_timeout_secs = 10
//!
//! [reconnect]
//! base_delay_ms = 2000
//! max_delay_ms = 30000
//! max_attempts = 15
//! jitter_ratio = 0.25
//!
//! [heartbeat]
//! interval_ms = 30000
//!
//! [queue]
//! max_pending = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Connection Settings
// =============================================================================

/// Where and how to open the order socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// WebSocket URL of the order server.
    #[serde(default = "default_url")]
    pub url: String,

    /// Restaurant used when the auth collaborator supplies none
    /// (anonymous/dev mode only).
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Allow connecting without a token. Never enable in production.
    #[serde(default)]
    pub allow_anonymous: bool,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Bound on a single frame write or close handshake (seconds). A socket
    /// that stays stalled longer is treated as failed.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

fn default_url() -> String {
    "ws://localhost:3001/ws".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_write_timeout() -> u64 {
    10
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            url: default_url(),
            tenant_id: None,
            allow_anonymous: false,
            connect_timeout_secs: default_connect_timeout(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

// =============================================================================
// Reconnect Settings
// =============================================================================

/// Exponential backoff with bounded jitter.
///
/// ```text
/// delay = min(max_delay, base * 2^(attempt-1)) + rand(0..=jitter_ratio * base)
///
/// Attempt 1:  2s  (+ up to 0.5s)
/// Attempt 2:  4s
/// Attempt 3:  8s
/// Attempt 4: 16s
/// Attempt 5+: 30s (capped)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Retries allowed before the terminal "connection lost" signal.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Jitter bound as a fraction of the base delay.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_base_delay() -> u64 {
    2000
}
fn default_max_delay() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    15
}
fn default_jitter_ratio() -> f64 {
    0.25
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        ReconnectSettings {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl ReconnectSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

// =============================================================================
// Heartbeat Settings
// =============================================================================

/// Liveness probing. A connection with no inbound traffic for
/// `2 × interval` is declared dead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,
}

fn default_heartbeat_interval() -> u64 {
    30_000
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        HeartbeatSettings {
            interval_ms: default_heartbeat_interval(),
        }
    }
}

impl HeartbeatSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// Outbound queue bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Pending sends kept while offline. The oldest is dropped on overflow.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_max_pending() -> usize {
    1000
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            max_pending: default_max_pending(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub reconnect: ReconnectSettings,

    #[serde(default)]
    pub heartbeat: HeartbeatSettings,

    #[serde(default)]
    pub queue: QueueSettings,
}

impl SyncConfig {
    /// Creates a config with defaults pointing at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.connection.url = url.into();
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = &self.connection.url;
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(SyncError::InvalidUrl(format!(
                "Socket URL must start with ws:// or wss://, got: {}",
                url
            )));
        }
        url::Url::parse(url)?;

        if self.connection.connect_timeout_secs == 0 || self.connection.write_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "connection timeouts must be greater than 0".into(),
            ));
        }

        let reconnect = &self.reconnect;
        if reconnect.base_delay_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "reconnect.base_delay_ms must be greater than 0".into(),
            ));
        }
        if reconnect.max_delay_ms < reconnect.base_delay_ms {
            return Err(SyncError::InvalidConfig(
                "reconnect.max_delay_ms must be at least base_delay_ms".into(),
            ));
        }
        if !(0.0..=1.0).contains(&reconnect.jitter_ratio) {
            return Err(SyncError::InvalidConfig(format!(
                "reconnect.jitter_ratio must be within [0, 1], got {}",
                reconnect.jitter_ratio
            )));
        }

        if self.heartbeat.interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "heartbeat.interval_ms must be greater than 0".into(),
            ));
        }

        if self.queue.max_pending == 0 {
            return Err(SyncError::InvalidConfig(
                "queue.max_pending must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("KDS_WS_URL") {
            debug!(url = %url, "Overriding socket URL from environment");
            self.connection.url = url;
        }

        if let Ok(tenant) = std::env::var("KDS_TENANT_ID") {
            self.connection.tenant_id = Some(tenant);
        }

        if let Ok(flag) = std::env::var("KDS_ALLOW_ANONYMOUS") {
            match flag.parse::<bool>() {
                Ok(allow) => self.connection.allow_anonymous = allow,
                Err(_) => warn!(value = %flag, "Ignoring non-boolean KDS_ALLOW_ANONYMOUS"),
            }
        }

        if let Ok(attempts) = std::env::var("KDS_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                debug!(max_attempts = n, "Overriding reconnect ceiling from environment");
                self.reconnect.max_attempts = n;
            }
        }

        if let Ok(base) = std::env::var("KDS_RECONNECT_BASE_MS") {
            if let Ok(ms) = base.parse::<u64>() {
                self.reconnect.base_delay_ms = ms;
            }
        }

        if let Ok(interval) = std::env::var("KDS_HEARTBEAT_INTERVAL_MS") {
            if let Ok(ms) = interval.parse::<u64>() {
                self.heartbeat.interval_ms = ms;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "kds", "expo-kds")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn url(&self) -> &str {
        &self.connection.url
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.connect_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.write_timeout_secs)
    }
}
