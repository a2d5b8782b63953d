//! Monitor configuration.
//!
//! Socket settings come from `SyncConfig` (file + `KDS_*` overrides). The
//! values below are specific to the monitor and are read from the
//! environment only.

use std::env;
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:3001";

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Base URL of the orders HTTP API
    pub api_url: String,

    /// Bearer token shared by the socket and the HTTP API
    pub token: Option<String>,

    /// Restaurant the token belongs to
    pub tenant_id: Option<String>,

    /// Explicit sync.toml path (otherwise the platform config dir)
    pub sync_config_path: Option<PathBuf>,
}

impl MonitorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("KDS_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue("KDS_API_URL".to_string()));
        }

        let config = MonitorConfig {
            api_url: api_url.trim_end_matches('/').to_string(),
            token: lookup("KDS_TOKEN").filter(|t| !t.is_empty()),
            tenant_id: lookup("KDS_TENANT_ID").filter(|t| !t.is_empty()),
            sync_config_path: lookup("KDS_SYNC_CONFIG").map(PathBuf::from),
        };

        if config.token.is_some() && config.tenant_id.is_none() {
            return Err(ConfigError::MissingRequired("KDS_TENANT_ID".to_string()));
        }

        Ok(config)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
