//! # Connection Authentication
//!
//! The auth subsystem is external. It hands the client an opaque bearer token
//! and the restaurant (tenant) the token belongs to; the client embeds both in
//! the connect target as query parameters.
//!
//! ```text
//! wss://orders.example.com/ws?token=<bearer>&restaurant_id=<tenant>
//! ```

use async_trait::async_trait;
use url::Url;

use crate::config::ConnectionSettings;
use crate::error::{SyncError, SyncResult};

/// Dev-mode tenant when neither auth nor config names one.
const ANONYMOUS_TENANT: &str = "dev-restaurant";

/// What the auth collaborator supplies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub tenant_id: String,
}

/// Source of connection credentials.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the current credentials, or `None` when signed out.
    async fn credentials(&self) -> SyncResult<Option<Credentials>>;
}

/// Fixed credentials (CLI tools, tests).
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    credentials: Option<Credentials>,
}

impl StaticAuth {
    pub fn new(token: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        StaticAuth {
            credentials: Some(Credentials {
                token: token.into(),
                tenant_id: tenant_id.into(),
            }),
        }
    }

    /// A provider that is always signed out.
    pub fn anonymous() -> Self {
        StaticAuth { credentials: None }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn credentials(&self) -> SyncResult<Option<Credentials>> {
        Ok(self.credentials.clone())
    }
}

/// A fully-resolved connect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub url: Url,
    pub tenant_id: String,
    /// False for anonymous/dev connections.
    pub authenticated: bool,
}

impl ConnectTarget {
    /// Builds the target from settings and whatever the auth collaborator
    /// returned.
    ///
    /// Without credentials this fails with [`SyncError::MissingToken`] unless
    /// anonymous connections are explicitly allowed.
    pub fn resolve(
        settings: &ConnectionSettings,
        credentials: Option<Credentials>,
    ) -> SyncResult<Self> {
        let mut url = Url::parse(&settings.url)?;

        let target = match credentials {
            Some(Credentials { token, tenant_id }) => {
                url.query_pairs_mut()
                    .append_pair("token", &token)
                    .append_pair("restaurant_id", &tenant_id);
                ConnectTarget {
                    url,
                    tenant_id,
                    authenticated: true,
                }
            }
            None if settings.allow_anonymous => {
                let tenant_id = settings
                    .tenant_id
                    .clone()
                    .unwrap_or_else(|| ANONYMOUS_TENANT.to_string());
                url.query_pairs_mut().append_pair("restaurant_id", &tenant_id);
                ConnectTarget {
                    url,
                    tenant_id,
                    authenticated: false,
                }
            }
            None => return Err(SyncError::MissingToken),
        };

        Ok(target)
    }

    /// URL with the token redacted, for logs.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        let pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "token" { "***".to_string() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            url: "wss://orders.example.com/ws".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_embeds_token_and_tenant() {
        let target = ConnectTarget::resolve(
            &settings(),
            Some(Credentials {
                token: "abc123".into(),
                tenant_id: "r-7".into(),
            }),
        )
        .unwrap();

        let pairs: Vec<(String, String)> = target.url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("token".into(), "abc123".into())));
        assert!(pairs.contains(&("restaurant_id".into(), "r-7".into())));
        assert!(target.authenticated);
        assert!(!target.redacted().contains("abc123"));
    }

    #[test]
    fn test_production_mode_requires_token() {
        let result = ConnectTarget::resolve(&settings(), None);
        assert!(matches!(result, Err(SyncError::MissingToken)));
    }

    #[test]
    fn test_anonymous_mode_when_allowed() {
        let mut settings = settings();
        settings.allow_anonymous = true;
        settings.tenant_id = Some("r-dev".into());

        let target = ConnectTarget::resolve(&settings, None).unwrap();
        assert!(!target.authenticated);
        assert_eq!(target.tenant_id, "r-dev");
        assert!(target.url.query().unwrap().contains("restaurant_id=r-dev"));
        assert!(!target.url.query().unwrap().contains("token"));
    }

    #[tokio::test]
    async fn test_static_auth() {
        let auth = StaticAuth::new("t", "r");
        assert_eq!(auth.credentials().await.unwrap().unwrap().tenant_id, "r");
        assert!(StaticAuth::anonymous().credentials().await.unwrap().is_none());
    }
}
