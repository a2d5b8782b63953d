//! # Wire Codec
//!
//! Converts envelopes to and from socket frames. This is the only place the
//! wire vocabulary (snake_case payload keys) meets the in-memory vocabulary
//! (camelCase payload keys, as produced by the `kds-core` types).
//!
//! ## Frame Shape
//! ```json
//! {
//!   "type": "order:status_changed",
//!   "payload": { "order_id": "o1", "status": "ready" },
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "tenantId": "restaurant-001"
//! }
//! ```
//!
//! ```text
//! outbound:  Envelope ── keys_to_snake(payload) ── serde_json ──► frame
//! inbound:   frame ──► serde_json ── keys_to_camel(payload) ──► Envelope
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncResult;

/// The typed wrapper around every message crossing the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Dispatch key.
    #[serde(rename = "type")]
    pub message_type: String,

    #[serde(default)]
    pub payload: Value,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl Envelope {
    /// Creates an envelope stamped now.
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Envelope {
            message_type: message_type.into(),
            payload,
            timestamp: Utc::now(),
            tenant_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }
}

/// Encodes an envelope into a text frame.
pub fn encode(envelope: &Envelope) -> SyncResult<String> {
    let wire = Envelope {
        payload: keys_to_snake(&envelope.payload),
        ..envelope.clone()
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Decodes a text frame into an envelope.
pub fn decode(frame: &str) -> SyncResult<Envelope> {
    let mut envelope: Envelope = serde_json::from_str(frame)?;
    envelope.payload = keys_to_camel(&envelope.payload);
    Ok(envelope)
}

/// Recursively rewrites object keys to snake_case.
pub fn keys_to_snake(value: &Value) -> Value {
    map_keys(value, &snake_case)
}

/// Recursively rewrites object keys to camelCase.
pub fn keys_to_camel(value: &Value) -> Value {
    map_keys(value, &camel_case)
}

fn map_keys(value: &Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| (rename(key), map_keys(inner, rename)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| map_keys(v, rename)).collect()),
        other => other.clone(),
    }
}

/// `orderNumber` → `order_number`, `orderID` → `order_id`.
fn snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p == '_' => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `order_number` → `orderNumber`. Leading underscores are kept.
fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' {
            if out.chars().all(|o| o == '_') {
                out.push(c);
            } else {
                upper_next = true;
            }
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
