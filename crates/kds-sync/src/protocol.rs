//! # Order Sync Protocol
//!
//! Message vocabulary spoken over the order socket.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Order Sync Messages                                │
//! │                                                                         │
//! │  ORDER EVENTS (server → client)                                        │
//! │  ──────────────────────────────                                        │
//! │  order:created         { order }                                       │
//! │  order:updated         { order }                                       │
//! │  order:deleted         { order_id }                                    │
//! │  order:status_changed  { order_id, status }                            │
//! │                                                                         │
//! │  RESYNC (client → server)                                              │
//! │  ────────────────────────                                              │
//! │  sync:request          { reason, since? }                              │
//! │                                                                         │
//! │  KEEPALIVE                                                             │
//! │  ─────────                                                             │
//! │  client ───► ping { timestamp }                                        │
//! │  client ◄─── pong                (consumed by the heartbeat monitor)   │
//! │                                                                         │
//! │  ERROR                                                                 │
//! │  ─────                                                                 │
//! │  client ◄─── error { code, message }                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every order event carries exactly one payload schema. There is no legacy
//! fallback shape.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use kds_core::{CoreError, Order, OrderEvent, OrderStatus};

use crate::codec::Envelope;
use crate::error::{SyncError, SyncResult};

/// Message type strings.
pub mod message_type {
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
    pub const SYNC_REQUEST: &str = "sync:request";
    pub const ORDER_CREATED: &str = "order:created";
    pub const ORDER_UPDATED: &str = "order:updated";
    pub const ORDER_DELETED: &str = "order:deleted";
    pub const ORDER_STATUS_CHANGED: &str = "order:status_changed";

    /// The four order-domain types, in the order they are documented.
    pub const ORDER_EVENTS: [&str; 4] = [
        ORDER_CREATED,
        ORDER_UPDATED,
        ORDER_DELETED,
        ORDER_STATUS_CHANGED,
    ];
}

// =============================================================================
// Inbound Classification
// =============================================================================

/// An inbound envelope sorted into the closed set the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Heartbeat reply. Never dispatched to subscribers.
    Pong,
    /// A typed order-domain event.
    Order(OrderEvent),
    /// Server-reported error.
    ServerError { code: String, message: String },
    /// Anything else; forwarded on the generic path only.
    Other,
}

// Payload schemas (camelCase: the codec has already normalized keys).

#[derive(Deserialize)]
struct OrderPayload {
    order: Order,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderIdPayload {
    order_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    order_id: String,
    status: OrderStatus,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Sorts an envelope into [`Inbound`].
///
/// A payload that does not match its declared type is an error for that
/// frame only.
pub fn classify(envelope: &Envelope) -> SyncResult<Inbound> {
    let payload = &envelope.payload;
    let inbound = match envelope.message_type.as_str() {
        message_type::PONG => Inbound::Pong,
        message_type::ORDER_CREATED => {
            Inbound::Order(OrderEvent::Created(parse_order(payload, "order:created")?))
        }
        message_type::ORDER_UPDATED => {
            Inbound::Order(OrderEvent::Updated(parse_order(payload, "order:updated")?))
        }
        message_type::ORDER_DELETED => {
            let p: OrderIdPayload = parse(payload, "order:deleted")?;
            Inbound::Order(OrderEvent::Deleted {
                id: non_empty(p.order_id)?,
            })
        }
        message_type::ORDER_STATUS_CHANGED => {
            let p: StatusPayload = parse(payload, "order:status_changed")?;
            Inbound::Order(OrderEvent::StatusChanged {
                id: non_empty(p.order_id)?,
                status: p.status,
            })
        }
        message_type::ERROR => {
            let p: ErrorPayload = parse(payload, "error")?;
            Inbound::ServerError {
                code: p.code,
                message: p.message,
            }
        }
        _ => Inbound::Other,
    };
    Ok(inbound)
}

fn parse<T: for<'de> Deserialize<'de>>(payload: &Value, context: &str) -> SyncResult<T> {
    T::deserialize(payload)
        .map_err(|e| SyncError::InvalidMessage(format!("{} payload: {}", context, e)))
}

fn parse_order(payload: &Value, context: &str) -> SyncResult<Order> {
    let OrderPayload { order } = parse(payload, context)?;
    if order.id.is_empty() {
        return Err(CoreError::MissingOrderId.into());
    }
    Ok(order)
}

fn non_empty(id: String) -> SyncResult<String> {
    if id.is_empty() {
        Err(CoreError::MissingOrderId.into())
    } else {
        Ok(id)
    }
}

// =============================================================================
// Outbound Builders
// =============================================================================

/// Liveness probe payload.
pub fn ping_payload() -> Value {
    json!({ "timestamp": Utc::now().to_rfc3339() })
}

/// Full-resync request sent after every reconnection.
pub fn sync_request_payload(reason: &str, since: Option<DateTime<Utc>>) -> Value {
    match since {
        Some(since) => json!({ "reason": reason, "since": since.to_rfc3339() }),
        None => json!({ "reason": reason }),
    }
}
