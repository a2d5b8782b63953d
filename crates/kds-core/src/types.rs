//! # Domain Types
//!
//! Order types shared by the sync engine and the order screens.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │   OrderItem     │   │  OrderStatus    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (immutable) │   │  name           │   │  New            │       │
//! │  │  order_number   │   │  quantity       │   │  Pending        │       │
//! │  │  status         │   │  modifiers      │   │  Confirmed      │       │
//! │  │  items          │   │  unit_price     │   │  Preparing      │       │
//! │  │  created_at     │   └─────────────────┘   │  Ready          │       │
//! │  │  updated_at     │                         │  PickedUp       │       │
//! │  └─────────────────┘                         │  Completed      │       │
//! │                                              │  Cancelled      │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority
//! The server owns every order. The client only ever holds a projection of
//! these values (see [`crate::projection`]).
//!
//! ## Field Naming
//! In-memory JSON uses camelCase (`orderNumber`). The sync codec converts to
//! and from the snake_case wire vocabulary at the socket boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle state of an order.
///
/// Variants are declared in lifecycle order, so `Ord` follows the kitchen
/// flow (`New < Preparing < Ready < Completed`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Just placed, not yet seen by the kitchen.
    #[default]
    New,
    /// Awaiting payment or confirmation.
    Pending,
    /// Accepted by the restaurant.
    Confirmed,
    /// On the line.
    Preparing,
    /// Waiting at the expo station.
    Ready,
    /// Handed to the guest or the courier.
    PickedUp,
    /// Closed out.
    Completed,
    /// Voided before completion.
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::New,
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::PickedUp,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true once the order has left the kitchen flow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::PickedUp | OrderStatus::Completed | OrderStatus::Cancelled
        )
    }

    /// Returns true while the order belongs on a kitchen screen.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
    }
}

// =============================================================================
// Order Type
// =============================================================================

/// How the order reaches the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    DineIn,
    Takeout,
    Delivery,
    Online,
}

// =============================================================================
// Order Item
// =============================================================================

/// A line on a kitchen ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    /// Unit price in cents (integer money, never floats).
    #[serde(default)]
    pub unit_price_cents: i64,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

// =============================================================================
// Order
// =============================================================================

/// An order as last reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique, immutable identifier.
    pub id: String,
    /// Human-facing ticket number ("A-104").
    pub order_number: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub table_number: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub total_cents: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order with no items, stamped now.
    pub fn new(id: impl Into<String>, order_number: impl Into<String>, status: OrderStatus) -> Self {
        let now = Utc::now();
        Order {
            id: id.into(),
            order_number: order_number.into(),
            status,
            order_type: OrderType::default(),
            table_number: None,
            customer_name: None,
            items: Vec::new(),
            total_cents: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}
