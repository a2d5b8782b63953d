//! # Order Events
//!
//! The closed set of order-domain events pushed by the server.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Order Event Set                                 │
//! │                                                                         │
//! │  Created(order)              new ticket                                │
//! │  Updated(order)              wholesale replacement                     │
//! │  Deleted { id }              removal (target may be unknown)           │
//! │  StatusChanged { id, status } status-only patch                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::types::{Order, OrderStatus};

/// An order lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Created(Order),
    Updated(Order),
    Deleted { id: String },
    StatusChanged { id: String, status: OrderStatus },
}

impl OrderEvent {
    /// Id of the order the event targets.
    pub fn order_id(&self) -> &str {
        match self {
            OrderEvent::Created(order) | OrderEvent::Updated(order) => &order.id,
            OrderEvent::Deleted { id } | OrderEvent::StatusChanged { id, .. } => id,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "created",
            OrderEvent::Updated(_) => "updated",
            OrderEvent::Deleted { .. } => "deleted",
            OrderEvent::StatusChanged { .. } => "status_changed",
        }
    }

    /// Human-readable description for the notification layer.
    pub fn describe(&self) -> String {
        match self {
            OrderEvent::Created(order) => {
                format!("New order received: #{}", order.order_number)
            }
            OrderEvent::Updated(order) => format!("Order #{} updated", order.order_number),
            OrderEvent::Deleted { id } => format!("Order {} removed", id),
            OrderEvent::StatusChanged { id, status } => {
                format!("Order {} is now {}", id, status)
            }
        }
    }
}
