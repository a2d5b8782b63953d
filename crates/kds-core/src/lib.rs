//! # kds-core: Pure Order Domain for Expo KDS
//!
//! Order types, the closed order-event set, and the reconciliation rules that
//! keep a client-side order projection consistent with the server's event
//! stream. Nothing in this crate touches a socket, a timer, or a file.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Expo KDS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Order screens (kitchen display, expo, front of house)    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ orders / update_order_status           │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kds-sync (OrderStore, SyncClient)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kds-core (THIS CRATE) ★                          │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌─────────────────┐             │   │
//! │  │   │   types   │  │  events   │  │   projection    │             │   │
//! │  │   │   Order   │  │OrderEvent │  │ OrderProjection │             │   │
//! │  │   └───────────┘  └───────────┘  └─────────────────┘             │   │
//! │  │   NO I/O • NO NETWORK • PURE FUNCTIONS                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use kds_core::{Order, OrderEvent, OrderProjection, OrderStatus};
//!
//! let mut projection = OrderProjection::new();
//! projection.apply(&OrderEvent::Created(Order::new("o1", "A-101", OrderStatus::New)));
//! projection.apply(&OrderEvent::StatusChanged { id: "o1".into(), status: OrderStatus::Ready });
//!
//! assert_eq!(projection.len(), 1);
//! assert_eq!(projection.get("o1").unwrap().status, OrderStatus::Ready);
//! ```

pub mod error;
pub mod events;
pub mod projection;
pub mod types;

pub use error::CoreError;
pub use events::OrderEvent;
pub use projection::{Applied, OrderProjection};
pub use types::{Order, OrderItem, OrderStatus, OrderType};
