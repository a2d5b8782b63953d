//! # kds-sync: Real-Time Order Sync for Expo KDS
//!
//! Keeps every order screen in step with the server over one authenticated
//! WebSocket, and survives the network dropping out from under it.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Client Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │             SyncClient (cloneable handle)                        │  │
//! │  │  connect / disconnect / send / subscribe / stats / shutdown      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ Command (mpsc)                          │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │             ConnectionActor (one Tokio task)                     │  │
//! │  │                                                                  │  │
//! │  │  Disconnected ──► Connecting ──► Connected ──► Error             │  │
//! │  │        ▲                              │           │              │  │
//! │  │        └───── ReconnectPolicy ◄───────┴───────────┘              │  │
//! │  └──────┬─────────────────┬──────────────────┬───────────────────────┘  │
//! │         ▼                 ▼                  ▼                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐          │
//! │  │ Transport    │  │ Heartbeat    │  │ OutboundQueue        │          │
//! │  │ WS + codec   │  │ ping / dead  │  │ FIFO while offline   │          │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘          │
//! │                                                                         │
//! │  Inbound frame ──► codec::decode ──► protocol::classify                 │
//! │                         ──► DispatchRegistry ──► OrderStore             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Connection
//! - [`client`] - `SyncClient` handle and builder
//! - [`connection`] - Connection actor and state machine
//! - [`reconnect`] - Exponential backoff with jitter
//! - [`heartbeat`] - Ping cadence and dead-connection detection
//! - [`outbox`] - Outbound queue for sends made while offline
//!
//! ### Wire
//! - [`transport`] - WebSocket connector behind a trait seam
//! - [`auth`] - Credentials and connect URL
//! - [`codec`] - Envelope encoding and key-case conversion
//! - [`protocol`] - Message type names and inbound classification
//!
//! ### Consumers
//! - [`dispatch`] - Typed subscription tables
//! - [`events`] - Lifecycle events and user-facing notices
//! - [`orders`] - `OrderStore` reconciliation over `kds-core`
//!
//! ### Ambient
//! - [`config`] - TOML configuration with defaults
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kds_sync::{OrderStore, StaticAuth, SyncClient, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let client = SyncClient::builder(config)
//!     .auth(Arc::new(StaticAuth::new(token, restaurant_id)))
//!     .spawn()?;
//!
//! let store = OrderStore::mount(client.clone(), api).await;
//! client.connect()?;
//!
//! for order in store.active_orders() {
//!     println!("{} {}", order.order_number, order.status);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Connection
pub mod client;
pub mod connection;
pub mod heartbeat;
pub mod outbox;
pub mod reconnect;

// Wire
pub mod auth;
pub mod codec;
pub mod protocol;
pub mod transport;

// Consumers
pub mod dispatch;
pub mod events;
pub mod orders;

// Ambient
pub mod config;
pub mod error;

#[cfg(test)]
mod testkit;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{AuthProvider, ConnectTarget, Credentials, StaticAuth};
pub use client::{SyncClient, SyncClientBuilder};
pub use codec::Envelope;
pub use config::SyncConfig;
pub use connection::{ClientStats, ConnectionState};
pub use dispatch::{DispatchRegistry, Unsubscribe};
pub use error::{SyncError, SyncResult};
pub use events::{LifecycleEvent, NoOpNotifier, Notice, Notifier};
pub use orders::{OrderStore, OrdersApi};
pub use transport::{Connection, Connector, TransportEvent, WsConnector};
