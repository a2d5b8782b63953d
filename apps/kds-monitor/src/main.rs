//! # Expo KDS Monitor
//!
//! Command-line order monitor for the expo station.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Monitor Process                                  │
//! │                                                                         │
//! │  env ──► MonitorConfig + SyncConfig                                    │
//! │                │                                                        │
//! │                ▼                                                        │
//! │  SyncClient ◄──── WebSocket ────► order server                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  OrderStore ◄──── HTTP (seed / resync) ────► orders API                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tracing log lines until Ctrl+C                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod http;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kds_core::OrderEvent;
use kds_sync::{
    AuthProvider, Notice, Notifier, OrderStore, StaticAuth, SyncClient, SyncConfig,
};

use crate::config::MonitorConfig;
use crate::http::HttpOrdersApi;

/// Routes user-facing notices into the log.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        if notice.is_warning() {
            warn!(%notice, "Notice");
        } else {
            info!(%notice, "Notice");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Expo KDS monitor...");

    let monitor = MonitorConfig::from_env()?;
    let sync_config = SyncConfig::load(monitor.sync_config_path.clone())?;
    info!(
        socket = %sync_config.connection.url,
        api = %monitor.api_url,
        authenticated = monitor.token.is_some(),
        "Configuration loaded"
    );

    let auth: Arc<dyn AuthProvider> = match (&monitor.token, &monitor.tenant_id) {
        (Some(token), Some(tenant_id)) => Arc::new(StaticAuth::new(token, tenant_id)),
        _ => Arc::new(StaticAuth::anonymous()),
    };

    let client = SyncClient::builder(sync_config)
        .auth(auth)
        .notifier(Arc::new(LogNotifier))
        .spawn()?;

    let api = Arc::new(HttpOrdersApi::new(
        monitor.api_url.clone(),
        monitor.token.clone(),
        monitor.tenant_id.clone(),
    ));
    let store = OrderStore::mount(client.clone(), api).await;
    info!(orders = store.len(), active = store.active_orders().len(), "Order store mounted");

    let feed = client.subscribe_orders(|event| match event {
        OrderEvent::StatusChanged { id, status } => info!(order_id = %id, %status, "Status changed"),
        OrderEvent::Deleted { id } => info!(order_id = %id, "Order removed"),
        OrderEvent::Created(order) | OrderEvent::Updated(order) => info!(
            kind = event.kind(),
            order_number = %order.order_number,
            status = %order.status,
            items = order.item_count(),
            "Order"
        ),
    });

    client.connect()?;

    let mut state = client.watch_state();
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    warn!("Sync client stopped");
                    break;
                }
                let current = *state.borrow_and_update();
                info!(state = %current, active = store.active_orders().len(), "Connection state");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    feed.unsubscribe();
    store.unmount();
    if let Err(e) = client.shutdown().await {
        warn!(error = %e, "Sync client already stopped");
    }

    info!("Monitor shutdown complete");
    Ok(())
}
