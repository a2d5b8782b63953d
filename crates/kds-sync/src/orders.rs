//! # Order Store
//!
//! Binds an [`OrderProjection`] to the sync client and the HTTP collaborator.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Order Store                                      │
//! │                                                                         │
//! │  mount()                                                               │
//! │    ├── subscribe_orders ──► projection.apply(event)                    │
//! │    ├── subscribe_lifecycle                                             │
//! │    │     Connected { reconnect: true }                                 │
//! │    │        ├── send sync:request { reason: "reconnect", since }       │
//! │    │        └── get_orders() ──► projection.replace_all               │
//! │    └── get_orders() ──► projection.replace_all        (initial seed)   │
//! │                                                                         │
//! │  update_order_status(id, status)                                       │
//! │    patch locally ──► API ──► ok: true                                  │
//! │                          └─► err: roll back, false                     │
//! │                                                                         │
//! │  unmount() ──► unsubscribe both, abort in-flight reload                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The protocol never replays missed events, so every reconnection is
//! followed by a full-state refresh. Only the newest refresh may land: a
//! reconnect aborts the reload started by the one before it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use kds_core::{Applied, Order, OrderEvent, OrderProjection, OrderStatus};

use crate::client::SyncClient;
use crate::dispatch::Unsubscribe;
use crate::error::SyncResult;
use crate::events::{LifecycleEvent, Notice, Notifier};
use crate::protocol::{message_type, sync_request_payload};

/// The authoritative HTTP API.
#[async_trait]
pub trait OrdersApi: Send + Sync {
    /// Full current order list.
    async fn get_orders(&self) -> SyncResult<Vec<Order>>;

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> SyncResult<()>;
}

/// The reconnect reload currently in flight, if any.
type ReloadSlot = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Reconciliation layer over a mounted projection.
pub struct OrderStore {
    client: SyncClient,
    api: Arc<dyn OrdersApi>,
    projection: Arc<Mutex<OrderProjection>>,
    subscriptions: Mutex<Vec<Unsubscribe>>,
    reload: ReloadSlot,
}

impl OrderStore {
    /// Subscribes to the client and seeds the projection from the API.
    ///
    /// A failed seed is logged; the store still mounts empty and fills in
    /// from events and the next reconnect refresh.
    pub async fn mount(client: SyncClient, api: Arc<dyn OrdersApi>) -> Self {
        let projection = Arc::new(Mutex::new(OrderProjection::new()));
        let last_disconnect: Arc<Mutex<Option<DateTime<Utc>>>> = Arc::new(Mutex::new(None));
        let notifier = client.notifier();
        let reload: ReloadSlot = Arc::new(Mutex::new(None));

        let orders_sub = {
            let projection = Arc::clone(&projection);
            let notifier = Arc::clone(&notifier);
            client.subscribe_orders(move |event| {
                apply_event(&projection, notifier.as_ref(), event);
            })
        };

        let lifecycle_sub = {
            let projection = Arc::clone(&projection);
            let api = Arc::clone(&api);
            let reload = Arc::clone(&reload);
            let handle = client.clone();
            client.subscribe_lifecycle(move |event| match event {
                LifecycleEvent::Connected { reconnect: true } => {
                    let since = last_disconnect.lock().take();
                    request_resync(&handle, since);
                    spawn_refresh(&reload, Arc::clone(&api), Arc::clone(&projection));
                }
                LifecycleEvent::Disconnected { .. } | LifecycleEvent::Error { .. } => {
                    last_disconnect.lock().get_or_insert_with(Utc::now);
                }
                _ => {}
            })
        };

        let store = OrderStore {
            client,
            api,
            projection,
            subscriptions: Mutex::new(vec![orders_sub, lifecycle_sub]),
            reload,
        };
        store.refresh().await;
        store
    }

    /// Reloads the full order list from the API.
    pub async fn refresh(&self) -> bool {
        load_snapshot(self.api.as_ref(), &self.projection).await
    }

    /// Snapshot of the projection, newest first.
    pub fn orders(&self) -> Vec<Order> {
        self.projection.lock().orders().to_vec()
    }

    /// Orders still in the kitchen flow.
    pub fn active_orders(&self) -> Vec<Order> {
        self.projection.lock().active().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Order> {
        self.projection.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.projection.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.projection.lock().is_empty()
    }

    /// Patches the local status, then asks the API to make it so.
    ///
    /// On API failure the local status is restored (unless an event has
    /// changed it in the meantime) and `false` is returned.
    pub async fn update_order_status(&self, id: &str, status: OrderStatus) -> bool {
        let previous = self.projection.lock().set_status(id, status);

        match self.api.update_order_status(id, status).await {
            Ok(()) => {
                info!(order_id = id, %status, "Order status updated");
                true
            }
            Err(e) => {
                error!(order_id = id, %status, error = %e, "Order status update failed");
                if let Some(previous) = previous {
                    let mut projection = self.projection.lock();
                    if projection.get(id).map(|order| order.status) == Some(status) {
                        projection.set_status(id, previous);
                        debug!(order_id = id, %previous, "Rolled back optimistic status");
                    }
                }
                false
            }
        }
    }

    /// Removes both subscriptions and cancels a pending reload. Safe to call
    /// more than once.
    pub fn unmount(&self) {
        let subscriptions: Vec<Unsubscribe> = self.subscriptions.lock().drain(..).collect();
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
        if let Some(task) = self.reload.lock().take() {
            task.abort();
        }
        if !subscriptions.is_empty() {
            debug!("Order store unmounted");
        }
    }

    /// The client this store is mounted on.
    pub fn client(&self) -> &SyncClient {
        &self.client
    }
}

fn apply_event(projection: &Mutex<OrderProjection>, notifier: &dyn Notifier, event: &OrderEvent) {
    let (applied, order_number) = {
        let mut projection = projection.lock();
        let applied = projection.apply(event);
        let order_number = projection
            .get(event.order_id())
            .map(|order| order.order_number.clone());
        (applied, order_number)
    };

    match (event, applied) {
        (OrderEvent::Created(order), Applied::Inserted) => {
            info!(order_id = %order.id, order_number = %order.order_number, "New order");
            notifier.notify(Notice::NewOrder {
                order_number: order.order_number.clone(),
            });
        }
        (OrderEvent::Created(order), Applied::Replaced) => {
            debug!(order_id = %order.id, "Duplicate create replaced in place");
        }
        (OrderEvent::Updated(order), Applied::Inserted) => {
            debug!(order_id = %order.id, "Update for unseen order inserted");
        }
        (OrderEvent::StatusChanged { id, status }, Applied::NoMatch) => {
            warn!(order_id = %id, %status, "Status change for unknown order");
        }
        (
            OrderEvent::StatusChanged {
                status: OrderStatus::Cancelled,
                ..
            },
            Applied::StatusPatched { previous },
        ) if previous != OrderStatus::Cancelled => {
            if let Some(order_number) = order_number {
                notifier.notify(Notice::OrderCancelled { order_number });
            }
        }
        (OrderEvent::Deleted { id }, Applied::NoMatch) => {
            debug!(order_id = %id, "Delete for unknown order ignored");
        }
        (event, applied) => {
            debug!(kind = event.kind(), order_id = event.order_id(), ?applied, "Order event applied");
        }
    }
}

fn request_resync(client: &SyncClient, since: Option<DateTime<Utc>>) {
    info!(?since, "Reconnected, requesting full resync");
    if let Err(e) = client.send(
        message_type::SYNC_REQUEST,
        sync_request_payload("reconnect", since),
    ) {
        warn!(error = %e, "Could not request resync");
    }
}

fn spawn_refresh(
    reload: &ReloadSlot,
    api: Arc<dyn OrdersApi>,
    projection: Arc<Mutex<OrderProjection>>,
) {
    let task = tokio::spawn(async move {
        load_snapshot(api.as_ref(), &projection).await;
    });
    if let Some(previous) = reload.lock().replace(task) {
        if !previous.is_finished() {
            debug!("Superseding in-flight order reload");
        }
        previous.abort();
    }
}

async fn load_snapshot(api: &dyn OrdersApi, projection: &Mutex<OrderProjection>) -> bool {
    match api.get_orders().await {
        Ok(orders) => {
            let count = orders.len();
            projection.lock().replace_all(orders);
            info!(count, "Order snapshot loaded");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to load orders");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{test_config, Harness, MockOrdersApi, MockPeer};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn order(id: &str, number: &str, status: OrderStatus) -> Order {
        Order::new(id, number, status)
    }

    fn order_payload(order: &Order) -> Value {
        json!({ "order": serde_json::to_value(order).unwrap() })
    }

    async fn mounted(api: Arc<MockOrdersApi>) -> (Harness, OrderStore, MockPeer) {
        let mut h = Harness::new(test_config());
        let store = OrderStore::mount(h.client.clone(), api).await;
        let peer = h.connect().await;
        (h, store, peer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_seeds_from_api() {
        let api = MockOrdersApi::with_orders(vec![
            order("o1", "A-1", OrderStatus::Preparing),
            order("o2", "A-2", OrderStatus::Completed),
        ]);
        let (_h, store, _peer) = mounted(api.clone()).await;

        assert_eq!(api.loads(), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_orders().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_created_then_status_changed() {
        let (h, store, peer) = mounted(MockOrdersApi::with_orders(Vec::new())).await;

        peer.push("order:created", order_payload(&order("o1", "A-1", OrderStatus::New)));
        peer.push(
            "order:status_changed",
            json!({ "orderId": "o1", "status": "ready" }),
        );
        h.drain_inbound(&peer).await;

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("o1").unwrap().status, OrderStatus::Ready);
        assert!(h.notifier.notices().contains(&Notice::NewOrder {
            order_number: "A-1".into()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_created_yields_one_entry() {
        let (h, store, peer) = mounted(MockOrdersApi::with_orders(Vec::new())).await;

        let mut ticket = order("o1", "A-1", OrderStatus::New);
        peer.push("order:created", order_payload(&ticket));
        ticket.notes = Some("extra napkins".into());
        peer.push("order:created", order_payload(&ticket));
        h.drain_inbound(&peer).await;

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("o1").unwrap().notes.as_deref(), Some("extra napkins"));
        let new_order_notices = h
            .notifier
            .notices()
            .into_iter()
            .filter(|n| matches!(n, Notice::NewOrder { .. }))
            .count();
        assert_eq!(new_order_notices, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_unknown_orders_are_harmless() {
        let api = MockOrdersApi::with_orders(vec![order("o1", "A-1", OrderStatus::New)]);
        let (h, store, peer) = mounted(api).await;

        peer.push("order:deleted", json!({ "orderId": "ghost" }));
        peer.push(
            "order:status_changed",
            json!({ "orderId": "ghost", "status": "ready" }),
        );
        h.drain_inbound(&peer).await;

        assert_eq!(store.len(), 1);
        assert!(store.get("ghost").is_none());
        assert!(h.client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_before_create_and_delete() {
        let (h, store, peer) = mounted(MockOrdersApi::with_orders(Vec::new())).await;

        peer.push("order:updated", order_payload(&order("o1", "A-1", OrderStatus::Confirmed)));
        h.drain_inbound(&peer).await;
        assert_eq!(store.get("o1").unwrap().status, OrderStatus::Confirmed);

        peer.push("order:deleted", json!({ "orderId": "o1" }));
        peer.push("order:status_changed", json!({ "orderId": "o1", "status": "ready" }));
        h.drain_inbound(&peer).await;
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_notice() {
        let api = MockOrdersApi::with_orders(vec![order("o1", "A-7", OrderStatus::Preparing)]);
        let (h, _store, peer) = mounted(api).await;

        peer.push(
            "order:status_changed",
            json!({ "orderId": "o1", "status": "cancelled" }),
        );
        h.drain_inbound(&peer).await;

        assert!(h.notifier.notices().contains(&Notice::OrderCancelled {
            order_number: "A-7".into()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_requests_resync_and_reloads() {
        let api = MockOrdersApi::with_orders(vec![order("o1", "A-1", OrderStatus::New)]);
        let (mut h, store, peer) = mounted(api.clone()).await;
        h.wait_for(|e| *e == LifecycleEvent::Connected { reconnect: false })
            .await;
        assert_eq!(api.loads(), 1);

        api.set_snapshot(vec![
            order("o1", "A-1", OrderStatus::Ready),
            order("o2", "A-2", OrderStatus::New),
        ]);
        peer.drop_connection(1006);

        let mut second = h.next_peer().await;
        let request = second.next_sent().await.unwrap();
        assert_eq!(request["type"], "sync:request");
        assert_eq!(request["payload"]["reason"], "reconnect");
        assert!(request["payload"]["since"].is_string());

        while api.loads() < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("o1").unwrap().status, OrderStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_reconnects_apply_newest_snapshot() {
        let api = MockOrdersApi::with_orders(vec![order("o1", "A-1", OrderStatus::New)]);
        let (mut h, store, peer) = mounted(api.clone()).await;

        // The first reload reads "preparing" but answers slowly.
        api.set_snapshot(vec![order("o1", "A-1", OrderStatus::Preparing)]);
        api.delay_next_load(Duration::from_secs(10));
        peer.drop_connection(1006);
        let second = h.next_peer().await;
        while api.loads() < 2 {
            tokio::task::yield_now().await;
        }

        // The second reads "ready" and answers at once.
        api.set_snapshot(vec![order("o1", "A-1", OrderStatus::Ready)]);
        second.drop_connection(1006);
        let _third = h.next_peer().await;
        while api.loads() < 3 {
            tokio::task::yield_now().await;
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.get("o1").unwrap().status, OrderStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_pending_reload() {
        let api = MockOrdersApi::with_orders(vec![order("o1", "A-1", OrderStatus::New)]);
        let (mut h, store, peer) = mounted(api.clone()).await;

        api.set_snapshot(Vec::new());
        api.delay_next_load(Duration::from_secs(10));
        peer.drop_connection(1006);
        let _second = h.next_peer().await;
        while api.loads() < 2 {
            tokio::task::yield_now().await;
        }

        store.unmount();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len(), 1);
        assert_eq!(api.loads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_update_success() {
        let api = MockOrdersApi::with_orders(vec![order("o1", "A-1", OrderStatus::New)]);
        let (_h, store, _peer) = mounted(api.clone()).await;

        assert!(store.update_order_status("o1", OrderStatus::Preparing).await);
        assert_eq!(store.get("o1").unwrap().status, OrderStatus::Preparing);
        assert_eq!(api.updates(), vec![("o1".to_string(), OrderStatus::Preparing)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_update_rolls_back_on_failure() {
        let api = MockOrdersApi::with_orders(vec![order("o1", "A-1", OrderStatus::New)]);
        let (_h, store, _peer) = mounted(api.clone()).await;
        api.fail_updates(true);

        assert!(!store.update_order_status("o1", OrderStatus::Ready).await);
        assert_eq!(store.get("o1").unwrap().status, OrderStatus::New);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_releases_subscriptions() {
        let (h, store, peer) = mounted(MockOrdersApi::with_orders(Vec::new())).await;
        let mounted_count = h.settle().await.subscriptions;

        store.unmount();
        store.unmount();
        assert_eq!(h.settle().await.subscriptions, mounted_count - 2);

        peer.push("order:created", order_payload(&order("o9", "A-9", OrderStatus::New)));
        h.drain_inbound(&peer).await;
        assert!(store.is_empty());
    }
}
