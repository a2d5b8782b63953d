//! In-memory transport and collaborators for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use kds_core::{Order, OrderStatus};

use crate::auth::{AuthProvider, ConnectTarget, StaticAuth};
use crate::client::SyncClient;
use crate::codec::{self, Envelope};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{LifecycleEvent, Notice, Notifier};
use crate::orders::OrdersApi;
use crate::transport::{Connection, Connector, TransportEvent};

// =============================================================================
// Mock Transport
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Accept,
    Refuse,
}

/// Scripted connector. Unscripted attempts are accepted.
pub(crate) struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    attempts: AtomicUsize,
    targets: Mutex<Vec<ConnectTarget>>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = MockConnector {
            script: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
            peers,
        };
        (Arc::new(connector), peer_rx)
    }

    pub(crate) fn script(&self, outcomes: &[Outcome]) {
        self.script.lock().extend(outcomes.iter().copied());
    }

    /// Physical connection attempts, accepted or refused.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn targets(&self) -> Vec<ConnectTarget> {
        self.targets.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, target: &ConnectTarget) -> SyncResult<Box<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().push(target.clone());

        let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Accept);
        if outcome == Outcome::Refuse {
            return Err(SyncError::ConnectionFailed("connection refused".into()));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(Mutex::new(None));

        let peer = MockPeer {
            to_client,
            from_client,
            closed: Arc::clone(&closed),
        };
        self.peers
            .send(peer)
            .map_err(|_| SyncError::ConnectionFailed("test dropped the peer receiver".into()))?;

        Ok(Box::new(MockConnection {
            inbound,
            outbound,
            closed,
        }))
    }
}

struct MockConnection {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<Mutex<Option<(u16, String)>>>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, frame: String) -> SyncResult<()> {
        self.outbound.send(frame).map_err(|_| SyncError::Disconnected)
    }

    async fn recv(&mut self) -> TransportEvent {
        match self.inbound.recv().await {
            Some(event) => event,
            None => TransportEvent::Closed {
                code: None,
                reason: "peer dropped".into(),
            },
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> SyncResult<()> {
        *self.closed.lock() = Some((code, reason.to_string()));
        Ok(())
    }
}

/// Server side of one mock connection.
pub(crate) struct MockPeer {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<Mutex<Option<(u16, String)>>>,
}

impl MockPeer {
    pub(crate) fn push_raw(&self, frame: &str) {
        let _ = self.to_client.send(TransportEvent::Frame(frame.to_string()));
    }

    /// Pushes an envelope with a snake_case wire payload.
    pub(crate) fn push(&self, message_type: &str, payload: Value) {
        let frame = codec::encode(&Envelope::new(message_type, payload)).unwrap();
        self.push_raw(&frame);
    }

    /// Closes from the server side.
    pub(crate) fn drop_connection(&self, code: u16) {
        let _ = self.to_client.send(TransportEvent::Closed {
            code: Some(code),
            reason: "server went away".into(),
        });
    }

    pub(crate) fn fail(&self) {
        let _ = self
            .to_client
            .send(TransportEvent::Error(SyncError::WebSocketError("reset".into())));
    }

    /// Next frame the client sent, skipping heartbeat probes.
    pub(crate) async fn next_sent(&mut self) -> Option<Value> {
        while let Some(frame) = self.from_client.recv().await {
            let value: Value = serde_json::from_str(&frame).unwrap();
            if value["type"] != "ping" {
                return Some(value);
            }
        }
        None
    }

    /// Every frame sent so far, heartbeat probes included.
    pub(crate) fn drain_sent(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    /// Close code and reason if the client closed this connection.
    pub(crate) fn closed_with(&self) -> Option<(u16, String)> {
        self.closed.lock().clone()
    }
}

// =============================================================================
// Collaborators
// =============================================================================

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

/// Orders API with a canned snapshot and a switchable failure mode.
///
/// A load reads the snapshot when called, then waits out the next scripted
/// delay, if any, before returning it.
#[derive(Default)]
pub(crate) struct MockOrdersApi {
    snapshot: Mutex<Vec<Order>>,
    load_delays: Mutex<VecDeque<Duration>>,
    fail_updates: Mutex<bool>,
    loads: AtomicUsize,
    updates: Mutex<Vec<(String, OrderStatus)>>,
}

impl MockOrdersApi {
    pub(crate) fn with_orders(orders: Vec<Order>) -> Arc<Self> {
        let api = MockOrdersApi::default();
        *api.snapshot.lock() = orders;
        Arc::new(api)
    }

    pub(crate) fn set_snapshot(&self, orders: Vec<Order>) {
        *self.snapshot.lock() = orders;
    }

    pub(crate) fn delay_next_load(&self, delay: Duration) {
        self.load_delays.lock().push_back(delay);
    }

    pub(crate) fn fail_updates(&self, fail: bool) {
        *self.fail_updates.lock() = fail;
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn updates(&self) -> Vec<(String, OrderStatus)> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl OrdersApi for MockOrdersApi {
    async fn get_orders(&self) -> SyncResult<Vec<Order>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.snapshot.lock().clone();
        let delay = self.load_delays.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> SyncResult<()> {
        self.updates.lock().push((id.to_string(), status));
        if *self.fail_updates.lock() {
            return Err(SyncError::ApiRequestFailed("500 Internal Server Error".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub(crate) struct Harness {
    pub client: SyncClient,
    pub connector: Arc<MockConnector>,
    pub peers: mpsc::UnboundedReceiver<MockPeer>,
    pub notifier: Arc<RecordingNotifier>,
    pub lifecycle: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl Harness {
    pub(crate) fn new(config: SyncConfig) -> Self {
        Self::with_auth(config, Arc::new(StaticAuth::new("token-1", "restaurant-1")))
    }

    pub(crate) fn with_auth(config: SyncConfig, auth: Arc<dyn AuthProvider>) -> Self {
        let (connector, peers) = MockConnector::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let client = SyncClient::builder(config)
            .connector(connector.clone())
            .auth(auth)
            .notifier(notifier.clone())
            .spawn()
            .unwrap();

        let (lifecycle_tx, lifecycle) = mpsc::unbounded_channel();
        client.subscribe_lifecycle(move |event| {
            let _ = lifecycle_tx.send(event.clone());
        });

        Harness {
            client,
            connector,
            peers,
            notifier,
            lifecycle,
        }
    }

    /// Connects and waits for the physical connection.
    pub(crate) async fn connect(&mut self) -> MockPeer {
        self.client.connect().unwrap();
        self.next_peer().await
    }

    pub(crate) async fn next_peer(&mut self) -> MockPeer {
        self.peers.recv().await.expect("connector dropped")
    }

    /// Waits for the next lifecycle event matching `pred`.
    pub(crate) async fn wait_for<F>(&mut self, pred: F) -> LifecycleEvent
    where
        F: Fn(&LifecycleEvent) -> bool,
    {
        loop {
            let event = self.lifecycle.recv().await.expect("lifecycle channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    /// Pushes a marker frame and waits until the actor has dispatched it,
    /// which means every earlier frame on this connection was handled.
    pub(crate) async fn drain_inbound(&self, peer: &MockPeer) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let marker = self.client.subscribe("test:marker", move |_| {
            let _ = tx.send(());
        });
        peer.push("test:marker", serde_json::json!({}));
        rx.recv().await.expect("marker never dispatched");
        marker.unsubscribe();
    }

    /// Round-trips through the actor so every earlier command is processed.
    pub(crate) async fn settle(&self) -> crate::connection::ClientStats {
        self.client.stats().await.unwrap()
    }
}

/// Config with fast, deterministic timings.
pub(crate) fn test_config() -> SyncConfig {
    let mut config = SyncConfig::new("ws://orders.test/ws");
    config.reconnect.base_delay_ms = 1000;
    config.reconnect.max_delay_ms = 8000;
    config.reconnect.max_attempts = 3;
    config.reconnect.jitter_ratio = 0.0;
    config.heartbeat.interval_ms = 30_000;
    config
}

pub(crate) const HEARTBEAT: Duration = Duration::from_secs(30);
