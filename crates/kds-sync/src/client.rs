//! # Sync Client
//!
//! Cloneable handle to the connection actor.
//!
//! ## Usage
//! ```rust,ignore
//! let client = SyncClient::builder(SyncConfig::load_or_default(None))
//!     .auth(Arc::new(StaticAuth::new(token, restaurant_id)))
//!     .notifier(Arc::new(ToastNotifier::new()))
//!     .spawn()?;
//!
//! let sub = client.subscribe_orders(|event| println!("{}", event.describe()));
//! client.connect()?;
//! client.send("order:bump", json!({ "orderId": "o1" }))?;
//!
//! // later
//! sub.unsubscribe();
//! client.shutdown().await?;
//! ```
//!
//! `connect`, `disconnect` and `send` never block: they post a command and
//! return. Results show up as state changes, lifecycle events and notices.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use kds_core::OrderEvent;

use crate::auth::{AuthProvider, StaticAuth};
use crate::codec::Envelope;
use crate::config::SyncConfig;
use crate::connection::{ClientStats, Command, ConnectionActor, ConnectionState};
use crate::dispatch::{DispatchRegistry, Unsubscribe};
use crate::error::{SyncError, SyncResult};
use crate::events::{LifecycleEvent, NoOpNotifier, Notifier};
use crate::outbox::PendingSend;
use crate::transport::{Connector, WsConnector};

/// Handle to a running sync client. Cheap to clone.
#[derive(Clone)]
pub struct SyncClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    registry: DispatchRegistry,
    notifier: Arc<dyn Notifier>,
}

impl SyncClient {
    pub fn builder(config: SyncConfig) -> SyncClientBuilder {
        SyncClientBuilder::new(config)
    }

    /// Opens the connection. No-op while connecting or connected.
    ///
    /// Also resets the reconnect counter, so it doubles as "retry now" after
    /// the client gave up.
    pub fn connect(&self) -> SyncResult<()> {
        self.post(Command::Connect)
    }

    /// Closes the connection and cancels any pending reconnect.
    pub fn disconnect(&self) -> SyncResult<()> {
        self.post(Command::Disconnect)
    }

    /// Sends now if connected, otherwise queues for the next open.
    pub fn send(&self, message_type: impl Into<String>, payload: Value) -> SyncResult<()> {
        self.post(Command::Send(PendingSend::new(message_type, payload)))
    }

    /// Raw envelopes of one message type.
    pub fn subscribe<F>(&self, message_type: impl Into<String>, callback: F) -> Unsubscribe
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.registry.subscribe(message_type, callback)
    }

    /// Typed order events.
    pub fn subscribe_orders<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&OrderEvent) + Send + Sync + 'static,
    {
        self.registry.subscribe_orders(callback)
    }

    pub fn subscribe_lifecycle<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.registry.subscribe_lifecycle(callback)
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that wakes on every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub async fn stats(&self) -> SyncResult<ClientStats> {
        let (reply, response) = oneshot::channel();
        self.post(Command::Stats(reply))?;
        response.await.map_err(|_| SyncError::ShuttingDown)
    }

    /// Disconnects, discards unsent messages and stops the actor.
    ///
    /// Every clone of this handle is dead afterwards.
    pub async fn shutdown(&self) -> SyncResult<()> {
        let (reply, done) = oneshot::channel();
        self.post(Command::Shutdown(reply))?;
        done.await.map_err(|_| SyncError::ShuttingDown)
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.notifier)
    }

    fn post(&self, command: Command) -> SyncResult<()> {
        self.commands.send(command).map_err(|_| {
            debug!("Sync client already stopped");
            SyncError::ShuttingDown
        })
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("state", &self.connection_state())
            .field("registry", &self.registry)
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Wires collaborators and spawns the actor.
pub struct SyncClientBuilder {
    config: SyncConfig,
    connector: Option<Arc<dyn Connector>>,
    auth: Option<Arc<dyn AuthProvider>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl SyncClientBuilder {
    pub fn new(config: SyncConfig) -> Self {
        SyncClientBuilder {
            config,
            connector: None,
            auth: None,
            notifier: None,
        }
    }

    /// Defaults to [`WsConnector`] with the configured timeout.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Defaults to signed out.
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Defaults to [`NoOpNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Validates the config, then spawns the actor on the current tokio
    /// runtime.
    pub fn spawn(self) -> SyncResult<SyncClient> {
        self.config.validate()?;

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector::new(self.config.connect_timeout())));
        let auth = self
            .auth
            .unwrap_or_else(|| Arc::new(StaticAuth::anonymous()));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(NoOpNotifier));

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let registry = DispatchRegistry::new();

        let actor = ConnectionActor::new(
            self.config,
            connector,
            auth,
            registry.clone(),
            Arc::clone(&notifier),
            commands_rx,
            state_tx,
        );
        tokio::spawn(actor.run());

        Ok(SyncClient {
            commands: commands_tx,
            state: state_rx,
            registry,
            notifier,
        })
    }
}
