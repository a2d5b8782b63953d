//! # Connection State Machine
//!
//! A single actor task owns the physical connection, the heartbeat timer, the
//! reconnect timer and the outbound queue. Handles talk to it over a command
//! channel, so no other component ever touches the socket.
//!
//! ## State Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    ConnectionState                                      │
//! │                                                                         │
//! │                 connect()                 open ok                       │
//! │  ┌──────────────┐ ───────► ┌────────────┐ ───────► ┌───────────┐       │
//! │  │ Disconnected │          │ Connecting │          │ Connected │       │
//! │  └──────────────┘ ◄─────── └────────────┘          └─────┬─────┘       │
//! │        ▲  ▲     disconnect()    │ open/auth failed       │             │
//! │        │  │                     ▼                        │             │
//! │        │  │               ┌─────────┐   socket error     │             │
//! │        │  │               │  Error  │ ◄──────────────────┤             │
//! │        │  │               └────┬────┘                    │             │
//! │        │  │                    │ retry timer             │ close /     │
//! │        │  │                    └──► connect()            │ heartbeat   │
//! │        │  └──────────────────────────────────────────────┘ dead        │
//! │        │                       (then retry timer ──► connect())        │
//! │        └── disconnect() from any state                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Actor Loop
//! ```text
//! select! {
//!     command        ── Connect / Disconnect / Send / Stats / Shutdown
//!     socket event   ── Frame / Closed / Error         (only while open)
//!     heartbeat tick ── Probe / Dead                  (only while running)
//!     retry timer    ── connect()                     (only while armed)
//! }
//! ```
//!
//! Every timer is an owned value on the actor. Leaving `Connected` stops the
//! heartbeat; `disconnect()` and a successful open drop the retry timer.
//!
//! Socket writes and close handshakes are bounded by `write_timeout`. A write
//! that stalls past it fails the connection like any other socket error, so
//! the loop always gets back to serving commands.

use std::fmt;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, trace, warn};

use crate::auth::{AuthProvider, ConnectTarget};
use crate::codec::{self, Envelope};
use crate::config::SyncConfig;
use crate::dispatch::DispatchRegistry;
use crate::error::SyncError;
use crate::events::{LifecycleEvent, Notice, Notifier};
use crate::heartbeat::{HeartbeatCheck, HeartbeatMonitor};
use crate::outbox::{OutboundQueue, PendingSend};
use crate::protocol::{self, message_type, Inbound};
use crate::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::transport::{
    close_within, send_within, Connection, Connector, TransportEvent, CLOSE_HEARTBEAT_TIMEOUT,
    CLOSE_NORMAL,
};

// =============================================================================
// Connection State
// =============================================================================

/// Exactly one value is current at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// Point-in-time view of the actor's resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub state: ConnectionState,
    /// Whether the heartbeat timer is armed.
    pub heartbeat_active: bool,
    /// Whether a reconnect timer is armed.
    pub reconnect_pending: bool,
    /// Current value of the reconnect counter.
    pub reconnect_attempts: u32,
    /// Messages waiting in the outbound queue.
    pub queued: usize,
    /// Messages evicted from a full queue.
    pub dropped: u64,
    /// Physical connections successfully opened.
    pub connections_opened: u64,
    /// Live dispatch subscriptions.
    pub subscriptions: usize,
}

// =============================================================================
// Commands
// =============================================================================

pub(crate) enum Command {
    Connect,
    Disconnect,
    Send(PendingSend),
    Stats(oneshot::Sender<ClientStats>),
    Shutdown(oneshot::Sender<()>),
}

enum Flow {
    Continue,
    Exit,
}

/// Result of awaiting work while still serving commands.
enum Interrupt<T> {
    Ready(T),
    Disconnect,
    Shutdown(Option<oneshot::Sender<()>>),
}

// =============================================================================
// Connection Actor
// =============================================================================

pub(crate) struct ConnectionActor {
    config: SyncConfig,
    connector: Arc<dyn Connector>,
    auth: Arc<dyn AuthProvider>,
    registry: DispatchRegistry,
    notifier: Arc<dyn Notifier>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,

    connection: Option<Box<dyn Connection>>,
    /// Tenant of the current connection; stamped on outbound envelopes.
    tenant_id: Option<String>,
    heartbeat: HeartbeatMonitor,
    policy: ReconnectPolicy,
    retry_timer: Option<Pin<Box<Sleep>>>,
    intentional_close: bool,
    queue: OutboundQueue,
    ever_connected: bool,
    connections_opened: u64,
}

impl ConnectionActor {
    pub(crate) fn new(
        config: SyncConfig,
        connector: Arc<dyn Connector>,
        auth: Arc<dyn AuthProvider>,
        registry: DispatchRegistry,
        notifier: Arc<dyn Notifier>,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        ConnectionActor {
            heartbeat: HeartbeatMonitor::new(config.heartbeat.interval()),
            policy: ReconnectPolicy::new(&config.reconnect),
            queue: OutboundQueue::new(config.queue.max_pending),
            config,
            connector,
            auth,
            registry,
            notifier,
            commands,
            state_tx,
            connection: None,
            tenant_id: None,
            retry_timer: None,
            intentional_close: false,
            ever_connected: false,
            connections_opened: 0,
        }
    }

    /// Main actor loop. Returns after shutdown or when every handle is gone.
    pub(crate) async fn run(mut self) {
        info!(url = %self.config.url(), "Sync client started");

        loop {
            let flow = tokio::select! {
                command = self.commands.recv() => self.handle_command(command).await,

                event = next_event(&mut self.connection), if self.connection.is_some() => {
                    self.handle_transport(event).await;
                    Flow::Continue
                }

                check = self.heartbeat.tick(), if self.heartbeat.is_running() => {
                    self.handle_heartbeat(check).await;
                    Flow::Continue
                }

                _ = retry_elapsed(&mut self.retry_timer), if self.retry_timer.is_some() => {
                    self.retry_timer = None;
                    self.connect(false).await
                }
            };

            if let Flow::Exit = flow {
                break;
            }
        }

        info!("Sync client stopped");
    }

    async fn handle_command(&mut self, command: Option<Command>) -> Flow {
        match command {
            Some(Command::Connect) => self.connect(true).await,
            Some(Command::Disconnect) => {
                self.disconnect().await;
                Flow::Continue
            }
            Some(Command::Send(message)) => {
                self.enqueue(message).await;
                Flow::Continue
            }
            Some(Command::Stats(reply)) => {
                let _ = reply.send(self.stats());
                Flow::Continue
            }
            Some(Command::Shutdown(reply)) => self.exit(Some(reply)).await,
            None => {
                debug!("All client handles dropped");
                self.exit(None).await
            }
        }
    }

    // =========================================================================
    // Connect / Disconnect
    // =========================================================================

    /// `manual` is true for consumer calls, false for retry-timer calls.
    async fn connect(&mut self, manual: bool) -> Flow {
        let state = self.state();
        if matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
            debug!(%state, "connect() ignored");
            return Flow::Continue;
        }

        self.intentional_close = false;
        self.retry_timer = None;
        if manual {
            self.policy.reset();
        }
        self.set_state(ConnectionState::Connecting);

        let auth = Arc::clone(&self.auth);
        let credentials = match self.serve_until(auth.credentials()).await {
            Interrupt::Ready(result) => result,
            Interrupt::Disconnect => {
                self.disconnect().await;
                return Flow::Continue;
            }
            Interrupt::Shutdown(reply) => return self.exit(reply).await,
        };

        let target = credentials
            .and_then(|credentials| ConnectTarget::resolve(&self.config.connection, credentials));
        let target = match target {
            Ok(target) => target,
            Err(e) => {
                if e.is_auth_error() {
                    warn!(error = %e, "No credentials for the order socket");
                    self.notifier.notify(Notice::AuthenticationFailed);
                }
                self.connection_failed(e);
                return Flow::Continue;
            }
        };

        info!(
            url = %target.redacted(),
            attempt = self.policy.attempts(),
            "Opening order socket"
        );

        let connector = Arc::clone(&self.connector);
        let opened = match self.serve_until(connector.open(&target)).await {
            Interrupt::Ready(result) => result,
            Interrupt::Disconnect => {
                self.disconnect().await;
                return Flow::Continue;
            }
            Interrupt::Shutdown(reply) => return self.exit(reply).await,
        };

        match opened {
            Ok(connection) => self.on_open(connection, target).await,
            Err(e) => {
                error!(error = %e, "Failed to open order socket");
                self.connection_failed(e);
            }
        }
        Flow::Continue
    }

    async fn on_open(&mut self, connection: Box<dyn Connection>, target: ConnectTarget) {
        self.connection = Some(connection);
        self.tenant_id = Some(target.tenant_id);
        self.connections_opened += 1;
        self.policy.reset();
        self.retry_timer = None;
        self.set_state(ConnectionState::Connected);
        self.heartbeat.start();

        info!(
            tenant = self.tenant_id.as_deref().unwrap_or_default(),
            authenticated = target.authenticated,
            queued = self.queue.len(),
            "Order socket connected"
        );

        self.flush().await;
        if self.connection.is_none() {
            return;
        }

        let reconnect = self.ever_connected;
        self.ever_connected = true;
        self.registry
            .dispatch_lifecycle(&LifecycleEvent::Connected { reconnect });
        self.notifier.notify(Notice::Connected);
    }

    async fn disconnect(&mut self) {
        self.intentional_close = true;
        self.heartbeat.stop();
        let had_retry = self.retry_timer.take().is_some();

        let had_connection = match self.connection.take() {
            Some(connection) => {
                close_within(
                    connection,
                    CLOSE_NORMAL,
                    "client disconnect",
                    self.config.write_timeout(),
                )
                .await;
                true
            }
            None => false,
        };

        let previous = self.set_state(ConnectionState::Disconnected);
        if had_connection || had_retry || previous != ConnectionState::Disconnected {
            info!("Order socket disconnected by client");
            self.registry
                .dispatch_lifecycle(&LifecycleEvent::Disconnected { intentional: true });
        }
    }

    async fn exit(&mut self, reply: Option<oneshot::Sender<()>>) -> Flow {
        self.disconnect().await;

        let discarded = self.queue.clear();
        if discarded > 0 {
            warn!(discarded, "Discarding unsent messages on shutdown");
        }
        self.registry.clear();

        if let Some(reply) = reply {
            let _ = reply.send(());
        }
        Flow::Exit
    }

    /// Awaits `work` while still accepting commands.
    ///
    /// Sends are queued, stats are answered, a repeated connect is ignored.
    async fn serve_until<F>(&mut self, work: F) -> Interrupt<F::Output>
    where
        F: Future,
    {
        tokio::pin!(work);
        loop {
            tokio::select! {
                output = &mut work => return Interrupt::Ready(output),
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => self.queue.push(message),
                    Some(Command::Stats(reply)) => {
                        let _ = reply.send(self.stats());
                    }
                    Some(Command::Connect) => debug!("connect() ignored, already connecting"),
                    Some(Command::Disconnect) => return Interrupt::Disconnect,
                    Some(Command::Shutdown(reply)) => return Interrupt::Shutdown(Some(reply)),
                    None => return Interrupt::Shutdown(None),
                },
            }
        }
    }

    // =========================================================================
    // Failure Handling
    // =========================================================================

    /// Open failed, or the socket errored.
    ///
    /// Configuration errors are permanent and leave the client in `Error`
    /// until the next manual `connect()`.
    fn connection_failed(&mut self, error: SyncError) {
        self.drop_connection();
        self.set_state(ConnectionState::Error);
        self.registry.dispatch_lifecycle(&LifecycleEvent::Error {
            reason: error.to_string(),
        });
        if error.is_retryable() {
            self.schedule_reconnect();
        } else {
            error!(error = %error, "Not retrying");
        }
    }

    /// The socket closed without the client asking.
    fn connection_closed(&mut self) {
        self.drop_connection();
        if self.intentional_close {
            return;
        }
        self.set_state(ConnectionState::Disconnected);
        self.registry
            .dispatch_lifecycle(&LifecycleEvent::Disconnected { intentional: false });
        self.schedule_reconnect();
    }

    fn drop_connection(&mut self) {
        self.connection = None;
        self.heartbeat.stop();
    }

    fn schedule_reconnect(&mut self) {
        if self.intentional_close {
            return;
        }
        if self.retry_timer.is_some() {
            debug!("Reconnect already pending");
            return;
        }

        match self.policy.next_decision() {
            ReconnectDecision::Retry { attempt, delay } => {
                info!(
                    attempt,
                    max_attempts = self.policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.retry_timer = Some(Box::pin(sleep(delay)));
                self.notifier.notify(Notice::Reconnecting { attempt, delay });
            }
            ReconnectDecision::Exhausted { attempts } => {
                error!(attempts, "Max reconnection attempts reached");
                self.registry
                    .dispatch_lifecycle(&LifecycleEvent::MaxAttemptsReached { attempts });
                self.notifier.notify(Notice::ConnectionLost { attempts });
            }
        }
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(text) => self.handle_frame(&text),
            TransportEvent::Closed { code, reason } => {
                warn!(?code, %reason, "Order socket closed");
                self.connection_closed();
            }
            TransportEvent::Error(e) => {
                error!(error = %e, "Order socket error");
                self.connection_failed(e);
            }
        }
    }

    /// A bad frame is logged and dropped; the connection stays open.
    fn handle_frame(&mut self, text: &str) {
        self.heartbeat.record_inbound();

        let envelope = match codec::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping undecodable frame");
                return;
            }
        };

        match protocol::classify(&envelope) {
            Ok(Inbound::Pong) => trace!("Heartbeat reply"),
            Ok(Inbound::Order(event)) => {
                debug!(kind = event.kind(), order_id = event.order_id(), "Order event");
                self.registry.dispatch_order(&envelope, &event);
            }
            Ok(Inbound::ServerError { code, message }) => {
                warn!(%code, %message, "Server reported an error");
                self.registry.dispatch(&envelope);
            }
            Ok(Inbound::Other) => {
                debug!(message_type = %envelope.message_type, "Inbound message");
                self.registry.dispatch(&envelope);
            }
            Err(e) => {
                warn!(message_type = %envelope.message_type, error = %e, "Dropping malformed frame");
            }
        }
    }

    async fn handle_heartbeat(&mut self, check: HeartbeatCheck) {
        match check {
            HeartbeatCheck::Probe => {
                let ping = Envelope::new(message_type::PING, protocol::ping_payload())
                    .with_tenant(self.tenant_id.clone());
                self.transmit(&ping).await;
            }
            HeartbeatCheck::Dead { silent_for } => {
                warn!(
                    silent_ms = silent_for.as_millis() as u64,
                    "No inbound traffic, closing dead connection"
                );
                if let Some(connection) = self.connection.take() {
                    close_within(
                        connection,
                        CLOSE_HEARTBEAT_TIMEOUT,
                        "heartbeat timeout",
                        self.config.write_timeout(),
                    )
                    .await;
                }
                self.connection_closed();
            }
        }
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    async fn enqueue(&mut self, message: PendingSend) {
        trace!(message_type = %message.message_type, state = %self.state(), "Outbound message");
        self.queue.push(message);
        if self.state() == ConnectionState::Connected {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let write_timeout = self.config.write_timeout();
        if let Err(e) = self
            .queue
            .flush(connection.as_mut(), self.tenant_id.as_deref(), write_timeout)
            .await
        {
            self.connection_failed(e);
        }
    }

    /// Sends outside the queue. Used for heartbeat probes.
    async fn transmit(&mut self, envelope: &Envelope) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let frame = match codec::encode(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(message_type = %envelope.message_type, error = %e, "Failed to encode message");
                return;
            }
        };
        let write_timeout = self.config.write_timeout();
        if let Err(e) = send_within(connection.as_mut(), frame, write_timeout).await {
            self.connection_failed(e);
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Publishes a transition and returns the previous state.
    fn set_state(&mut self, state: ConnectionState) -> ConnectionState {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
        previous
    }

    fn stats(&self) -> ClientStats {
        ClientStats {
            state: self.state(),
            heartbeat_active: self.heartbeat.is_running(),
            reconnect_pending: self.retry_timer.is_some(),
            reconnect_attempts: self.policy.attempts(),
            queued: self.queue.len(),
            dropped: self.queue.dropped(),
            connections_opened: self.connections_opened,
            subscriptions: self.registry.subscription_count(),
        }
    }
}

async fn next_event(connection: &mut Option<Box<dyn Connection>>) -> TransportEvent {
    match connection.as_mut() {
        Some(connection) => connection.recv().await,
        None => future::pending().await,
    }
}

async fn retry_elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(timer) => timer.as_mut().await,
        None => future::pending().await,
    }
}
