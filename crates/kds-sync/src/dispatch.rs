//! # Dispatch Registry
//!
//! Typed publish/subscribe table between the connection actor and everything
//! that consumes inbound traffic.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Dispatch Tables                                   │
//! │                                                                         │
//! │  generic    "order:created"  ──► [cb1, cb2]     (raw Envelope)         │
//! │             "menu:86d"       ──► [cb3]                                  │
//! │                                                                         │
//! │  orders     ──► [cb4, cb5]                      (typed OrderEvent)     │
//! │                                                                         │
//! │  lifecycle  ──► [cb6]                           (LifecycleEvent)       │
//! │                                                                         │
//! │  order frame:   typed listeners first, then generic ones for the type  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callbacks run synchronously, in registration order, on the actor task.
//! The table lock is released before any callback runs, so a callback may
//! subscribe or unsubscribe. A panicking callback is logged and skipped.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{error, trace};

use kds_core::OrderEvent;

use crate::codec::Envelope;
use crate::events::LifecycleEvent;

type EnvelopeCallback = Arc<dyn Fn(&Envelope) + Send + Sync>;
type OrderCallback = Arc<dyn Fn(&OrderEvent) + Send + Sync>;
type LifecycleCallback = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

#[derive(Default)]
struct Tables {
    next_id: u64,
    generic: HashMap<String, Vec<(u64, EnvelopeCallback)>>,
    orders: Vec<(u64, OrderCallback)>,
    lifecycle: Vec<(u64, LifecycleCallback)>,
}

impl Tables {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn len(&self) -> usize {
        self.generic.values().map(Vec::len).sum::<usize>() + self.orders.len() + self.lifecycle.len()
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Generic(String),
    Orders,
    Lifecycle,
}

/// Shared subscription table. Clones share the same table.
#[derive(Clone, Default)]
pub struct DispatchRegistry {
    tables: Arc<Mutex<Tables>>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for raw envelopes of `message_type`.
    pub fn subscribe<F>(&self, message_type: impl Into<String>, callback: F) -> Unsubscribe
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let message_type = message_type.into();
        let mut tables = self.tables.lock();
        let id = tables.allocate();
        tables
            .generic
            .entry(message_type.clone())
            .or_default()
            .push((id, Arc::new(callback)));
        self.handle(Slot::Generic(message_type), id)
    }

    /// Registers a callback for typed order events.
    pub fn subscribe_orders<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&OrderEvent) + Send + Sync + 'static,
    {
        let mut tables = self.tables.lock();
        let id = tables.allocate();
        tables.orders.push((id, Arc::new(callback)));
        self.handle(Slot::Orders, id)
    }

    /// Registers a callback for connection lifecycle events.
    pub fn subscribe_lifecycle<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let mut tables = self.tables.lock();
        let id = tables.allocate();
        tables.lifecycle.push((id, Arc::new(callback)));
        self.handle(Slot::Lifecycle, id)
    }

    /// Delivers an envelope to its generic subscribers. Returns how many ran
    /// without panicking.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let callbacks: Vec<EnvelopeCallback> = {
            let tables = self.tables.lock();
            match tables.generic.get(&envelope.message_type) {
                Some(entries) => entries.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => Vec::new(),
            }
        };
        trace!(message_type = %envelope.message_type, subscribers = callbacks.len(), "Dispatching");
        run_all(callbacks.as_slice(), &envelope.message_type, |cb| cb(envelope))
    }

    /// Delivers an order event to typed subscribers, then the raw envelope
    /// to generic subscribers of its type.
    pub fn dispatch_order(&self, envelope: &Envelope, event: &OrderEvent) -> usize {
        let typed: Vec<OrderCallback> = {
            let tables = self.tables.lock();
            tables.orders.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        let delivered = run_all(typed.as_slice(), event.kind(), |cb| cb(event));
        delivered + self.dispatch(envelope)
    }

    pub fn dispatch_lifecycle(&self, event: &LifecycleEvent) -> usize {
        let callbacks: Vec<LifecycleCallback> = {
            let tables = self.tables.lock();
            tables.lifecycle.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        run_all(callbacks.as_slice(), "lifecycle", |cb| cb(event))
    }

    /// Total live subscriptions across all tables.
    pub fn subscription_count(&self) -> usize {
        self.tables.lock().len()
    }

    /// Drops every subscription. Outstanding handles become no-ops.
    ///
    /// Ids keep counting up, so an old handle never matches a later
    /// subscription.
    pub fn clear(&self) {
        let mut tables = self.tables.lock();
        tables.generic.clear();
        tables.orders.clear();
        tables.lifecycle.clear();
    }

    fn handle(&self, slot: Slot, id: u64) -> Unsubscribe {
        Unsubscribe {
            tables: Arc::downgrade(&self.tables),
            slot,
            id,
        }
    }
}

impl std::fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRegistry")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

fn run_all<C, F>(callbacks: &[C], label: &str, invoke: F) -> usize
where
    F: Fn(&C),
{
    let mut delivered = 0;
    for (index, callback) in callbacks.iter().enumerate() {
        match catch_unwind(AssertUnwindSafe(|| invoke(callback))) {
            Ok(()) => delivered += 1,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic".into());
                error!(event = label, subscriber = index, %message, "Subscriber panicked");
            }
        }
    }
    delivered
}

// =============================================================================
// Unsubscribe Handle
// =============================================================================

/// Removes one subscription.
///
/// Dropping the handle does NOT unsubscribe. Calling
/// [`unsubscribe`](Self::unsubscribe) twice, or after the registry is gone,
/// does nothing.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    tables: Weak<Mutex<Tables>>,
    slot: Slot,
    id: u64,
}

impl Unsubscribe {
    /// Returns true if a subscription was actually removed.
    pub fn unsubscribe(&self) -> bool {
        let Some(tables) = self.tables.upgrade() else {
            return false;
        };
        let mut tables = tables.lock();
        let id = self.id;
        match &self.slot {
            Slot::Generic(message_type) => {
                let Some(entries) = tables.generic.get_mut(message_type) else {
                    return false;
                };
                let before = entries.len();
                entries.retain(|(entry, _)| *entry != id);
                let removed = entries.len() != before;
                if entries.is_empty() {
                    tables.generic.remove(message_type);
                }
                removed
            }
            Slot::Orders => remove_by_id(&mut tables.orders, id),
            Slot::Lifecycle => remove_by_id(&mut tables.lifecycle, id),
        }
    }
}

fn remove_by_id<C>(entries: &mut Vec<(u64, C)>, id: u64) -> bool {
    let before = entries.len();
    entries.retain(|(entry, _)| *entry != id);
    entries.len() != before
}
