//! # Order Projection
//!
//! The client-held, eventually-consistent copy of server-owned order state.
//!
//! ## Reconciliation Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Event → Projection Mutation                          │
//! │                                                                         │
//! │  Created(order)                                                        │
//! │    id absent  → insert at head                                         │
//! │    id present → replace in place (duplicate delivery)                  │
//! │                                                                         │
//! │  Updated(order)                                                        │
//! │    id present → replace wholesale                                      │
//! │    id absent  → insert at head (update overtook create)                │
//! │                                                                         │
//! │  Deleted { id }                                                        │
//! │    remove if present, otherwise no-op                                  │
//! │                                                                         │
//! │  StatusChanged { id, status }                                          │
//! │    patch status only if present, otherwise no-op                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events are applied in delivery order; the last writer wins. The projection
//! never holds two entries with the same id.

use crate::events::OrderEvent;
use crate::types::{Order, OrderStatus};

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new entry was placed at the head.
    Inserted,
    /// An existing entry was replaced wholesale.
    Replaced,
    /// The entry was removed.
    Removed,
    /// Only the status of an existing entry changed.
    StatusPatched { previous: OrderStatus },
    /// The event targeted an id the projection does not hold.
    NoMatch,
}

/// Ordered collection of orders keyed by `id`, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderProjection {
    orders: Vec<Order>,
}

impl OrderProjection {
    /// Creates an empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one order event.
    pub fn apply(&mut self, event: &OrderEvent) -> Applied {
        match event {
            OrderEvent::Created(order) | OrderEvent::Updated(order) => self.upsert(order.clone()),
            OrderEvent::Deleted { id } => self.remove(id),
            OrderEvent::StatusChanged { id, status } => match self.set_status(id, *status) {
                Some(previous) => Applied::StatusPatched { previous },
                None => Applied::NoMatch,
            },
        }
    }

    /// Replaces the whole projection with a server snapshot.
    ///
    /// Later duplicates in the snapshot overwrite earlier ones in place.
    pub fn replace_all(&mut self, orders: Vec<Order>) {
        self.orders.clear();
        for order in orders {
            match self.position(&order.id) {
                Some(index) => self.orders[index] = order,
                None => self.orders.push(order),
            }
        }
    }

    /// Sets the status of an order, returning the previous one.
    pub fn set_status(&mut self, id: &str, status: OrderStatus) -> Option<OrderStatus> {
        let order = self.orders.iter_mut().find(|order| order.id == id)?;
        let previous = order.status;
        order.status = status;
        Some(previous)
    }

    /// Looks up an order by id.
    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.iter().find(|order| order.id == id)
    }

    /// All orders, newest first.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Orders still in the kitchen flow.
    pub fn active(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|order| order.status.is_active())
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn upsert(&mut self, order: Order) -> Applied {
        match self.position(&order.id) {
            Some(index) => {
                self.orders[index] = order;
                Applied::Replaced
            }
            None => {
                self.orders.insert(0, order);
                Applied::Inserted
            }
        }
    }

    fn remove(&mut self, id: &str) -> Applied {
        match self.position(id) {
            Some(index) => {
                self.orders.remove(index);
                Applied::Removed
            }
            None => Applied::NoMatch,
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.orders.iter().position(|order| order.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn order(id: &str, status: OrderStatus) -> Order {
        Order::new(id, format!("#{id}"), status)
    }

    fn assert_unique_ids(projection: &OrderProjection) {
        let ids: HashSet<&str> = projection.orders().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids.len(), projection.len());
    }

    #[test]
    fn test_created_then_status_changed() {
        let mut projection = OrderProjection::new();
        projection.apply(&OrderEvent::Created(order("o1", OrderStatus::New)));
        let applied = projection.apply(&OrderEvent::StatusChanged {
            id: "o1".into(),
            status: OrderStatus::Ready,
        });

        assert_eq!(
            applied,
            Applied::StatusPatched {
                previous: OrderStatus::New
            }
        );
        assert_eq!(projection.len(), 1);
        assert_eq!(projection.get("o1").unwrap().status, OrderStatus::Ready);
    }

    #[test]
    fn test_duplicate_created_is_idempotent() {
        let mut projection = OrderProjection::new();
        let event = OrderEvent::Created(order("o1", OrderStatus::New));

        assert_eq!(projection.apply(&event), Applied::Inserted);
        assert_eq!(projection.apply(&event), Applied::Replaced);
        assert_eq!(projection.len(), 1);
    }

    #[test]
    fn test_created_inserts_at_head() {
        let mut projection = OrderProjection::new();
        projection.apply(&OrderEvent::Created(order("o1", OrderStatus::New)));
        projection.apply(&OrderEvent::Created(order("o2", OrderStatus::New)));

        let ids: Vec<&str> = projection.orders().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["o2", "o1"]);
    }

    #[test]
    fn test_duplicate_created_replaces_in_place() {
        let mut projection = OrderProjection::new();
        projection.apply(&OrderEvent::Created(order("o1", OrderStatus::New)));
        projection.apply(&OrderEvent::Created(order("o2", OrderStatus::New)));
        projection.apply(&OrderEvent::Created(order("o1", OrderStatus::Confirmed)));

        let ids: Vec<&str> = projection.orders().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["o2", "o1"]);
        assert_eq!(projection.get("o1").unwrap().status, OrderStatus::Confirmed);
    }

    #[test]
    fn test_update_before_create_inserts() {
        let mut projection = OrderProjection::new();
        let applied = projection.apply(&OrderEvent::Updated(order("o3", OrderStatus::Preparing)));

        assert_eq!(applied, Applied::Inserted);
        assert_eq!(projection.get("o3").unwrap().status, OrderStatus::Preparing);
    }

    #[test]
    fn test_update_replaces_wholesale() {
        let mut projection = OrderProjection::new();
        let mut original = order("o1", OrderStatus::New);
        original.notes = Some("no onions".into());
        projection.apply(&OrderEvent::Created(original));

        let replacement = order("o1", OrderStatus::Confirmed);
        assert_eq!(
            projection.apply(&OrderEvent::Updated(replacement.clone())),
            Applied::Replaced
        );
        assert_eq!(projection.get("o1"), Some(&replacement));
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let mut projection = OrderProjection::new();
        projection.apply(&OrderEvent::Created(order("o1", OrderStatus::New)));
        let before = projection.clone();

        let applied = projection.apply(&OrderEvent::Deleted { id: "o2".into() });

        assert_eq!(applied, Applied::NoMatch);
        assert_eq!(projection, before);
    }

    #[test]
    fn test_status_change_for_unknown_is_noop() {
        let mut projection = OrderProjection::new();
        let applied = projection.apply(&OrderEvent::StatusChanged {
            id: "ghost".into(),
            status: OrderStatus::Ready,
        });
        assert_eq!(applied, Applied::NoMatch);
        assert!(projection.is_empty());
    }

    #[test]
    fn test_delete_before_create_leaves_no_entry() {
        let mut projection = OrderProjection::new();
        projection.apply(&OrderEvent::Deleted { id: "o1".into() });
        assert!(projection.get("o1").is_none());

        // A later create is a new fact and is applied.
        projection.apply(&OrderEvent::Created(order("o1", OrderStatus::New)));
        assert!(projection.get("o1").is_some());
    }

    #[test]
    fn test_every_ordering_keeps_ids_unique_and_last_writer_wins() {
        let events = vec![
            OrderEvent::Created(order("o1", OrderStatus::New)),
            OrderEvent::Updated(order("o1", OrderStatus::Preparing)),
            OrderEvent::StatusChanged {
                id: "o1".into(),
                status: OrderStatus::Ready,
            },
            OrderEvent::Deleted { id: "o1".into() },
        ];

        // All 24 permutations of the four events.
        let mut indices = [0usize, 1, 2, 3];
        let mut permutations = Vec::new();
        permute(&mut indices, 0, &mut permutations);
        assert_eq!(permutations.len(), 24);

        for permutation in permutations {
            let mut projection = OrderProjection::new();
            let mut expected: Option<OrderStatus> = None;
            for &i in &permutation {
                projection.apply(&events[i]);
                expected = match &events[i] {
                    OrderEvent::Created(o) | OrderEvent::Updated(o) => Some(o.status),
                    OrderEvent::Deleted { .. } => None,
                    OrderEvent::StatusChanged { status, .. } => expected.map(|_| *status),
                };
                assert_unique_ids(&projection);
            }
            assert_eq!(
                projection.get("o1").map(|o| o.status),
                expected,
                "ordering {permutation:?}"
            );
        }
    }

    fn permute(items: &mut [usize; 4], k: usize, out: &mut Vec<[usize; 4]>) {
        if k == items.len() {
            out.push(*items);
            return;
        }
        for i in k..items.len() {
            items.swap(k, i);
            permute(items, k + 1, out);
            items.swap(k, i);
        }
    }

    #[test]
    fn test_replace_all_dedupes_snapshot() {
        let mut projection = OrderProjection::new();
        projection.apply(&OrderEvent::Created(order("stale", OrderStatus::New)));

        projection.replace_all(vec![
            order("o1", OrderStatus::New),
            order("o2", OrderStatus::Ready),
            order("o1", OrderStatus::Preparing),
        ]);

        assert_eq!(projection.len(), 2);
        assert!(projection.get("stale").is_none());
        assert_eq!(projection.get("o1").unwrap().status, OrderStatus::Preparing);
        assert_unique_ids(&projection);
    }

    #[test]
    fn test_active_filters_terminal_orders() {
        let mut projection = OrderProjection::new();
        projection.replace_all(vec![
            order("o1", OrderStatus::Preparing),
            order("o2", OrderStatus::Completed),
            order("o3", OrderStatus::Cancelled),
        ]);
        let active: Vec<&str> = projection.active().map(|o| o.id.as_str()).collect();
        assert_eq!(active, vec!["o1"]);
    }
}
