//! # Outbound Queue
//!
//! Buffers messages submitted while the socket is not open and flushes them,
//! in submission order, once it is.
//!
//! ## Delivery Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbound Queue Flow                                  │
//! │                                                                         │
//! │  send(type, payload) ──► push_back ──┐                                  │
//! │                                      ▼                                  │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  VecDeque<PendingSend>        (bounded by max_pending)          │   │
//! │  │                                                                 │   │
//! │  │  front ─► [ a ][ b ][ c ] ◄─ back                               │   │
//! │  │                                                                 │   │
//! │  │  overflow: drop oldest (logged, counted)                        │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │ flush() after open, or right after      │
//! │                               │ the push when already connected         │
//! │                               ▼                                         │
//! │  pop_front ─► transmit ─► ok: next   err/timeout: push_front, stop      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A message only leaves the queue once the transport has accepted it, so a
//! failure mid-flush keeps the failed message and everything behind it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::{self, Envelope};
use crate::error::SyncResult;
use crate::transport::{send_within, Connection};

/// One message waiting for an open socket.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub id: Uuid,
    pub message_type: String,
    pub payload: Value,
    /// When the caller submitted it. Becomes the envelope timestamp.
    pub submitted_at: DateTime<Utc>,
}

impl PendingSend {
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        PendingSend {
            id: Uuid::new_v4(),
            message_type: message_type.into(),
            payload,
            submitted_at: Utc::now(),
        }
    }

    /// Frames the message for transmission.
    pub fn to_envelope(&self, tenant_id: Option<String>) -> Envelope {
        Envelope {
            message_type: self.message_type.clone(),
            payload: self.payload.clone(),
            timestamp: self.submitted_at,
            tenant_id,
        }
    }
}

/// Bounded FIFO of pending sends.
#[derive(Debug)]
pub struct OutboundQueue {
    pending: VecDeque<PendingSend>,
    max_pending: usize,
    dropped: u64,
}

impl OutboundQueue {
    pub fn new(max_pending: usize) -> Self {
        OutboundQueue {
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            dropped: 0,
        }
    }

    /// Appends a message, evicting the oldest if full.
    pub fn push(&mut self, message: PendingSend) {
        if self.pending.len() >= self.max_pending {
            if let Some(evicted) = self.pending.pop_front() {
                self.dropped += 1;
                warn!(
                    message_type = %evicted.message_type,
                    id = %evicted.id,
                    max_pending = self.max_pending,
                    "Outbound queue full, dropping oldest message"
                );
            }
        }
        self.pending.push_back(message);
    }

    /// Transmits queued messages in order until empty or the socket fails.
    ///
    /// Returns how many were sent. On failure, including a write that stalls
    /// past `write_timeout`, the failed message goes back to the front and the
    /// error is returned.
    pub async fn flush(
        &mut self,
        connection: &mut dyn Connection,
        tenant_id: Option<&str>,
        write_timeout: Duration,
    ) -> SyncResult<usize> {
        let mut sent = 0usize;
        while let Some(message) = self.pending.pop_front() {
            let frame = match codec::encode(&message.to_envelope(tenant_id.map(str::to_owned))) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(message_type = %message.message_type, error = %e, "Dropping unencodable message");
                    self.dropped += 1;
                    continue;
                }
            };
            if let Err(e) = send_within(connection, frame, write_timeout).await {
                warn!(
                    message_type = %message.message_type,
                    remaining = self.pending.len() + 1,
                    error = %e,
                    "Flush interrupted"
                );
                self.pending.push_front(message);
                return Err(e);
            }
            sent += 1;
        }
        if sent > 0 {
            debug!(sent, "Outbound queue flushed");
        }
        Ok(sent)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Messages evicted on overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Discards everything. Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    /// Message types in queue order.
    pub fn message_types(&self) -> Vec<&str> {
        self.pending.iter().map(|m| m.message_type.as_str()).collect()
    }
}
