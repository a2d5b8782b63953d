//! # Lifecycle Events and Notices
//!
//! Two outward signals leave the connection actor:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Outward Signals                                  │
//! │                                                                         │
//! │  LifecycleEvent  ──► DispatchRegistry ──► OrderStore (resync)          │
//! │                                      └──► app code                     │
//! │                                                                         │
//! │  Notice          ──► Notifier ──► toast / log line / status bar        │
//! │                      (human-readable, fire and forget)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::time::Duration;

/// Connection lifecycle, delivered through the dispatch registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The socket opened. `reconnect` is true for every open after the first.
    Connected { reconnect: bool },
    /// The socket closed.
    Disconnected { intentional: bool },
    /// Open failed or the socket errored.
    Error { reason: String },
    /// Retries are exhausted. Terminal until the next manual `connect()`.
    MaxAttemptsReached { attempts: u32 },
}

/// Something worth telling a person about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Connected,
    Reconnecting { attempt: u32, delay: Duration },
    ConnectionLost { attempts: u32 },
    AuthenticationFailed,
    NewOrder { order_number: String },
    OrderCancelled { order_number: String },
}

impl Notice {
    /// Severity hint for the presentation layer.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Notice::Reconnecting { .. } | Notice::ConnectionLost { .. } | Notice::AuthenticationFailed
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Connected => write!(f, "Connected to order server"),
            Notice::Reconnecting { attempt, delay } => write!(
                f,
                "Connection lost. Reconnecting in {:.1}s (attempt {})",
                delay.as_secs_f64(),
                attempt
            ),
            Notice::ConnectionLost { attempts } => write!(
                f,
                "Unable to reach the order server after {} attempts. Check your network.",
                attempts
            ),
            Notice::AuthenticationFailed => write!(f, "Not signed in. Orders will not sync."),
            Notice::NewOrder { order_number } => write!(f, "New order received: #{}", order_number),
            Notice::OrderCancelled { order_number } => {
                write!(f, "Order #{} was cancelled", order_number)
            }
        }
    }
}

// =============================================================================
// Notifier Trait
// =============================================================================

/// Receives notices (implemented by the UI layer).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Discards every notice.
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, _notice: Notice) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_messages() {
        assert_eq!(
            Notice::NewOrder {
                order_number: "A-12".into()
            }
            .to_string(),
            "New order received: #A-12"
        );
        assert_eq!(
            Notice::Reconnecting {
                attempt: 2,
                delay: Duration::from_millis(4300)
            }
            .to_string(),
            "Connection lost. Reconnecting in 4.3s (attempt 2)"
        );
        assert!(Notice::ConnectionLost { attempts: 15 }.is_warning());
        assert!(!Notice::Connected.is_warning());
    }
}
