//! # Error Types
//!
//! Domain-specific error types for kds-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kds-core errors (this file)                                           │
//! │  └── CoreError        - Order domain errors                            │
//! │                                                                         │
//! │  kds-sync errors (separate crate)                                      │
//! │  └── SyncError        - Transport, protocol, config failures           │
//! │                                                                         │
//! │  Flow: CoreError → SyncError → logs / notices                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Order domain errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A status string outside the known lifecycle.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// An order without an identifier cannot enter the projection.
    #[error("Order is missing an id")]
    MissingOrderId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::UnknownStatus("plated".into());
        assert_eq!(err.to_string(), "Unknown order status: plated");

        assert_eq!(CoreError::MissingOrderId.to_string(), "Order is missing an id");
    }
}
