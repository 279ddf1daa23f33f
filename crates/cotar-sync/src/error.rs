//! # Sync Error Types
//!
//! Error taxonomy for the engine, mirrored from how failures are handled:
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Sync Error Categories                          │
//! │                                                                     │
//! │  ┌────────────────┐  ┌────────────────┐  ┌───────────────────────┐ │
//! │  │ Orchestration  │  │  Conversion    │  │  Store Passthrough    │ │
//! │  │                │  │                │  │                       │ │
//! │  │ AlreadyRunning │  │ QuotationNot-  │  │  Db(DbError)          │ │
//! │  │ ConfigLoad     │  │   Found        │  │  Erp(ErpError)        │ │
//! │  │                │  │ AlreadyConv.   │  │                       │ │
//! │  │                │  │ StatusUpdate   │  │                       │ │
//! │  └────────────────┘  └────────────────┘  └───────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Record-level failures during sync are NOT errors: they are folded into
//! [`crate::reconcile::BatchOutcome`] and reported as partial success.

use thiserror::Error;

/// Result type alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Engine error type.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    /// A full sync was requested while another run is in progress.
    /// Callers must retry later; runs are never queued.
    #[error("sync already in progress")]
    AlreadyRunning,

    /// Failed to load the engine configuration file.
    #[error("failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Conversion Errors
    // =========================================================================
    /// Conversion requested for an unknown quotation.
    #[error("quotation {code} not found")]
    QuotationNotFound { code: String },

    /// Conversion requested for a quotation that already produced an order
    /// (either locally CONVERTED, or detected in the ERP by the
    /// reconciliation probe).
    #[error("quotation {code} already converted")]
    AlreadyConverted { code: String },

    /// The quotation has no line items to convert.
    #[error("quotation {code} has no items")]
    EmptyQuotation { code: String },

    /// The quotation references a payment term the local store lacks.
    #[error("payment term {code} not found")]
    PaymentTermNotFound { code: String },

    /// The ERP order committed but the local status update failed even
    /// after a retry. The ERP order is authoritative; the local quotation
    /// is still ACTIVE until the next conversion attempt detects the
    /// order through the reconciliation probe.
    #[error(
        "ERP order {order_code} committed but quotation {code} could not be marked converted"
    )]
    StatusUpdateFailed { code: String, order_code: String },

    // =========================================================================
    // Store Passthrough
    // =========================================================================
    /// Local-store failure.
    #[error("local store error: {0}")]
    Db(#[from] cotar_db::DbError),

    /// ERP-store failure.
    #[error("ERP store error: {0}")]
    Erp(#[from] cotar_erp::ErpError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_running_message() {
        assert_eq!(SyncError::AlreadyRunning.to_string(), "sync already in progress");
    }

    #[test]
    fn test_db_error_passthrough() {
        let err: SyncError = cotar_db::DbError::not_found("Customer", "C1").into();
        assert!(matches!(err, SyncError::Db(_)));
    }
}
