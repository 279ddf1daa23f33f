//! # Error Types
//!
//! Domain-specific error types for cotar-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  cotar-core errors (this file)                                         │
//! │  └── ValidationError  - Code/format validation failures                │
//! │                                                                         │
//! │  cotar-db errors      - Local store operation failures (DbError)       │
//! │  cotar-erp errors     - ERP store / schema probing failures (ErpError) │
//! │  cotar-sync errors    - Engine-level failures (SyncError)              │
//! │                                                                         │
//! │  Flow: ValidationError → caller (normalizers, sync steps)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (code, jurisdiction, etc.)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Validation Error
// =============================================================================

/// Code-format validation errors.
///
/// These errors occur when a code or identifier does not meet the canonical
/// format the local store enforces. Used by normalizers before any upsert.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., non-alphabetic state code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ValidationError::InvalidFormat {
            field: "state_code".to_string(),
            reason: "must be two letters".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "state_code has invalid format: must be two letters"
        );
    }

    #[test]
    fn test_required_message() {
        let err = ValidationError::Required {
            field: "state_code".to_string(),
        };
        assert_eq!(err.to_string(), "state_code is required");
    }
}
