//! # ERP Adapter Error Types
//!
//! Error taxonomy for the ERP side of the engine:
//! - Schema resolution misses are NOT errors: [`crate::schema::SchemaCatalog::resolve`]
//!   returns `Ok(None)` so callers can degrade to defaults.
//! - [`ErpError::SchemaRequired`] is reserved for operations that cannot
//!   degrade (the order writer needs real order tables to write to).

use thiserror::Error;

/// Errors from the ERP adapter.
#[derive(Error, Debug)]
pub enum ErpError {
    /// Failed to connect to the ERP store.
    #[error("ERP connection failed: {0}")]
    ConnectionFailed(String),

    /// A query against the ERP store failed after schema fallback.
    #[error("ERP query failed: {0}")]
    QueryFailed(String),

    /// An operation that cannot degrade found no usable table.
    ///
    /// Only the order writer raises this; master-data reads return
    /// `Ok(None)` instead and let the caller fall back.
    #[error("no ERP table found for {entity}")]
    SchemaRequired { entity: &'static str },

    /// The ERP returned a row the adapter cannot use.
    #[error("corrupt ERP row in {table}: {reason}")]
    CorruptRow { table: String, reason: String },

    /// The order write transaction failed and was rolled back.
    #[error("ERP order transaction failed: {0}")]
    OrderTransaction(String),
}

impl From<sqlx::Error> for ErpError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                ErpError::ConnectionFailed("ERP pool timed out".to_string())
            }
            sqlx::Error::Io(e) => ErpError::ConnectionFailed(e.to_string()),
            other => ErpError::QueryFailed(other.to_string()),
        }
    }
}

/// Convenience Result alias for ERP operations.
pub type ErpResult<T> = Result<T, ErpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_required_message() {
        let err = ErpError::SchemaRequired {
            entity: "sales orders",
        };
        assert_eq!(err.to_string(), "no ERP table found for sales orders");
    }

    #[test]
    fn test_pool_timeout_maps_to_connection() {
        let err: ErpError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ErpError::ConnectionFailed(_)));
    }
}
