//! # ERP Store Connection
//!
//! Connection pool for the external ERP database. Unlike the local store,
//! the ERP schema is NOT ours: no migrations run here, and every access
//! goes through the [`crate::schema::SchemaCatalog`].

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{ErpError, ErpResult};
use crate::orders::OrderRepository;
use crate::reader::ErpReader;
use crate::schema::SchemaCatalog;

// =============================================================================
// Configuration
// =============================================================================

/// ERP-store connection configuration.
#[derive(Debug, Clone)]
pub struct ErpConfig {
    /// Path to the ERP SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 3 (sequential sync reads + one order-write transaction)
    pub max_connections: u32,

    /// Connection acquire timeout - the only timeout the engine enforces.
    /// Default: 30 seconds
    pub connect_timeout: Duration,
}

impl ErpConfig {
    /// Creates a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ErpConfig {
            database_path: path.into(),
            max_connections: 3,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Creates an in-memory ERP store configuration (for testing).
    pub fn in_memory() -> Self {
        ErpConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            connect_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// ERP Store
// =============================================================================

/// Handle to the ERP database: pool plus the shared schema catalog.
#[derive(Debug, Clone)]
pub struct ErpStore {
    pool: SqlitePool,
    catalog: Arc<SchemaCatalog>,
}

impl ErpStore {
    /// Connects to the ERP store.
    ///
    /// The database file must already exist - the ERP owns its schema and
    /// this adapter never creates or migrates it.
    pub async fn connect(config: ErpConfig) -> ErpResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Connecting to ERP store"
        );

        let connect_url = format!("sqlite://{}", config.database_path.display());
        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| ErpError::ConnectionFailed(e.to_string()))?
            // in-memory stores are created on connect; file stores must exist
            .create_if_missing(config.database_path == PathBuf::from(":memory:"))
            .read_only(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(connect_options)
            .await
            .map_err(|e| ErpError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "ERP pool created"
        );

        let catalog = Arc::new(SchemaCatalog::new(pool.clone()));
        Ok(ErpStore { pool, catalog })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the shared schema catalog.
    pub fn catalog(&self) -> Arc<SchemaCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Returns the raw-row reader for master-data sync.
    pub fn reader(&self) -> ErpReader {
        ErpReader::new(self.pool.clone(), Arc::clone(&self.catalog))
    }

    /// Returns the sales-order repository.
    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone(), Arc::clone(&self.catalog))
    }

    /// Closes the ERP connection pool.
    pub async fn close(&self) {
        info!("Closing ERP connection pool");
        self.pool.close().await;
    }

    /// Checks if the ERP store is reachable.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store() {
        let erp = ErpStore::connect(ErpConfig::in_memory()).await.unwrap();
        assert!(erp.health_check().await);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = ErpConfig::new("/tmp/erp.db").max_connections(8);
        assert_eq!(config.max_connections, 8);
    }
}
