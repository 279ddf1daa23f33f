//! # Company Repository
//!
//! The local schema carries a companies table for future multi-tenancy;
//! the engine runs against exactly one default row which the orchestrator
//! ensures exists before the first sync step.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use cotar_core::DEFAULT_COMPANY_ID;

/// Repository for company/tenant operations.
#[derive(Debug, Clone)]
pub struct CompanyRepository {
    pool: SqlitePool,
}

impl CompanyRepository {
    /// Creates a new CompanyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CompanyRepository { pool }
    }

    /// Ensures the default company row exists; idempotent.
    ///
    /// Returns the default company id either way.
    pub async fn ensure_default(&self, name: &str, tax_id: Option<&str>) -> DbResult<String> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO companies (id, name, tax_id, is_default, created_at)
            VALUES (?1, ?2, ?3, 1, ?4)
            "#,
        )
        .bind(DEFAULT_COMPANY_ID)
        .bind(name)
        .bind(tax_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(name = %name, "Created default company row");
        }

        Ok(DEFAULT_COMPANY_ID.to_string())
    }

    /// Whether the default company row exists.
    pub async fn default_exists(&self) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM companies WHERE id = ?1")
            .bind(DEFAULT_COMPANY_ID)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_ensure_default_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.companies();

        assert!(!repo.default_exists().await.unwrap());

        let id1 = repo.ensure_default("Matriz", Some("12345678000195")).await.unwrap();
        let id2 = repo.ensure_default("Matriz", None).await.unwrap();
        assert_eq!(id1, id2);
        assert!(repo.default_exists().await.unwrap());
    }
}
