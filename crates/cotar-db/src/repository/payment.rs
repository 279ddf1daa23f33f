//! # Payment Repository
//!
//! Local-store operations for payment methods and payment terms.
//!
//! ## Day Offsets
//! A payment term's ordered days-to-due offsets are stored in a single
//! JSON array column (`day_offsets`). The ERP spreads them over up to 24
//! slot columns; the normalizer collapses them before they get here.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use cotar_core::{PaymentMethod, PaymentTerm};

/// Row shape of `payment_terms` before the JSON column is decoded.
#[derive(Debug, sqlx::FromRow)]
struct PaymentTermRow {
    code: String,
    description: String,
    installment_count: i64,
    day_offsets: String,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl PaymentTermRow {
    fn decode(self) -> DbResult<PaymentTerm> {
        let day_offsets: Vec<i64> =
            serde_json::from_str(&self.day_offsets).map_err(|e| DbError::CorruptValue {
                entity: "PaymentTerm".to_string(),
                id: self.code.clone(),
                reason: e.to_string(),
            })?;

        Ok(PaymentTerm {
            code: self.code,
            description: self.description,
            installment_count: self.installment_count,
            day_offsets,
            is_active: self.is_active,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for payment method/term operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    // =========================================================================
    // Payment Methods
    // =========================================================================

    /// All payment-method codes currently in the local store.
    pub async fn method_codes(&self) -> DbResult<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>("SELECT code FROM payment_methods")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    /// Inserts a payment method.
    pub async fn insert_method(&self, m: &PaymentMethod) -> DbResult<()> {
        debug!(code = %m.code, "Inserting payment method");

        sqlx::query(
            r#"
            INSERT INTO payment_methods (code, description, is_active, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&m.code)
        .bind(&m.description)
        .bind(m.is_active)
        .bind(m.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a payment method by its natural key.
    pub async fn update_method(&self, m: &PaymentMethod) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_methods SET
                description = ?2,
                is_active = ?3,
                updated_at = ?4
            WHERE code = ?1
            "#,
        )
        .bind(&m.code)
        .bind(&m.description)
        .bind(m.is_active)
        .bind(m.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Payment Terms
    // =========================================================================

    /// All payment-term codes currently in the local store.
    pub async fn term_codes(&self) -> DbResult<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>("SELECT code FROM payment_terms")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    /// Gets a payment term by code (used by order conversion).
    pub async fn get_term(&self, code: &str) -> DbResult<Option<PaymentTerm>> {
        let row = sqlx::query_as::<_, PaymentTermRow>(
            r#"
            SELECT code, description, installment_count, day_offsets, is_active, updated_at
            FROM payment_terms
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentTermRow::decode).transpose()
    }

    /// Inserts a payment term.
    pub async fn insert_term(&self, t: &PaymentTerm) -> DbResult<()> {
        debug!(code = %t.code, installments = t.installment_count, "Inserting payment term");

        let offsets_json = serde_json::to_string(&t.day_offsets)
            .map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO payment_terms (
                code, description, installment_count, day_offsets, is_active, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&t.code)
        .bind(&t.description)
        .bind(t.installment_count)
        .bind(offsets_json)
        .bind(t.is_active)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a payment term by its natural key.
    pub async fn update_term(&self, t: &PaymentTerm) -> DbResult<()> {
        let offsets_json = serde_json::to_string(&t.day_offsets)
            .map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE payment_terms SET
                description = ?2,
                installment_count = ?3,
                day_offsets = ?4,
                is_active = ?5,
                updated_at = ?6
            WHERE code = ?1
            "#,
        )
        .bind(&t.code)
        .bind(&t.description)
        .bind(t.installment_count)
        .bind(offsets_json)
        .bind(t.is_active)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_term_offsets_roundtrip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.payments();

        let term = PaymentTerm {
            code: "30-60-90".into(),
            description: "3x sem juros".into(),
            installment_count: 3,
            day_offsets: vec![30, 60, 90],
            is_active: true,
            updated_at: Utc::now(),
        };
        repo.insert_term(&term).await.unwrap();

        let fetched = repo.get_term("30-60-90").await.unwrap().unwrap();
        assert_eq!(fetched.day_offsets, vec![30, 60, 90]);
        assert_eq!(fetched.installment_count, 3);

        let mut updated = fetched.clone();
        updated.day_offsets = vec![28, 56];
        updated.installment_count = 2;
        repo.update_term(&updated).await.unwrap();

        let fetched = repo.get_term("30-60-90").await.unwrap().unwrap();
        assert_eq!(fetched.day_offsets, vec![28, 56]);
    }

    #[tokio::test]
    async fn test_method_codes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.payments();

        let method = PaymentMethod {
            code: "01".into(),
            description: "Dinheiro".into(),
            is_active: true,
            updated_at: Utc::now(),
        };
        repo.insert_method(&method).await.unwrap();
        assert_eq!(repo.method_codes().await.unwrap(), vec!["01"]);
    }
}
