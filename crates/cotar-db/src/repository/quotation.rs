//! # Quotation Repository
//!
//! Local-store operations for quotations, their items, and the local
//! mirror of converted sales orders.
//!
//! ## Conversion Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Quotation Lifecycle                                 │
//! │                                                                         │
//! │  1. CREATE (application layer, out of engine scope)                     │
//! │     └── insert() + add_item() → status 'active'                         │
//! │                                                                         │
//! │  2. CONVERT (cotar-sync::convert)                                       │
//! │     └── reads header + items + payment term                             │
//! │     └── writes order to the ERP store in one transaction                │
//! │     └── mark_converted() guarded by status = 'active'                   │
//! │     └── mirror_order() keeps a local copy of the ERP order              │
//! │                                                                         │
//! │  A quotation converts AT MOST ONCE: mark_converted() affecting zero     │
//! │  rows means someone else already flipped it.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use cotar_core::{Quotation, QuotationItem, QuotationStatus, SalesOrder};

/// Repository for quotation operations.
#[derive(Debug, Clone)]
pub struct QuotationRepository {
    pool: SqlitePool,
}

impl QuotationRepository {
    /// Creates a new QuotationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QuotationRepository { pool }
    }

    /// Gets a quotation by code.
    pub async fn get(&self, code: &str) -> DbResult<Option<Quotation>> {
        let quotation = sqlx::query_as::<_, Quotation>(
            r#"
            SELECT code, customer_code, payment_term_code, status,
                   total_cents, order_code, created_at, converted_at
            FROM quotations
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(quotation)
    }

    /// Gets all items of a quotation, in insertion order.
    pub async fn items(&self, code: &str) -> DbResult<Vec<QuotationItem>> {
        let items = sqlx::query_as::<_, QuotationItem>(
            r#"
            SELECT id, quotation_code, product_code, description,
                   quantity, unit_price_cents, total_cents
            FROM quotation_items
            WHERE quotation_code = ?1
            ORDER BY rowid
            "#,
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Inserts a quotation header.
    pub async fn insert(&self, q: &Quotation) -> DbResult<()> {
        debug!(code = %q.code, total = q.total_cents, "Inserting quotation");

        sqlx::query(
            r#"
            INSERT INTO quotations (
                code, customer_code, payment_term_code, status,
                total_cents, order_code, created_at, converted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&q.code)
        .bind(&q.customer_code)
        .bind(&q.payment_term_code)
        .bind(q.status)
        .bind(q.total_cents)
        .bind(&q.order_code)
        .bind(q.created_at)
        .bind(q.converted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adds an item to a quotation.
    pub async fn add_item(&self, item: &QuotationItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO quotation_items (
                id, quotation_code, product_code, description,
                quantity, unit_price_cents, total_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&item.id)
        .bind(&item.quotation_code)
        .bind(&item.product_code)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.total_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Flips a quotation to CONVERTED, recording the ERP order code.
    ///
    /// ## Exactly-Once Guard
    /// The UPDATE is guarded by `status = 'active'`; zero rows affected
    /// means the quotation was already converted (or doesn't exist) and
    /// surfaces as `DbError::NotFound` so the conversion service can map
    /// it to an already-converted error.
    pub async fn mark_converted(
        &self,
        code: &str,
        order_code: &str,
        converted_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE quotations SET
                status = ?2,
                order_code = ?3,
                converted_at = ?4
            WHERE code = ?1 AND status = ?5
            "#,
        )
        .bind(code)
        .bind(QuotationStatus::Converted)
        .bind(order_code)
        .bind(converted_at)
        .bind(QuotationStatus::Active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Quotation (active)", code));
        }

        Ok(())
    }

    /// Records the local mirror of an order written to the ERP.
    pub async fn mirror_order(&self, order: &SalesOrder) -> DbResult<()> {
        debug!(code = %order.code, quotation = %order.quotation_code, "Mirroring sales order");

        sqlx::query(
            r#"
            INSERT INTO sales_orders (
                code, quotation_code, customer_code, payment_term_code,
                total_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&order.code)
        .bind(&order.quotation_code)
        .bind(&order.customer_code)
        .bind(&order.payment_term_code)
        .bind(order.total_cents)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the mirrored order for a quotation, if the conversion got far
    /// enough to record one.
    pub async fn mirrored_order_for(&self, quotation_code: &str) -> DbResult<Option<SalesOrder>> {
        let order = sqlx::query_as::<_, SalesOrder>(
            r#"
            SELECT code, quotation_code, customer_code, payment_term_code,
                   total_cents, created_at
            FROM sales_orders
            WHERE quotation_code = ?1
            "#,
        )
        .bind(quotation_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn quotation(code: &str) -> Quotation {
        Quotation {
            code: code.into(),
            customer_code: "C-1".into(),
            payment_term_code: "30-60".into(),
            status: QuotationStatus::Active,
            total_cents: 10_000,
            order_code: None,
            created_at: Utc::now(),
            converted_at: None,
        }
    }

    #[tokio::test]
    async fn test_mark_converted_is_exactly_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.quotations();

        repo.insert(&quotation("Q-1")).await.unwrap();

        repo.mark_converted("Q-1", "1001", Utc::now()).await.unwrap();

        let q = repo.get("Q-1").await.unwrap().unwrap();
        assert_eq!(q.status, QuotationStatus::Converted);
        assert_eq!(q.order_code.as_deref(), Some("1001"));

        // Second flip must fail: the guard saw no active row.
        let err = repo.mark_converted("Q-1", "1002", Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_items_preserve_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.quotations();

        repo.insert(&quotation("Q-2")).await.unwrap();
        for (i, product) in ["P-B", "P-A"].iter().enumerate() {
            repo.add_item(&QuotationItem {
                id: format!("item-{}", i),
                quotation_code: "Q-2".into(),
                product_code: product.to_string(),
                description: product.to_string(),
                quantity: 1,
                unit_price_cents: 5_000,
                total_cents: 5_000,
            })
            .await
            .unwrap();
        }

        let items = repo.items("Q-2").await.unwrap();
        assert_eq!(items[0].product_code, "P-B"); // insertion order, not sorted
        assert_eq!(items[1].product_code, "P-A");
    }
}
