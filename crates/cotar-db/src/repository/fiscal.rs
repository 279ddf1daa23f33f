//! # Fiscal Repository
//!
//! Local-store operations for fiscal rules, fiscal classifications, and
//! product fiscal bindings.
//!
//! ## Key Invariants
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  fiscal_rule_items            (rule_code, jurisdiction) UNIQUE          │
//! │  fiscal_classification_items  (classification_code, jurisdiction) UNIQUE│
//! │  product_fiscal_bindings      ONE active row per product,               │
//! │                               prior rows deactivated, never deleted     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Item writes use `ON CONFLICT ... DO UPDATE` so a batch carrying a
//! duplicate (code, jurisdiction) pair overwrites instead of duplicating
//! or erroring - the reconciler's insert-set may legitimately contain the
//! same composite key twice when the ERP does.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use cotar_core::{
    FiscalClassification, FiscalClassificationItem, FiscalRuleHeader, FiscalRuleItem,
    ProductFiscalBinding,
};

/// Repository for fiscal data operations.
#[derive(Debug, Clone)]
pub struct FiscalRepository {
    pool: SqlitePool,
}

impl FiscalRepository {
    /// Creates a new FiscalRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FiscalRepository { pool }
    }

    // =========================================================================
    // Rule Headers
    // =========================================================================

    /// All fiscal-rule header codes.
    pub async fn header_codes(&self) -> DbResult<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>("SELECT code FROM fiscal_rule_headers")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    /// Inserts a rule header.
    pub async fn insert_header(&self, h: &FiscalRuleHeader) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fiscal_rule_headers (code, description, updated_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&h.code)
        .bind(&h.description)
        .bind(h.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a rule header by code.
    pub async fn update_header(&self, h: &FiscalRuleHeader) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE fiscal_rule_headers SET description = ?2, updated_at = ?3
            WHERE code = ?1
            "#,
        )
        .bind(&h.code)
        .bind(&h.description)
        .bind(h.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Rule Items
    // =========================================================================

    /// All (rule_code, jurisdiction) pairs currently stored.
    pub async fn item_keys(&self) -> DbResult<Vec<(String, String)>> {
        let keys = sqlx::query_as::<_, (String, String)>(
            "SELECT rule_code, jurisdiction FROM fiscal_rule_items",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    /// All (classification code, jurisdiction) pairs currently stored.
    pub async fn classification_item_keys(&self) -> DbResult<Vec<(String, String)>> {
        let keys = sqlx::query_as::<_, (String, String)>(
            "SELECT classification_code, jurisdiction FROM fiscal_classification_items",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    /// Upserts a rule item keyed by (rule_code, jurisdiction).
    pub async fn upsert_item(&self, item: &FiscalRuleItem) -> DbResult<()> {
        debug!(rule = %item.rule_code, uf = %item.jurisdiction, "Upserting fiscal rule item");

        sqlx::query(
            r#"
            INSERT INTO fiscal_rule_items (
                rule_code, jurisdiction, rate_bps, reduction_bps,
                st_margin_bps, substitution, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(rule_code, jurisdiction) DO UPDATE SET
                rate_bps = excluded.rate_bps,
                reduction_bps = excluded.reduction_bps,
                st_margin_bps = excluded.st_margin_bps,
                substitution = excluded.substitution,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.rule_code)
        .bind(&item.jurisdiction)
        .bind(item.rate_bps)
        .bind(item.reduction_bps)
        .bind(item.st_margin_bps)
        .bind(item.substitution)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets one rule item by its composite key.
    pub async fn get_item(
        &self,
        rule_code: &str,
        jurisdiction: &str,
    ) -> DbResult<Option<FiscalRuleItem>> {
        let item = sqlx::query_as::<_, FiscalRuleItem>(
            r#"
            SELECT rule_code, jurisdiction, rate_bps, reduction_bps,
                   st_margin_bps, substitution, updated_at
            FROM fiscal_rule_items
            WHERE rule_code = ?1 AND jurisdiction = ?2
            "#,
        )
        .bind(rule_code)
        .bind(jurisdiction)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Counts items for a rule (audit/test helper).
    pub async fn count_items(&self, rule_code: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM fiscal_rule_items WHERE rule_code = ?1")
                .bind(rule_code)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // =========================================================================
    // Classifications
    // =========================================================================

    /// All fiscal-classification codes.
    pub async fn classification_codes(&self) -> DbResult<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>("SELECT code FROM fiscal_classifications")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    /// Inserts a classification header.
    pub async fn insert_classification(&self, c: &FiscalClassification) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fiscal_classifications (code, description, updated_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&c.code)
        .bind(&c.description)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a classification header by code.
    pub async fn update_classification(&self, c: &FiscalClassification) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE fiscal_classifications SET description = ?2, updated_at = ?3
            WHERE code = ?1
            "#,
        )
        .bind(&c.code)
        .bind(&c.description)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upserts a classification item keyed by (classification, jurisdiction).
    pub async fn upsert_classification_item(&self, item: &FiscalClassificationItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fiscal_classification_items (
                classification_code, jurisdiction, rate_bps,
                surcharge_bps, presumed_margin_bps, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(classification_code, jurisdiction) DO UPDATE SET
                rate_bps = excluded.rate_bps,
                surcharge_bps = excluded.surcharge_bps,
                presumed_margin_bps = excluded.presumed_margin_bps,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.classification_code)
        .bind(&item.jurisdiction)
        .bind(item.rate_bps)
        .bind(item.surcharge_bps)
        .bind(item.presumed_margin_bps)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Product Fiscal Bindings
    // =========================================================================

    /// The active binding for a product, if any.
    pub async fn active_binding(&self, product_code: &str) -> DbResult<Option<ProductFiscalBinding>> {
        let binding = sqlx::query_as::<_, ProductFiscalBinding>(
            r#"
            SELECT id, product_code, rule_code, classification_code,
                   origin_code, is_active, created_at
            FROM product_fiscal_bindings
            WHERE product_code = ?1 AND is_active = 1
            "#,
        )
        .bind(product_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(binding)
    }

    /// Full binding history for a product, newest first.
    pub async fn binding_history(&self, product_code: &str) -> DbResult<Vec<ProductFiscalBinding>> {
        let bindings = sqlx::query_as::<_, ProductFiscalBinding>(
            r#"
            SELECT id, product_code, rule_code, classification_code,
                   origin_code, is_active, created_at
            FROM product_fiscal_bindings
            WHERE product_code = ?1
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(product_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(bindings)
    }

    /// Replaces a product's active binding.
    ///
    /// ## What This Does
    /// 1. Deactivates any currently-active binding (soft retire - rows are
    ///    history, never deleted)
    /// 2. Inserts the new binding as active, with a fresh surrogate id
    ///
    /// Both statements run in one transaction so the partial unique index
    /// never sees two active rows for the product.
    pub async fn replace_binding(&self, b: &ProductFiscalBinding) -> DbResult<ProductFiscalBinding> {
        debug!(product = %b.product_code, rule = %b.rule_code, "Replacing fiscal binding");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE product_fiscal_bindings SET is_active = 0
            WHERE product_code = ?1 AND is_active = 1
            "#,
        )
        .bind(&b.product_code)
        .execute(&mut *tx)
        .await?;

        let stored = ProductFiscalBinding {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            ..b.clone()
        };

        sqlx::query(
            r#"
            INSERT INTO product_fiscal_bindings (
                id, product_code, rule_code, classification_code,
                origin_code, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.product_code)
        .bind(&stored.rule_code)
        .bind(&stored.classification_code)
        .bind(stored.origin_code)
        .bind(stored.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(stored)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;

    fn header(code: &str) -> FiscalRuleHeader {
        FiscalRuleHeader {
            code: code.into(),
            description: None,
            updated_at: Utc::now(),
        }
    }

    fn item(rule: &str, uf: &str, rate_bps: i64) -> FiscalRuleItem {
        FiscalRuleItem {
            rule_code: rule.into(),
            jurisdiction: uf.into(),
            rate_bps,
            reduction_bps: 0,
            st_margin_bps: 0,
            substitution: false,
            updated_at: Utc::now(),
        }
    }

    fn binding(product: &str, rule: &str) -> ProductFiscalBinding {
        ProductFiscalBinding {
            id: String::new(),
            product_code: product.into(),
            rule_code: rule.into(),
            classification_code: "NCM-1".into(),
            origin_code: 0,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_item_key_overwrites() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.fiscal();

        repo.insert_header(&header("ICMS-18")).await.unwrap();
        repo.upsert_item(&item("ICMS-18", "SP", 1800)).await.unwrap();
        repo.upsert_item(&item("ICMS-18", "SP", 1200)).await.unwrap();

        assert_eq!(repo.count_items("ICMS-18").await.unwrap(), 1);
        let stored = repo.get_item("ICMS-18", "SP").await.unwrap().unwrap();
        assert_eq!(stored.rate_bps, 1200);
    }

    #[tokio::test]
    async fn test_single_active_binding_with_history() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.fiscal();

        repo.replace_binding(&binding("P-1", "ICMS-18")).await.unwrap();
        repo.replace_binding(&binding("P-1", "ICMS-12")).await.unwrap();

        let active = repo.active_binding("P-1").await.unwrap().unwrap();
        assert_eq!(active.rule_code, "ICMS-12");

        let history = repo.binding_history("P-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|b| b.is_active).count(), 1);
    }
}
