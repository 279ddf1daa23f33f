//! # Customer Repository
//!
//! Local-store operations for customers mirrored from the ERP.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use cotar_core::Customer;

const CUSTOMER_COLUMNS: &str = r#"
    code, legal_name, trade_name, tax_id, state_registration,
    street, number, complement, district, postal_code,
    municipality_name, state_code, municipality_code,
    is_taxpayer, tax_regime, updated_at
"#;

/// Repository for customer operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// All customer codes currently in the local store.
    pub async fn codes(&self) -> DbResult<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>("SELECT code FROM customers")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    /// Gets a customer by its ERP code.
    pub async fn get(&self, code: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE code = ?1",
            CUSTOMER_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Inserts a customer.
    pub async fn insert(&self, c: &Customer) -> DbResult<()> {
        debug!(code = %c.code, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                code, legal_name, trade_name, tax_id, state_registration,
                street, number, complement, district, postal_code,
                municipality_name, state_code, municipality_code,
                is_taxpayer, tax_regime, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13,
                ?14, ?15, ?16
            )
            "#,
        )
        .bind(&c.code)
        .bind(&c.legal_name)
        .bind(&c.trade_name)
        .bind(&c.tax_id)
        .bind(&c.state_registration)
        .bind(&c.street)
        .bind(&c.number)
        .bind(&c.complement)
        .bind(&c.district)
        .bind(&c.postal_code)
        .bind(&c.municipality_name)
        .bind(&c.state_code)
        .bind(&c.municipality_code)
        .bind(c.is_taxpayer)
        .bind(c.tax_regime)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a customer by its natural key.
    pub async fn update(&self, c: &Customer) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE customers SET
                legal_name = ?2,
                trade_name = ?3,
                tax_id = ?4,
                state_registration = ?5,
                street = ?6,
                number = ?7,
                complement = ?8,
                district = ?9,
                postal_code = ?10,
                municipality_name = ?11,
                state_code = ?12,
                municipality_code = ?13,
                is_taxpayer = ?14,
                tax_regime = ?15,
                updated_at = ?16
            WHERE code = ?1
            "#,
        )
        .bind(&c.code)
        .bind(&c.legal_name)
        .bind(&c.trade_name)
        .bind(&c.tax_id)
        .bind(&c.state_registration)
        .bind(&c.street)
        .bind(&c.number)
        .bind(&c.complement)
        .bind(&c.district)
        .bind(&c.postal_code)
        .bind(&c.municipality_name)
        .bind(&c.state_code)
        .bind(&c.municipality_code)
        .bind(c.is_taxpayer)
        .bind(c.tax_regime)
        .bind(c.updated_at)
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
    use chrono::Utc;
    use cotar_core::TaxRegime;

    fn customer(code: &str) -> Customer {
        Customer {
            code: code.into(),
            legal_name: "ACME LTDA".into(),
            trade_name: Some("ACME".into()),
            tax_id: Some("12345678000195".into()),
            state_registration: Some("110042490114".into()),
            street: Some("Av. Paulista".into()),
            number: Some("1000".into()),
            complement: None,
            district: Some("Bela Vista".into()),
            postal_code: Some("01310100".into()),
            municipality_name: Some("São Paulo".into()),
            state_code: Some("SP".into()),
            municipality_code: Some("3550308".into()),
            is_taxpayer: true,
            tax_regime: TaxRegime::Contributor,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_get_update() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();

        repo.insert(&customer("C-1")).await.unwrap();

        let fetched = repo.get("C-1").await.unwrap().unwrap();
        assert_eq!(fetched.legal_name, "ACME LTDA");
        assert_eq!(fetched.tax_regime, TaxRegime::Contributor);
        assert!(fetched.is_taxpayer);

        let mut updated = fetched.clone();
        updated.legal_name = "ACME COMERCIO LTDA".into();
        repo.update(&updated).await.unwrap();

        let fetched = repo.get("C-1").await.unwrap().unwrap();
        assert_eq!(fetched.legal_name, "ACME COMERCIO LTDA");
        assert_eq!(repo.codes().await.unwrap(), vec!["C-1"]);
    }
}
