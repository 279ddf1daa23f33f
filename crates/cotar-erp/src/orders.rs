//! # Sales Order Writer
//!
//! Writes a sales order (header + items + installments) into the ERP
//! store inside one transaction. The ERP is the system of record for
//! orders, so unlike master-data reads this path cannot degrade: missing
//! order tables are a hard [`ErpError::SchemaRequired`].
//!
//! ## Transaction Shape
//! ```text
//! BEGIN
//!   next code ← COALESCE(MAX(CAST(code AS INTEGER)), 0) + 1
//!   INSERT order header
//!   INSERT order item  × N
//!   INSERT installment × M
//! COMMIT
//! ```
//! Any failure rolls the whole order back; the caller's quotation stays
//! convertible.

use chrono::NaiveDate;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ErpError, ErpResult};
use crate::schema::{AccessPlan, EntityKind, SchemaCatalog};

// =============================================================================
// Order Draft
// =============================================================================

/// A fully-computed sales order ready to be written to the ERP.
///
/// All derivation (installment split, totals) happens before this struct
/// is built; the writer only persists it.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Local quotation this order originates from.
    pub quotation_code: String,
    pub customer_code: String,
    pub payment_term_code: String,
    /// Total in centavos; stored in the ERP as a decimal amount.
    pub total_cents: i64,
    pub issued_on: NaiveDate,
    pub items: Vec<NewOrderItem>,
    pub installments: Vec<NewInstallment>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_code: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone)]
pub struct NewInstallment {
    /// 1-based installment number.
    pub number: i64,
    pub due_date: NaiveDate,
    pub amount_cents: i64,
}

/// One bound value for a dynamically-assembled INSERT.
enum Bind {
    Int(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
}

/// ERP money columns hold decimal amounts, not centavos.
fn to_decimal(cents: i64) -> f64 {
    cents as f64 / 100.0
}

// =============================================================================
// Order Repository
// =============================================================================

/// Writes sales orders into the ERP store.
#[derive(Debug)]
pub struct OrderRepository {
    pool: SqlitePool,
    catalog: Arc<SchemaCatalog>,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool, catalog: Arc<SchemaCatalog>) -> Self {
        OrderRepository { pool, catalog }
    }

    /// Writes the order atomically and returns the ERP-assigned code.
    pub async fn create(&self, order: &NewOrder) -> ErpResult<String> {
        let order_plan = self.require_plan(EntityKind::SalesOrder).await?;
        let item_plan = self.require_plan(EntityKind::SalesOrderItem).await?;
        let installment_plan = self.require_plan(EntityKind::Installment).await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ErpError::OrderTransaction(e.to_string()))?;

        let code = next_order_code(&mut tx, &order_plan).await?;
        let code_text = code.to_string();

        debug!(
            order_code = %code_text,
            quotation = %order.quotation_code,
            items = order.items.len(),
            installments = order.installments.len(),
            "Writing ERP order"
        );

        // Header. Optional logical fields are written only when the
        // deployment has a column for them.
        let mut fields: Vec<(&str, Bind)> = vec![
            ("code", Bind::Int(code)),
            ("customer_code", Bind::Text(order.customer_code.clone())),
            ("total", Bind::Real(to_decimal(order.total_cents))),
        ];
        if order_plan.has("payment_term_code") {
            fields.push((
                "payment_term_code",
                Bind::Text(order.payment_term_code.clone()),
            ));
        }
        if order_plan.has("issued_on") {
            fields.push(("issued_on", Bind::Date(order.issued_on)));
        }
        if order_plan.has("quotation_code") {
            fields.push(("quotation_code", Bind::Text(order.quotation_code.clone())));
        }
        insert_dynamic(&mut tx, &order_plan, fields).await?;

        // Items.
        for item in &order.items {
            let mut fields: Vec<(&str, Bind)> = vec![
                ("order_code", Bind::Int(code)),
                ("product_code", Bind::Text(item.product_code.clone())),
                ("quantity", Bind::Int(item.quantity)),
            ];
            if item_plan.has("description") {
                fields.push(("description", Bind::Text(item.description.clone())));
            }
            if item_plan.has("unit_price") {
                fields.push(("unit_price", Bind::Real(to_decimal(item.unit_price_cents))));
            }
            if item_plan.has("total") {
                fields.push(("total", Bind::Real(to_decimal(item.total_cents))));
            }
            insert_dynamic(&mut tx, &item_plan, fields).await?;
        }

        // Installments.
        for installment in &order.installments {
            let mut fields: Vec<(&str, Bind)> = vec![
                ("order_code", Bind::Int(code)),
                ("number", Bind::Int(installment.number)),
                ("amount", Bind::Real(to_decimal(installment.amount_cents))),
            ];
            if installment_plan.has("due_date") {
                fields.push(("due_date", Bind::Date(installment.due_date)));
            }
            insert_dynamic(&mut tx, &installment_plan, fields).await?;
        }

        tx.commit()
            .await
            .map_err(|e| ErpError::OrderTransaction(e.to_string()))?;

        info!(
            order_code = %code_text,
            quotation = %order.quotation_code,
            "ERP order committed"
        );
        Ok(code_text)
    }

    /// Reconciliation probe: does the ERP already hold an order for this
    /// quotation?
    ///
    /// Used to detect the committed-in-ERP-but-still-ACTIVE-locally window
    /// before re-running a conversion. Degrades to `false` when the
    /// deployment's order table carries no quotation-reference column -
    /// in that case the window cannot be detected from the ERP side.
    pub async fn order_exists_for_quotation(&self, quotation_code: &str) -> ErpResult<bool> {
        let Some(plan) = self.catalog.resolve(EntityKind::SalesOrder).await? else {
            return Ok(false);
        };
        let Some(ref_col) = plan.column("quotation_code") else {
            debug!("ERP order table has no quotation reference column; probe unavailable");
            return Ok(false);
        };

        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM \"{}\" WHERE \"{}\" = ?1)",
            plan.table, ref_col
        );
        let exists: i64 = sqlx::query_scalar(&sql)
            .bind(quotation_code)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists != 0)
    }

    async fn require_plan(&self, kind: EntityKind) -> ErpResult<AccessPlan> {
        self.catalog
            .resolve(kind)
            .await?
            .ok_or(ErpError::SchemaRequired {
                entity: kind.label(),
            })
    }
}

/// Next order code within the open transaction.
///
/// `CAST` tolerates deployments that store codes as TEXT.
async fn next_order_code(
    tx: &mut Transaction<'_, Sqlite>,
    plan: &AccessPlan,
) -> ErpResult<i64> {
    let code_col = plan
        .column("code")
        .ok_or(ErpError::SchemaRequired {
            entity: "sales orders",
        })?;
    let sql = format!(
        "SELECT COALESCE(MAX(CAST(\"{}\" AS INTEGER)), 0) + 1 FROM \"{}\"",
        code_col, plan.table
    );
    let code: i64 = sqlx::query_scalar(&sql)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| ErpError::OrderTransaction(e.to_string()))?;
    Ok(code)
}

/// Assembles and executes an INSERT over the plan's real column names.
async fn insert_dynamic(
    tx: &mut Transaction<'_, Sqlite>,
    plan: &AccessPlan,
    fields: Vec<(&str, Bind)>,
) -> ErpResult<()> {
    let columns = fields
        .iter()
        .map(|(logical, _)| {
            plan.column(logical)
                .map(|real| format!("\"{}\"", real))
                .ok_or(ErpError::SchemaRequired {
                    entity: "sales orders",
                })
        })
        .collect::<ErpResult<Vec<_>>>()?
        .join(", ");
    let placeholders = (1..=fields.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        plan.table, columns, placeholders
    );

    let mut query = sqlx::query(&sql);
    for (_, bind) in fields {
        query = match bind {
            Bind::Int(v) => query.bind(v),
            Bind::Real(v) => query.bind(v),
            Bind::Text(v) => query.bind(v),
            Bind::Date(v) => query.bind(v),
        };
    }
    query
        .execute(&mut **tx)
        .await
        .map_err(|e| ErpError::OrderTransaction(e.to_string()))?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{ErpConfig, ErpStore};

    const ORDER_SCHEMA: &str = "
        CREATE TABLE pedidos (
            codigo INTEGER PRIMARY KEY,
            cod_cliente TEXT NOT NULL,
            cond_pagto TEXT,
            total REAL NOT NULL,
            data TEXT,
            num_orcamento TEXT
        );
        CREATE TABLE pedido_itens (
            num_pedido INTEGER NOT NULL,
            cod_produto TEXT NOT NULL,
            descricao TEXT,
            quantidade INTEGER,
            preco_unitario REAL,
            total REAL
        );
        CREATE TABLE pedido_parcelas (
            num_pedido INTEGER NOT NULL,
            parcela INTEGER NOT NULL,
            vencimento TEXT,
            valor REAL
        );
    ";

    async fn erp_with_order_tables() -> ErpStore {
        let erp = ErpStore::connect(ErpConfig::in_memory()).await.unwrap();
        sqlx::raw_sql(ORDER_SCHEMA).execute(erp.pool()).await.unwrap();
        erp
    }

    fn sample_order() -> NewOrder {
        NewOrder {
            quotation_code: "ORC-0001".to_string(),
            customer_code: "CLI-0001".to_string(),
            payment_term_code: "30-60-90".to_string(),
            total_cents: 10_000,
            issued_on: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            items: vec![
                NewOrderItem {
                    product_code: "PRD-1".to_string(),
                    description: "Item um".to_string(),
                    quantity: 2,
                    unit_price_cents: 2_500,
                    total_cents: 5_000,
                },
                NewOrderItem {
                    product_code: "PRD-2".to_string(),
                    description: "Item dois".to_string(),
                    quantity: 1,
                    unit_price_cents: 5_000,
                    total_cents: 5_000,
                },
            ],
            installments: vec![
                NewInstallment {
                    number: 1,
                    due_date: NaiveDate::from_ymd_opt(2024, 6, 9).unwrap(),
                    amount_cents: 3_333,
                },
                NewInstallment {
                    number: 2,
                    due_date: NaiveDate::from_ymd_opt(2024, 7, 9).unwrap(),
                    amount_cents: 3_333,
                },
                NewInstallment {
                    number: 3,
                    due_date: NaiveDate::from_ymd_opt(2024, 8, 8).unwrap(),
                    amount_cents: 3_334,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_create_writes_header_items_installments() {
        let erp = erp_with_order_tables().await;

        let code = erp.orders().create(&sample_order()).await.unwrap();
        assert_eq!(code, "1");

        let (total, quotation): (f64, String) =
            sqlx::query_as("SELECT total, num_orcamento FROM pedidos WHERE codigo = 1")
                .fetch_one(erp.pool())
                .await
                .unwrap();
        assert_eq!(total, 100.0);
        assert_eq!(quotation, "ORC-0001");

        let item_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pedido_itens WHERE num_pedido = 1")
                .fetch_one(erp.pool())
                .await
                .unwrap();
        assert_eq!(item_count, 2);

        let installment_sum: f64 =
            sqlx::query_scalar("SELECT SUM(valor) FROM pedido_parcelas WHERE num_pedido = 1")
                .fetch_one(erp.pool())
                .await
                .unwrap();
        assert!((installment_sum - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_codes_increment() {
        let erp = erp_with_order_tables().await;
        let orders = erp.orders();

        assert_eq!(orders.create(&sample_order()).await.unwrap(), "1");
        let mut second = sample_order();
        second.quotation_code = "ORC-0002".to_string();
        assert_eq!(orders.create(&second).await.unwrap(), "2");
    }

    #[tokio::test]
    async fn test_quotation_probe() {
        let erp = erp_with_order_tables().await;
        let orders = erp.orders();

        assert!(!orders.order_exists_for_quotation("ORC-0001").await.unwrap());
        orders.create(&sample_order()).await.unwrap();
        assert!(orders.order_exists_for_quotation("ORC-0001").await.unwrap());
        assert!(!orders.order_exists_for_quotation("ORC-0099").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_order_tables_is_hard_error() {
        let erp = ErpStore::connect(ErpConfig::in_memory()).await.unwrap();
        let err = erp.orders().create(&sample_order()).await.unwrap_err();
        assert!(matches!(err, ErpError::SchemaRequired { .. }));
    }
}
