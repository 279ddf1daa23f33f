//! # Quotation Conversion
//!
//! Converts an active quotation into an ERP sales order.
//!
//! ## Two Stores, One Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  local store (read-only)          ERP store (one transaction)       │
//! │                                                                     │
//! │  quotation header  ─┐                                               │
//! │  quotation items   ─┼──► build order ──► BEGIN                      │
//! │  payment term      ─┘    + installment     header / items /         │
//! │                            split           installments             │
//! │                                          COMMIT                     │
//! │                                             │                       │
//! │  mark CONVERTED  ◄──────────────────────────┘                       │
//! │  mirror order row                                                   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No transaction spans both stores. An ERP-side failure rolls back
//! atomically and the quotation stays ACTIVE (safe to retry). If the ERP
//! commit succeeds but the local status update fails, the stores disagree
//! until the next attempt: the reconciliation probe (an ERP-side lookup
//! by quotation code) detects the committed order and rejects the retry
//! with "already converted" instead of duplicating it.

use chrono::Utc;
use tracing::{error, info, warn};

use cotar_core::{Money, Quotation, QuotationStatus, SalesOrder};
use cotar_db::Database;
use cotar_erp::{ErpStore, NewInstallment, NewOrder, NewOrderItem};

use crate::error::{SyncError, SyncResult};

/// Converts quotations into ERP sales orders.
pub struct QuotationConverter {
    db: Database,
    erp: ErpStore,
}

impl QuotationConverter {
    pub fn new(db: Database, erp: ErpStore) -> Self {
        QuotationConverter { db, erp }
    }

    /// Converts the quotation and returns the ERP order code.
    ///
    /// Preconditions: the quotation exists, is ACTIVE, and the ERP holds
    /// no order for it yet. A quotation converts at most once.
    pub async fn convert(&self, code: &str) -> SyncResult<String> {
        let quotation = self
            .db
            .quotations()
            .get(code)
            .await?
            .ok_or_else(|| SyncError::QuotationNotFound {
                code: code.to_string(),
            })?;

        if quotation.status == QuotationStatus::Converted {
            return Err(SyncError::AlreadyConverted {
                code: code.to_string(),
            });
        }

        // Reconciliation probe: a previous attempt may have committed the
        // ERP order and then failed to flip the local status.
        if self.erp.orders().order_exists_for_quotation(code).await? {
            warn!(
                quotation = code,
                "ERP already holds an order for this quotation; rejecting re-conversion"
            );
            return Err(SyncError::AlreadyConverted {
                code: code.to_string(),
            });
        }

        let order = self.build_order(&quotation).await?;
        let order_code = self.erp.orders().create(&order).await?;

        info!(
            quotation = code,
            order = %order_code,
            installments = order.installments.len(),
            "Quotation converted"
        );

        self.finish_locally(&quotation, &order_code).await?;
        Ok(order_code)
    }

    /// Reads everything the order needs from the local store and computes
    /// the installment schedule. Pure reads, no transaction held.
    async fn build_order(&self, quotation: &Quotation) -> SyncResult<NewOrder> {
        let items = self.db.quotations().items(&quotation.code).await?;
        if items.is_empty() {
            return Err(SyncError::EmptyQuotation {
                code: quotation.code.clone(),
            });
        }

        let term = self
            .db
            .payments()
            .get_term(&quotation.payment_term_code)
            .await?
            .ok_or_else(|| SyncError::PaymentTermNotFound {
                code: quotation.payment_term_code.clone(),
            })?;

        let today = Utc::now().date_naive();
        let offsets = term.effective_offsets();
        let amounts = Money::from_cents(quotation.total_cents).split_installments(offsets.len());

        let installments = offsets
            .iter()
            .zip(amounts.iter())
            .enumerate()
            .map(|(i, (offset, amount))| NewInstallment {
                number: (i + 1) as i64,
                due_date: today + chrono::Duration::days(*offset),
                amount_cents: amount.cents(),
            })
            .collect();

        Ok(NewOrder {
            quotation_code: quotation.code.clone(),
            customer_code: quotation.customer_code.clone(),
            payment_term_code: quotation.payment_term_code.clone(),
            total_cents: quotation.total_cents,
            issued_on: today,
            items: items
                .into_iter()
                .map(|item| NewOrderItem {
                    product_code: item.product_code,
                    description: item.description,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                    total_cents: item.total_cents,
                })
                .collect(),
            installments,
        })
    }

    /// Post-commit local bookkeeping: flip the status, mirror the order.
    ///
    /// The ERP order is already committed here, so the status update gets
    /// one retry before surfacing the inconsistency; the mirror row is
    /// convenience data and failure to write it is only logged.
    async fn finish_locally(&self, quotation: &Quotation, order_code: &str) -> SyncResult<()> {
        let converted_at = Utc::now();
        let quotations = self.db.quotations();

        let mut marked = quotations
            .mark_converted(&quotation.code, order_code, converted_at)
            .await;
        if marked.is_err() {
            marked = quotations
                .mark_converted(&quotation.code, order_code, converted_at)
                .await;
        }
        if let Err(err) = marked {
            error!(
                quotation = %quotation.code,
                order = order_code,
                error = %err,
                "ERP order committed but local status update failed; \
                 quotation stays ACTIVE until the probe detects the order"
            );
            return Err(SyncError::StatusUpdateFailed {
                code: quotation.code.clone(),
                order_code: order_code.to_string(),
            });
        }

        let mirror = SalesOrder {
            code: order_code.to_string(),
            quotation_code: quotation.code.clone(),
            customer_code: quotation.customer_code.clone(),
            payment_term_code: quotation.payment_term_code.clone(),
            total_cents: quotation.total_cents,
            created_at: converted_at,
        };
        if let Err(err) = quotations.mirror_order(&mirror).await {
            warn!(
                order = order_code,
                error = %err,
                "Local order mirror write failed; ERP remains authoritative"
            );
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cotar_core::{PaymentTerm, QuotationItem};
    use cotar_db::DbConfig;
    use cotar_erp::ErpConfig;

    const ERP_ORDER_TABLES: &str = "
        CREATE TABLE pedidos (
            codigo INTEGER PRIMARY KEY,
            cod_cliente TEXT NOT NULL,
            cond_pagto TEXT,
            total REAL NOT NULL,
            data TEXT,
            num_orcamento TEXT
        );
        CREATE TABLE pedido_itens (
            num_pedido INTEGER, cod_produto TEXT, descricao TEXT,
            quantidade INTEGER, preco_unitario REAL, total REAL
        );
        CREATE TABLE pedido_parcelas (
            num_pedido INTEGER, parcela INTEGER, vencimento TEXT, valor REAL
        );
    ";

    async fn converter_with_quotation(total_cents: i64) -> (QuotationConverter, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let erp = ErpStore::connect(ErpConfig::in_memory()).await.unwrap();
        sqlx::raw_sql(ERP_ORDER_TABLES)
            .execute(erp.pool())
            .await
            .unwrap();

        let now = Utc::now();
        db.payments()
            .insert_term(&PaymentTerm {
                code: "30-60-90".to_string(),
                description: "3x".to_string(),
                installment_count: 3,
                day_offsets: vec![30, 60, 90],
                is_active: true,
                updated_at: now,
            })
            .await
            .unwrap();
        db.quotations()
            .insert(&Quotation {
                code: "Q1".to_string(),
                customer_code: "C1".to_string(),
                payment_term_code: "30-60-90".to_string(),
                status: QuotationStatus::Active,
                total_cents,
                order_code: None,
                created_at: now,
                converted_at: None,
            })
            .await
            .unwrap();
        db.quotations()
            .add_item(&QuotationItem {
                id: "item-1".to_string(),
                quotation_code: "Q1".to_string(),
                product_code: "P1".to_string(),
                description: "Produto".to_string(),
                quantity: 1,
                unit_price_cents: total_cents,
                total_cents,
            })
            .await
            .unwrap();

        (QuotationConverter::new(db.clone(), erp), db)
    }

    #[tokio::test]
    async fn test_convert_creates_order_and_flips_status() {
        let (converter, db) = converter_with_quotation(10_000).await;

        let order_code = converter.convert("Q1").await.unwrap();
        assert_eq!(order_code, "1");

        let quotation = db.quotations().get("Q1").await.unwrap().unwrap();
        assert_eq!(quotation.status, QuotationStatus::Converted);
        assert_eq!(quotation.order_code.as_deref(), Some("1"));
        assert!(quotation.converted_at.is_some());

        let mirror = db
            .quotations()
            .mirrored_order_for("Q1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mirror.total_cents, 10_000);
    }

    #[tokio::test]
    async fn test_installments_split_with_remainder_on_last() {
        let (converter, _db) = converter_with_quotation(10_000).await;

        converter.convert("Q1").await.unwrap();

        let amounts: Vec<f64> = sqlx::query_scalar(
            "SELECT valor FROM pedido_parcelas WHERE num_pedido = 1 ORDER BY parcela",
        )
        .fetch_all(converter.erp.pool())
        .await
        .unwrap();
        assert_eq!(amounts, vec![33.33, 33.33, 33.34]);
    }

    #[tokio::test]
    async fn test_second_convert_is_rejected() {
        let (converter, _db) = converter_with_quotation(10_000).await;

        converter.convert("Q1").await.unwrap();
        let err = converter.convert("Q1").await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyConverted { .. }));

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pedidos")
            .fetch_one(converter.erp.pool())
            .await
            .unwrap();
        assert_eq!(orders, 1);
    }

    #[tokio::test]
    async fn test_probe_detects_erp_order_for_active_quotation() {
        let (converter, db) = converter_with_quotation(10_000).await;

        // Simulate the inconsistency window: an earlier attempt committed
        // the ERP order but never flipped the local status.
        sqlx::query(
            "INSERT INTO pedidos (codigo, cod_cliente, total, num_orcamento)
             VALUES (7, 'C1', 100.0, 'Q1')",
        )
        .execute(converter.erp.pool())
        .await
        .unwrap();

        let err = converter.convert("Q1").await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyConverted { .. }));

        // Still exactly one order, and the quotation is locally untouched.
        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pedidos")
            .fetch_one(converter.erp.pool())
            .await
            .unwrap();
        assert_eq!(orders, 1);
        let quotation = db.quotations().get("Q1").await.unwrap().unwrap();
        assert_eq!(quotation.status, QuotationStatus::Active);
    }

    #[tokio::test]
    async fn test_unknown_quotation() {
        let (converter, _db) = converter_with_quotation(10_000).await;
        let err = converter.convert("NOPE").await.unwrap_err();
        assert!(matches!(err, SyncError::QuotationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_quotation_without_items_is_rejected() {
        let (converter, db) = converter_with_quotation(5_000).await;
        sqlx::query("DELETE FROM quotation_items")
            .execute(db.pool())
            .await
            .unwrap();

        let err = converter.convert("Q1").await.unwrap_err();
        assert!(matches!(err, SyncError::EmptyQuotation { .. }));
    }

    #[tokio::test]
    async fn test_missing_payment_term_is_rejected() {
        let (converter, db) = converter_with_quotation(5_000).await;
        sqlx::query("DELETE FROM payment_terms")
            .execute(db.pool())
            .await
            .unwrap();

        let err = converter.convert("Q1").await.unwrap_err();
        assert!(matches!(err, SyncError::PaymentTermNotFound { .. }));
    }
}
