//! # Sync Steps
//!
//! One function per master-data category, invoked strictly in sequence
//! by the engine. Each step is the same pipeline:
//!
//! ```text
//! ERP raw rows ──► normalize (pure) ──► resolve (customers only) ──► reconcile
//! ```
//!
//! A missing ERP table is not a failure: the step records an audit row
//! and degrades (payment methods fall back to the configured built-ins).
//! Unusable rows are counted as failed and excluded, never fatal.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};

use cotar_core::normalize::{
    normalize_customer, normalize_fiscal_classification_item, normalize_fiscal_rule_item,
    normalize_municipality, normalize_payment_method, normalize_payment_term,
    normalize_product_binding, normalize_state,
};
use cotar_core::{
    Customer, FiscalClassification, FiscalClassificationItem, FiscalRuleHeader, FiscalRuleItem,
    Municipality, PaymentMethod, PaymentTerm, RawRow, State, SyncRunStatus,
};
use cotar_db::{Database, DbResult};
use cotar_erp::{EntityKind, ErpReader};

use crate::config::EngineConfig;
use crate::error::SyncResult;
use crate::reconcile::{reconcile, BatchOutcome, EntityBatch};
use crate::resolve::GeoResolver;

// =============================================================================
// Step Context
// =============================================================================

/// Shared dependencies for one sync run.
pub struct StepContext<'a> {
    pub db: &'a Database,
    pub reader: &'a ErpReader,
    pub config: &'a EngineConfig,
    /// Single timestamp stamped on every record touched by this run.
    pub now: DateTime<Utc>,
}

impl StepContext<'_> {
    /// Fetches and normalizes one entity's rows.
    ///
    /// Returns `None` when the ERP has no table for the entity (after
    /// recording an audit row), otherwise the canonical records plus the
    /// count of rows too broken to normalize.
    async fn load<T>(
        &self,
        kind: EntityKind,
        normalize: impl Fn(&RawRow, DateTime<Utc>) -> Option<T>,
    ) -> SyncResult<Option<(Vec<T>, u64)>> {
        let Some(rows) = self.reader.fetch(kind).await? else {
            info!(entity = kind.label(), "No ERP table; step skipped");
            self.db
                .sync_log()
                .append(kind.label(), SyncRunStatus::Completed, "no ERP table; skipped")
                .await?;
            return Ok(None);
        };

        let total = rows.len();
        let records: Vec<T> = rows
            .iter()
            .filter_map(|row| normalize(row, self.now))
            .collect();
        let skipped = (total - records.len()) as u64;
        if skipped > 0 {
            warn!(
                entity = kind.label(),
                skipped, "Unusable ERP rows excluded from batch"
            );
        }
        Ok(Some((records, skipped)))
    }
}

// =============================================================================
// Geography
// =============================================================================

struct StateBatch {
    db: Database,
}

impl EntityBatch for StateBatch {
    type Record = State;

    fn entity(&self) -> &'static str {
        "states"
    }

    fn key(record: &State) -> String {
        record.code.clone()
    }

    async fn existing_keys(&self) -> DbResult<HashSet<String>> {
        Ok(self.db.geo().state_codes().await?.into_iter().collect())
    }

    async fn insert(&self, record: &State) -> DbResult<()> {
        self.db.geo().insert_state(record).await
    }

    async fn update(&self, record: &State) -> DbResult<()> {
        self.db.geo().update_state(record).await
    }
}

pub async fn sync_states(ctx: &StepContext<'_>) -> SyncResult<BatchOutcome> {
    let Some((records, skipped)) = ctx.load(EntityKind::State, normalize_state).await? else {
        return Ok(BatchOutcome::default());
    };
    let batch = StateBatch {
        db: ctx.db.clone(),
    };
    let mut outcome = reconcile(&batch, &records, &ctx.db.sync_log()).await?;
    outcome.failed += skipped;
    Ok(outcome)
}

struct MunicipalityBatch {
    db: Database,
}

impl EntityBatch for MunicipalityBatch {
    type Record = Municipality;

    fn entity(&self) -> &'static str {
        "municipalities"
    }

    fn key(record: &Municipality) -> String {
        record.code.clone()
    }

    async fn existing_keys(&self) -> DbResult<HashSet<String>> {
        Ok(self
            .db
            .geo()
            .municipality_codes()
            .await?
            .into_iter()
            .collect())
    }

    async fn insert(&self, record: &Municipality) -> DbResult<()> {
        self.db.geo().insert_municipality(record).await
    }

    async fn update(&self, record: &Municipality) -> DbResult<()> {
        self.db.geo().update_municipality(record).await
    }
}

pub async fn sync_municipalities(ctx: &StepContext<'_>) -> SyncResult<BatchOutcome> {
    let Some((records, skipped)) = ctx
        .load(EntityKind::Municipality, normalize_municipality)
        .await?
    else {
        return Ok(BatchOutcome::default());
    };
    let batch = MunicipalityBatch {
        db: ctx.db.clone(),
    };
    let mut outcome = reconcile(&batch, &records, &ctx.db.sync_log()).await?;
    outcome.failed += skipped;
    Ok(outcome)
}

// =============================================================================
// Customers
// =============================================================================

struct CustomerBatch {
    db: Database,
}

impl EntityBatch for CustomerBatch {
    type Record = Customer;

    fn entity(&self) -> &'static str {
        "customers"
    }

    fn key(record: &Customer) -> String {
        record.code.clone()
    }

    async fn existing_keys(&self) -> DbResult<HashSet<String>> {
        Ok(self.db.customers().codes().await?.into_iter().collect())
    }

    async fn insert(&self, record: &Customer) -> DbResult<()> {
        self.db.customers().insert(record).await
    }

    async fn update(&self, record: &Customer) -> DbResult<()> {
        self.db.customers().update(record).await
    }
}

/// Customers additionally run the geographic fallback chain between
/// normalization and reconciliation; a record whose resolution fails is
/// skipped and counted, the batch continues.
pub async fn sync_customers(ctx: &StepContext<'_>) -> SyncResult<BatchOutcome> {
    let Some((mut records, mut skipped)) =
        ctx.load(EntityKind::Customer, normalize_customer).await?
    else {
        return Ok(BatchOutcome::default());
    };

    let resolver = GeoResolver::new(ctx.db.geo(), ctx.config.sync.default_state.clone());
    let mut resolved = Vec::with_capacity(records.len());
    for mut customer in records.drain(..) {
        match resolver.resolve(&mut customer).await {
            Ok(_) => resolved.push(customer),
            Err(err) => {
                warn!(
                    customer = %customer.code,
                    error = %err,
                    "Geography resolution failed; record skipped"
                );
                skipped += 1;
            }
        }
    }

    let batch = CustomerBatch {
        db: ctx.db.clone(),
    };
    let mut outcome = reconcile(&batch, &resolved, &ctx.db.sync_log()).await?;
    outcome.failed += skipped;
    Ok(outcome)
}

// =============================================================================
// Payments
// =============================================================================

struct PaymentMethodBatch {
    db: Database,
}

impl EntityBatch for PaymentMethodBatch {
    type Record = PaymentMethod;

    fn entity(&self) -> &'static str {
        "payment methods"
    }

    fn key(record: &PaymentMethod) -> String {
        record.code.clone()
    }

    async fn existing_keys(&self) -> DbResult<HashSet<String>> {
        Ok(self.db.payments().method_codes().await?.into_iter().collect())
    }

    async fn insert(&self, record: &PaymentMethod) -> DbResult<()> {
        self.db.payments().insert_method(record).await
    }

    async fn update(&self, record: &PaymentMethod) -> DbResult<()> {
        self.db.payments().update_method(record).await
    }
}

/// Payment methods degrade to the configured built-ins when the ERP has
/// no table at all: the built-ins are inserted once and left untouched on
/// later runs.
pub async fn sync_payment_methods(ctx: &StepContext<'_>) -> SyncResult<BatchOutcome> {
    let records = match ctx
        .load(EntityKind::PaymentMethod, normalize_payment_method)
        .await?
    {
        Some((records, skipped)) => {
            let batch = PaymentMethodBatch {
                db: ctx.db.clone(),
            };
            let mut outcome = reconcile(&batch, &records, &ctx.db.sync_log()).await?;
            outcome.failed += skipped;
            return Ok(outcome);
        }
        None => ctx
            .config
            .sync
            .fallback_payment_methods
            .iter()
            .map(|m| PaymentMethod {
                code: m.code.clone(),
                description: m.description.clone(),
                is_active: true,
                updated_at: ctx.now,
            })
            .collect::<Vec<_>>(),
    };

    // Fallback path: seed only the methods not already present.
    let existing: HashSet<String> = ctx.db.payments().method_codes().await?.into_iter().collect();
    let mut outcome = BatchOutcome::default();
    for method in records {
        if existing.contains(&method.code) {
            continue;
        }
        match ctx.db.payments().insert_method(&method).await {
            Ok(()) => outcome.inserted += 1,
            Err(err) => outcome.record_failure(method.code.clone(), err),
        }
    }
    if outcome.inserted > 0 {
        info!(seeded = outcome.inserted, "Fallback payment methods seeded");
    }
    ctx.db
        .sync_log()
        .append(
            "payment methods",
            SyncRunStatus::Completed,
            &format!("fallback: {}", outcome.summary()),
        )
        .await?;
    Ok(outcome)
}

struct PaymentTermBatch {
    db: Database,
}

impl EntityBatch for PaymentTermBatch {
    type Record = PaymentTerm;

    fn entity(&self) -> &'static str {
        "payment terms"
    }

    fn key(record: &PaymentTerm) -> String {
        record.code.clone()
    }

    async fn existing_keys(&self) -> DbResult<HashSet<String>> {
        Ok(self.db.payments().term_codes().await?.into_iter().collect())
    }

    async fn insert(&self, record: &PaymentTerm) -> DbResult<()> {
        self.db.payments().insert_term(record).await
    }

    async fn update(&self, record: &PaymentTerm) -> DbResult<()> {
        self.db.payments().update_term(record).await
    }
}

pub async fn sync_payment_terms(ctx: &StepContext<'_>) -> SyncResult<BatchOutcome> {
    let Some((records, skipped)) = ctx
        .load(EntityKind::PaymentTerm, normalize_payment_term)
        .await?
    else {
        return Ok(BatchOutcome::default());
    };
    let batch = PaymentTermBatch {
        db: ctx.db.clone(),
    };
    let mut outcome = reconcile(&batch, &records, &ctx.db.sync_log()).await?;
    outcome.failed += skipped;
    Ok(outcome)
}

// =============================================================================
// Fiscal Rules
// =============================================================================

struct RuleHeaderBatch {
    db: Database,
}

impl EntityBatch for RuleHeaderBatch {
    type Record = FiscalRuleHeader;

    fn entity(&self) -> &'static str {
        "fiscal rule headers"
    }

    fn key(record: &FiscalRuleHeader) -> String {
        record.code.clone()
    }

    async fn existing_keys(&self) -> DbResult<HashSet<String>> {
        Ok(self.db.fiscal().header_codes().await?.into_iter().collect())
    }

    async fn insert(&self, record: &FiscalRuleHeader) -> DbResult<()> {
        self.db.fiscal().insert_header(record).await
    }

    async fn update(&self, record: &FiscalRuleHeader) -> DbResult<()> {
        self.db.fiscal().update_header(record).await
    }
}

struct RuleItemBatch {
    db: Database,
}

impl EntityBatch for RuleItemBatch {
    type Record = FiscalRuleItem;

    fn entity(&self) -> &'static str {
        "fiscal rule items"
    }

    fn key(record: &FiscalRuleItem) -> String {
        format!("{}|{}", record.rule_code, record.jurisdiction)
    }

    async fn existing_keys(&self) -> DbResult<HashSet<String>> {
        Ok(self
            .db
            .fiscal()
            .item_keys()
            .await?
            .into_iter()
            .map(|(rule, uf)| format!("{}|{}", rule, uf))
            .collect())
    }

    // Items are written with ON CONFLICT upserts, so a duplicated
    // (rule, jurisdiction) pair inside one batch overwrites cleanly.
    async fn insert(&self, record: &FiscalRuleItem) -> DbResult<()> {
        self.db.fiscal().upsert_item(record).await
    }

    async fn update(&self, record: &FiscalRuleItem) -> DbResult<()> {
        self.db.fiscal().upsert_item(record).await
    }
}

/// The ERP stores fiscal rules flat (one row per rule × jurisdiction);
/// headers are derived as the distinct rule codes before the items are
/// reconciled, so the item FK always has a parent.
pub async fn sync_fiscal_rules(ctx: &StepContext<'_>) -> SyncResult<BatchOutcome> {
    let Some(rows) = ctx.reader.fetch(EntityKind::FiscalRule).await? else {
        info!("No ERP fiscal rule table; step skipped");
        ctx.db
            .sync_log()
            .append(
                "fiscal rules",
                SyncRunStatus::Completed,
                "no ERP table; skipped",
            )
            .await?;
        return Ok(BatchOutcome::default());
    };

    let mut headers: Vec<FiscalRuleHeader> = Vec::new();
    let mut items: Vec<FiscalRuleItem> = Vec::new();
    let mut skipped: u64 = 0;
    for row in &rows {
        let Some(item) = normalize_fiscal_rule_item(row, ctx.now) else {
            skipped += 1;
            continue;
        };
        if !headers.iter().any(|h| h.code == item.rule_code) {
            headers.push(FiscalRuleHeader {
                code: item.rule_code.clone(),
                description: row.get_str("description"),
                updated_at: ctx.now,
            });
        }
        items.push(item);
    }

    let header_outcome = reconcile(
        &RuleHeaderBatch {
            db: ctx.db.clone(),
        },
        &headers,
        &ctx.db.sync_log(),
    )
    .await?;
    let mut outcome = reconcile(
        &RuleItemBatch {
            db: ctx.db.clone(),
        },
        &items,
        &ctx.db.sync_log(),
    )
    .await?;

    outcome.inserted += header_outcome.inserted;
    outcome.updated += header_outcome.updated;
    outcome.failed += header_outcome.failed + skipped;
    outcome.errors.extend(header_outcome.errors);
    Ok(outcome)
}

// =============================================================================
// Fiscal Classifications
// =============================================================================

struct ClassificationBatch {
    db: Database,
}

impl EntityBatch for ClassificationBatch {
    type Record = FiscalClassification;

    fn entity(&self) -> &'static str {
        "fiscal classifications"
    }

    fn key(record: &FiscalClassification) -> String {
        record.code.clone()
    }

    async fn existing_keys(&self) -> DbResult<HashSet<String>> {
        Ok(self
            .db
            .fiscal()
            .classification_codes()
            .await?
            .into_iter()
            .collect())
    }

    async fn insert(&self, record: &FiscalClassification) -> DbResult<()> {
        self.db.fiscal().insert_classification(record).await
    }

    async fn update(&self, record: &FiscalClassification) -> DbResult<()> {
        self.db.fiscal().update_classification(record).await
    }
}

struct ClassificationItemBatch {
    db: Database,
}

impl EntityBatch for ClassificationItemBatch {
    type Record = FiscalClassificationItem;

    fn entity(&self) -> &'static str {
        "fiscal classification items"
    }

    fn key(record: &FiscalClassificationItem) -> String {
        format!("{}|{}", record.classification_code, record.jurisdiction)
    }

    async fn existing_keys(&self) -> DbResult<HashSet<String>> {
        Ok(self
            .db
            .fiscal()
            .classification_item_keys()
            .await?
            .into_iter()
            .map(|(code, uf)| format!("{}|{}", code, uf))
            .collect())
    }

    async fn insert(&self, record: &FiscalClassificationItem) -> DbResult<()> {
        self.db.fiscal().upsert_classification_item(record).await
    }

    async fn update(&self, record: &FiscalClassificationItem) -> DbResult<()> {
        self.db.fiscal().upsert_classification_item(record).await
    }
}

pub async fn sync_fiscal_classifications(ctx: &StepContext<'_>) -> SyncResult<BatchOutcome> {
    let Some(rows) = ctx.reader.fetch(EntityKind::FiscalClassification).await? else {
        info!("No ERP fiscal classification table; step skipped");
        ctx.db
            .sync_log()
            .append(
                "fiscal classifications",
                SyncRunStatus::Completed,
                "no ERP table; skipped",
            )
            .await?;
        return Ok(BatchOutcome::default());
    };

    let mut headers: Vec<FiscalClassification> = Vec::new();
    let mut items: Vec<FiscalClassificationItem> = Vec::new();
    let mut skipped: u64 = 0;
    for row in &rows {
        let Some(item) = normalize_fiscal_classification_item(row, ctx.now) else {
            skipped += 1;
            continue;
        };
        if !headers.iter().any(|h| h.code == item.classification_code) {
            headers.push(FiscalClassification {
                code: item.classification_code.clone(),
                description: row.get_str("description"),
                updated_at: ctx.now,
            });
        }
        items.push(item);
    }

    let header_outcome = reconcile(
        &ClassificationBatch {
            db: ctx.db.clone(),
        },
        &headers,
        &ctx.db.sync_log(),
    )
    .await?;
    let mut outcome = reconcile(
        &ClassificationItemBatch {
            db: ctx.db.clone(),
        },
        &items,
        &ctx.db.sync_log(),
    )
    .await?;

    outcome.inserted += header_outcome.inserted;
    outcome.updated += header_outcome.updated;
    outcome.failed += header_outcome.failed + skipped;
    outcome.errors.extend(header_outcome.errors);
    Ok(outcome)
}

// =============================================================================
// Product Fiscal Bindings
// =============================================================================

/// Bindings are history rows, not upserts: an unchanged binding is left
/// alone (keeps the run idempotent), a changed one soft-retires the
/// active row and inserts a fresh active one.
pub async fn sync_product_bindings(ctx: &StepContext<'_>) -> SyncResult<BatchOutcome> {
    let Some((records, skipped)) = ctx
        .load(EntityKind::ProductBinding, normalize_product_binding)
        .await?
    else {
        return Ok(BatchOutcome::default());
    };

    let fiscal = ctx.db.fiscal();
    let mut outcome = BatchOutcome::default();
    outcome.failed += skipped;

    for binding in &records {
        let current = match fiscal.active_binding(&binding.product_code).await {
            Ok(current) => current,
            Err(err) => {
                outcome.record_failure(binding.product_code.clone(), err);
                continue;
            }
        };

        let unchanged = current.as_ref().is_some_and(|c| {
            c.rule_code == binding.rule_code
                && c.classification_code == binding.classification_code
                && c.origin_code == binding.origin_code
        });
        if unchanged {
            continue;
        }

        match fiscal.replace_binding(binding).await {
            Ok(_) => {
                if current.is_some() {
                    outcome.updated += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
            Err(err) => outcome.record_failure(binding.product_code.clone(), err),
        }
    }

    ctx.db
        .sync_log()
        .append(
            "product fiscal bindings",
            SyncRunStatus::Completed,
            &outcome.summary(),
        )
        .await?;
    Ok(outcome)
}
