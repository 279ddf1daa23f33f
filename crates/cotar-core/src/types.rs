//! # Domain Types
//!
//! Canonical records used throughout cotar.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Canonical Records                                │
//! │                                                                         │
//! │  Master data (ERP → local)          Transactional (local → ERP)        │
//! │  ┌─────────────────┐                ┌─────────────────┐                │
//! │  │ State           │                │ Quotation       │                │
//! │  │ Municipality    │                │ QuotationItem   │                │
//! │  │ Customer        │                └────────┬────────┘                │
//! │  │ PaymentMethod   │                         │ convert                 │
//! │  │ PaymentTerm     │                         ▼                         │
//! │  │ FiscalRule*     │                ┌─────────────────┐                │
//! │  │ FiscalClass*    │                │ SalesOrder      │                │
//! │  │ ProductBinding  │                │ SalesOrderItem  │                │
//! │  └─────────────────┘                │ Installment     │                │
//! │                                     └─────────────────┘                │
//! │  Audit: SyncRunRecord (append-only)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Natural-Key Identity Pattern
//! Master-data records are keyed by their ERP-assigned business code
//! (state code, municipality registry code, customer code, ...). Surrogate
//! UUIDs exist only where the local store owns the identity (fiscal
//! bindings, audit rows, quotation items).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Geography
// =============================================================================

/// A federative state (2-letter code, e.g. "SP").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct State {
    /// 2-letter code - natural key.
    pub code: String,

    /// Display name (e.g. "São Paulo").
    pub name: String,

    /// Country-registry numeric id (IBGE), when the ERP provides one.
    pub registry_id: Option<i64>,

    /// Whether the state is selectable (soft delete).
    pub is_active: bool,

    /// Last sync touch.
    pub updated_at: DateTime<Utc>,
}

/// A municipality (7-digit registry code, e.g. "3550308").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Municipality {
    /// 7-digit registry code (IBGE) - natural key.
    pub code: String,

    /// Display name.
    pub name: String,

    /// Owning state code. Invariant: must reference an existing State.
    pub state_code: String,

    /// Geographic region label, when provided.
    pub region: Option<String>,

    /// Whether this municipality is the state capital.
    pub is_capital: bool,

    /// Telephone area code, when provided.
    pub area_code: Option<String>,

    /// Last sync touch.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Customer
// =============================================================================

/// Tax regime of a customer, inferred when the ERP does not provide one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
    /// Taxpayer registered with the state (contributes ICMS).
    Contributor,
    /// End consumer / unregistered entity.
    NonContributor,
}

impl TaxRegime {
    /// Fiscal-document regime code (1 = contributor, 9 = non-contributor).
    #[inline]
    pub const fn code(&self) -> i64 {
        match self {
            TaxRegime::Contributor => 1,
            TaxRegime::NonContributor => 9,
        }
    }
}

/// A customer mirrored from the ERP store.
///
/// `state_code` and `municipality_code` may be absent on the raw ERP row;
/// the resolution heuristics fill them before the upsert, so persisted
/// customers always carry a resolved state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    /// ERP-assigned code - natural key.
    pub code: String,

    /// Legal name (razão social).
    pub legal_name: String,

    /// Trade name (nome fantasia).
    pub trade_name: Option<String>,

    /// Tax id (CNPJ/CPF), digits may include formatting in the ERP.
    pub tax_id: Option<String>,

    /// State tax registration (inscrição estadual).
    pub state_registration: Option<String>,

    /// Address fields.
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub district: Option<String>,

    /// Postal code, digits-only, at most 8 characters.
    pub postal_code: Option<String>,

    /// Free-text municipality name from the ERP.
    pub municipality_name: Option<String>,

    /// 2-letter state code; never null after resolution.
    pub state_code: Option<String>,

    /// 7-digit municipality registry code, when known.
    pub municipality_code: Option<String>,

    /// Whether the customer is a tax contributor.
    pub is_taxpayer: bool,

    /// Tax regime (explicit from the ERP, or inferred).
    pub tax_regime: TaxRegime,

    /// Last sync touch.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Payments
// =============================================================================

/// A payment method (e.g. cash, bank transfer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PaymentMethod {
    /// ERP-assigned code - natural key.
    pub code: String,

    /// Description shown at quotation entry.
    pub description: String,

    /// Soft-delete flag.
    pub is_active: bool,

    /// Last sync touch.
    pub updated_at: DateTime<Utc>,
}

/// A payment term: an installment count plus ordered days-to-due offsets.
///
/// The offsets drive installment generation at order conversion; a term
/// with offsets `[30, 60, 90]` due-dates three installments 30/60/90 days
/// after conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTerm {
    /// ERP-assigned code - natural key.
    pub code: String,

    /// Description shown at quotation entry.
    pub description: String,

    /// Number of installments (defaults to 1 when the ERP omits it).
    pub installment_count: i64,

    /// Ordered days-to-due offsets, at most [`crate::MAX_INSTALLMENTS`].
    pub day_offsets: Vec<i64>,

    /// Soft-delete flag.
    pub is_active: bool,

    /// Last sync touch.
    pub updated_at: DateTime<Utc>,
}

impl PaymentTerm {
    /// Offsets actually used to generate installments.
    ///
    /// A term with no stored offsets still produces one immediate
    /// installment (offset 0) so every order carries a schedule.
    pub fn effective_offsets(&self) -> Vec<i64> {
        if self.day_offsets.is_empty() {
            vec![0]
        } else {
            self.day_offsets.clone()
        }
    }
}

// =============================================================================
// Fiscal Data
// =============================================================================

/// A fiscal rule header; owns one item per jurisdiction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FiscalRuleHeader {
    /// Rule code - natural key.
    pub code: String,

    /// Description, when the ERP provides one.
    pub description: Option<String>,

    /// Last sync touch.
    pub updated_at: DateTime<Utc>,
}

/// Per-jurisdiction tax parameters of a fiscal rule.
///
/// Composite natural key: (rule_code, jurisdiction). Percentages are held
/// in basis points (1825 = 18.25%) so comparisons and upserts stay exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FiscalRuleItem {
    /// Owning rule code.
    pub rule_code: String,

    /// 2-letter jurisdiction code.
    pub jurisdiction: String,

    /// Tax rate in basis points.
    pub rate_bps: i64,

    /// Base-reduction percentage in basis points.
    pub reduction_bps: i64,

    /// Presumed-margin percentage for substitution, in basis points.
    pub st_margin_bps: i64,

    /// Whether tax substitution applies in this jurisdiction.
    pub substitution: bool,

    /// Last sync touch.
    pub updated_at: DateTime<Utc>,
}

/// A fiscal classification header (classification code - natural key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FiscalClassification {
    pub code: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Per-jurisdiction tax data of a fiscal classification.
///
/// Composite natural key: (classification_code, jurisdiction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FiscalClassificationItem {
    pub classification_code: String,
    pub jurisdiction: String,

    /// Tax rate in basis points.
    pub rate_bps: i64,

    /// Surcharge (FCP) in basis points.
    pub surcharge_bps: i64,

    /// Presumed-margin percentage in basis points.
    pub presumed_margin_bps: i64,

    pub updated_at: DateTime<Utc>,
}

/// Links a product to exactly one *active* fiscal rule + classification.
///
/// Previous bindings for the same product are soft-retired, never deleted,
/// to preserve audit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductFiscalBinding {
    /// Surrogate id (UUID v4) - bindings are history rows.
    pub id: String,

    /// Product code the binding applies to.
    pub product_code: String,

    /// Active fiscal rule code.
    pub rule_code: String,

    /// Fiscal classification code.
    pub classification_code: String,

    /// Product origin code (0 = domestic, 1 = imported, ...).
    pub origin_code: i64,

    /// Exactly one active binding per product.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Quotations & Orders
// =============================================================================

/// Lifecycle of a quotation. A quotation converts at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    /// Open for editing and conversion.
    Active,
    /// Converted into an ERP sales order; terminal.
    Converted,
}

/// A priced proposal to a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Quotation {
    /// Quotation code - natural key.
    pub code: String,

    /// Customer the quotation is addressed to.
    pub customer_code: String,

    /// Payment term that will drive the installment schedule.
    pub payment_term_code: String,

    pub status: QuotationStatus,

    /// Total in centavos.
    pub total_cents: i64,

    /// ERP order code, set when converted.
    pub order_code: Option<String>,

    pub created_at: DateTime<Utc>,
    pub converted_at: Option<DateTime<Utc>>,
}

impl Quotation {
    /// Returns the total as a Money value.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// One line of a quotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct QuotationItem {
    /// Surrogate id (UUID v4).
    pub id: String,

    pub quotation_code: String,
    pub product_code: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

/// A sales order as written to the ERP store (and mirrored locally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SalesOrder {
    /// ERP-assigned order code.
    pub code: String,

    /// Quotation this order was converted from.
    pub quotation_code: String,

    pub customer_code: String,
    pub payment_term_code: String,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// One line of a sales order (snapshot of the quotation line).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesOrderItem {
    pub order_code: String,
    pub line_number: i64,
    pub product_code: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

/// One scheduled partial payment derived from a payment term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub order_code: String,

    /// 1-based installment number.
    pub number: i64,

    /// Due date = conversion date + the term's day offset.
    pub due_date: NaiveDate,

    pub amount_cents: i64,
}

// =============================================================================
// Sync Audit
// =============================================================================

/// Outcome of a sync run or batch. Append-only; never mutated after insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncRunStatus {
    Started,
    Completed,
    Error,
}

/// One row of the durable sync audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SyncRunRecord {
    /// Surrogate id (UUID v4).
    pub id: String,

    /// Category of the run ("full_sync", "states", "customers", ...).
    pub run_type: String,

    pub status: SyncRunStatus,

    /// Free-text outcome summary.
    pub message: String,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_regime_codes() {
        assert_eq!(TaxRegime::Contributor.code(), 1);
        assert_eq!(TaxRegime::NonContributor.code(), 9);
    }

    #[test]
    fn test_effective_offsets_default_to_immediate() {
        let term = PaymentTerm {
            code: "CASH".into(),
            description: "à vista".into(),
            installment_count: 1,
            day_offsets: vec![],
            is_active: true,
            updated_at: Utc::now(),
        };
        assert_eq!(term.effective_offsets(), vec![0]);
    }

    #[test]
    fn test_quotation_total_as_money() {
        let q = Quotation {
            code: "Q-1".into(),
            customer_code: "C-1".into(),
            payment_term_code: "30-60".into(),
            status: QuotationStatus::Active,
            total_cents: 10_000,
            order_code: None,
            created_at: Utc::now(),
            converted_at: None,
        };
        assert_eq!(q.total(), Money::from_cents(10_000));
    }
}
