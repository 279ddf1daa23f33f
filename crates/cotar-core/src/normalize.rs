//! # Entity Normalizers
//!
//! One pure function per entity type: raw ERP row → canonical record, or
//! `None` when the row is unusable (missing mandatory key).
//!
//! ## Normalization Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Where Normalizers Sit                               │
//! │                                                                         │
//! │  ERP store ──► schema discovery ──► reader ──► RawRow                  │
//! │                                                  │                      │
//! │                                                  ▼                      │
//! │                                      normalize_* (THIS MODULE)          │
//! │                                                  │                      │
//! │                      None ◄── unusable row       │ Some(record)         │
//! │                      (skipped, counted)          ▼                      │
//! │                                      resolution heuristics (sync)       │
//! │                                                  │                      │
//! │                                                  ▼                      │
//! │                                      upsert reconciler → local store    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules of the House
//! - Normalizers NEVER perform I/O; cross-referencing lookups happen in
//!   the resolution heuristics (cotar-sync).
//! - The caller injects `now` so output is deterministic for a given row.
//! - Free text is truncated to the local store's column widths here, not
//!   at insert time, so reconciliation compares like with like.

use chrono::{DateTime, Utc};

use crate::raw::RawRow;
use crate::types::*;
use crate::validation::{digits_of, is_company_tax_id, validate_state_code};
use crate::{MAX_INSTALLMENTS, MUNICIPALITY_CODE_LEN};

// =============================================================================
// Local Column Widths
// =============================================================================

/// Column widths of the local store's free-text customer fields.
pub mod widths {
    pub const LEGAL_NAME: usize = 120;
    pub const TRADE_NAME: usize = 60;
    pub const STREET: usize = 120;
    pub const NUMBER: usize = 10;
    pub const COMPLEMENT: usize = 60;
    pub const DISTRICT: usize = 60;
    pub const MUNICIPALITY_NAME: usize = 60;
    pub const POSTAL_CODE: usize = 8;
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Truncates a string to `max` characters (char-boundary safe).
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Converts a percentage (`18.25`) to basis points (`1825`).
///
/// ERP fiscal tables store rates as REAL percentages; the local store
/// keeps integer basis points so upsert comparisons stay exact.
pub fn pct_to_bps(pct: f64) -> i64 {
    (pct * 100.0).round() as i64
}

/// Infers the tax-contributor flag when the ERP has no explicit field.
///
/// A customer is a taxpayer when the tax id has company length (CNPJ)
/// AND the state tax registration is non-blank.
pub fn infer_taxpayer(tax_id: Option<&str>, state_registration: Option<&str>) -> bool {
    let company = tax_id.map(is_company_tax_id).unwrap_or(false);
    let registered = state_registration
        .map(|r| !r.trim().is_empty())
        .unwrap_or(false);
    company && registered
}

/// Infers the tax regime from the same signals as [`infer_taxpayer`].
pub fn infer_tax_regime(tax_id: Option<&str>, state_registration: Option<&str>) -> TaxRegime {
    if infer_taxpayer(tax_id, state_registration) {
        TaxRegime::Contributor
    } else {
        TaxRegime::NonContributor
    }
}

/// Upper-cased, trimmed 2-letter state code, or `None` when malformed.
fn clean_state_code(raw: Option<String>) -> Option<String> {
    let code = raw?.trim().to_uppercase();
    validate_state_code(&code).ok().map(|_| code)
}

/// Digits-only municipality registry code, left-padded to 7.
///
/// Codes longer than 7 digits are rejected rather than trimmed - a
/// truncated registry code would resolve to the wrong municipality.
fn clean_municipality_code(raw: Option<String>) -> Option<String> {
    let digits = digits_of(&raw?);
    if digits.is_empty() || digits.len() > MUNICIPALITY_CODE_LEN {
        return None;
    }
    Some(format!("{:0>width$}", digits, width = MUNICIPALITY_CODE_LEN))
}

// =============================================================================
// Geography
// =============================================================================

/// Normalizes a raw state row.
///
/// Unusable when the code is missing or not a 2-letter code.
pub fn normalize_state(row: &RawRow, now: DateTime<Utc>) -> Option<State> {
    let code = clean_state_code(row.get_str("code"))?;
    let name = row.get_str("name").unwrap_or_else(|| code.clone());

    Some(State {
        registry_id: row.get_i64("registry_id"),
        is_active: row.get_bool("active").unwrap_or(true),
        updated_at: now,
        code,
        name,
    })
}

/// Normalizes a raw municipality row.
///
/// Unusable when the registry code cannot be shaped into 7 digits, the
/// name is blank, or the owning state code is malformed.
pub fn normalize_municipality(row: &RawRow, now: DateTime<Utc>) -> Option<Municipality> {
    let code = clean_municipality_code(row.get_str("code"))?;
    let name = row.get_str("name")?;
    let state_code = clean_state_code(row.get_str("state_code"))?;

    Some(Municipality {
        region: row.get_str("region"),
        is_capital: row.get_bool("capital").unwrap_or(false),
        area_code: row.get_str("area_code").map(|c| digits_of(&c)),
        updated_at: now,
        code,
        name,
        state_code,
    })
}

// =============================================================================
// Customer
// =============================================================================

/// Normalizes a raw customer row.
///
/// Unusable when the ERP code is missing. Geography may come out
/// incomplete here; the resolution heuristics repair it before upsert.
pub fn normalize_customer(row: &RawRow, now: DateTime<Utc>) -> Option<Customer> {
    let code = row.get_str("code")?;

    let tax_id = row.get_str("tax_id").map(|t| digits_of(&t)).filter(|t| !t.is_empty());
    let state_registration = row.get_str("state_registration");

    // Explicit contributor flag wins; otherwise infer from the tax id
    // length and the state registration.
    let is_taxpayer = row
        .get_bool("taxpayer")
        .unwrap_or_else(|| infer_taxpayer(tax_id.as_deref(), state_registration.as_deref()));

    let tax_regime = match row.get_i64("tax_regime") {
        Some(1) => TaxRegime::Contributor,
        Some(9) => TaxRegime::NonContributor,
        _ => infer_tax_regime(tax_id.as_deref(), state_registration.as_deref()),
    };

    let legal_name = row
        .get_str("legal_name")
        .or_else(|| row.get_str("trade_name"))
        .unwrap_or_else(|| code.clone());

    Some(Customer {
        legal_name: truncate(&legal_name, widths::LEGAL_NAME),
        trade_name: row
            .get_str("trade_name")
            .map(|s| truncate(&s, widths::TRADE_NAME)),
        street: row.get_str("street").map(|s| truncate(&s, widths::STREET)),
        number: row.get_str("number").map(|s| truncate(&s, widths::NUMBER)),
        complement: row
            .get_str("complement")
            .map(|s| truncate(&s, widths::COMPLEMENT)),
        district: row
            .get_str("district")
            .map(|s| truncate(&s, widths::DISTRICT)),
        postal_code: row
            .get_str("postal_code")
            .map(|s| truncate(&digits_of(&s), widths::POSTAL_CODE))
            .filter(|s| !s.is_empty()),
        municipality_name: row
            .get_str("municipality_name")
            .map(|s| truncate(&s, widths::MUNICIPALITY_NAME)),
        state_code: clean_state_code(row.get_str("state_code")),
        municipality_code: clean_municipality_code(row.get_str("municipality_code")),
        updated_at: now,
        code,
        tax_id,
        state_registration,
        is_taxpayer,
        tax_regime,
    })
}

// =============================================================================
// Payments
// =============================================================================

/// Normalizes a raw payment-method row.
pub fn normalize_payment_method(row: &RawRow, now: DateTime<Utc>) -> Option<PaymentMethod> {
    let code = row.get_str("code")?;
    let description = row.get_str("description").unwrap_or_else(|| code.clone());

    Some(PaymentMethod {
        is_active: row.get_bool("active").unwrap_or(true),
        updated_at: now,
        code,
        description,
    })
}

/// Normalizes a raw payment-term row.
///
/// ## Day Offsets
/// ERP term tables expose up to 24 slot columns (`days_1` .. `days_24`);
/// only strictly positive offsets are kept, in slot order. An empty list
/// is valid - [`PaymentTerm::effective_offsets`] turns it into a single
/// immediate installment.
///
/// ## Installment Count
/// Explicit positive count wins; otherwise the number of kept offsets;
/// otherwise 1 (cash terms carry no installment data at all).
pub fn normalize_payment_term(row: &RawRow, now: DateTime<Utc>) -> Option<PaymentTerm> {
    let code = row.get_str("code")?;
    let description = row.get_str("description").unwrap_or_else(|| code.clone());

    let mut day_offsets = Vec::new();
    for slot in 1..=MAX_INSTALLMENTS {
        if let Some(days) = row.get_i64(&format!("days_{}", slot)) {
            if days > 0 {
                day_offsets.push(days);
            }
        }
    }

    let installment_count = row
        .get_i64("installments")
        .filter(|n| *n > 0)
        .unwrap_or_else(|| day_offsets.len().max(1) as i64);

    Some(PaymentTerm {
        is_active: row.get_bool("active").unwrap_or(true),
        updated_at: now,
        code,
        description,
        installment_count,
        day_offsets,
    })
}

// =============================================================================
// Fiscal Data
// =============================================================================

/// Normalizes a raw fiscal-rule row into its per-jurisdiction item.
///
/// The ERP stores one row per (rule, jurisdiction); the header is derived
/// from the same row by the sync step.
pub fn normalize_fiscal_rule_item(row: &RawRow, now: DateTime<Utc>) -> Option<FiscalRuleItem> {
    let rule_code = row.get_str("rule_code")?;
    let jurisdiction = clean_state_code(row.get_str("jurisdiction"))?;

    Some(FiscalRuleItem {
        rate_bps: pct_to_bps(row.get_f64("rate").unwrap_or(0.0)),
        reduction_bps: pct_to_bps(row.get_f64("reduction").unwrap_or(0.0)),
        st_margin_bps: pct_to_bps(row.get_f64("st_margin").unwrap_or(0.0)),
        substitution: row.get_bool("substitution").unwrap_or(false),
        updated_at: now,
        rule_code,
        jurisdiction,
    })
}

/// Normalizes a raw fiscal-classification row into its jurisdiction item.
pub fn normalize_fiscal_classification_item(
    row: &RawRow,
    now: DateTime<Utc>,
) -> Option<FiscalClassificationItem> {
    let classification_code = row.get_str("classification_code")?;
    let jurisdiction = clean_state_code(row.get_str("jurisdiction"))?;

    Some(FiscalClassificationItem {
        rate_bps: pct_to_bps(row.get_f64("rate").unwrap_or(0.0)),
        surcharge_bps: pct_to_bps(row.get_f64("surcharge").unwrap_or(0.0)),
        presumed_margin_bps: pct_to_bps(row.get_f64("presumed_margin").unwrap_or(0.0)),
        updated_at: now,
        classification_code,
        jurisdiction,
    })
}

/// Normalizes a raw product fiscal-binding row.
///
/// The binding id is assigned by the local store at insert time (bindings
/// are history rows), so the normalizer leaves it empty.
pub fn normalize_product_binding(row: &RawRow, now: DateTime<Utc>) -> Option<ProductFiscalBinding> {
    let product_code = row.get_str("product_code")?;
    let rule_code = row.get_str("rule_code")?;
    let classification_code = row.get_str("classification_code")?;

    Some(ProductFiscalBinding {
        id: String::new(),
        origin_code: row.get_i64("origin").unwrap_or(0),
        is_active: true,
        created_at: now,
        product_code,
        rule_code,
        classification_code,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::RawValue;

    fn row(pairs: &[(&str, RawValue)]) -> RawRow {
        let mut r = RawRow::new();
        for (k, v) in pairs {
            r.insert(*k, v.clone());
        }
        r
    }

    fn t(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_state_uppercases_and_trims() {
        let r = row(&[("code", t(" sp ")), ("name", t("São Paulo"))]);
        let s = normalize_state(&r, now()).unwrap();
        assert_eq!(s.code, "SP");
        assert_eq!(s.name, "São Paulo");
        assert!(s.is_active);
    }

    #[test]
    fn test_state_rejects_malformed_code() {
        assert!(normalize_state(&row(&[("code", t("S1"))]), now()).is_none());
        assert!(normalize_state(&row(&[("name", t("Orphan"))]), now()).is_none());
    }

    #[test]
    fn test_municipality_pads_code_to_seven_digits() {
        let r = row(&[
            ("code", RawValue::Integer(94)),
            ("name", t("Alta Floresta")),
            ("state_code", t("mt")),
            ("capital", t("N")),
        ]);
        let m = normalize_municipality(&r, now()).unwrap();
        assert_eq!(m.code, "0000094");
        assert_eq!(m.state_code, "MT");
        assert!(!m.is_capital);
    }

    #[test]
    fn test_municipality_capital_flag_coercion() {
        for v in [t("S"), t("true"), RawValue::Integer(1), RawValue::Real(1.0)] {
            let r = row(&[
                ("code", t("3550308")),
                ("name", t("São Paulo")),
                ("state_code", t("SP")),
                ("capital", v),
            ]);
            assert!(normalize_municipality(&r, now()).unwrap().is_capital);
        }
    }

    #[test]
    fn test_municipality_rejects_overlong_code() {
        let r = row(&[
            ("code", t("123456789")),
            ("name", t("Nowhere")),
            ("state_code", t("SP")),
        ]);
        assert!(normalize_municipality(&r, now()).is_none());
    }

    #[test]
    fn test_customer_requires_code() {
        assert!(normalize_customer(&row(&[("legal_name", t("ACME"))]), now()).is_none());
    }

    #[test]
    fn test_customer_truncates_and_cleans_postal_code() {
        let long_name = "x".repeat(500);
        let r = row(&[
            ("code", t("C-1")),
            ("legal_name", t(&long_name)),
            ("postal_code", t("01310-100-EXTRA99")),
        ]);
        let c = normalize_customer(&r, now()).unwrap();
        assert_eq!(c.legal_name.chars().count(), widths::LEGAL_NAME);
        // digits-only, capped at 8
        assert_eq!(c.postal_code.as_deref(), Some("01310100"));
    }

    #[test]
    fn test_customer_taxpayer_inference() {
        // CNPJ + state registration → taxpayer / contributor
        let r = row(&[
            ("code", t("C-2")),
            ("legal_name", t("ACME LTDA")),
            ("tax_id", t("12.345.678/0001-95")),
            ("state_registration", t("110.042.490.114")),
        ]);
        let c = normalize_customer(&r, now()).unwrap();
        assert!(c.is_taxpayer);
        assert_eq!(c.tax_regime, TaxRegime::Contributor);

        // CPF → not a taxpayer even with a registration-ish field
        let r = row(&[
            ("code", t("C-3")),
            ("legal_name", t("João")),
            ("tax_id", t("123.456.789-09")),
            ("state_registration", t("ISENTO")),
        ]);
        let c = normalize_customer(&r, now()).unwrap();
        assert!(!c.is_taxpayer);
        assert_eq!(c.tax_regime, TaxRegime::NonContributor);
    }

    #[test]
    fn test_customer_explicit_flag_wins_over_inference() {
        let r = row(&[
            ("code", t("C-4")),
            ("legal_name", t("ACME")),
            ("taxpayer", t("S")),
        ]);
        assert!(normalize_customer(&r, now()).unwrap().is_taxpayer);
    }

    #[test]
    fn test_payment_term_defaults_installments_to_one() {
        let r = row(&[("code", t("CASH"))]);
        let term = normalize_payment_term(&r, now()).unwrap();
        assert_eq!(term.installment_count, 1);
        assert!(term.day_offsets.is_empty());
    }

    #[test]
    fn test_payment_term_collects_positive_offsets_in_order() {
        let r = row(&[
            ("code", t("30-60-90")),
            ("days_1", RawValue::Integer(30)),
            ("days_2", RawValue::Integer(60)),
            ("days_3", RawValue::Integer(90)),
            ("days_4", RawValue::Integer(0)),
        ]);
        let term = normalize_payment_term(&r, now()).unwrap();
        assert_eq!(term.day_offsets, vec![30, 60, 90]);
        assert_eq!(term.installment_count, 3);
    }

    #[test]
    fn test_fiscal_rule_item_converts_rates_to_bps() {
        let r = row(&[
            ("rule_code", t("ICMS-18")),
            ("jurisdiction", t("sp")),
            ("rate", RawValue::Real(18.0)),
            ("reduction", t("33,33")),
            ("substitution", t("S")),
        ]);
        let item = normalize_fiscal_rule_item(&r, now()).unwrap();
        assert_eq!(item.jurisdiction, "SP");
        assert_eq!(item.rate_bps, 1800);
        assert_eq!(item.reduction_bps, 3333);
        assert!(item.substitution);
    }

    #[test]
    fn test_product_binding_requires_all_codes() {
        let r = row(&[("product_code", t("P-1")), ("rule_code", t("ICMS-18"))]);
        assert!(normalize_product_binding(&r, now()).is_none());

        let r = row(&[
            ("product_code", t("P-1")),
            ("rule_code", t("ICMS-18")),
            ("classification_code", t("NCM-1")),
            ("origin", RawValue::Integer(1)),
        ]);
        let b = normalize_product_binding(&r, now()).unwrap();
        assert_eq!(b.origin_code, 1);
        assert!(b.is_active);
    }
}
