//! # Raw Row Model
//!
//! Dynamically-typed rows read from the ERP store.
//!
//! ## Why Not Typed Rows?
//! ERP deployments rename tables and columns freely, so the schema
//! discovery adapter resolves *logical* field names to real columns at
//! runtime and the reader hands normalizers a `RawRow` keyed by logical
//! field name. Normalizers then coerce whatever the ERP stored (TEXT "1",
//! INTEGER 1, or REAL 1.0 may all mean "true") into canonical records.
//!
//! Keys are lowercased on insert so access is case-insensitive.

use std::collections::HashMap;

// =============================================================================
// Raw Value
// =============================================================================

/// A single dynamically-typed value read from the ERP store.
///
/// Mirrors SQLite's storage classes minus BLOB (no binary master data).
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl RawValue {
    /// Returns true for `Null`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

// =============================================================================
// Raw Row
// =============================================================================

/// One row from the ERP store, keyed by lowercased logical field name.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    values: HashMap<String, RawValue>,
}

impl RawRow {
    /// Creates an empty row.
    pub fn new() -> Self {
        RawRow {
            values: HashMap::new(),
        }
    }

    /// Inserts a value under a logical field name (lowercased).
    pub fn insert(&mut self, field: impl Into<String>, value: RawValue) {
        self.values.insert(field.into().to_lowercase(), value);
    }

    /// Raw access (case-insensitive).
    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.values.get(&field.to_lowercase())
    }

    /// Number of fields present.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no fields are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads a field as a trimmed string.
    ///
    /// ## Coercion Rules
    /// - Text → trimmed; empty-after-trim becomes `None`
    /// - Integer/Real → decimal rendering
    /// - Null / absent → `None`
    pub fn get_str(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            RawValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            RawValue::Integer(i) => Some(i.to_string()),
            RawValue::Real(f) => Some(f.to_string()),
            RawValue::Null => None,
        }
    }

    /// Reads a field as an integer.
    ///
    /// Text values are parsed after trimming; reals are truncated.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        match self.get(field)? {
            RawValue::Integer(i) => Some(*i),
            RawValue::Real(f) => Some(*f as i64),
            RawValue::Text(s) => s.trim().parse::<i64>().ok(),
            RawValue::Null => None,
        }
    }

    /// Reads a field as a float.
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        match self.get(field)? {
            RawValue::Integer(i) => Some(*i as f64),
            RawValue::Real(f) => Some(*f),
            RawValue::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
            RawValue::Null => None,
        }
    }

    /// Reads a field as a boolean flag.
    ///
    /// ## Coercion Rules
    /// ERP capital/active flags arrive as strings, numbers, or booleans:
    /// - Integer/Real: non-zero is true
    /// - Text: `S`, `SIM`, `T`, `TRUE`, `Y`, `YES`, `1` (case-insensitive)
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        match self.get(field)? {
            RawValue::Integer(i) => Some(*i != 0),
            RawValue::Real(f) => Some(*f != 0.0),
            RawValue::Text(s) => {
                let v = s.trim().to_uppercase();
                if v.is_empty() {
                    None
                } else {
                    Some(matches!(v.as_str(), "S" | "SIM" | "T" | "TRUE" | "Y" | "YES" | "1"))
                }
            }
            RawValue::Null => None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, RawValue)]) -> RawRow {
        let mut r = RawRow::new();
        for (k, v) in pairs {
            r.insert(*k, v.clone());
        }
        r
    }

    #[test]
    fn test_case_insensitive_access() {
        let r = row(&[("Codigo", RawValue::Text("SP".into()))]);
        assert_eq!(r.get_str("CODIGO"), Some("SP".to_string()));
        assert_eq!(r.get_str("codigo"), Some("SP".to_string()));
    }

    #[test]
    fn test_get_str_trims_and_blanks() {
        let r = row(&[
            ("a", RawValue::Text("  x  ".into())),
            ("b", RawValue::Text("   ".into())),
            ("c", RawValue::Integer(7)),
        ]);
        assert_eq!(r.get_str("a"), Some("x".to_string()));
        assert_eq!(r.get_str("b"), None);
        assert_eq!(r.get_str("c"), Some("7".to_string()));
        assert_eq!(r.get_str("missing"), None);
    }

    #[test]
    fn test_get_i64_coercions() {
        let r = row(&[
            ("int", RawValue::Integer(3)),
            ("real", RawValue::Real(3.9)),
            ("text", RawValue::Text(" 42 ".into())),
            ("bad", RawValue::Text("abc".into())),
        ]);
        assert_eq!(r.get_i64("int"), Some(3));
        assert_eq!(r.get_i64("real"), Some(3));
        assert_eq!(r.get_i64("text"), Some(42));
        assert_eq!(r.get_i64("bad"), None);
    }

    #[test]
    fn test_get_f64_accepts_comma_decimal() {
        let r = row(&[("rate", RawValue::Text("18,00".into()))]);
        assert_eq!(r.get_f64("rate"), Some(18.0));
    }

    #[test]
    fn test_get_bool_coercions() {
        let r = row(&[
            ("s", RawValue::Text("S".into())),
            ("sim", RawValue::Text("sim".into())),
            ("n", RawValue::Text("N".into())),
            ("one", RawValue::Integer(1)),
            ("zero", RawValue::Integer(0)),
        ]);
        assert_eq!(r.get_bool("s"), Some(true));
        assert_eq!(r.get_bool("sim"), Some(true));
        assert_eq!(r.get_bool("n"), Some(false));
        assert_eq!(r.get_bool("one"), Some(true));
        assert_eq!(r.get_bool("zero"), Some(false));
        assert_eq!(r.get_bool("missing"), None);
    }
}
