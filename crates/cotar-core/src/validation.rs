//! # Validation Module
//!
//! Code-format validation shared by normalizers and repositories.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Normalizers (cotar-core)                                     │
//! │  ├── THIS MODULE: code formats (state, registry, tax id)               │
//! │  └── Unusable rows become None and are skipped                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Resolution heuristics (cotar-sync)                           │
//! │  └── Repair missing geography/fiscal attributes                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Local store (SQLite)                                         │
//! │  ├── NOT NULL / UNIQUE constraints                                     │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{COMPANY_TAX_ID_LEN, MUNICIPALITY_CODE_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Digit Helpers
// =============================================================================

/// Extracts the decimal digits of a string (drops punctuation/formatting).
///
/// ## Example
/// ```rust
/// use cotar_core::validation::digits_of;
///
/// assert_eq!(digits_of("12.345.678/0001-95"), "12345678000195");
/// ```
pub fn digits_of(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Whether a tax id has the digit length of a company (CNPJ).
///
/// Formatting is ignored: `"12.345.678/0001-95"` counts as 14 digits.
pub fn is_company_tax_id(tax_id: &str) -> bool {
    digits_of(tax_id).len() == COMPANY_TAX_ID_LEN
}

// =============================================================================
// Code Validators
// =============================================================================

/// Validates a 2-letter state code (already upper-cased by the caller).
pub fn validate_state_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "state_code".to_string(),
        });
    }

    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: "state_code".to_string(),
            reason: "must be exactly 2 letters".to_string(),
        });
    }

    Ok(())
}

/// Validates a 7-digit municipality registry code.
pub fn validate_municipality_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "municipality_code".to_string(),
        });
    }

    if code.len() != MUNICIPALITY_CODE_LEN || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "municipality_code".to_string(),
            reason: format!("must be exactly {} digits", MUNICIPALITY_CODE_LEN),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_of_strips_formatting() {
        assert_eq!(digits_of("01310-100"), "01310100");
        assert_eq!(digits_of(""), "");
    }

    #[test]
    fn test_company_tax_id_by_digit_length() {
        assert!(is_company_tax_id("12.345.678/0001-95"));
        assert!(is_company_tax_id("12345678000195"));
        assert!(!is_company_tax_id("123.456.789-09")); // CPF: 11 digits
        assert!(!is_company_tax_id(""));
    }

    #[test]
    fn test_state_code_rules() {
        assert!(validate_state_code("SP").is_ok());
        assert!(validate_state_code(" RJ ").is_ok());
        assert!(validate_state_code("").is_err());
        assert!(validate_state_code("S").is_err());
        assert!(validate_state_code("S1").is_err());
        assert!(validate_state_code("SAO").is_err());
    }

    #[test]
    fn test_municipality_code_rules() {
        assert!(validate_municipality_code("3550308").is_ok());
        assert!(validate_municipality_code("355030").is_err());
        assert!(validate_municipality_code("355030X").is_err());
        assert!(validate_municipality_code("").is_err());
    }
}
