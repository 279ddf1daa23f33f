//! # Engine Configuration
//!
//! TOML-backed configuration for the sync engine.
//!
//! ## Configuration File Format
//! ```toml
//! # cotar.toml
//! [company]
//! name = "Minha Empresa Ltda"
//! tax_id = "12345678000195"
//!
//! [sync]
//! default_state = "SP"
//!
//! # Used when the ERP deployment has no payment-method table at all
//! [[sync.fallback_payment_methods]]
//! code = "DIN"
//! description = "Dinheiro"
//!
//! [[sync.fallback_payment_methods]]
//! code = "BOL"
//! description = "Boleto bancário"
//! ```
//!
//! Every field has a default; an absent file is not an error when using
//! [`EngineConfig::default`], only an unreadable or malformed one is.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Engine Config
// =============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub company: CompanyConfig,
    pub sync: SyncConfig,
}

/// Default company/tenant row ensured at the start of every sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyConfig {
    pub name: String,
    pub tax_id: Option<String>,
}

/// Sync behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Default jurisdiction adopted when the geographic fallback chain
    /// exhausts every lookup.
    pub default_state: String,

    /// Payment methods seeded when the ERP has no payment-method table.
    pub fallback_payment_methods: Vec<FallbackPaymentMethod>,
}

/// One built-in payment method used when the ERP offers none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPaymentMethod {
    pub code: String,
    pub description: String,
}

impl Default for CompanyConfig {
    fn default() -> Self {
        CompanyConfig {
            name: "Empresa Padrão".to_string(),
            tax_id: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            default_state: "SP".to_string(),
            fallback_payment_methods: vec![
                FallbackPaymentMethod {
                    code: "DIN".to_string(),
                    description: "Dinheiro".to_string(),
                },
                FallbackPaymentMethod {
                    code: "BOL".to_string(),
                    description: "Boleto bancário".to_string(),
                },
                FallbackPaymentMethod {
                    code: "CC".to_string(),
                    description: "Cartão de crédito".to_string(),
                },
            ],
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
        let config: EngineConfig = toml::from_str(&raw)
            .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            default_state = %config.sync.default_state,
            "Engine configuration loaded"
        );
        Ok(config)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sync.default_state, "SP");
        assert!(!config.sync.fallback_payment_methods.is_empty());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            [company]
            name = "Acme Ltda"

            [sync]
            default_state = "MG"
            "#,
        )
        .unwrap();
        assert_eq!(config.company.name, "Acme Ltda");
        assert_eq!(config.sync.default_state, "MG");
        // Unlisted fields keep their defaults
        assert_eq!(config.sync.fallback_payment_methods.len(), 3);
    }

    #[test]
    fn test_fallback_methods_override() {
        let config: EngineConfig = toml::from_str(
            r#"
            [[sync.fallback_payment_methods]]
            code = "PIX"
            description = "Pix"
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.fallback_payment_methods.len(), 1);
        assert_eq!(config.sync.fallback_payment_methods[0].code, "PIX");
    }
}
