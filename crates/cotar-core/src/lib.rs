//! # cotar-core: Pure Business Logic for cotar
//!
//! This crate is the **heart** of the cotar sync engine. It contains all
//! business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         cotar Architecture                              │
//! │                                                                         │
//! │  ┌──────────────────┐                      ┌──────────────────────┐    │
//! │  │    ERP store     │   raw rows           │     Local store      │    │
//! │  │  (heterogeneous  │ ───────────┐         │  (canonical tables)  │    │
//! │  │   table names)   │            │         └──────────▲───────────┘    │
//! │  └──────────────────┘            │                    │                │
//! │                                  ▼                    │                │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ cotar-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ normalize │  │ validation│  │   │
//! │  │   │ Customer  │  │   Money   │  │ raw row → │  │   codes   │  │   │
//! │  │   │ Quotation │  │ split     │  │ canonical │  │  formats  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Canonical domain records (State, Customer, Quotation, ...)
//! - [`raw`] - Dynamically-typed rows read from the ERP store
//! - [`normalize`] - Per-entity normalizers (raw row → canonical record)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`validation`] - Code-format validation (state codes, registry codes)
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every normalizer is deterministic - same raw row,
//!    same canonical record. Cross-referencing lookups live in cotar-sync.
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in centavos (i64)
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod normalize;
pub mod raw;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::ValidationError;
pub use money::Money;
pub use raw::{RawRow, RawValue};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default company ID for the single-tenant runtime.
///
/// ## Why a constant?
/// The local schema carries a companies table so a second tenant can be
/// added later, but the engine runs against exactly one default row. The
/// orchestrator ensures this row exists before the first sync step.
pub const DEFAULT_COMPANY_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Maximum number of day-offsets a payment term may carry.
///
/// ## Business Reason
/// ERP payment-term tables expose at most 24 installment columns; anything
/// past that is silently ignored during normalization.
pub const MAX_INSTALLMENTS: usize = 24;

/// Length (in digits) of a company tax id (CNPJ).
///
/// Used by the tax-contributor inference: a 14-digit tax id together with
/// a non-blank state registration marks a customer as a taxpayer.
pub const COMPANY_TAX_ID_LEN: usize = 14;

/// Length (in digits) of a municipality registry code (IBGE).
pub const MUNICIPALITY_CODE_LEN: usize = 7;
