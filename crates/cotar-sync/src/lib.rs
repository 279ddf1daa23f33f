//! # cotar-sync: Synchronization & Reconciliation Engine
//!
//! Mirrors ERP master data (geography, customers, payment data, fiscal
//! rules) into the local store and pushes quotation conversions back as
//! ERP sales orders.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          SyncEngine                                 │
//! │                                                                     │
//! │  start_full_sync()          status()        convert_quotation()     │
//! │       │                        │                   │                │
//! │       ▼                        ▼                   ▼                │
//! │  ┌───────────┐          ┌───────────┐       ┌─────────────────┐     │
//! │  │ RunGuard  │          │ audit log │       │ Quotation-      │     │
//! │  │ (reject on│          │ last_sync │       │ Converter       │     │
//! │  │  conflict)│          └───────────┘       └─────────────────┘     │
//! │  └───────────┘                                                      │
//! │       │                                                             │
//! │       ▼  strictly sequential steps                                  │
//! │  states → municipalities → customers → payments → fiscal data       │
//! │       │            │                                                │
//! │       ▼            ▼                                                │
//! │  normalize     GeoResolver (ordered fallback chain)                 │
//! │  (cotar-core)      │                                                │
//! │       └────────────┴──► reconcile (insert/update partition,         │
//! │                          per-record failure folding)                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Master data flows ERP → local only; orders flow local → ERP only. The
//! engine is the single component that touches both stores.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod resolve;
pub mod steps;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::EngineConfig;
pub use convert::QuotationConverter;
pub use engine::{CategoryReport, FullSyncReport, RunGuard, SyncEngine, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use reconcile::{BatchOutcome, RecordError};
pub use resolve::{GeoResolver, ResolvedVia};
