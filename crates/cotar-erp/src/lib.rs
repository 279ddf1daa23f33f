//! # cotar-erp: ERP Store Adapter
//!
//! The only crate that touches the external ERP database. ERP deployments
//! rename tables and columns freely, so nothing here assumes a fixed
//! schema: every read resolves an access plan from ordered structural
//! hypotheses (cached after first success) and hands back dynamically
//! typed rows for the normalizers in `cotar-core`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  cotar-sync (orchestrator, conversion)                          │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │                 cotar-erp (THIS CRATE)                   │  │
//! │  │                                                          │  │
//! │  │  ┌────────────┐   ┌────────────┐   ┌─────────────────┐  │  │
//! │  │  │  ErpStore  │   │ SchemaCat. │   │ ErpReader /     │  │  │
//! │  │  │ (pool.rs)  │◄──│ (schema.rs)│◄──│ OrderRepository │  │  │
//! │  │  └────────────┘   └────────────┘   └─────────────────┘  │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! │       │                                                         │
//! │       ▼                                                         │
//! │                  ERP SQLite database (not ours)                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Master data flows ERP → local (reads); sales orders flow local → ERP
//! (the one write path, transactional).

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod orders;
pub mod pool;
pub mod reader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ErpError, ErpResult};
pub use orders::{NewInstallment, NewOrder, NewOrderItem, OrderRepository};
pub use pool::{ErpConfig, ErpStore};
pub use reader::ErpReader;
pub use schema::{AccessPlan, EntityKind, SchemaCatalog};
