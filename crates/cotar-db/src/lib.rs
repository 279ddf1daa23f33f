//! # cotar-db: Local Store for the Cotar Quotation System
//!
//! SQLite-backed master-data store kept in sync with the ERP, plus the
//! quotation lifecycle tables. All async access goes through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Cotar Data Flow                            │
//! │                                                                   │
//! │  cotar-sync (SyncEngine, quotation conversion)                    │
//! │       │                                                           │
//! │       ▼                                                           │
//! │  ┌───────────────────────────────────────────────────────────┐   │
//! │  │                   cotar-db (THIS CRATE)                   │   │
//! │  │                                                           │   │
//! │  │   ┌─────────────┐    ┌────────────────┐   ┌───────────┐  │   │
//! │  │   │  Database   │    │  Repositories  │   │ Migrations│  │   │
//! │  │   │  (pool.rs)  │    │ (geo, fiscal,  │   │ (embedded)│  │   │
//! │  │   │             │◄───│  customer, …)  │   │           │  │   │
//! │  │   └─────────────┘    └────────────────┘   └───────────┘  │   │
//! │  └───────────────────────────────────────────────────────────┘   │
//! │       │                                                           │
//! │       ▼                                                           │
//! │                    SQLite database file                           │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (geo, customer, fiscal, ...)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cotar_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/cotar.db")).await?;
//! let states = db.geo().state_codes().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::company::CompanyRepository;
pub use repository::customer::CustomerRepository;
pub use repository::fiscal::FiscalRepository;
pub use repository::geo::GeoRepository;
pub use repository::payment::PaymentRepository;
pub use repository::quotation::QuotationRepository;
pub use repository::sync_log::SyncLogRepository;
