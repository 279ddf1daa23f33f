//! # Repository Layer
//!
//! One repository struct per entity family, each owning a clone of the
//! connection pool. Master-data repositories expose the trio the upsert
//! reconciler needs (`existing codes` / `insert` / `update`) plus the
//! lookups the resolution heuristics and order conversion perform.

pub mod company;
pub mod customer;
pub mod fiscal;
pub mod geo;
pub mod payment;
pub mod quotation;
pub mod sync_log;
