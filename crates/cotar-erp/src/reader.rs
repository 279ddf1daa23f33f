//! # Raw Row Reader
//!
//! Reads master-data rows from the ERP store as dynamically-typed
//! [`RawRow`]s keyed by logical field name. The access plan's `SELECT`
//! aliases real columns to logical names, so normalizers downstream never
//! see deployment-specific column names.

use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::sync::Arc;
use tracing::debug;

use cotar_core::{RawRow, RawValue};

use crate::error::ErpResult;
use crate::schema::{EntityKind, SchemaCatalog};

/// Reader over the ERP store for master-data sync.
#[derive(Debug)]
pub struct ErpReader {
    pool: SqlitePool,
    catalog: Arc<SchemaCatalog>,
}

impl ErpReader {
    pub fn new(pool: SqlitePool, catalog: Arc<SchemaCatalog>) -> Self {
        ErpReader { pool, catalog }
    }

    /// Fetches all rows for an entity.
    ///
    /// Returns `Ok(None)` when no table hypothesis matched - the caller
    /// degrades to defaults. If the resolved plan fails at read time
    /// (partially-migrated schema), the catalog advances to the next
    /// hypothesis and the read is retried; the error surfaces only once
    /// every hypothesis is exhausted.
    pub async fn fetch(&self, kind: EntityKind) -> ErpResult<Option<Vec<RawRow>>> {
        let Some(mut plan) = self.catalog.resolve(kind).await? else {
            debug!(entity = kind.label(), "No ERP table; skipping read");
            return Ok(None);
        };

        loop {
            match sqlx::query(&plan.select_sql()).fetch_all(&self.pool).await {
                Ok(rows) => {
                    debug!(
                        entity = kind.label(),
                        table = %plan.table,
                        rows = rows.len(),
                        "ERP rows fetched"
                    );
                    return Ok(Some(rows.iter().map(decode_row).collect()));
                }
                Err(err) => {
                    match self.catalog.advance_past(kind, &plan.table).await? {
                        Some(next) => plan = next,
                        None => return Err(err.into()),
                    }
                }
            }
        }
    }
}

/// Decodes one SQLite row into a [`RawRow`] using the storage class of
/// each value, not the declared column type (ERP columns routinely hold
/// TEXT in INTEGER columns and vice versa).
pub(crate) fn decode_row(row: &SqliteRow) -> RawRow {
    let mut raw = RawRow::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = match row.try_get_raw(idx) {
            Ok(v) if v.is_null() => RawValue::Null,
            Ok(v) => match v.type_info().name() {
                "INTEGER" | "BOOLEAN" => row
                    .try_get::<i64, _>(idx)
                    .map(RawValue::Integer)
                    .unwrap_or(RawValue::Null),
                "REAL" => row
                    .try_get::<f64, _>(idx)
                    .map(RawValue::Real)
                    .unwrap_or(RawValue::Null),
                // TEXT, and anything else SQLite can render as text
                _ => row
                    .try_get::<String, _>(idx)
                    .map(RawValue::Text)
                    .unwrap_or(RawValue::Null),
            },
            Err(_) => RawValue::Null,
        };
        raw.insert(column.name(), value);
    }
    raw
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{ErpConfig, ErpStore};

    async fn store_with(schema_sql: &str) -> ErpStore {
        let erp = ErpStore::connect(ErpConfig::in_memory()).await.unwrap();
        sqlx::raw_sql(schema_sql).execute(erp.pool()).await.unwrap();
        erp
    }

    #[tokio::test]
    async fn test_fetch_aliases_to_logical_names() {
        let erp = store_with(
            "CREATE TABLE estados (uf TEXT PRIMARY KEY, nome TEXT, codigo_ibge INTEGER);
             INSERT INTO estados VALUES ('SP', 'São Paulo', 35), ('RJ', 'Rio de Janeiro', 33);",
        )
        .await;

        let rows = erp.reader().fetch(EntityKind::State).await.unwrap().unwrap();
        assert_eq!(rows.len(), 2);

        let sp = rows
            .iter()
            .find(|r| r.get_str("code").as_deref() == Some("SP"))
            .unwrap();
        assert_eq!(sp.get_str("name"), Some("São Paulo".to_string()));
        assert_eq!(sp.get_i64("registry_id"), Some(35));
    }

    #[tokio::test]
    async fn test_fetch_missing_table_is_none() {
        let erp = store_with("CREATE TABLE unrelated (x INTEGER);").await;
        assert!(erp
            .reader()
            .fetch(EntityKind::FiscalRule)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_storage_class_wins_over_declared_type() {
        // TEXT stored in an INTEGER-declared column and vice versa.
        let erp = store_with(
            "CREATE TABLE estados (uf TEXT, nome TEXT, codigo_ibge INTEGER);
             INSERT INTO estados VALUES ('MG', 'Minas Gerais', '31');",
        )
        .await;

        let rows = erp.reader().fetch(EntityKind::State).await.unwrap().unwrap();
        // SQLite stores '31' as INTEGER under type affinity; either way the
        // coercing accessor reads it back as an integer.
        assert_eq!(rows[0].get_i64("registry_id"), Some(31));
    }

    #[tokio::test]
    async fn test_null_and_real_values() {
        let erp = store_with(
            "CREATE TABLE tributacoes (codigo TEXT, uf TEXT, aliquota REAL);
             INSERT INTO tributacoes VALUES ('T01', 'SP', 18.0), ('T01', 'RJ', NULL);",
        )
        .await;

        let rows = erp
            .reader()
            .fetch(EntityKind::FiscalRule)
            .await
            .unwrap()
            .unwrap();
        let sp = rows
            .iter()
            .find(|r| r.get_str("jurisdiction").as_deref() == Some("SP"))
            .unwrap();
        let rj = rows
            .iter()
            .find(|r| r.get_str("jurisdiction").as_deref() == Some("RJ"))
            .unwrap();
        assert_eq!(sp.get_f64("rate"), Some(18.0));
        assert_eq!(rj.get_f64("rate"), None);
    }
}
