//! # Geography Repository
//!
//! Local-store operations for states and municipalities.
//!
//! Besides the reconciler trio (codes/insert/update), this repository is
//! the lookup surface for the geographic resolution heuristics: registry
//! code, exact name match, state capital, any-in-state.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use cotar_core::{Municipality, State};

/// Repository for geography operations.
#[derive(Debug, Clone)]
pub struct GeoRepository {
    pool: SqlitePool,
}

impl GeoRepository {
    /// Creates a new GeoRepository.
    pub fn new(pool: SqlitePool) -> Self {
        GeoRepository { pool }
    }

    // =========================================================================
    // States
    // =========================================================================

    /// All state codes currently in the local store (one query, used by
    /// the reconciler to partition insert/update sets).
    pub async fn state_codes(&self) -> DbResult<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>("SELECT code FROM states")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    /// Gets a state by its 2-letter code.
    pub async fn get_state(&self, code: &str) -> DbResult<Option<State>> {
        let state = sqlx::query_as::<_, State>(
            r#"
            SELECT code, name, registry_id, is_active, updated_at
            FROM states
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    /// Inserts a state.
    pub async fn insert_state(&self, state: &State) -> DbResult<()> {
        debug!(code = %state.code, "Inserting state");

        sqlx::query(
            r#"
            INSERT INTO states (code, name, registry_id, is_active, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&state.code)
        .bind(&state.name)
        .bind(state.registry_id)
        .bind(state.is_active)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a state by its natural key.
    pub async fn update_state(&self, state: &State) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE states SET
                name = ?2,
                registry_id = ?3,
                is_active = ?4,
                updated_at = ?5
            WHERE code = ?1
            "#,
        )
        .bind(&state.code)
        .bind(&state.name)
        .bind(state.registry_id)
        .bind(state.is_active)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Municipalities
    // =========================================================================

    /// All municipality registry codes currently in the local store.
    pub async fn municipality_codes(&self) -> DbResult<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>("SELECT code FROM municipalities")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    /// Finds a municipality by its 7-digit registry code.
    ///
    /// This is step 1 of the customer resolution chain: when the ERP row
    /// carries a registry code, the municipality table is the source of
    /// truth for both state and name.
    pub async fn find_municipality(&self, code: &str) -> DbResult<Option<Municipality>> {
        let municipality = sqlx::query_as::<_, Municipality>(
            r#"
            SELECT code, name, state_code, region, is_capital, area_code, updated_at
            FROM municipalities
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(municipality)
    }

    /// Finds municipalities by exact upper-cased name match.
    ///
    /// Ordered by registry code so "first result" tie-breaking in the
    /// heuristics is deterministic.
    pub async fn find_municipalities_by_name(&self, name: &str) -> DbResult<Vec<Municipality>> {
        let municipalities = sqlx::query_as::<_, Municipality>(
            r#"
            SELECT code, name, state_code, region, is_capital, area_code, updated_at
            FROM municipalities
            WHERE UPPER(name) = UPPER(?1)
            ORDER BY code
            "#,
        )
        .bind(name.trim())
        .fetch_all(&self.pool)
        .await?;

        Ok(municipalities)
    }

    /// The capital municipality of a state, if one is flagged.
    pub async fn capital_of(&self, state_code: &str) -> DbResult<Option<Municipality>> {
        let municipality = sqlx::query_as::<_, Municipality>(
            r#"
            SELECT code, name, state_code, region, is_capital, area_code, updated_at
            FROM municipalities
            WHERE state_code = ?1 AND is_capital = 1
            ORDER BY code
            LIMIT 1
            "#,
        )
        .bind(state_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(municipality)
    }

    /// Any municipality in a state (fallback when no capital is flagged).
    pub async fn any_in_state(&self, state_code: &str) -> DbResult<Option<Municipality>> {
        let municipality = sqlx::query_as::<_, Municipality>(
            r#"
            SELECT code, name, state_code, region, is_capital, area_code, updated_at
            FROM municipalities
            WHERE state_code = ?1
            ORDER BY code
            LIMIT 1
            "#,
        )
        .bind(state_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(municipality)
    }

    /// Inserts a municipality.
    ///
    /// Fails with a foreign-key violation when the owning state is not in
    /// the local store - the reconciler counts that as a record failure.
    pub async fn insert_municipality(&self, m: &Municipality) -> DbResult<()> {
        debug!(code = %m.code, state = %m.state_code, "Inserting municipality");

        sqlx::query(
            r#"
            INSERT INTO municipalities (
                code, name, state_code, region, is_capital, area_code, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&m.code)
        .bind(&m.name)
        .bind(&m.state_code)
        .bind(&m.region)
        .bind(m.is_capital)
        .bind(&m.area_code)
        .bind(m.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a municipality by its natural key.
    pub async fn update_municipality(&self, m: &Municipality) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE municipalities SET
                name = ?2,
                state_code = ?3,
                region = ?4,
                is_capital = ?5,
                area_code = ?6,
                updated_at = ?7
            WHERE code = ?1
            "#,
        )
        .bind(&m.code)
        .bind(&m.name)
        .bind(&m.state_code)
        .bind(&m.region)
        .bind(m.is_capital)
        .bind(&m.area_code)
        .bind(m.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
