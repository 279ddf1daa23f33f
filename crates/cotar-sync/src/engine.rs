//! # Sync Engine
//!
//! Orchestrates the full master-data sync run.
//!
//! ## Run Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        Full Sync Run                                │
//! │                                                                     │
//! │  start_full_sync()                                                  │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  guard.try_acquire() ──busy──► Err(AlreadyRunning), nothing queued  │
//! │       │ acquired                                                    │
//! │       ▼                                                             │
//! │  ensure default company row                                         │
//! │  sync states                                                        │
//! │  sync municipalities                                                │
//! │  sync customers              each step fault-tolerant:              │
//! │  sync payment methods        a failure is recorded in the           │
//! │  sync payment terms          report and the run continues           │
//! │  sync fiscal rules                                                  │
//! │  sync fiscal classifications                                        │
//! │  sync product bindings                                              │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  append terminal audit row, release guard (also on early exit)      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps run strictly in sequence because later categories depend on
//! earlier ones (customers resolve against municipalities, fiscal items
//! reference headers). Categories are independent failure domains: a
//! broken fiscal table must not block customer sync.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use cotar_core::SyncRunStatus;
use cotar_db::Database;
use cotar_erp::ErpStore;

use crate::config::EngineConfig;
use crate::convert::QuotationConverter;
use crate::error::{SyncError, SyncResult};
use crate::reconcile::BatchOutcome;
use crate::steps::{self, StepContext};

/// Audit run type for full sync runs.
const FULL_SYNC: &str = "full sync";

// =============================================================================
// Run Guard
// =============================================================================

/// Reject-on-conflict concurrency guard for full sync runs.
///
/// A second `try_acquire` while a permit is alive fails immediately;
/// runs are never queued. The permit releases on drop, so the flag
/// resets on every exit path.
#[derive(Debug, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

/// Held for the duration of one run.
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        RunGuard {
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Acquires the run slot, or `None` when a run is already active.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                running: Arc::clone(&self.running),
            })
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

// =============================================================================
// Run Report
// =============================================================================

/// Outcome of one category within a full sync run.
#[derive(Debug, Clone)]
pub struct CategoryReport {
    pub name: &'static str,
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
    /// Step-level failure, when the whole category could not run.
    pub error: Option<String>,
}

impl CategoryReport {
    fn from_outcome(name: &'static str, outcome: &BatchOutcome) -> Self {
        CategoryReport {
            name,
            inserted: outcome.inserted,
            updated: outcome.updated,
            failed: outcome.failed,
            error: None,
        }
    }

    fn from_error(name: &'static str, err: &SyncError) -> Self {
        CategoryReport {
            name,
            inserted: 0,
            updated: 0,
            failed: 0,
            error: Some(err.to_string()),
        }
    }
}

/// Structured outcome of a full sync run; always returned, even when
/// some categories failed (partial success, never all-or-nothing).
#[derive(Debug, Clone)]
pub struct FullSyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub categories: Vec<CategoryReport>,
}

impl FullSyncReport {
    /// True when at least one category failed at step level.
    pub fn has_step_failures(&self) -> bool {
        self.categories.iter().any(|c| c.error.is_some())
    }

    /// Total records written across all categories.
    pub fn total_applied(&self) -> u64 {
        self.categories.iter().map(|c| c.inserted + c.updated).sum()
    }

    fn summary(&self) -> String {
        let inserted: u64 = self.categories.iter().map(|c| c.inserted).sum();
        let updated: u64 = self.categories.iter().map(|c| c.updated).sum();
        let failed: u64 = self.categories.iter().map(|c| c.failed).sum();
        let broken: usize = self.categories.iter().filter(|c| c.error.is_some()).count();
        format!(
            "{} inserted, {} updated, {} failed, {} categories errored",
            inserted, updated, failed, broken
        )
    }
}

/// Point-in-time view for external status queries.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// Completion time of the last successful full sync, from the audit
    /// trail (survives restarts).
    pub last_sync: Option<DateTime<Utc>>,
    pub in_progress: bool,
    /// Per-category counts from the most recent run in this process,
    /// when one has completed.
    pub last_report: Option<FullSyncReport>,
}

// =============================================================================
// Sync Engine
// =============================================================================

/// The engine: owns both store handles, the configuration, and the guard.
pub struct SyncEngine {
    db: Database,
    erp: ErpStore,
    config: EngineConfig,
    guard: RunGuard,
    last_report: RwLock<Option<FullSyncReport>>,
}

impl SyncEngine {
    pub fn new(db: Database, erp: ErpStore, config: EngineConfig) -> Self {
        SyncEngine {
            db,
            erp,
            config,
            guard: RunGuard::new(),
            last_report: RwLock::new(None),
        }
    }

    /// Runs a full master-data sync.
    ///
    /// Fails fast with [`SyncError::AlreadyRunning`] when a run is active.
    /// Otherwise always returns a report; category failures are folded
    /// into it rather than aborting the run.
    pub async fn start_full_sync(&self) -> SyncResult<FullSyncReport> {
        let _permit = self.guard.try_acquire().ok_or(SyncError::AlreadyRunning)?;

        let started_at = Utc::now();
        info!("Full sync started");
        self.db
            .sync_log()
            .append(FULL_SYNC, SyncRunStatus::Started, "run started")
            .await?;

        let reader = self.erp.reader();
        let ctx = StepContext {
            db: &self.db,
            reader: &reader,
            config: &self.config,
            now: started_at,
        };

        let mut categories = Vec::new();

        // Step 0: the company row other tables hang off.
        categories.push(self.ensure_company().await);

        categories.push(Self::run_step("states", steps::sync_states(&ctx).await));
        categories.push(Self::run_step(
            "municipalities",
            steps::sync_municipalities(&ctx).await,
        ));
        categories.push(Self::run_step(
            "customers",
            steps::sync_customers(&ctx).await,
        ));
        categories.push(Self::run_step(
            "payment methods",
            steps::sync_payment_methods(&ctx).await,
        ));
        categories.push(Self::run_step(
            "payment terms",
            steps::sync_payment_terms(&ctx).await,
        ));
        categories.push(Self::run_step(
            "fiscal rules",
            steps::sync_fiscal_rules(&ctx).await,
        ));
        categories.push(Self::run_step(
            "fiscal classifications",
            steps::sync_fiscal_classifications(&ctx).await,
        ));
        categories.push(Self::run_step(
            "product fiscal bindings",
            steps::sync_product_bindings(&ctx).await,
        ));

        let report = FullSyncReport {
            started_at,
            finished_at: Utc::now(),
            categories,
        };

        let all_failed = report.categories.iter().all(|c| c.error.is_some());
        let status = if all_failed {
            SyncRunStatus::Error
        } else {
            SyncRunStatus::Completed
        };
        self.db
            .sync_log()
            .append(FULL_SYNC, status, &report.summary())
            .await?;

        info!(
            applied = report.total_applied(),
            step_failures = report.has_step_failures(),
            "Full sync finished"
        );
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    /// Current engine status for external queries.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let last_sync = self.db.sync_log().last_completed(FULL_SYNC).await?;
        Ok(SyncStatus {
            last_sync,
            in_progress: self.guard.is_running(),
            last_report: self.last_report.read().await.clone(),
        })
    }

    /// Converts an active quotation into an ERP sales order.
    pub async fn convert_quotation(&self, code: &str) -> SyncResult<String> {
        QuotationConverter::new(self.db.clone(), self.erp.clone())
            .convert(code)
            .await
    }

    /// Returns the local store handle (for embedding applications).
    pub fn db(&self) -> &Database {
        &self.db
    }

    async fn ensure_company(&self) -> CategoryReport {
        let result = self
            .db
            .companies()
            .ensure_default(
                &self.config.company.name,
                self.config.company.tax_id.as_deref(),
            )
            .await;
        match result {
            Ok(_) => CategoryReport {
                name: "company",
                inserted: 0,
                updated: 0,
                failed: 0,
                error: None,
            },
            Err(err) => {
                error!(error = %err, "Default company row could not be ensured");
                CategoryReport::from_error("company", &err.into())
            }
        }
    }

    fn run_step(name: &'static str, result: SyncResult<BatchOutcome>) -> CategoryReport {
        match result {
            Ok(outcome) => CategoryReport::from_outcome(name, &outcome),
            Err(err) => {
                warn!(step = name, error = %err, "Sync step failed; continuing run");
                CategoryReport::from_error(name, &err)
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cotar_db::DbConfig;
    use cotar_erp::ErpConfig;

    /// A small but complete fake ERP covering every master-data category.
    const ERP_FIXTURE: &str = "
        CREATE TABLE estados (uf TEXT, nome TEXT, codigo_ibge INTEGER, ativo TEXT);
        INSERT INTO estados VALUES
            ('SP', 'São Paulo', 35, 'S'),
            ('RJ', 'Rio de Janeiro', 33, 'S');

        CREATE TABLE municipios (codigo_ibge TEXT, nome TEXT, uf TEXT, capital INTEGER);
        INSERT INTO municipios VALUES
            ('3550308', 'SÃO PAULO', 'SP', 1),
            ('3304557', 'RIO DE JANEIRO', 'RJ', 1);

        CREATE TABLE clientes (
            codigo TEXT, razao_social TEXT, cnpj_cpf TEXT, inscricao_estadual TEXT,
            cidade TEXT, uf TEXT, codigo_ibge TEXT, cep TEXT
        );
        INSERT INTO clientes VALUES
            ('C1', 'Cliente Um Ltda', '11222333000144', '110042490114',
             'SÃO PAULO', 'SP', '3550308', '01310-100'),
            ('C2', 'Cliente Dois', NULL, NULL, NULL, NULL, NULL, NULL);

        CREATE TABLE formas_pagamento (codigo TEXT, descricao TEXT, ativo TEXT);
        INSERT INTO formas_pagamento VALUES ('DIN', 'Dinheiro', 'S');

        CREATE TABLE condicoes_pagamento (
            codigo TEXT, descricao TEXT, parcelas INTEGER,
            dias_1 INTEGER, dias_2 INTEGER, dias_3 INTEGER
        );
        INSERT INTO condicoes_pagamento VALUES ('30-60-90', '3x 30/60/90', 3, 30, 60, 90);

        CREATE TABLE tributacoes (
            codigo TEXT, descricao TEXT, uf TEXT,
            aliquota REAL, reducao REAL, margem_st REAL, substituicao TEXT
        );
        INSERT INTO tributacoes VALUES
            ('T01', 'ICMS padrão', 'SP', 18.0, 0, 0, 'N'),
            ('T01', 'ICMS padrão', 'RJ', 20.0, 0, 0, 'N');

        CREATE TABLE classificacoes_fiscais (
            codigo TEXT, descricao TEXT, uf TEXT,
            aliquota REAL, fcp REAL, margem_presumida REAL
        );
        INSERT INTO classificacoes_fiscais VALUES ('NCM1', 'Classe 1', 'SP', 18.0, 2.0, 40.0);

        CREATE TABLE produto_tributacao (
            cod_produto TEXT, cod_tributacao TEXT, cod_classificacao TEXT, origem INTEGER
        );
        INSERT INTO produto_tributacao VALUES ('P1', 'T01', 'NCM1', 0);
    ";

    async fn engine_with(fixture: Option<&str>) -> SyncEngine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let erp = ErpStore::connect(ErpConfig::in_memory()).await.unwrap();
        if let Some(sql) = fixture {
            sqlx::raw_sql(sql).execute(erp.pool()).await.unwrap();
        }
        SyncEngine::new(db, erp, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_full_sync_mirrors_all_categories() {
        let engine = engine_with(Some(ERP_FIXTURE)).await;
        let report = engine.start_full_sync().await.unwrap();

        assert!(!report.has_step_failures());
        assert_eq!(engine.db().geo().state_codes().await.unwrap().len(), 2);
        assert_eq!(
            engine.db().geo().municipality_codes().await.unwrap().len(),
            2
        );

        let c1 = engine.db().customers().get("C1").await.unwrap().unwrap();
        assert!(c1.is_taxpayer);
        assert_eq!(c1.postal_code.as_deref(), Some("01310100"));

        // C2 arrived with no geography at all: default state + capital.
        let c2 = engine.db().customers().get("C2").await.unwrap().unwrap();
        assert_eq!(c2.state_code.as_deref(), Some("SP"));
        assert_eq!(c2.municipality_code.as_deref(), Some("3550308"));

        let term = engine
            .db()
            .payments()
            .get_term("30-60-90")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(term.day_offsets, vec![30, 60, 90]);

        assert_eq!(
            engine.db().fiscal().count_items("T01").await.unwrap(),
            2
        );
        let binding = engine
            .db()
            .fiscal()
            .active_binding("P1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(binding.rule_code, "T01");
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let engine = engine_with(Some(ERP_FIXTURE)).await;
        engine.start_full_sync().await.unwrap();

        let second = engine.start_full_sync().await.unwrap();
        let inserted: u64 = second.categories.iter().map(|c| c.inserted).sum();
        assert_eq!(inserted, 0);

        // Unchanged bindings are left alone, not re-replaced.
        let history = engine.db().fiscal().binding_history("P1").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_binding_retires_previous_row() {
        let engine = engine_with(Some(ERP_FIXTURE)).await;
        engine.start_full_sync().await.unwrap();

        sqlx::query("UPDATE produto_tributacao SET cod_tributacao = 'T02'")
            .execute(engine.erp.pool())
            .await
            .unwrap();
        engine.start_full_sync().await.unwrap();

        let history = engine.db().fiscal().binding_history("P1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|b| b.is_active).count(), 1);
        let active = engine
            .db()
            .fiscal()
            .active_binding("P1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.rule_code, "T02");
    }

    #[tokio::test]
    async fn test_empty_erp_degrades_to_fallback_methods() {
        let engine = engine_with(None).await;
        let report = engine.start_full_sync().await.unwrap();

        assert!(!report.has_step_failures());
        // Built-in methods are seeded once and only once.
        let methods = engine.db().payments().method_codes().await.unwrap();
        assert_eq!(methods.len(), 3);

        let second = engine.start_full_sync().await.unwrap();
        let inserted: u64 = second.categories.iter().map(|c| c.inserted).sum();
        assert_eq!(inserted, 0);
    }

    #[tokio::test]
    async fn test_run_guard_rejects_concurrent_sync() {
        let engine = engine_with(None).await;
        let _permit = engine.guard.try_acquire().unwrap();

        let err = engine.start_full_sync().await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_status_reports_last_sync() {
        let engine = engine_with(None).await;

        let before = engine.status().await.unwrap();
        assert!(before.last_sync.is_none());
        assert!(!before.in_progress);
        assert!(before.last_report.is_none());

        engine.start_full_sync().await.unwrap();
        let after = engine.status().await.unwrap();
        assert!(after.last_sync.is_some());
        assert!(!after.in_progress);
        let report = after.last_report.unwrap();
        assert!(!report.categories.is_empty());
    }

    #[test]
    fn test_guard_rejects_second_acquire() {
        let guard = RunGuard::new();
        let permit = guard.try_acquire();
        assert!(permit.is_some());
        assert!(guard.try_acquire().is_none());
        assert!(guard.is_running());

        drop(permit);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_report_summary_counts() {
        let report = FullSyncReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            categories: vec![
                CategoryReport {
                    name: "states",
                    inserted: 5,
                    updated: 2,
                    failed: 1,
                    error: None,
                },
                CategoryReport {
                    name: "customers",
                    inserted: 0,
                    updated: 0,
                    failed: 0,
                    error: Some("boom".to_string()),
                },
            ],
        };
        assert!(report.has_step_failures());
        assert_eq!(report.total_applied(), 7);
        assert_eq!(
            report.summary(),
            "5 inserted, 2 updated, 1 failed, 1 categories errored"
        );
    }
}
