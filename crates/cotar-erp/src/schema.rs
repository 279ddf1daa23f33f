//! # Schema Discovery
//!
//! ERP deployments rename tables and columns freely: a customer table may
//! be `clientes`, `cad_clientes`, or `cliente` depending on the install,
//! and its tax-id column `cnpj_cpf`, `cnpj`, or `documento`. This module
//! resolves each logical entity against an ordered list of structural
//! hypotheses and caches the winning [`AccessPlan`].
//!
//! ## Resolution Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  resolve(EntityKind::Customer)                                  │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  cache hit? ──yes──► return cached plan (or cached miss)        │
//! │       │ no                                                      │
//! │       ▼                                                         │
//! │  for table in ["clientes", "cad_clientes", "cliente"]:          │
//! │     table exists in sqlite_master?  (case-insensitive)          │
//! │        │ yes                                                    │
//! │        ▼                                                        │
//! │     pragma_table_info → real column set                         │
//! │     map each logical field to its first present candidate       │
//! │     all required fields mapped? ──► AccessPlan, cache, done     │
//! │        │ no: next table hypothesis                              │
//! │       ▼                                                         │
//! │  nothing matched ──► cache None (caller degrades to defaults)   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A resolution miss is `Ok(None)`, never an error: sync steps fall back
//! to documented defaults (e.g. built-in payment methods) when the ERP
//! has no table for an entity.

use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ErpResult;

// =============================================================================
// Logical Entities
// =============================================================================

/// Logical entity kinds read from (or written to) the ERP store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    State,
    Municipality,
    Customer,
    PaymentMethod,
    PaymentTerm,
    /// Tax rules, one ERP row per (rule code, jurisdiction).
    FiscalRule,
    /// NCM-style classifications, one ERP row per (code, jurisdiction).
    FiscalClassification,
    /// Product → rule/classification binding rows.
    ProductBinding,
    SalesOrder,
    SalesOrderItem,
    Installment,
}

/// Ordered column candidates for one logical field.
struct FieldSpec {
    logical: &'static str,
    candidates: &'static [&'static str],
}

impl EntityKind {
    /// Human-readable label, used in logs and audit messages.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::State => "states",
            EntityKind::Municipality => "municipalities",
            EntityKind::Customer => "customers",
            EntityKind::PaymentMethod => "payment methods",
            EntityKind::PaymentTerm => "payment terms",
            EntityKind::FiscalRule => "fiscal rules",
            EntityKind::FiscalClassification => "fiscal classifications",
            EntityKind::ProductBinding => "product fiscal bindings",
            EntityKind::SalesOrder => "sales orders",
            EntityKind::SalesOrderItem => "sales order items",
            EntityKind::Installment => "installments",
        }
    }

    /// Ordered table-name hypotheses, most common deployment first.
    fn table_candidates(&self) -> &'static [&'static str] {
        match self {
            EntityKind::State => &["estados", "cad_estados", "uf"],
            EntityKind::Municipality => &["municipios", "cidades", "cad_municipios"],
            EntityKind::Customer => &["clientes", "cad_clientes", "cliente"],
            EntityKind::PaymentMethod => {
                &["formas_pagamento", "forma_pagto", "cad_formas_pagamento"]
            }
            EntityKind::PaymentTerm => &["condicoes_pagamento", "cond_pagto", "cad_condicoes"],
            EntityKind::FiscalRule => &["tributacoes", "regras_fiscais", "tributacao"],
            EntityKind::FiscalClassification => {
                &["classificacoes_fiscais", "class_fiscal", "ncm_tributacao"]
            }
            EntityKind::ProductBinding => {
                &["produto_tributacao", "produtos_fiscal", "produto_fiscal"]
            }
            EntityKind::SalesOrder => &["pedidos", "ped_venda", "pedidos_venda"],
            EntityKind::SalesOrderItem => &["pedido_itens", "itens_pedido", "ped_venda_itens"],
            EntityKind::Installment => {
                &["pedido_parcelas", "parcelas_pedido", "ped_venda_parcelas"]
            }
        }
    }

    /// Ordered column candidates per logical field.
    ///
    /// Logical names here are a contract with the normalizers in
    /// `cotar_core::normalize` (reads) and the order writer (writes).
    fn field_specs(&self) -> Vec<FieldSpec> {
        fn f(logical: &'static str, candidates: &'static [&'static str]) -> FieldSpec {
            FieldSpec {
                logical,
                candidates,
            }
        }
        match self {
            EntityKind::State => vec![
                f("code", &["uf", "sigla", "codigo_uf"]),
                f("name", &["nome", "descricao", "nome_estado"]),
                f("registry_id", &["codigo_ibge", "cod_ibge", "ibge"]),
                f("active", &["ativo", "situacao"]),
            ],
            EntityKind::Municipality => vec![
                f("code", &["codigo_ibge", "cod_ibge", "ibge", "codigo"]),
                f("name", &["nome", "descricao", "cidade"]),
                f("state_code", &["uf", "estado", "sigla_uf"]),
                f("region", &["regiao"]),
                f("capital", &["capital", "eh_capital"]),
                f("area_code", &["ddd", "cod_ddd"]),
            ],
            EntityKind::Customer => vec![
                f("code", &["codigo", "cod_cliente", "id_cliente"]),
                f("legal_name", &["razao_social", "razao", "nome"]),
                f("trade_name", &["fantasia", "nome_fantasia"]),
                f("tax_id", &["cnpj_cpf", "cnpj", "cpf_cnpj", "documento"]),
                f(
                    "state_registration",
                    &["inscricao_estadual", "insc_estadual", "ie"],
                ),
                f("street", &["endereco", "logradouro", "rua"]),
                f("number", &["numero", "num"]),
                f("complement", &["complemento"]),
                f("district", &["bairro"]),
                f("postal_code", &["cep"]),
                f("municipality_name", &["cidade", "municipio", "nome_cidade"]),
                f("state_code", &["uf", "estado"]),
                f(
                    "municipality_code",
                    &["codigo_ibge", "cod_municipio", "cod_ibge"],
                ),
                f("taxpayer", &["contribuinte", "eh_contribuinte"]),
                f("tax_regime", &["regime_tributario", "regime"]),
            ],
            EntityKind::PaymentMethod => vec![
                f("code", &["codigo", "cod_forma"]),
                f("description", &["descricao", "nome"]),
                f("active", &["ativo", "situacao"]),
            ],
            EntityKind::PaymentTerm => {
                let mut specs = vec![
                    f("code", &["codigo", "cod_condicao"]),
                    f("description", &["descricao", "nome"]),
                    f("installments", &["parcelas", "qtd_parcelas", "num_parcelas"]),
                    f("active", &["ativo", "situacao"]),
                ];
                specs.extend(DAY_SLOTS.iter().map(|slot| FieldSpec {
                    logical: slot.logical,
                    candidates: slot.candidates,
                }));
                specs
            }
            EntityKind::FiscalRule => vec![
                f("rule_code", &["codigo", "cod_tributacao"]),
                f("jurisdiction", &["uf", "estado"]),
                f("description", &["descricao", "nome"]),
                f("rate", &["aliquota", "aliquota_icms"]),
                f("reduction", &["reducao", "reducao_base"]),
                f("st_margin", &["margem_st", "mva"]),
                f("substitution", &["substituicao", "st"]),
            ],
            EntityKind::FiscalClassification => vec![
                f(
                    "classification_code",
                    &["codigo", "ncm", "cod_classificacao"],
                ),
                f("jurisdiction", &["uf", "estado"]),
                f("description", &["descricao", "nome"]),
                f("rate", &["aliquota", "aliquota_icms"]),
                f("surcharge", &["fcp", "adicional"]),
                f("presumed_margin", &["margem_presumida", "mva"]),
            ],
            EntityKind::ProductBinding => vec![
                f("product_code", &["cod_produto", "codigo_produto", "produto"]),
                f("rule_code", &["cod_tributacao", "tributacao"]),
                f(
                    "classification_code",
                    &["cod_classificacao", "classificacao", "ncm"],
                ),
                f("origin", &["origem", "cod_origem"]),
            ],
            EntityKind::SalesOrder => vec![
                f("code", &["codigo", "numero", "num_pedido"]),
                f("customer_code", &["cod_cliente", "cliente"]),
                f("payment_term_code", &["cond_pagto", "cod_condicao"]),
                f("total", &["total", "valor_total"]),
                f("issued_on", &["data", "data_emissao"]),
                f(
                    "quotation_code",
                    &["num_orcamento", "cod_orcamento", "orcamento"],
                ),
            ],
            EntityKind::SalesOrderItem => vec![
                f("order_code", &["num_pedido", "cod_pedido", "pedido"]),
                f("product_code", &["cod_produto", "produto"]),
                f("description", &["descricao"]),
                f("quantity", &["quantidade", "qtde"]),
                f(
                    "unit_price",
                    &["preco_unitario", "valor_unitario", "unitario"],
                ),
                f("total", &["total", "valor_total"]),
            ],
            EntityKind::Installment => vec![
                f("order_code", &["num_pedido", "cod_pedido", "pedido"]),
                f("number", &["parcela", "num_parcela", "numero"]),
                f("due_date", &["vencimento", "data_vencimento"]),
                f("amount", &["valor", "valor_parcela"]),
            ],
        }
    }

    /// Logical fields that MUST map for a table hypothesis to be accepted.
    ///
    /// These are the natural-key fields; a table missing them is a false
    /// positive (e.g. an unrelated table that happens to share a name).
    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::State => &["code"],
            EntityKind::Municipality => &["code", "name", "state_code"],
            EntityKind::Customer => &["code", "legal_name"],
            EntityKind::PaymentMethod => &["code"],
            EntityKind::PaymentTerm => &["code"],
            EntityKind::FiscalRule => &["rule_code", "jurisdiction"],
            EntityKind::FiscalClassification => &["classification_code", "jurisdiction"],
            EntityKind::ProductBinding => &["product_code", "rule_code"],
            EntityKind::SalesOrder => &["code", "customer_code", "total"],
            EntityKind::SalesOrderItem => &["order_code", "product_code"],
            EntityKind::Installment => &["order_code", "number", "amount"],
        }
    }
}

/// Payment-term installment slot columns (`dias_1` .. `dias_24`).
///
/// Generated once as statics so [`FieldSpec`] can stay borrowed.
struct DaySlot {
    logical: &'static str,
    candidates: &'static [&'static str],
}

macro_rules! day_slots {
    ($(($n:literal, $dias:literal, $prazo:literal)),+ $(,)?) => {
        &[$(DaySlot {
            logical: concat!("days_", $n),
            candidates: &[$dias, $prazo],
        }),+]
    };
}

static DAY_SLOTS: &[DaySlot] = day_slots![
    (1, "dias_1", "prazo_1"),
    (2, "dias_2", "prazo_2"),
    (3, "dias_3", "prazo_3"),
    (4, "dias_4", "prazo_4"),
    (5, "dias_5", "prazo_5"),
    (6, "dias_6", "prazo_6"),
    (7, "dias_7", "prazo_7"),
    (8, "dias_8", "prazo_8"),
    (9, "dias_9", "prazo_9"),
    (10, "dias_10", "prazo_10"),
    (11, "dias_11", "prazo_11"),
    (12, "dias_12", "prazo_12"),
    (13, "dias_13", "prazo_13"),
    (14, "dias_14", "prazo_14"),
    (15, "dias_15", "prazo_15"),
    (16, "dias_16", "prazo_16"),
    (17, "dias_17", "prazo_17"),
    (18, "dias_18", "prazo_18"),
    (19, "dias_19", "prazo_19"),
    (20, "dias_20", "prazo_20"),
    (21, "dias_21", "prazo_21"),
    (22, "dias_22", "prazo_22"),
    (23, "dias_23", "prazo_23"),
    (24, "dias_24", "prazo_24"),
];

// =============================================================================
// Access Plan
// =============================================================================

/// A resolved (table, logical-field → real-column) mapping.
#[derive(Debug, Clone)]
pub struct AccessPlan {
    /// Real table name as stored in `sqlite_master`.
    pub table: String,

    /// Logical field name → real column name. Only fields that resolved
    /// are present; absent fields read as NULL through [`select_sql`].
    ///
    /// [`select_sql`]: AccessPlan::select_sql
    columns: HashMap<&'static str, String>,
}

impl AccessPlan {
    /// Real column backing a logical field, when the deployment has one.
    pub fn column(&self, logical: &str) -> Option<&str> {
        self.columns.get(logical).map(String::as_str)
    }

    /// True when the logical field resolved against a real column.
    pub fn has(&self, logical: &str) -> bool {
        self.columns.contains_key(logical)
    }

    /// Builds the `SELECT` that reads every resolved field aliased to its
    /// logical name, so downstream rows are keyed uniformly regardless of
    /// the deployment's real column names.
    pub fn select_sql(&self) -> String {
        let mut cols: Vec<(&&'static str, &String)> = self.columns.iter().collect();
        // Deterministic column order keeps the SQL stable across runs.
        cols.sort_by_key(|(logical, _)| **logical);

        let projection = cols
            .iter()
            .map(|(logical, real)| format!("\"{}\" AS \"{}\"", real, logical))
            .collect::<Vec<_>>()
            .join(", ");

        format!("SELECT {} FROM \"{}\"", projection, self.table)
    }
}

// =============================================================================
// Schema Catalog
// =============================================================================

/// Lazily-resolved, cached access plans for every logical entity.
///
/// Resolution runs at most once per entity per process (unless a plan is
/// explicitly invalidated after a failed read); every later call is a
/// cache hit. A cached `None` is also remembered so absent tables are not
/// re-probed on every sync step.
#[derive(Debug)]
pub struct SchemaCatalog {
    pool: SqlitePool,
    cache: RwLock<HashMap<EntityKind, Option<AccessPlan>>>,
}

impl SchemaCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        SchemaCatalog {
            pool,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves the access plan for an entity, consulting the cache first.
    ///
    /// Returns `Ok(None)` when no table hypothesis matched; callers degrade
    /// to defaults rather than treating this as fatal.
    pub async fn resolve(&self, kind: EntityKind) -> ErpResult<Option<AccessPlan>> {
        if let Some(cached) = self.cache.read().await.get(&kind) {
            return Ok(cached.clone());
        }

        let plan = self.probe(kind, None).await?;
        self.cache.write().await.insert(kind, plan.clone());
        Ok(plan)
    }

    /// Drops the cached plan and re-resolves, skipping hypotheses up to and
    /// including `failed_table`.
    ///
    /// Called by the reader when a `SELECT` against a resolved plan fails
    /// at runtime (partially-migrated deployments can have a table whose
    /// columns changed after probing).
    pub async fn advance_past(
        &self,
        kind: EntityKind,
        failed_table: &str,
    ) -> ErpResult<Option<AccessPlan>> {
        warn!(
            entity = kind.label(),
            table = failed_table,
            "Access plan failed at read time; trying next hypothesis"
        );
        let plan = self.probe(kind, Some(failed_table)).await?;
        self.cache.write().await.insert(kind, plan.clone());
        Ok(plan)
    }

    /// Probes table hypotheses in order, optionally resuming after a
    /// previously-failed table name.
    async fn probe(
        &self,
        kind: EntityKind,
        skip_through: Option<&str>,
    ) -> ErpResult<Option<AccessPlan>> {
        let candidates = kind.table_candidates();
        let start = match skip_through {
            Some(failed) => candidates
                .iter()
                .position(|t| t.eq_ignore_ascii_case(failed))
                .map(|i| i + 1)
                .unwrap_or(0),
            None => 0,
        };

        for candidate in &candidates[start..] {
            let Some(real_table) = self.table_exists(candidate).await? else {
                continue;
            };

            let real_columns = self.column_names(&real_table).await?;
            let mut columns: HashMap<&'static str, String> = HashMap::new();
            for spec in kind.field_specs() {
                let hit = spec.candidates.iter().find_map(|cand| {
                    real_columns
                        .iter()
                        .find(|real| real.eq_ignore_ascii_case(cand))
                });
                if let Some(real) = hit {
                    columns.insert(spec.logical, real.clone());
                }
            }

            let missing: Vec<&str> = kind
                .required_fields()
                .iter()
                .filter(|field| !columns.contains_key(*field))
                .copied()
                .collect();
            if !missing.is_empty() {
                debug!(
                    entity = kind.label(),
                    table = %real_table,
                    missing = ?missing,
                    "Table hypothesis rejected: key columns absent"
                );
                continue;
            }

            info!(
                entity = kind.label(),
                table = %real_table,
                fields = columns.len(),
                "Access plan resolved"
            );
            return Ok(Some(AccessPlan {
                table: real_table,
                columns,
            }));
        }

        debug!(entity = kind.label(), "No table hypothesis matched");
        Ok(None)
    }

    /// Case-insensitive table existence check; returns the real name.
    async fn table_exists(&self, candidate: &str) -> ErpResult<Option<String>> {
        let name: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?1)",
        )
        .bind(candidate)
        .fetch_optional(&self.pool)
        .await?;
        Ok(name)
    }

    /// Real column names of a table, via `pragma_table_info`.
    async fn column_names(&self, table: &str) -> ErpResult<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool_with(schema_sql: &str) -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        sqlx::raw_sql(schema_sql).execute(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_resolves_first_table_hypothesis() {
        let pool = pool_with(
            "CREATE TABLE estados (uf TEXT PRIMARY KEY, nome TEXT, codigo_ibge INTEGER);",
        )
        .await;
        let catalog = SchemaCatalog::new(pool);

        let plan = catalog.resolve(EntityKind::State).await.unwrap().unwrap();
        assert_eq!(plan.table, "estados");
        assert_eq!(plan.column("code"), Some("uf"));
        assert_eq!(plan.column("name"), Some("nome"));
        assert_eq!(plan.column("registry_id"), Some("codigo_ibge"));
        assert!(!plan.has("active"));
    }

    #[tokio::test]
    async fn test_falls_back_to_later_hypothesis() {
        // First candidate name absent; second exists under mixed case.
        let pool =
            pool_with("CREATE TABLE Cad_Estados (Sigla TEXT PRIMARY KEY, Descricao TEXT);").await;
        let catalog = SchemaCatalog::new(pool);

        let plan = catalog.resolve(EntityKind::State).await.unwrap().unwrap();
        assert_eq!(plan.table, "Cad_Estados");
        assert_eq!(plan.column("code"), Some("Sigla"));
        assert_eq!(plan.column("name"), Some("Descricao"));
    }

    #[tokio::test]
    async fn test_missing_table_is_none_not_error() {
        let pool = pool_with("CREATE TABLE unrelated (x INTEGER);").await;
        let catalog = SchemaCatalog::new(pool);

        assert!(catalog
            .resolve(EntityKind::PaymentMethod)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rejects_table_missing_key_columns() {
        // 'clientes' exists but has none of the key columns; the next
        // hypothesis 'cad_clientes' carries a usable layout.
        let pool = pool_with(
            "CREATE TABLE clientes (irrelevante TEXT);
             CREATE TABLE cad_clientes (codigo TEXT PRIMARY KEY, razao_social TEXT, cnpj TEXT);",
        )
        .await;
        let catalog = SchemaCatalog::new(pool);

        let plan = catalog
            .resolve(EntityKind::Customer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(plan.table, "cad_clientes");
        assert_eq!(plan.column("tax_id"), Some("cnpj"));
    }

    #[tokio::test]
    async fn test_advance_past_skips_failed_table() {
        let pool = pool_with(
            "CREATE TABLE municipios (codigo_ibge TEXT, nome TEXT, uf TEXT);
             CREATE TABLE cidades (codigo TEXT, cidade TEXT, estado TEXT);",
        )
        .await;
        let catalog = SchemaCatalog::new(pool);

        let first = catalog
            .resolve(EntityKind::Municipality)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.table, "municipios");

        let second = catalog
            .advance_past(EntityKind::Municipality, "municipios")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.table, "cidades");
        assert_eq!(second.column("name"), Some("cidade"));
    }

    #[tokio::test]
    async fn test_select_sql_aliases_logical_names() {
        let pool = pool_with("CREATE TABLE estados (uf TEXT, nome TEXT);").await;
        let catalog = SchemaCatalog::new(pool);

        let plan = catalog.resolve(EntityKind::State).await.unwrap().unwrap();
        let sql = plan.select_sql();
        assert!(sql.contains("\"uf\" AS \"code\""));
        assert!(sql.contains("\"nome\" AS \"name\""));
        assert!(sql.ends_with("FROM \"estados\""));
    }

    #[tokio::test]
    async fn test_payment_term_day_slots_resolve() {
        let pool = pool_with(
            "CREATE TABLE condicoes_pagamento (
                 codigo TEXT PRIMARY KEY, descricao TEXT, parcelas INTEGER,
                 dias_1 INTEGER, dias_2 INTEGER, prazo_3 INTEGER
             );",
        )
        .await;
        let catalog = SchemaCatalog::new(pool);

        let plan = catalog
            .resolve(EntityKind::PaymentTerm)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(plan.column("days_1"), Some("dias_1"));
        assert_eq!(plan.column("days_3"), Some("prazo_3"));
        assert!(!plan.has("days_4"));
    }
}
