//! # Geographic Resolution Heuristics
//!
//! Repairs incomplete customer records during sync using an ordered
//! fallback chain. The chain is a single sequential pipeline - later
//! steps assume the earlier ones already failed, so they must never run
//! out of order or in parallel.
//!
//! ## Fallback Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  1. municipality registry code present AND resolves locally?        │
//! │       → adopt its state and canonical name                          │
//! │         (registry wins over the ERP's own free-text state/city)     │
//! │  2. else municipality name present?                                 │
//! │       → exact upper-cased name match                                │
//! │         one hit    → adopt it                                       │
//! │         many hits  → prefer the default state, else first           │
//! │  3. else state still unknown?                                       │
//! │       → keep the ERP's state if it is a known code,                 │
//! │         else the configured default                                 │
//! │  4. municipality still blank but state resolved?                    │
//! │       → adopt the state capital, or any municipality in it          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tax-regime inference (contributor when company tax id + state
//! registration) happens earlier, in `cotar_core::normalize`; this module
//! only repairs geography.

use tracing::debug;

use cotar_core::Customer;
use cotar_db::GeoRepository;

use crate::error::SyncResult;

/// Which step of the chain produced the final geography.
///
/// Mostly useful in logs and tests; callers only need the mutated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedVia {
    /// Step 1: registry code matched the local municipality table.
    RegistryCode,
    /// Step 2: exactly one municipality matched by name.
    UniqueName,
    /// Step 2: several matched; default-state (or first) preference applied.
    AmbiguousName,
    /// Step 3: the ERP-supplied state was already a known code.
    ExistingState,
    /// Step 3: nothing matched; configured default state adopted.
    DefaultState,
}

/// Resolves customer geography against the local store.
#[derive(Debug, Clone)]
pub struct GeoResolver {
    geo: GeoRepository,
    default_state: String,
}

impl GeoResolver {
    pub fn new(geo: GeoRepository, default_state: impl Into<String>) -> Self {
        GeoResolver {
            geo,
            default_state: default_state.into(),
        }
    }

    /// Runs the fallback chain once, mutating the customer in place.
    ///
    /// Post-condition: `state_code` is always `Some` of a known (or
    /// default) 2-letter code; `municipality_code` is `Some` whenever the
    /// local store has any municipality for the resolved state.
    pub async fn resolve(&self, customer: &mut Customer) -> SyncResult<ResolvedVia> {
        let via = self.resolve_state(customer).await?;
        self.backfill_municipality(customer).await?;

        debug!(
            customer = %customer.code,
            via = ?via,
            state = customer.state_code.as_deref().unwrap_or("?"),
            municipality = customer.municipality_code.as_deref().unwrap_or("-"),
            "Customer geography resolved"
        );
        Ok(via)
    }

    /// Steps 1-3: settle the state (and municipality where a lookup hit).
    async fn resolve_state(&self, customer: &mut Customer) -> SyncResult<ResolvedVia> {
        // Step 1: registry code is the source of truth when it resolves.
        if let Some(code) = customer.municipality_code.clone() {
            if let Some(municipality) = self.geo.find_municipality(&code).await? {
                customer.state_code = Some(municipality.state_code);
                customer.municipality_name = Some(municipality.name);
                return Ok(ResolvedVia::RegistryCode);
            }
            // Unresolvable registry code is dropped so step 4 can backfill.
            customer.municipality_code = None;
        }

        // Step 2: exact name match.
        if let Some(name) = customer.municipality_name.clone() {
            let matches = self.geo.find_municipalities_by_name(&name).await?;
            match matches.len() {
                0 => {}
                1 => {
                    let m = &matches[0];
                    customer.state_code = Some(m.state_code.clone());
                    customer.municipality_code = Some(m.code.clone());
                    customer.municipality_name = Some(m.name.clone());
                    return Ok(ResolvedVia::UniqueName);
                }
                _ => {
                    let preferred = matches
                        .iter()
                        .find(|m| m.state_code == self.default_state)
                        .unwrap_or(&matches[0]);
                    customer.state_code = Some(preferred.state_code.clone());
                    customer.municipality_code = Some(preferred.code.clone());
                    customer.municipality_name = Some(preferred.name.clone());
                    return Ok(ResolvedVia::AmbiguousName);
                }
            }
        }

        // Step 3: keep a known ERP-supplied state, else the default.
        if let Some(code) = customer.state_code.clone() {
            if self.geo.get_state(&code).await?.is_some() {
                return Ok(ResolvedVia::ExistingState);
            }
        }
        customer.state_code = Some(self.default_state.clone());
        Ok(ResolvedVia::DefaultState)
    }

    /// Step 4: adopt the state capital (or any municipality) when the
    /// record still has no municipality.
    async fn backfill_municipality(&self, customer: &mut Customer) -> SyncResult<()> {
        if customer.municipality_code.is_some() {
            return Ok(());
        }
        let Some(state) = customer.state_code.clone() else {
            return Ok(());
        };

        let backfill = match self.geo.capital_of(&state).await? {
            Some(capital) => Some(capital),
            None => self.geo.any_in_state(&state).await?,
        };
        if let Some(m) = backfill {
            customer.municipality_code = Some(m.code);
            customer.municipality_name = Some(m.name);
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
