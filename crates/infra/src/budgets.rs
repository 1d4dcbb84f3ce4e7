//! Budget ledger orchestration: entry persistence and rollup reconciliation.
//!
//! The annual rollup is the one document touched by every independent entry
//! creation, so it is the one place that needs a concurrency-safe update
//! discipline: read, fold, compare-and-swap write, retry on conflict. The
//! fold itself is commutative (a sum), so any interleaving of concurrent
//! creations converges to the same rollup.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use thiserror::Error;

use procura_budgets::{AnnualBudget, Budget, BudgetCategory, BudgetId, BudgetStatus};
use procura_core::{DomainError, ExpectedRevision, RecordId, TenantId, ValidationErrors};

use crate::document_store::{DocumentStore, StoreError, collections};

const RECONCILE_ATTEMPTS: usize = 8;

/// Budget ledger operation error.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Field → message map; nothing was written.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("budget not found")]
    NotFound,

    /// Concurrent writers kept winning; the operation gave up.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(errors) => LedgerError::Validation(errors),
            DomainError::Conflict(msg) => LedgerError::Conflict(msg),
            DomainError::NotFound => LedgerError::NotFound,
            DomainError::Precondition(msg) => LedgerError::Conflict(msg),
            DomainError::InvalidId(msg) => {
                LedgerError::Validation(ValidationErrors::single("id", msg))
            }
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            StoreError::NotFound { .. } => LedgerError::NotFound,
            other => LedgerError::Store(other),
        }
    }
}

/// Input for a new budget allocation entry.
#[derive(Debug, Clone)]
pub struct NewBudget {
    pub name: String,
    pub category: BudgetCategory,
    pub period: String,
    /// Allocated amount in smallest currency unit (e.g., cents).
    pub allocated: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BudgetStatus,
    /// Overrides the year derived from `start_date` when present.
    pub year_override: Option<i32>,
}

/// Budget ledger service.
#[derive(Debug)]
pub struct BudgetService<S> {
    store: S,
}

impl<S> BudgetService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S> BudgetService<S>
where
    S: DocumentStore,
{
    /// Record a new allocation entry and fold it into its year's rollup.
    ///
    /// The entry is persisted unconditionally first; the rollup update then
    /// runs its own compare-and-swap retry loop. Entries are append-only from
    /// the rollup's perspective: later edits or deletions of an entry do not
    /// adjust the rollup ([`BudgetService::rebuild_rollups`] is the
    /// correction tool).
    pub async fn record_budget(
        &self,
        tenant_id: TenantId,
        new: NewBudget,
    ) -> Result<Budget, LedgerError> {
        let now = Utc::now();
        let budget = Budget {
            id: BudgetId::new(RecordId::new()),
            tenant_id,
            name: new.name,
            category: new.category,
            period: new.period,
            allocated: new.allocated,
            spent: 0,
            start_date: new.start_date,
            end_date: new.end_date,
            status: new.status,
            year_override: new.year_override,
            created_at: now,
            updated_at: now,
        };
        budget.validate().map_err(LedgerError::Validation)?;

        self.store
            .put(
                tenant_id,
                collections::BUDGETS,
                &budget.id.to_string(),
                to_document(&budget)?,
                ExpectedRevision::NoDocument,
            )
            .await?;

        let rollup = self
            .reconcile(tenant_id, budget.year(), budget.category, budget.allocated)
            .await?;
        tracing::info!(
            budget = %budget.id,
            year = budget.year(),
            category = %budget.category,
            rollup_total = rollup.total,
            "budget recorded and reconciled"
        );

        Ok(budget)
    }

    /// Record the spent-to-date figure on an entry.
    ///
    /// Overwrites rather than accumulates: callers report a point-in-time
    /// figure. The rollup is never touched by expense recording.
    pub async fn record_expense(
        &self,
        tenant_id: TenantId,
        budget_id: BudgetId,
        amount: u64,
    ) -> Result<Budget, LedgerError> {
        let key = budget_id.to_string();
        let document = self
            .store
            .get(tenant_id, collections::BUDGETS, &key)
            .await?
            .ok_or(LedgerError::NotFound)?;
        let mut budget: Budget = from_document(document.value)?;

        let now = Utc::now();
        self.store
            .merge(
                tenant_id,
                collections::BUDGETS,
                &key,
                json!({ "spent": amount, "updated_at": now }),
            )
            .await?;

        budget.spent = amount;
        budget.updated_at = now;
        Ok(budget)
    }

    pub async fn get_budget(
        &self,
        tenant_id: TenantId,
        budget_id: BudgetId,
    ) -> Result<Budget, LedgerError> {
        let document = self
            .store
            .get(tenant_id, collections::BUDGETS, &budget_id.to_string())
            .await?
            .ok_or(LedgerError::NotFound)?;
        from_document(document.value)
    }

    pub async fn list_budgets(&self, tenant_id: TenantId) -> Result<Vec<Budget>, LedgerError> {
        let documents = self
            .store
            .query(tenant_id, collections::BUDGETS, &|_| true)
            .await?;
        documents
            .into_iter()
            .map(|doc| from_document(doc.value))
            .collect()
    }

    /// The year's rollup, if any entry has ever been reconciled into it.
    pub async fn get_annual(
        &self,
        tenant_id: TenantId,
        year: i32,
    ) -> Result<Option<AnnualBudget>, LedgerError> {
        let document = self
            .store
            .get(
                tenant_id,
                collections::ANNUAL_BUDGETS,
                &AnnualBudget::document_key(year),
            )
            .await?;
        document.map(|doc| from_document(doc.value)).transpose()
    }

    /// Explicit, idempotent repair: recompute every year's rollup from the
    /// full entry set. Replaying entries reproduces the same sums as the
    /// incremental fold, so running this after a suspected divergence (or
    /// twice in a row) converges on the same documents. Invoked deliberately,
    /// never as a side effect of reads.
    pub async fn rebuild_rollups(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<AnnualBudget>, LedgerError> {
        let entries = self.list_budgets(tenant_id).await?;
        let mut years: Vec<i32> = entries.iter().map(|entry| entry.year()).collect();
        years.sort_unstable();
        years.dedup();

        let mut rebuilt = Vec::with_capacity(years.len());
        for year in years {
            rebuilt.push(self.rebuild_year(tenant_id, year).await?);
        }
        tracing::info!(years = rebuilt.len(), "annual rollups rebuilt");
        Ok(rebuilt)
    }

    /// Fold one allocation into its year's rollup with compare-and-swap and
    /// bounded reload-and-retry. Two concurrent folds for the same year both
    /// land: the loser of the race re-reads and re-applies.
    async fn reconcile(
        &self,
        tenant_id: TenantId,
        year: i32,
        category: BudgetCategory,
        amount: u64,
    ) -> Result<AnnualBudget, LedgerError> {
        let key = AnnualBudget::document_key(year);
        for attempt in 0..RECONCILE_ATTEMPTS {
            let now = Utc::now();
            let (mut rollup, expected) = match self
                .store
                .get(tenant_id, collections::ANNUAL_BUDGETS, &key)
                .await?
            {
                Some(doc) => (
                    from_document::<AnnualBudget>(doc.value)?,
                    ExpectedRevision::Exact(doc.revision),
                ),
                None => (AnnualBudget::new(year, now), ExpectedRevision::NoDocument),
            };

            rollup.credit(category, amount, now)?;

            let write = self
                .store
                .put(
                    tenant_id,
                    collections::ANNUAL_BUDGETS,
                    &key,
                    to_document(&rollup)?,
                    expected,
                )
                .await;
            match write {
                Ok(_) => return Ok(rollup),
                Err(StoreError::Conflict(reason)) => {
                    tracing::debug!(year, attempt, %reason, "rollup write conflicted, retrying");
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(LedgerError::Conflict(format!(
            "annual rollup for {year} kept conflicting after {RECONCILE_ATTEMPTS} attempts"
        )))
    }

    async fn rebuild_year(
        &self,
        tenant_id: TenantId,
        year: i32,
    ) -> Result<AnnualBudget, LedgerError> {
        let key = AnnualBudget::document_key(year);
        for attempt in 0..RECONCILE_ATTEMPTS {
            // Re-read entries every attempt: a concurrent creation between the
            // query and the write shows up as a revision conflict below.
            let entries = self.list_budgets(tenant_id).await?;
            let existing = self
                .store
                .get(tenant_id, collections::ANNUAL_BUDGETS, &key)
                .await?;

            let now = Utc::now();
            let (created_at, expected) = match &existing {
                Some(doc) => (
                    from_document::<AnnualBudget>(doc.value.clone())?.created_at,
                    ExpectedRevision::Exact(doc.revision),
                ),
                None => (now, ExpectedRevision::NoDocument),
            };

            let mut rollup = AnnualBudget::new(year, now);
            rollup.created_at = created_at;
            for entry in entries.iter().filter(|entry| entry.year() == year) {
                rollup.credit(entry.category, entry.allocated, now)?;
            }

            let write = self
                .store
                .put(
                    tenant_id,
                    collections::ANNUAL_BUDGETS,
                    &key,
                    to_document(&rollup)?,
                    expected,
                )
                .await;
            match write {
                Ok(_) => return Ok(rollup),
                Err(StoreError::Conflict(reason)) => {
                    tracing::debug!(year, attempt, %reason, "rollup rebuild conflicted, retrying");
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(LedgerError::Conflict(format!(
            "annual rollup rebuild for {year} kept conflicting after {RECONCILE_ATTEMPTS} attempts"
        )))
    }
}

fn to_document<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, LedgerError> {
    serde_json::to_value(value)
        .map_err(|e| LedgerError::Store(StoreError::Serialization(e.to_string())))
}

fn from_document<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T, LedgerError> {
    serde_json::from_value(value)
        .map_err(|e| LedgerError::Store(StoreError::Serialization(e.to_string())))
}
