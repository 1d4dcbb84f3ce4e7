use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procura_core::DomainError;

use crate::budget::BudgetCategory;

/// Per-category accumulated allocation within one year's rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: BudgetCategory,
    /// Accumulated allocation in smallest currency unit (e.g., cents).
    pub amount: u64,
}

/// Derived aggregate summarizing all budget entries of one (tenant, year).
///
/// Not an independent source of truth: `total` always equals the sum of the
/// category rows, and each row equals the sum of the allocations folded into
/// it. The only legitimate mutation path is [`AnnualBudget::credit`]; the
/// persistence layer guards concurrent folds with a compare-and-swap write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnualBudget {
    pub year: i32,
    /// Sum of all category amounts, recomputed on every merge.
    pub total: u64,
    /// One row per category; category names are unique.
    pub categories: Vec<CategoryTotal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnnualBudget {
    /// Store key for a year's rollup (the store scopes by tenant).
    pub fn document_key(year: i32) -> String {
        year.to_string()
    }

    /// Fresh rollup with no allocations yet.
    pub fn new(year: i32, at: DateTime<Utc>) -> Self {
        Self {
            year,
            total: 0,
            categories: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    /// Fold one new allocation into the rollup.
    ///
    /// Additive merge: the amount is **added** to the category's row (a row is
    /// appended for an unseen category), never subtracted or overwritten, so
    /// replaying any interleaving of entry creations reproduces the same sums.
    /// `total` is recomputed from the rows rather than adjusted in place.
    pub fn credit(
        &mut self,
        category: BudgetCategory,
        amount: u64,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        match self.categories.iter_mut().find(|c| c.category == category) {
            Some(row) => {
                row.amount = row.amount.checked_add(amount).ok_or_else(|| {
                    DomainError::validation_field("allocated", "category amount overflow")
                })?;
            }
            None => self.categories.push(CategoryTotal { category, amount }),
        }
        self.total = Self::sum(&self.categories)?;
        self.updated_at = at;
        Ok(())
    }

    /// Accumulated amount for a category (0 when the category has no row).
    pub fn amount_for(&self, category: BudgetCategory) -> u64 {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.amount)
            .unwrap_or(0)
    }

    /// Whether the stored total still equals the sum of the rows.
    pub fn is_consistent(&self) -> bool {
        Self::sum(&self.categories).is_ok_and(|sum| sum == self.total)
    }

    fn sum(categories: &[CategoryTotal]) -> Result<u64, DomainError> {
        categories.iter().try_fold(0u64, |acc, row| {
            acc.checked_add(row.amount).ok_or_else(|| {
                DomainError::validation_field("total", "annual budget total overflow")
            })
        })
    }
}
