use core::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{DomainError, RecordId, TenantId, ValidationErrors};

/// Budget entry identifier (tenant-scoped at the store boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetId(pub RecordId);

impl BudgetId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BudgetId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Fixed set of budget categories.
///
/// Shared by budget entries, the annual rollup, and the informational
/// category tag on purchase orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BudgetCategory {
    #[serde(rename = "IT")]
    It,
    Marketing,
    Operations,
    Travel,
    Facilities,
    Equipment,
    Other,
}

impl BudgetCategory {
    pub const ALL: [BudgetCategory; 7] = [
        BudgetCategory::It,
        BudgetCategory::Marketing,
        BudgetCategory::Operations,
        BudgetCategory::Travel,
        BudgetCategory::Facilities,
        BudgetCategory::Equipment,
        BudgetCategory::Other,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BudgetCategory::It => "IT",
            BudgetCategory::Marketing => "Marketing",
            BudgetCategory::Operations => "Operations",
            BudgetCategory::Travel => "Travel",
            BudgetCategory::Facilities => "Facilities",
            BudgetCategory::Equipment => "Equipment",
            BudgetCategory::Other => "Other",
        }
    }
}

impl core::fmt::Display for BudgetCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BudgetCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BudgetCategory::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| {
                DomainError::validation_field("category", format!("unknown budget category: {s}"))
            })
    }
}

/// Budget entry lifecycle status (informational; reconciliation does not
/// depend on it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Draft,
    Active,
    Completed,
}

/// A budget allocation entry.
///
/// Entries are append-only from the rollup's perspective: creating one feeds
/// the year's [`crate::AnnualBudget`]; editing or deleting one never adjusts
/// it (the rebuild operation is the correction tool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub tenant_id: TenantId,
    pub name: String,
    pub category: BudgetCategory,
    /// Free period label, e.g. "Q3 2025".
    pub period: String,
    /// Allocated amount in smallest currency unit (e.g., cents).
    pub allocated: u64,
    /// Spent amount; set only by expense recording.
    pub spent: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BudgetStatus,
    /// Overrides the year derived from `start_date` when present.
    pub year_override: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    /// Rollup year: the explicit override, else the start date's calendar year.
    pub fn year(&self) -> i32 {
        self.year_override.unwrap_or_else(|| self.start_date.year())
    }

    /// Creation-time checks, collected per field.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.name.trim().is_empty() {
            errors.add("name", "a budget name is required");
        }
        if self.end_date < self.start_date {
            errors.add("end_date", "the end date must not precede the start date");
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_budget() -> Budget {
        Budget {
            id: BudgetId::new(RecordId::new()),
            tenant_id: TenantId::new(),
            name: "Infrastructure refresh".to_string(),
            category: BudgetCategory::It,
            period: "Q3 2025".to_string(),
            allocated: 100_000,
            spent: 0,
            start_date: date(2025, 7, 1),
            end_date: date(2025, 9, 30),
            status: BudgetStatus::Active,
            year_override: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn year_derives_from_start_date() {
        let budget = test_budget();
        assert_eq!(budget.year(), 2025);
    }

    #[test]
    fn year_override_wins_over_start_date() {
        let mut budget = test_budget();
        budget.year_override = Some(2026);
        assert_eq!(budget.year(), 2026);
    }

    #[test]
    fn validate_rejects_blank_name_and_inverted_dates() {
        let mut budget = test_budget();
        budget.name = "  ".to_string();
        budget.end_date = date(2025, 6, 1);

        let errors = budget.validate().unwrap_err();
        assert!(errors.contains("name"));
        assert!(errors.contains("end_date"));
    }

    #[test]
    fn category_serializes_to_its_display_name() {
        let json = serde_json::to_value(BudgetCategory::It).unwrap();
        assert_eq!(json, serde_json::json!("IT"));
        let json = serde_json::to_value(BudgetCategory::Marketing).unwrap();
        assert_eq!(json, serde_json::json!("Marketing"));
    }

    #[test]
    fn category_parses_from_its_display_name() {
        for category in BudgetCategory::ALL {
            let parsed: BudgetCategory = category.name().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("Snacks".parse::<BudgetCategory>().is_err());
    }
}
