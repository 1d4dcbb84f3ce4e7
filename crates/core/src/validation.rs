//! Structured validation failures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field → message map describing everything wrong with a record.
///
/// Validation collects into this map instead of stopping at the first
/// problem, so a caller can surface all failures in one pass. Running the
/// same checks on the same record always produces the same map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map with a single entry, for one-field failures.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Record a failure for `field`. A later message for the same field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(field.into(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn message(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(())` when no failure was recorded, `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl core::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for (field, message) in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_multiple_fields() {
        let mut errors = ValidationErrors::new();
        errors.add("supplier", "a supplier must be selected");
        errors.add("items", "at least one line item is required");

        assert_eq!(errors.len(), 2);
        assert!(errors.contains("supplier"));
        assert!(errors.contains("items"));
        assert_eq!(
            errors.message("supplier"),
            Some("a supplier must be selected")
        );
    }

    #[test]
    fn empty_map_converts_to_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
        assert!(
            ValidationErrors::single("name", "required")
                .into_result()
                .is_err()
        );
    }

    #[test]
    fn display_joins_fields_in_order() {
        let mut errors = ValidationErrors::new();
        errors.add("b", "second");
        errors.add("a", "first");
        assert_eq!(errors.to_string(), "a: first; b: second");
    }
}
