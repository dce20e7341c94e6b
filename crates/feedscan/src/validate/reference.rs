//! Reference data consulted by the validator.
//!
//! A snapshot is taken once when a job enters PROCESSING and shared
//! read-only across all fragment workers, so mid-job changes to the
//! underlying tables never affect a running job.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::ReferenceError;

/// Immutable category -> allowed-values mapping.
#[derive(Debug, Default, Clone)]
pub struct ReferenceData {
    sets: HashMap<String, HashSet<String>>,
}

impl ReferenceData {
    pub fn new(sets: HashMap<String, HashSet<String>>) -> Self {
        Self { sets }
    }

    /// Membership test. A category with no loaded values does not
    /// constrain the field.
    pub fn is_member(&self, category: &str, value: &str) -> bool {
        match self.sets.get(category) {
            Some(set) if !set.is_empty() => set.contains(value),
            _ => true,
        }
    }

    pub fn category_count(&self) -> usize {
        self.sets.len()
    }

    pub fn value_count(&self) -> usize {
        self.sets.values().map(HashSet::len).sum()
    }
}

/// Supplies the reference snapshot at job start.
#[async_trait]
pub trait ReferenceProvider: Send + Sync {
    async fn load(&self) -> Result<ReferenceData, ReferenceError>;
}

/// Provider over a fixed in-memory snapshot.
#[derive(Debug, Default, Clone)]
pub struct StaticReferenceProvider {
    data: ReferenceData,
}

impl StaticReferenceProvider {
    pub fn new(data: ReferenceData) -> Self {
        Self { data }
    }

    /// Convenience constructor from category/value slices.
    pub fn from_slices(categories: &[(&str, &[&str])]) -> Self {
        let mut sets = HashMap::new();
        for (category, values) in categories {
            let set: HashSet<String> = values.iter().map(|v| v.to_string()).collect();
            sets.insert(category.to_string(), set);
        }
        Self::new(ReferenceData::new(sets))
    }
}

#[async_trait]
impl ReferenceProvider for StaticReferenceProvider {
    async fn load(&self) -> Result<ReferenceData, ReferenceError> {
        Ok(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let provider = StaticReferenceProvider::from_slices(&[("currencies", &["EUR", "USD"][..])]);
        let data = provider.data;

        assert!(data.is_member("currencies", "EUR"));
        assert!(!data.is_member("currencies", "GBP"));
    }

    #[test]
    fn test_unknown_category_does_not_constrain() {
        let data = ReferenceData::default();
        assert!(data.is_member("currencies", "anything"));
    }

    #[test]
    fn test_counts() {
        let provider = StaticReferenceProvider::from_slices(&[
            ("currencies", &["EUR", "USD"][..]),
            ("provinces", &["BC"][..]),
        ]);
        assert_eq!(provider.data.category_count(), 2);
        assert_eq!(provider.data.value_count(), 3);
    }
}
