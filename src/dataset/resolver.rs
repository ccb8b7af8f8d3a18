//! Dataset Resolver: which dataset a user's analytics run against.
//!
//! 1. The user's active dataset, if the store has one with rows.
//! 2. Otherwise the sample dataset, if the fallback policy grants it.
//! 3. Otherwise an empty dataset with the canonical columns.
//!
//! Absence is never an error; `Err` only surfaces real storage failures.

use std::sync::Arc;

use anyhow::{Context, Result};

use super::Dataset;
use super::sample::DatasetProvider;
use crate::config::schema::{DatasetConfig, Fallback};
use crate::store::DatasetStore;

/// Who receives the sample dataset when they have nothing active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub fallback: Fallback,
    /// Compared case-insensitively.
    pub sample_users: Vec<String>,
}

impl FallbackPolicy {
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            fallback: config.fallback,
            sample_users: config.sample_users.clone(),
        }
    }

    pub fn grants_sample(&self, user_id: &str) -> bool {
        self.fallback == Fallback::Sample
            || self
                .sample_users
                .iter()
                .any(|u| u.trim().eq_ignore_ascii_case(user_id.trim()))
    }
}

/// Resolves a user id to the raw (not yet coerced) dataset to analyse.
#[derive(Clone)]
pub struct DatasetResolver {
    store: Arc<dyn DatasetStore>,
    sample: Arc<dyn DatasetProvider>,
    policy: FallbackPolicy,
}

impl DatasetResolver {
    pub fn new(
        store: Arc<dyn DatasetStore>,
        sample: Arc<dyn DatasetProvider>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            store,
            sample,
            policy,
        }
    }

    pub fn resolve(&self, user_id: &str) -> Result<Dataset> {
        let active = self
            .store
            .active_dataset(user_id)
            .with_context(|| format!("failed to load active dataset for user {user_id}"))?;

        if let Some(active) = active
            && !active.data.is_empty()
        {
            return Ok(active.to_dataset());
        }

        if self.policy.grants_sample(user_id) {
            return self.sample.dataset().context("failed to load sample dataset");
        }

        Ok(Dataset::empty_canonical())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::dataset::{CANONICAL_COLUMNS, Cell};
    use crate::store::ActiveDataset;

    struct MemoryStore(HashMap<String, ActiveDataset>);

    impl DatasetStore for MemoryStore {
        fn active_dataset(&self, user_id: &str) -> Result<Option<ActiveDataset>> {
            Ok(self.0.get(user_id).cloned())
        }
    }

    struct FailingStore;

    impl DatasetStore for FailingStore {
        fn active_dataset(&self, _user_id: &str) -> Result<Option<ActiveDataset>> {
            anyhow::bail!("disk on fire")
        }
    }

    struct OneRowSample;

    impl DatasetProvider for OneRowSample {
        fn dataset(&self) -> Result<Dataset> {
            let mut ds = Dataset::new(vec!["CompanyName".into()]);
            ds.push_row(vec![Cell::Text("Sample".into())]);
            Ok(ds)
        }
    }

    fn active(rows: serde_json::Value) -> ActiveDataset {
        ActiveDataset {
            filename: Some("mine.csv".into()),
            columns: vec!["CompanyName".into()],
            data: rows
                .as_array()
                .unwrap()
                .iter()
                .map(|r| r.as_object().unwrap().clone())
                .collect(),
            upload_id: None,
            updated_at: Utc::now(),
        }
    }

    fn resolver(store: impl DatasetStore + 'static, policy: FallbackPolicy) -> DatasetResolver {
        DatasetResolver::new(Arc::new(store), Arc::new(OneRowSample), policy)
    }

    fn seeded_policy() -> FallbackPolicy {
        FallbackPolicy {
            fallback: Fallback::Empty,
            sample_users: vec!["Test@Esg.Local".into()],
        }
    }

    #[test]
    fn active_dataset_wins() {
        let mut users = HashMap::new();
        users.insert("u1".to_string(), active(json!([{"CompanyName": "Mine"}])));
        let ds = resolver(MemoryStore(users), seeded_policy()).resolve("u1").unwrap();
        assert_eq!(ds.rows()[0][0], Cell::Text("Mine".into()));
    }

    #[test]
    fn unknown_user_gets_empty_canonical_dataset() {
        let ds = resolver(MemoryStore(HashMap::new()), seeded_policy())
            .resolve("nobody")
            .unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.columns().len(), CANONICAL_COLUMNS.len());
    }

    #[test]
    fn seeded_user_gets_sample_case_insensitively() {
        let ds = resolver(MemoryStore(HashMap::new()), seeded_policy())
            .resolve("test@esg.local")
            .unwrap();
        assert_eq!(ds.rows()[0][0], Cell::Text("Sample".into()));
    }

    #[test]
    fn empty_active_dataset_falls_through() {
        let mut users = HashMap::new();
        users.insert("u1".to_string(), active(json!([])));
        let policy = FallbackPolicy {
            fallback: Fallback::Sample,
            sample_users: Vec::new(),
        };
        let ds = resolver(MemoryStore(users), policy).resolve("u1").unwrap();
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn storage_failure_is_an_error() {
        assert!(resolver(FailingStore, seeded_policy()).resolve("u1").is_err());
    }
}
