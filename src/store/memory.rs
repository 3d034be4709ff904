use dashmap::DashMap;
use serde_json::Value;

use super::{Record, Store, StoreError};

/// A [`Store`] kept in process memory, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    labels: DashMap<String, Record, ahash::RandomState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn update(&self, label: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.labels
            .entry(label.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn recall(&self, label: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.labels.get(label).map(|entry| entry.value().clone()))
    }

    fn forget(&self, label: &str) -> Result<(), StoreError> {
        self.labels.remove(label);
        Ok(())
    }
}
