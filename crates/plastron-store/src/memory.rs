use crate::{StateStore, StoreError};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory state store for tests and ephemeral runs.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::LockFailed(format!("mutex poisoned: {e}")))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::LockFailed(format!("mutex poisoned: {e}")))?;
        entries.insert(key.to_owned(), value.clone());
        Ok(())
    }
}
