//! Value store bridge
//!
//! The bridge never owns stored values. It talks to the script repository of
//! the hosting shell through [`ScriptStore`] and does not cache anything
//! between calls, so atomicity of get/set/delete is whatever the repository
//! provides.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::identity::ScriptId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store lock poisoned: {0}")]
    Lock(String),
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store data invalid: {0}")]
    InvalidData(#[from] serde_json::Error),
}

/// Values persisted by the script repository, scoped per script
pub trait ScriptStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read
    fn get_value(&self, script: &ScriptId, key: &str) -> Result<Option<String>, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the repository cannot be written
    fn set_value(&self, script: &ScriptId, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a key that does not exist is not an error
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be written
    fn delete_value(&self, script: &ScriptId, key: &str) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns an error if the repository cannot be read
    fn value_names(&self, script: &ScriptId) -> Result<Vec<String>, StoreError>;
}

type Values = HashMap<ScriptId, BTreeMap<String, String>>;

/// Thread-safe in-memory store, cloning shares the same values
#[derive(Clone, Default)]
pub struct MemoryScriptStore {
    values: Arc<RwLock<Values>>,
}

impl std::fmt::Debug for MemoryScriptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scripts = self.values.read().map(|v| v.len()).unwrap_or_default();
        f.debug_struct("MemoryScriptStore")
            .field("script_count", &scripts)
            .finish()
    }
}

impl MemoryScriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(err: &std::sync::PoisonError<T>) -> StoreError {
    StoreError::Lock(err.to_string())
}

impl ScriptStore for MemoryScriptStore {
    fn get_value(&self, script: &ScriptId, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.read().map_err(|e| poisoned(&e))?;
        Ok(values.get(script).and_then(|v| v.get(key)).cloned())
    }

    fn set_value(&self, script: &ScriptId, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().map_err(|e| poisoned(&e))?;
        values
            .entry(script.clone())
            .or_default()
            .insert(key.into(), value.into());
        Ok(())
    }

    fn delete_value(&self, script: &ScriptId, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().map_err(|e| poisoned(&e))?;
        if let Some(script_values) = values.get_mut(script) {
            script_values.remove(key);
            if script_values.is_empty() {
                values.remove(script);
            }
        }
        Ok(())
    }

    fn value_names(&self, script: &ScriptId) -> Result<Vec<String>, StoreError> {
        let values = self.values.read().map_err(|e| poisoned(&e))?;
        Ok(values
            .get(script)
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default())
    }
}
