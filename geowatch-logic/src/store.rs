use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::prelude::*;

/// The host's session-scoped key/value bag that story content reads variables from
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Store `value` under `key` unless something is already there.
    /// Returns whether the value was inserted.
    fn set_if_absent(&self, key: &str, value: Value) -> bool {
        if self.contains(key) {
            false
        } else {
            self.set(key, value);
            true
        }
    }
}

/// Read `key` from `store` and decode it into `T`
pub fn read_typed<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    store
        .get(key)
        .map(serde_json::from_value)
        .transpose()
        .with_context(|| format!("Variable \"{key}\" has an unexpected shape"))
}

/// Encode `value` and write it to `store` under `key`
pub fn write_typed<T: Serialize>(store: &dyn StateStore, key: &str, value: &T) -> Result {
    let value = serde_json::to_value(value).context("Failed to encode variable")?;
    store.set(key, value);
    Ok(())
}

#[derive(Debug, Default)]
/// A [StateStore] kept in memory for the lifetime of the process
pub struct MemoryStore(Mutex<HashMap<String, Value>>);

impl MemoryStore {
    fn vars(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        // A panic while holding the lock can't leave the map half-written
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn keys(&self) -> Vec<String> {
        self.vars().keys().cloned().collect()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.vars().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.vars().insert(key.to_string(), value);
    }

    fn contains(&self, key: &str) -> bool {
        self.vars().contains_key(key)
    }

    fn set_if_absent(&self, key: &str, value: Value) -> bool {
        let mut vars = self.vars();
        if vars.contains_key(key) {
            false
        } else {
            vars.insert(key.to_string(), value);
            true
        }
    }
}
