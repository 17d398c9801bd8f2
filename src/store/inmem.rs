//! In-memory state store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::week::WeekKey;

use super::StateStore;

/// Process-local store. State is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<WeekKey, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<WeekKey, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Store("in-memory store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get(&self, key: &WeekKey) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &WeekKey, value: &str) -> Result<()> {
        self.entries()?.insert(*key, value.to_string());
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &WeekKey,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool> {
        let mut entries = self.entries()?;
        if entries.get(key).map(String::as_str) != expected {
            return Ok(false);
        }
        entries.insert(*key, value.to_string());
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &WeekKey, expected: &str) -> Result<bool> {
        let mut entries = self.entries()?;
        if entries.get(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }

    async fn delete(&self, key: &WeekKey) -> Result<bool> {
        Ok(self.entries()?.remove(key).is_some())
    }
}
