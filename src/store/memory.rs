//! In-memory store: for tests and sessions that should leave nothing behind.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::traits::{LegacyStore, PersistenceAdapter, StoreKind, StoredState};

/// Process-local store implementing both persistence contracts.
///
/// The record is kept serialized so a load always returns an independent
/// copy of the last complete write.
#[derive(Default)]
pub struct MemoryStore {
    record: RwLock<Option<String>>,
    raw: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with raw flat keys.
    pub fn with_raw<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        let raw = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            record: RwLock::new(None),
            raw: RwLock::new(raw),
        }
    }

    /// Copy of every raw key currently stored.
    pub async fn raw_entries(&self) -> BTreeMap<String, serde_json::Value> {
        self.raw.read().await.clone()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Local
    }

    async fn load_all(&self) -> Result<Option<StoredState>, StoreError> {
        let record = self.record.read().await;
        record
            .as_deref()
            .map(|json| {
                serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .transpose()
    }

    async fn save_all(&self, state: &StoredState) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        *self.record.write().await = Some(json);
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        *self.record.write().await = None;
        Ok(())
    }
}

#[async_trait]
impl LegacyStore for MemoryStore {
    async fn read_raw(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.raw.read().await.get(key).cloned())
    }

    async fn write_raw(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        self.raw.write().await.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete_raw(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.raw.write().await.remove(key).is_some())
    }
}
