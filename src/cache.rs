//! Memoization of expensive derived results (generated bulletins, reports)
//! keyed by a caller-built fingerprint. Entries never expire; a new value
//! for the same key simply replaces the old one.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::logging::DataSource;
use crate::model::StoreError;
use crate::store::{Store, StoreResult};

#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn Store>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let Some(entry) = self.store.cache_get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&entry.value)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(format!("cache entry '{}': {}", key, e)))
    }

    pub async fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        self.store.cache_upsert(key, &value.to_string()).await
    }

    /// Typed read. A stored value that no longer decodes as `T` is a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let Some(entry) = self.store.cache_get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&entry.value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(source = %DataSource::Database, key, "ignoring undecodable cache entry: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let encoded = serde_json::to_string(value)
            .map_err(|e| StoreError::Corrupt(format!("cache value for '{}': {}", key, e)))?;
        self.store.cache_upsert(key, &encoded).await
    }
}
