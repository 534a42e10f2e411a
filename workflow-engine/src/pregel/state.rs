//! Run-scoped shared state
//!
//! A key/value table visible to every executor of one run. Writes take the
//! write lock, so concurrent executors in the same superstep are serialized
//! and the last writer wins.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::error::WorkflowError;

/// Handle to the shared state of one run. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot
    pub fn from_snapshot(values: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(values)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    /// Read and decode a value
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, WorkflowError> {
        match self.get(key).await {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| WorkflowError::serialization(format!("shared state '{}': {}", key, e))),
            None => Ok(None),
        }
    }

    /// Write a value, returning the previous one
    pub async fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.write().await.insert(key.into(), value)
    }

    /// Encode and write a value
    pub async fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<(), WorkflowError> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| WorkflowError::serialization(format!("shared state '{}': {}", key, e)))?;
        self.set(key, value).await;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Option<Value> {
        self.inner.write().await.remove(key)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Copy of the whole table, used for checkpoints
    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().await.clone()
    }

    /// Replace the whole table
    pub async fn restore(&self, values: HashMap<String, Value>) {
        *self.inner.write().await = values;
    }
}
