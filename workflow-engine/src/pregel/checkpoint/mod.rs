//! Checkpointing for workflow runs
//!
//! A checkpoint captures everything needed to continue a run in a fresh
//! process: queued messages with their sequence numbers, shared state,
//! outstanding requests and partially filled fan-in buffers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               CheckpointStore                │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐    │
//! │  │  Memory  │  │   File   │  │  SQLite  │    │
//! │  └──────────┘  └──────────┘  └──────────┘    │
//! │        └────────────┴────────────┘           │
//! │                     ▼                        │
//! │                 Checkpoint                   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let store = create_checkpoint_store(CheckpointStoreConfig::File {
//!     path: PathBuf::from("./checkpoints"),
//!     compression: true,
//! })
//! .await?;
//!
//! let workflow = WorkflowBuilder::new()
//!     // ...
//!     .with_checkpointing(store.clone())
//!     .build()?;
//!
//! if let Some(latest) = store.latest(workflow.id()).await? {
//!     workflow.run_from_checkpoint(&latest.checkpoint_id).await?;
//! }
//! ```

mod file;
#[cfg(feature = "checkpointer-sqlite")]
mod sqlite;

pub use file::FileCheckpointStore;
#[cfg(feature = "checkpointer-sqlite")]
pub use sqlite::SqliteCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use super::error::WorkflowError;
use super::events::RunState;
use super::executor::ExecutorId;
use super::message::Message;
use super::request::PendingRequest;
use crate::workflow::router::FanInBuffer;

/// Persisted snapshot of a run at a superstep boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Workflow the run belongs to
    pub workflow_id: String,

    /// Unique identifier of this checkpoint
    pub checkpoint_id: String,

    /// When this checkpoint was created
    pub created_at: DateTime<Utc>,

    /// Run the checkpoint was taken from
    pub run_id: String,

    /// Number of completed supersteps
    pub superstep: usize,

    /// Run state at the time of the checkpoint
    pub state: RunState,

    /// Next sequence number to assign
    pub next_seq: u64,

    /// Next request batch number to assign
    pub next_batch: u64,

    /// Queued messages per destination, each keeping its `seq`
    pub in_flight_messages: BTreeMap<ExecutorId, Vec<Message>>,

    /// Shared state table
    pub shared_state: HashMap<String, Value>,

    /// Requests raised and not yet released, with answers collected so far
    pub outstanding_requests: Vec<PendingRequest>,

    /// Fan-in results buffered for incomplete rounds
    #[serde(default)]
    pub fan_in_buffers: Vec<FanInBuffer>,

    /// Optional metadata for debugging or external tools
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Checkpoint {
    /// Create an empty checkpoint with a fresh id
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>, superstep: usize) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            run_id: run_id.into(),
            superstep,
            state: RunState::Running,
            next_seq: 0,
            next_batch: 0,
            in_flight_messages: BTreeMap::new(),
            shared_state: HashMap::new(),
            outstanding_requests: Vec::new(),
            fan_in_buffers: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to this checkpoint
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Total number of queued messages across all executors
    pub fn pending_message_count(&self) -> usize {
        self.in_flight_messages.values().map(|v| v.len()).sum()
    }

    /// Queued deliveries in original FIFO order
    pub fn queued_deliveries(&self) -> Vec<(ExecutorId, Message)> {
        let mut deliveries: Vec<(ExecutorId, Message)> = self
            .in_flight_messages
            .iter()
            .flat_map(|(id, messages)| messages.iter().map(move |m| (id.clone(), m.clone())))
            .collect();
        deliveries.sort_by_key(|(_, m)| m.seq);
        deliveries
    }

    /// Summary used by listings
    pub fn metadata_summary(&self) -> CheckpointMetadata {
        CheckpointMetadata {
            checkpoint_id: self.checkpoint_id.clone(),
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
            created_at: self.created_at,
            superstep: self.superstep,
            state: self.state,
            pending_messages: self.pending_message_count(),
            pending_requests: self.outstanding_requests.iter().filter(|r| !r.is_answered()).count(),
        }
    }

    pub(crate) fn reissued(&self) -> Self {
        let mut copy = self.clone();
        copy.checkpoint_id = uuid::Uuid::new_v4().to_string();
        copy
    }
}

/// Listing entry for a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub checkpoint_id: String,
    pub workflow_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub superstep: usize,
    pub state: RunState,
    pub pending_messages: usize,
    pub pending_requests: usize,
}

pub(crate) fn sort_metadata(entries: &mut [CheckpointMetadata]) {
    entries.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then(a.superstep.cmp(&b.superstep))
    });
}

/// Trait for checkpoint persistence.
///
/// Saved checkpoints are immutable: saving a checkpoint whose id is already
/// stored writes a copy under a fresh id and returns that id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Save a checkpoint and return the id it was stored under.
    ///
    /// Implementations must write atomically so a partial checkpoint is
    /// never observable.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<String, WorkflowError>;

    /// Load a checkpoint by id.
    async fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, WorkflowError>;

    /// List checkpoints of a workflow, oldest first.
    async fn list(&self, workflow_id: &str) -> Result<Vec<CheckpointMetadata>, WorkflowError>;

    /// Delete a checkpoint, returning whether it existed.
    async fn delete(&self, checkpoint_id: &str) -> Result<bool, WorkflowError>;

    /// Load the most recent checkpoint of a workflow.
    async fn latest(&self, workflow_id: &str) -> Result<Option<Checkpoint>, WorkflowError> {
        match self.list(workflow_id).await?.last() {
            Some(entry) => self.load(&entry.checkpoint_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Prune checkpoints, keeping only the most recent `keep`.
    async fn prune(&self, workflow_id: &str, keep: usize) -> Result<usize, WorkflowError> {
        let checkpoints = self.list(workflow_id).await?;
        let to_delete = checkpoints.len().saturating_sub(keep);
        let mut deleted = 0;

        for entry in checkpoints.into_iter().take(to_delete) {
            if self.delete(&entry.checkpoint_id).await? {
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Clear all checkpoints of a workflow.
    async fn clear(&self, workflow_id: &str) -> Result<(), WorkflowError> {
        for entry in self.list(workflow_id).await? {
            self.delete(&entry.checkpoint_id).await?;
        }
        Ok(())
    }
}

/// Configuration for creating checkpoint stores.
///
/// Use with [`create_checkpoint_store`] to instantiate the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckpointStoreConfig {
    /// In-memory store (not durable)
    #[default]
    Memory,

    /// File-based store
    File {
        /// Base directory for checkpoint files
        path: PathBuf,
        /// Whether to compress checkpoint data (uses zstd)
        #[serde(default)]
        compression: bool,
    },

    /// SQLite-based store (requires `checkpointer-sqlite` feature)
    #[cfg(feature = "checkpointer-sqlite")]
    Sqlite {
        /// Path to the SQLite database file, or `:memory:`
        path: String,
        #[serde(default)]
        compression: bool,
    },
}

/// In-memory checkpoint store for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: tokio::sync::RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<String, WorkflowError> {
        let mut checkpoints = self.checkpoints.write().await;
        let stored = if checkpoints.contains_key(&checkpoint.checkpoint_id) {
            checkpoint.reissued()
        } else {
            checkpoint.clone()
        };
        let id = stored.checkpoint_id.clone();
        checkpoints.insert(id.clone(), stored);
        Ok(id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, WorkflowError> {
        let checkpoints = self.checkpoints.read().await;
        checkpoints
            .get(checkpoint_id)
            .cloned()
            .ok_or_else(|| WorkflowError::CheckpointNotFound(checkpoint_id.to_string()))
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<CheckpointMetadata>, WorkflowError> {
        let checkpoints = self.checkpoints.read().await;
        let mut entries: Vec<CheckpointMetadata> = checkpoints
            .values()
            .filter(|c| c.workflow_id == workflow_id)
            .map(Checkpoint::metadata_summary)
            .collect();
        sort_metadata(&mut entries);
        Ok(entries)
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<bool, WorkflowError> {
        let mut checkpoints = self.checkpoints.write().await;
        Ok(checkpoints.remove(checkpoint_id).is_some())
    }
}

/// Create a checkpoint store from configuration.
///
/// # Example
///
/// ```ignore
/// let config = CheckpointStoreConfig::File {
///     path: PathBuf::from("./checkpoints"),
///     compression: true,
/// };
/// let store = create_checkpoint_store(config).await?;
/// ```
pub async fn create_checkpoint_store(
    config: CheckpointStoreConfig,
) -> Result<Arc<dyn CheckpointStore>, WorkflowError> {
    match config {
        CheckpointStoreConfig::Memory => Ok(Arc::new(MemoryCheckpointStore::new())),

        CheckpointStoreConfig::File { path, compression } => {
            Ok(Arc::new(FileCheckpointStore::new(path, compression)))
        }

        #[cfg(feature = "checkpointer-sqlite")]
        CheckpointStoreConfig::Sqlite { path, compression } => {
            let store = SqliteCheckpointStore::with_compression(&path, compression).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Compress data using zstd
pub(crate) fn compress(data: &[u8]) -> Result<Vec<u8>, WorkflowError> {
    let mut encoder = zstd::stream::Encoder::new(Vec::new(), 3)
        .map_err(|e| WorkflowError::checkpoint_error(format!("Compression init failed: {}", e)))?;
    encoder
        .write_all(data)
        .map_err(|e| WorkflowError::checkpoint_error(format!("Compression write failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| WorkflowError::checkpoint_error(format!("Compression finish failed: {}", e)))
}

/// Decompress data using zstd
pub(crate) fn decompress(data: &[u8]) -> Result<Vec<u8>, WorkflowError> {
    zstd::stream::decode_all(data)
        .map_err(|e| WorkflowError::checkpoint_error(format!("Decompression failed: {}", e)))
}

pub(crate) fn encode(checkpoint: &Checkpoint, compression: bool) -> Result<Vec<u8>, WorkflowError> {
    let json = serde_json::to_vec_pretty(checkpoint)
        .map_err(|e| WorkflowError::checkpoint_error(format!("Serialization failed: {}", e)))?;
    if compression {
        compress(&json)
    } else {
        Ok(json)
    }
}

pub(crate) fn decode(data: &[u8], compressed: bool) -> Result<Checkpoint, WorkflowError> {
    let json = if compressed { decompress(data)? } else { data.to_vec() };
    serde_json::from_slice(&json)
        .map_err(|e| WorkflowError::checkpoint_error(format!("Deserialization failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static_assertions::assert_impl_all!(MemoryCheckpointStore: Send, Sync);
    static_assertions::assert_obj_safe!(CheckpointStore);

    fn checkpoint(workflow_id: &str, superstep: usize) -> Checkpoint {
        let mut checkpoint = Checkpoint::new(workflow_id, "run-1", superstep);
        checkpoint
            .in_flight_messages
            .insert("joiner".into(), vec![Message::text("ABC").with_seq(4)]);
        checkpoint
            .in_flight_messages
            .insert("upper".into(), vec![Message::text("def").with_seq(2)]);
        checkpoint.shared_state.insert("count".into(), json!(3));
        checkpoint
    }

    #[test]
    fn test_checkpoint_creation() {
        let checkpoint = Checkpoint::new("test-workflow", "run", 5).with_metadata("creator", "test");

        assert_eq!(checkpoint.workflow_id, "test-workflow");
        assert_eq!(checkpoint.superstep, 5);
        assert_eq!(checkpoint.pending_message_count(), 0);
        assert_eq!(checkpoint.metadata.get("creator"), Some(&"test".to_string()));
    }

    #[test]
    fn test_queued_deliveries_sorted_by_seq() {
        let checkpoint = checkpoint("wf", 1);
        let deliveries = checkpoint.queued_deliveries();
        let order: Vec<&str> = deliveries.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["upper", "joiner"]);
    }

    #[test]
    fn test_checkpoint_json_roundtrip() {
        let checkpoint = checkpoint("wf", 2);
        let bytes = encode(&checkpoint, true).unwrap();
        assert_eq!(decode(&bytes, true).unwrap(), checkpoint);
    }

    #[tokio::test]
    async fn test_memory_store_save_load() {
        let store = MemoryCheckpointStore::new();
        let checkpoint = checkpoint("test-workflow", 5);

        let id = store.save(&checkpoint).await.unwrap();
        assert_eq!(id, checkpoint.checkpoint_id);

        let loaded = store.load(&id).await.unwrap();
        assert_eq!(loaded, checkpoint);
    }

    #[tokio::test]
    async fn test_memory_store_save_existing_reissues() {
        let store = MemoryCheckpointStore::new();
        let checkpoint = checkpoint("test-workflow", 1);

        let first = store.save(&checkpoint).await.unwrap();
        let second = store.save(&checkpoint).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.list("test-workflow").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_missing() {
        let store = MemoryCheckpointStore::new();
        let err = store.load("nope").await.unwrap_err();
        assert!(matches!(err, WorkflowError::CheckpointNotFound(id) if id == "nope"));
        assert!(!store.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_list_latest_prune() {
        let store = MemoryCheckpointStore::new();
        for superstep in [1, 2, 3, 4, 5] {
            store.save(&checkpoint("test-workflow", superstep)).await.unwrap();
        }
        store.save(&checkpoint("other-workflow", 9)).await.unwrap();

        let list = store.list("test-workflow").await.unwrap();
        assert_eq!(list.len(), 5);
        assert_eq!(list.last().map(|c| c.superstep), Some(5));

        let latest = store.latest("test-workflow").await.unwrap().unwrap();
        assert_eq!(latest.superstep, 5);

        let deleted = store.prune("test-workflow", 2).await.unwrap();
        assert_eq!(deleted, 3);
        let remaining: Vec<usize> = store
            .list("test-workflow")
            .await
            .unwrap()
            .iter()
            .map(|c| c.superstep)
            .collect();
        assert_eq!(remaining, vec![4, 5]);

        store.clear("test-workflow").await.unwrap();
        assert!(store.list("test-workflow").await.unwrap().is_empty());
        assert_eq!(store.list("other-workflow").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_store_from_config() {
        let config: CheckpointStoreConfig = serde_json::from_str(r#"{"type": "memory"}"#).unwrap();
        assert_eq!(config, CheckpointStoreConfig::default());
        let store = create_checkpoint_store(config).await.unwrap();
        assert!(store.list("wf").await.unwrap().is_empty());
    }
}
