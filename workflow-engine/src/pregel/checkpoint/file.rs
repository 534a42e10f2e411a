//! File-based checkpoint store
//!
//! Stores checkpoints as JSON files, one directory per workflow.
//! Supports optional compression via zstd for reduced storage.
//!
//! # Directory Structure
//!
//! ```text
//! checkpoints/
//! └── {workflow_id}/
//!     ├── {checkpoint_id}.json[.zst]
//!     └── {checkpoint_id}.json[.zst]
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{decode, encode, sort_metadata, Checkpoint, CheckpointMetadata, CheckpointStore};
use crate::pregel::error::WorkflowError;

const JSON_EXT: &str = ".json";
const ZST_EXT: &str = ".json.zst";

/// File-based checkpoint store.
///
/// Atomic writes are ensured via temporary file + rename pattern. Files
/// written with and without compression can be read back regardless of the
/// current setting; the extension decides.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    base_path: PathBuf,
    compression: bool,
}

impl FileCheckpointStore {
    /// Create a new file-based store rooted at `base_path`
    pub fn new(base_path: impl Into<PathBuf>, compression: bool) -> Self {
        Self {
            base_path: base_path.into(),
            compression,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Ids become file and directory names and must stay a single path segment
    fn check_segment(label: &str, value: &str) -> Result<(), WorkflowError> {
        let invalid = value.is_empty()
            || value == "."
            || value == ".."
            || value.chars().any(|c| matches!(c, '/' | '\\' | ':' | '\0'));
        if invalid {
            return Err(WorkflowError::checkpoint_error(format!(
                "invalid {} for file store: {:?}",
                label, value
            )));
        }
        Ok(())
    }

    fn workflow_path(&self, workflow_id: &str) -> PathBuf {
        self.base_path.join(workflow_id)
    }

    fn checkpoint_path(&self, workflow_id: &str, checkpoint_id: &str) -> PathBuf {
        let ext = if self.compression { ZST_EXT } else { JSON_EXT };
        self.workflow_path(workflow_id)
            .join(format!("{}{}", checkpoint_id, ext))
    }

    fn temp_path(&self, workflow_id: &str, checkpoint_id: &str) -> PathBuf {
        self.workflow_path(workflow_id)
            .join(format!("{}.tmp", checkpoint_id))
    }

    /// Parse checkpoint id and compression flag from a file name
    fn parse_file_name(path: &Path) -> Option<(String, bool)> {
        let filename = path.file_name()?.to_str()?;
        if let Some(id) = filename.strip_suffix(ZST_EXT) {
            return Some((id.to_string(), true));
        }
        filename
            .strip_suffix(JSON_EXT)
            .map(|id| (id.to_string(), false))
    }

    async fn read_dir_paths(dir: &Path) -> Result<Vec<PathBuf>, WorkflowError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to read directory: {}", e)))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to read entry: {}", e)))?
        {
            paths.push(entry.path());
        }
        Ok(paths)
    }

    /// Locate a checkpoint file across all workflow directories
    async fn find(&self, checkpoint_id: &str) -> Result<Option<(PathBuf, bool)>, WorkflowError> {
        for dir in Self::read_dir_paths(&self.base_path).await? {
            if !dir.is_dir() {
                continue;
            }
            for (ext, compressed) in [(ZST_EXT, true), (JSON_EXT, false)] {
                let path = dir.join(format!("{}{}", checkpoint_id, ext));
                if path.exists() {
                    return Ok(Some((path, compressed)));
                }
            }
        }
        Ok(None)
    }

    async fn read_checkpoint(path: &Path, compressed: bool) -> Result<Checkpoint, WorkflowError> {
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to open file: {}", e)))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to read file: {}", e)))?;

        decode(&data, compressed)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<String, WorkflowError> {
        Self::check_segment("workflow id", &checkpoint.workflow_id)?;
        Self::check_segment("checkpoint id", &checkpoint.checkpoint_id)?;
        let reissued;
        let checkpoint = if self.find(&checkpoint.checkpoint_id).await?.is_some() {
            reissued = checkpoint.reissued();
            &reissued
        } else {
            checkpoint
        };

        fs::create_dir_all(self.workflow_path(&checkpoint.workflow_id))
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to create directory: {}", e)))?;

        let data = encode(checkpoint, self.compression)?;

        // Write to temp file first (atomic write pattern)
        let temp_path = self.temp_path(&checkpoint.workflow_id, &checkpoint.checkpoint_id);
        let final_path = self.checkpoint_path(&checkpoint.workflow_id, &checkpoint.checkpoint_id);

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to create temp file: {}", e)))?;

        file.write_all(&data)
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to write data: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to sync file: {}", e)))?;

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to rename file: {}", e)))?;

        Ok(checkpoint.checkpoint_id.clone())
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, WorkflowError> {
        Self::check_segment("checkpoint id", checkpoint_id)?;
        match self.find(checkpoint_id).await? {
            Some((path, compressed)) => Self::read_checkpoint(&path, compressed).await,
            None => Err(WorkflowError::CheckpointNotFound(checkpoint_id.to_string())),
        }
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<CheckpointMetadata>, WorkflowError> {
        Self::check_segment("workflow id", workflow_id)?;
        let mut entries = Vec::new();
        for path in Self::read_dir_paths(&self.workflow_path(workflow_id)).await? {
            if let Some((_, compressed)) = Self::parse_file_name(&path) {
                let checkpoint = Self::read_checkpoint(&path, compressed).await?;
                entries.push(checkpoint.metadata_summary());
            }
        }
        sort_metadata(&mut entries);
        Ok(entries)
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<bool, WorkflowError> {
        Self::check_segment("checkpoint id", checkpoint_id)?;
        match self.find(checkpoint_id).await? {
            Some((path, _)) => {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to delete file: {}", e)))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pregel::message::Message;
    use serde_json::json;
    use tempfile::tempdir;

    fn checkpoint(workflow_id: &str, superstep: usize) -> Checkpoint {
        let mut checkpoint = Checkpoint::new(workflow_id, "run-1", superstep);
        checkpoint
            .in_flight_messages
            .insert("upper".into(), vec![Message::text("abc").with_seq(1)]);
        checkpoint.shared_state.insert("seen".into(), json!(["abc"]));
        checkpoint
    }

    #[tokio::test]
    async fn test_file_store_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(temp_dir.path(), false);

        let checkpoint = checkpoint("test-workflow", 5);
        let id = store.save(&checkpoint).await.unwrap();

        let path = temp_dir.path().join(format!("test-workflow/{}.json", id));
        assert!(path.exists());

        let loaded = store.load(&id).await.unwrap();
        assert_eq!(loaded, checkpoint);
    }

    #[tokio::test]
    async fn test_file_store_with_compression() {
        let temp_dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(temp_dir.path(), true);

        let checkpoint = checkpoint("compressed-workflow", 10);
        let id = store.save(&checkpoint).await.unwrap();

        let path = temp_dir.path().join(format!("compressed-workflow/{}.json.zst", id));
        assert!(path.exists());

        let loaded = store.load(&id).await.unwrap();
        assert_eq!(loaded.superstep, 10);
        assert_eq!(loaded.pending_message_count(), 1);

        // Readable by a store configured without compression
        let plain = FileCheckpointStore::new(temp_dir.path(), false);
        assert_eq!(plain.load(&id).await.unwrap(), loaded);
    }

    #[tokio::test]
    async fn test_file_store_load_nonexistent() {
        let temp_dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(temp_dir.path(), false);

        let err = store.load("missing").await.unwrap_err();
        assert!(matches!(err, WorkflowError::CheckpointNotFound(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_file_store_list_and_prune() {
        let temp_dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(temp_dir.path(), false);

        for superstep in 1..=5 {
            store.save(&checkpoint("test-workflow", superstep)).await.unwrap();
        }
        store.save(&checkpoint("other-workflow", 1)).await.unwrap();

        let list = store.list("test-workflow").await.unwrap();
        let supersteps: Vec<usize> = list.iter().map(|c| c.superstep).collect();
        assert_eq!(supersteps, vec![1, 2, 3, 4, 5]);

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
        assert_eq!(store.list("other-workflow").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_saved_checkpoints_are_immutable() {
        let temp_dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(temp_dir.path(), false);

        let mut checkpoint = checkpoint("test-workflow", 1);
        let first = store.save(&checkpoint).await.unwrap();

        checkpoint.superstep = 2;
        let second = store.save(&checkpoint).await.unwrap();
        assert_ne!(first, second);

        assert_eq!(store.load(&first).await.unwrap().superstep, 1);
        assert_eq!(store.load(&second).await.unwrap().superstep, 2);
    }

    #[tokio::test]
    async fn test_file_store_atomic_write() {
        let temp_dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(temp_dir.path(), false);

        let id = store.save(&checkpoint("test-workflow", 7)).await.unwrap();

        let temp_path = temp_dir.path().join(format!("test-workflow/{}.tmp", id));
        assert!(!temp_path.exists());
        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_ids() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("store");
        let store = FileCheckpointStore::new(&root, false);

        for workflow_id in ["", "..", "../escape", "a/b", "a\\b"] {
            let err = store.save(&checkpoint(workflow_id, 1)).await.unwrap_err();
            assert!(matches!(err, WorkflowError::Checkpoint(_)), "{:?}", workflow_id);
            let err = store.list(workflow_id).await.unwrap_err();
            assert!(matches!(err, WorkflowError::Checkpoint(_)));
        }

        let mut escaping = checkpoint("test-workflow", 1);
        escaping.checkpoint_id = "../../outside".to_string();
        assert!(matches!(store.save(&escaping).await, Err(WorkflowError::Checkpoint(_))));
        assert!(!temp_dir.path().join("outside.json").exists());

        for checkpoint_id in ["..", "../x", "x/y"] {
            assert!(matches!(store.load(checkpoint_id).await, Err(WorkflowError::Checkpoint(_))));
            assert!(matches!(store.delete(checkpoint_id).await, Err(WorkflowError::Checkpoint(_))));
        }

        // Dots inside a segment are fine
        let id = store.save(&checkpoint("team.v2", 1)).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap().workflow_id, "team.v2");
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            FileCheckpointStore::parse_file_name(Path::new("abc.json")),
            Some(("abc".to_string(), false))
        );
        assert_eq!(
            FileCheckpointStore::parse_file_name(Path::new("abc.json.zst")),
            Some(("abc".to_string(), true))
        );
        assert_eq!(FileCheckpointStore::parse_file_name(Path::new("abc.tmp")), None);
    }
}
