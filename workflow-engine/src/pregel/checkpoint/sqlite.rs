//! SQLite-based checkpoint store
//!
//! Stores checkpoints in a SQLite database for durable, queryable persistence.
//! Supports both file-based and in-memory databases.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS workflow_checkpoints (
//!     checkpoint_id TEXT PRIMARY KEY,
//!     workflow_id TEXT NOT NULL,
//!     superstep INTEGER NOT NULL,
//!     created_at TEXT NOT NULL,
//!     compressed INTEGER NOT NULL,
//!     data BLOB NOT NULL
//! );
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tokio_rusqlite::Connection;

use super::{decode, encode, sort_metadata, Checkpoint, CheckpointMetadata, CheckpointStore};
use crate::pregel::error::WorkflowError;

/// SQLite-based checkpoint store.
///
/// Each save is a single INSERT, so a partial checkpoint is never visible.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    conn: Arc<Connection>,
    compression: bool,
}

impl SqliteCheckpointStore {
    /// Open a store at `path`, or `:memory:` for an in-memory database
    pub async fn new(path: impl AsRef<str>) -> Result<Self, WorkflowError> {
        Self::with_compression(path, false).await
    }

    /// Open a store with compression option.
    pub async fn with_compression(path: impl AsRef<str>, compression: bool) -> Result<Self, WorkflowError> {
        let path = path.as_ref().to_string();

        let conn = Connection::open(&path)
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to open SQLite: {}", e)))?;

        conn.call(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS workflow_checkpoints (
                    checkpoint_id TEXT PRIMARY KEY,
                    workflow_id TEXT NOT NULL,
                    superstep INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    compressed INTEGER NOT NULL,
                    data BLOB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_workflow_checkpoints_workflow
                    ON workflow_checkpoints(workflow_id, created_at);
                "#,
            )?;
            Ok(())
        })
        .await
        .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to create schema: {}", e)))?;

        Ok(Self {
            conn: Arc::new(conn),
            compression,
        })
    }

    async fn exists(&self, checkpoint_id: &str) -> Result<bool, WorkflowError> {
        let checkpoint_id = checkpoint_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT 1 FROM workflow_checkpoints WHERE checkpoint_id = ?1")?;
                Ok(stmt.exists(rusqlite::params![checkpoint_id])?)
            })
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to query checkpoint: {}", e)))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<String, WorkflowError> {
        let stored = if self.exists(&checkpoint.checkpoint_id).await? {
            checkpoint.reissued()
        } else {
            checkpoint.clone()
        };

        let data = encode(&stored, self.compression)?;
        let compressed = self.compression;
        let checkpoint_id = stored.checkpoint_id.clone();
        let workflow_id = stored.workflow_id.clone();
        let superstep = stored.superstep as i64;
        let created_at = stored.created_at.to_rfc3339();

        let id = checkpoint_id.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO workflow_checkpoints
                        (checkpoint_id, workflow_id, superstep, created_at, compressed, data)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    rusqlite::params![id, workflow_id, superstep, created_at, compressed, data],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to save checkpoint: {}", e)))?;

        Ok(checkpoint_id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, WorkflowError> {
        let id = checkpoint_id.to_string();

        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT data, compressed FROM workflow_checkpoints WHERE checkpoint_id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![id])?;

                if let Some(row) = rows.next()? {
                    let data: Vec<u8> = row.get(0)?;
                    let compressed: bool = row.get(1)?;
                    Ok(Some((data, compressed)))
                } else {
                    Ok(None)
                }
            })
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to load checkpoint: {}", e)))?;

        match row {
            Some((data, compressed)) => decode(&data, compressed),
            None => Err(WorkflowError::CheckpointNotFound(checkpoint_id.to_string())),
        }
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<CheckpointMetadata>, WorkflowError> {
        let workflow_id = workflow_id.to_string();

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT data, compressed FROM workflow_checkpoints WHERE workflow_id = ?1",
                )?;
                let rows = stmt.query_map(rusqlite::params![workflow_id], |row| {
                    let data: Vec<u8> = row.get(0)?;
                    let compressed: bool = row.get(1)?;
                    Ok((data, compressed))
                })?;

                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to list checkpoints: {}", e)))?;

        let mut entries = rows
            .iter()
            .map(|(data, compressed)| decode(data, *compressed).map(|c| c.metadata_summary()))
            .collect::<Result<Vec<_>, _>>()?;
        sort_metadata(&mut entries);
        Ok(entries)
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<bool, WorkflowError> {
        let id = checkpoint_id.to_string();

        let removed = self
            .conn
            .call(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM workflow_checkpoints WHERE checkpoint_id = ?1",
                    rusqlite::params![id],
                )?;
                Ok(removed)
            })
            .await
            .map_err(|e| WorkflowError::checkpoint_error(format!("Failed to delete checkpoint: {}", e)))?;

        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pregel::message::Message;

    fn checkpoint(workflow_id: &str, superstep: usize) -> Checkpoint {
        let mut checkpoint = Checkpoint::new(workflow_id, "run-1", superstep);
        checkpoint.in_flight_messages.insert(
            "count".into(),
            vec![Message::json(serde_json::json!([1, 2, 3, 4])).with_seq(3)],
        );
        checkpoint
    }

    #[tokio::test]
    async fn test_sqlite_store_save_load() {
        let store = SqliteCheckpointStore::new(":memory:").await.unwrap();

        let checkpoint = checkpoint("test-workflow", 5);
        let id = store.save(&checkpoint).await.unwrap();
        let loaded = store.load(&id).await.unwrap();

        assert_eq!(loaded, checkpoint);
    }

    #[tokio::test]
    async fn test_sqlite_store_with_compression() {
        let store = SqliteCheckpointStore::with_compression(":memory:", true).await.unwrap();

        let id = store.save(&checkpoint("compressed-workflow", 10)).await.unwrap();
        let loaded = store.load(&id).await.unwrap();

        assert_eq!(loaded.superstep, 10);
        assert_eq!(loaded.pending_message_count(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_store_load_nonexistent() {
        let store = SqliteCheckpointStore::new(":memory:").await.unwrap();
        let err = store.load("missing").await.unwrap_err();
        assert!(matches!(err, WorkflowError::CheckpointNotFound(_)));
    }

    #[tokio::test]
    async fn test_sqlite_store_list_prune_isolation() {
        let store = SqliteCheckpointStore::new(":memory:").await.unwrap();

        for superstep in [1, 2, 3, 4, 5] {
            store.save(&checkpoint("workflow-1", superstep)).await.unwrap();
        }

        assert!(store.list("workflow-2").await.unwrap().is_empty());

        let deleted = store.prune("workflow-1", 2).await.unwrap();
        assert_eq!(deleted, 3);

        let remaining: Vec<usize> = store
            .list("workflow-1")
            .await
            .unwrap()
            .iter()
            .map(|c| c.superstep)
            .collect();
        assert_eq!(remaining, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_sqlite_store_save_existing_reissues() {
        let store = SqliteCheckpointStore::new(":memory:").await.unwrap();

        let checkpoint = checkpoint("test-workflow", 1);
        let first = store.save(&checkpoint).await.unwrap();
        let second = store.save(&checkpoint).await.unwrap();

        assert_ne!(first, second);
        assert!(store.delete(&first).await.unwrap());
        assert!(!store.delete(&first).await.unwrap());
        assert!(store.load(&second).await.is_ok());
    }
}
