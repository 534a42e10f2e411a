//! Pregel-style runtime for typed executor graphs
//!
//! Key concepts:
//!
//! - **Executor**: Computation unit that handles typed messages
//! - **Message**: Envelope with a kind discriminant and a JSON payload
//! - **Superstep**: One dispatch cycle over the FIFO delivery queue
//! - **Checkpoint**: Durable snapshot of an in-flight run
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Runtime                                 │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐                     │
//! │  │Superstep│→ │Superstep│→ │Superstep│→ ... → quiescence   │
//! │  │    0    │  │    1    │  │    2    │                     │
//! │  └─────────┘  └─────────┘  └─────────┘                     │
//! │       │            │            │                           │
//! │       ▼            ▼            ▼                           │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │ Per-Superstep: Drain → Invoke → Publish → Route     │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A run becomes quiescent when the queue is empty. With outstanding
//! requests it is `Suspended` and resumes when answers arrive.

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod message;
pub mod request;
pub mod runtime;
pub mod state;
pub mod visualization;

// Re-exports
pub use checkpoint::{
    create_checkpoint_store, Checkpoint, CheckpointMetadata, CheckpointStore, CheckpointStoreConfig,
    FileCheckpointStore, MemoryCheckpointStore,
};
#[cfg(feature = "checkpointer-sqlite")]
pub use checkpoint::SqliteCheckpointStore;
pub use config::WorkflowConfig;
pub use context::{CancellationHandle, WorkflowContext};
pub use error::{OrchestrationLimit, WorkflowError};
pub use events::{DropReason, RequestInfoEvent, RunState, WorkflowEvent, WorkflowRunResult};
pub use executor::{BoxedExecutor, Executor, ExecutorId, ExecutorKind};
pub use message::{FanInMessage, Message, MessagePayload, JSON_KIND, TEXT_KIND};
pub use request::{PendingRequest, RequestResponse};
pub use runtime::EventSink;
pub use state::SharedState;
pub use visualization::{render_edge, render_node, sanitize_id, to_dot, to_mermaid};
