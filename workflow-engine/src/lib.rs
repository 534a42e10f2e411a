//! workflow-engine: typed executor graphs on a superstep runtime
//!
//! - Executor trait: typed message handlers wired into a validated graph
//! - Edge groups: direct, conditional, switch-case, multi-selection, fan-out, fan-in
//! - Workflow: batch and streaming runs, checkpoints, request/response suspension
//! - Magentic: manager-led multi-agent orchestration built from the above
//!
//! # Example
//!
//! ```rust,ignore
//! use workflow_engine::{FunctionExecutor, WorkflowBuilder};
//!
//! let upper = FunctionExecutor::typed::<String, _>("upper", |text, ctx| {
//!     ctx.send(&text.to_uppercase())
//! });
//! let done = FunctionExecutor::typed::<String, _>("done", |text, ctx| {
//!     ctx.yield_output(text);
//!     Ok(())
//! });
//!
//! let workflow = WorkflowBuilder::new()
//!     .add_executor(upper)
//!     .add_executor(done)
//!     .set_start("upper")
//!     .add_edge("upper", "done")
//!     .build()?;
//!
//! let result = workflow.run("hello").await?;
//! assert_eq!(result.outputs()[0], "HELLO");
//! ```

pub mod agent;
pub mod magentic;
pub mod pregel;
pub mod workflow;

// Re-exports for convenience
pub use agent::{AgentError, AgentRunResponse, AgentRunStream, AgentRunUpdate, ChatAgent, ChatMessage, Role};
pub use pregel::{
    create_checkpoint_store, CancellationHandle, Checkpoint, CheckpointMetadata, CheckpointStore,
    CheckpointStoreConfig, DropReason, Executor, ExecutorId, ExecutorKind, FanInMessage, FileCheckpointStore,
    MemoryCheckpointStore, Message, MessagePayload, OrchestrationLimit, PendingRequest, RequestInfoEvent,
    RequestResponse, RunState, SharedState, WorkflowConfig, WorkflowContext, WorkflowError, WorkflowEvent,
    WorkflowRunResult, JSON_KIND, TEXT_KIND,
};
#[cfg(feature = "checkpointer-sqlite")]
pub use pregel::SqliteCheckpointStore;
pub use workflow::executors::{
    AgentExecutor, AgentExecutorRequest, AgentExecutorResponse, FunctionExecutor, RequestInfoExecutor,
};
pub use workflow::{
    Case, Condition, EdgeGroup, GraphValidationError, Predicate, Workflow, WorkflowBuilder, WorkflowEventStream,
    WorkflowGraph,
};

// Magentic exports
pub use magentic::{
    AgentMagenticManager, MagenticBuilder, MagenticContext, MagenticLimits, MagenticManager,
    MagenticPlanReviewReply, MagenticPlanReviewRequest, PlanReviewDecision, ProgressLedger,
};
