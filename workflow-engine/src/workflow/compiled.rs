//! Built workflow handle
//!
//! [`Workflow`] owns an immutable [`WorkflowGraph`] and the mutable state of
//! its current run. Every operation drives the run to its next quiescence
//! point and reports the events produced on the way, either collected into
//! a [`WorkflowRunResult`] or as a [`WorkflowEventStream`].

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, Stream};
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::info;

use super::graph::WorkflowGraph;
use crate::pregel::checkpoint::{CheckpointMetadata, CheckpointStore};
use crate::pregel::config::WorkflowConfig;
use crate::pregel::context::CancellationHandle;
use crate::pregel::error::WorkflowError;
use crate::pregel::events::{RequestInfoEvent, RunState, WorkflowEvent, WorkflowRunResult};
use crate::pregel::message::Message;
use crate::pregel::runtime::{EventSink, Run, Runtime};
use crate::pregel::visualization;

/// What a driver call should do before driving
enum Operation {
    Start(Message),
    Respond(HashMap<String, Value>),
    Restore(String),
}

/// Why an operation did not end cleanly
enum Outcome {
    /// Rejected before any state changed
    Rejected(WorkflowError),
    /// The run ended `Failed` or `Exhausted`
    Ended(WorkflowError),
}

struct WorkflowInner {
    graph: WorkflowGraph,
    config: WorkflowConfig,
    store: Option<Arc<dyn CheckpointStore>>,
    run: Mutex<Run>,
    cancellation: CancellationHandle,
    state_tx: watch::Sender<RunState>,
}

/// A validated, runnable workflow.
///
/// Cloning is cheap and clones share the same run. Operations on one
/// workflow are serialized.
///
/// # Example
///
/// ```ignore
/// let workflow = WorkflowBuilder::new()
///     .add_executor(upper)
///     .add_executor(reverse)
///     .set_start("upper")
///     .add_edge("upper", "reverse")
///     .build()?;
///
/// let result = workflow.run("hello").await?;
/// println!("{:?}", result.outputs());
/// ```
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<WorkflowInner>,
}

impl Workflow {
    pub(crate) fn new(
        graph: WorkflowGraph,
        config: WorkflowConfig,
        store: Option<Arc<dyn CheckpointStore>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(RunState::NotStarted);
        Self {
            inner: Arc::new(WorkflowInner {
                graph,
                config,
                store,
                run: Mutex::new(Run::new()),
                cancellation: CancellationHandle::new(),
                state_tx,
            }),
        }
    }

    /// The validated graph
    pub fn graph(&self) -> &WorkflowGraph {
        &self.inner.graph
    }

    pub fn id(&self) -> &str {
        self.inner.graph.id()
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.inner.config
    }

    /// Current run state. Does not wait for an operation in progress.
    pub fn state(&self) -> RunState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to run state transitions
    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.inner.state_tx.subscribe()
    }

    /// Requests still awaiting an answer
    pub async fn pending_requests(&self) -> Vec<RequestInfoEvent> {
        self.inner.run.lock().await.pending_requests()
    }

    /// Ask the in-flight run to stop at the next superstep boundary
    pub fn cancel(&self) {
        info!(workflow_id = %self.id(), "Cancellation requested");
        self.inner.cancellation.cancel();
    }

    /// Handle that cancels this workflow's runs from elsewhere
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.inner.cancellation.clone()
    }

    /// Persist the current run now, returning the checkpoint id
    pub async fn checkpoint_now(&self) -> Result<String, WorkflowError> {
        let mut run = self.inner.run.lock().await;
        let state = run.state;
        self.runtime()
            .checkpoint(&mut run, state, &mut |_| {})
            .await?
            .ok_or_else(|| WorkflowError::config_error("checkpointing is not configured"))
    }

    /// Checkpoints saved for this workflow, oldest first
    pub async fn list_checkpoints(&self) -> Result<Vec<CheckpointMetadata>, WorkflowError> {
        match &self.inner.store {
            Some(store) => store.list(self.id()).await,
            None => Err(WorkflowError::config_error("checkpointing is not configured")),
        }
    }

    /// Mermaid flowchart of the graph
    pub fn to_mermaid(&self) -> String {
        visualization::to_mermaid(&self.inner.graph)
    }

    /// Graphviz digraph of the graph
    pub fn to_dot(&self) -> String {
        visualization::to_dot(&self.inner.graph)
    }

    // =========================================================================
    // Batch operations
    // =========================================================================

    /// Start a fresh run with `input` delivered to the start executor.
    ///
    /// Fails with `InvalidState` while the current run is suspended.
    pub async fn run(&self, input: impl Into<Message>) -> Result<WorkflowRunResult, WorkflowError> {
        self.execute_collect(Operation::Start(input.into())).await
    }

    /// Answer outstanding requests and resume to the next quiescence point.
    ///
    /// Unknown ids are rejected before anything is recorded.
    pub async fn send_responses(
        &self,
        answers: HashMap<String, Value>,
    ) -> Result<WorkflowRunResult, WorkflowError> {
        self.execute_collect(Operation::Respond(answers)).await
    }

    /// Restore a checkpoint and drive the restored run
    pub async fn run_from_checkpoint(&self, checkpoint_id: &str) -> Result<WorkflowRunResult, WorkflowError> {
        self.execute_collect(Operation::Restore(checkpoint_id.to_string())).await
    }

    // =========================================================================
    // Streaming operations
    // =========================================================================

    /// Streaming form of [`run`](Self::run)
    pub fn run_streaming(&self, input: impl Into<Message>) -> WorkflowEventStream {
        self.execute_streaming(Operation::Start(input.into()))
    }

    /// Streaming form of [`send_responses`](Self::send_responses)
    pub fn send_responses_streaming(&self, answers: HashMap<String, Value>) -> WorkflowEventStream {
        self.execute_streaming(Operation::Respond(answers))
    }

    /// Streaming form of [`run_from_checkpoint`](Self::run_from_checkpoint)
    pub fn run_from_checkpoint_streaming(&self, checkpoint_id: &str) -> WorkflowEventStream {
        self.execute_streaming(Operation::Restore(checkpoint_id.to_string()))
    }

    // =========================================================================
    // Driver
    // =========================================================================

    fn runtime(&self) -> Runtime<'_> {
        Runtime {
            graph: &self.inner.graph,
            config: &self.inner.config,
            store: self.inner.store.as_ref(),
            cancellation: &self.inner.cancellation,
            state_tx: &self.inner.state_tx,
        }
    }

    async fn execute_collect(&self, operation: Operation) -> Result<WorkflowRunResult, WorkflowError> {
        let mut events = Vec::new();
        match self.execute(operation, &mut |event| events.push(event)).await {
            Ok(()) => Ok(WorkflowRunResult::new(events)),
            Err(Outcome::Rejected(e)) | Err(Outcome::Ended(e)) => Err(e),
        }
    }

    fn execute_streaming(&self, operation: Operation) -> WorkflowEventStream {
        let (tx, rx) = mpsc::unbounded_channel::<Result<WorkflowEvent, WorkflowError>>();
        let workflow = self.clone();

        tokio::spawn(async move {
            let events = tx.clone();
            let mut emit = move |event: WorkflowEvent| {
                // The receiver may be gone; the run continues regardless
                let _ = events.send(Ok(event));
            };
            if let Err(Outcome::Rejected(e)) = workflow.execute(operation, &mut emit).await {
                let _ = tx.send(Err(e));
            }
        });

        WorkflowEventStream::new(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }

    async fn execute(&self, operation: Operation, emit: EventSink<'_>) -> Result<(), Outcome> {
        let mut run = self.inner.run.lock().await;
        let runtime = self.runtime();

        match operation {
            Operation::Start(input) => {
                if run.state.is_suspended() {
                    return Err(Outcome::Rejected(WorkflowError::invalid_state(
                        "run is suspended; answer its requests or restore a checkpoint",
                    )));
                }
                *run = Run::new();
                self.inner.cancellation.reset();
                info!(workflow_id = %self.id(), run_id = %run.run_id, kind = %input.kind, "Starting run");
                runtime.inject_input(&mut run, input, emit);
            }
            Operation::Respond(answers) => {
                if !run.state.is_suspended() {
                    return Err(Outcome::Rejected(WorkflowError::invalid_state(format!(
                        "cannot send responses while run is {}",
                        run.state
                    ))));
                }
                run.requests.validate(&answers).map_err(Outcome::Rejected)?;
                info!(workflow_id = %self.id(), run_id = %run.run_id, answers = answers.len(), "Resuming run");
                let ready = run.record_answers(answers);
                if let Err(e) = runtime.inject_responses(&mut run, ready, emit) {
                    return runtime.fail(&mut run, e, emit).map_err(Outcome::Ended);
                }
            }
            Operation::Restore(checkpoint_id) => {
                let store = self.inner.store.as_ref().ok_or_else(|| {
                    Outcome::Rejected(WorkflowError::config_error("checkpointing is not configured"))
                })?;
                let checkpoint = store.load(&checkpoint_id).await.map_err(Outcome::Rejected)?;
                let restored = Run::from_checkpoint(&self.inner.graph, checkpoint).map_err(Outcome::Rejected)?;
                *run = restored;
                self.inner.cancellation.reset();
                info!(
                    workflow_id = %self.id(),
                    run_id = %run.run_id,
                    checkpoint_id = %checkpoint_id,
                    superstep = run.superstep,
                    "Restored run from checkpoint"
                );
                for request in run.pending_requests() {
                    emit(WorkflowEvent::RequestInfo(request));
                }
            }
        }

        runtime.drive(&mut run, emit).await.map_err(Outcome::Ended)
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("graph", &self.inner.graph)
            .field("config", &self.inner.config)
            .field("checkpointing", &self.inner.store.is_some())
            .field("state", &self.state())
            .finish()
    }
}

/// Single-pass stream of run events.
///
/// Precondition failures arrive as one `Err` item. Run failures arrive as a
/// [`WorkflowEvent::Failed`] followed by the final state change. Dropping the
/// stream does not stop the run.
pub struct WorkflowEventStream {
    inner: Pin<Box<dyn Stream<Item = Result<WorkflowEvent, WorkflowError>> + Send>>,
}

impl WorkflowEventStream {
    fn new(stream: impl Stream<Item = Result<WorkflowEvent, WorkflowError>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Drain the stream into a batch result
    pub async fn into_run_result(self) -> Result<WorkflowRunResult, WorkflowError> {
        use futures::StreamExt;

        let mut events = Vec::new();
        let mut stream = self;
        while let Some(item) = stream.next().await {
            events.push(item?);
        }
        Ok(WorkflowRunResult::new(events))
    }
}

impl Stream for WorkflowEventStream {
    type Item = Result<WorkflowEvent, WorkflowError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pregel::message::TEXT_KIND;
    use crate::workflow::executors::{FunctionExecutor, RequestInfoExecutor};
    use crate::workflow::graph::WorkflowBuilder;
    use crate::pregel::checkpoint::MemoryCheckpointStore;
    use futures::StreamExt;
    use std::time::Duration;

    static_assertions::assert_impl_all!(Workflow: Send, Sync, Clone);
    static_assertions::assert_impl_all!(WorkflowEventStream: Send);

    fn upper() -> FunctionExecutor {
        FunctionExecutor::typed::<String, _>("upper", |text, ctx| ctx.send(&text.to_uppercase()))
    }

    fn output() -> FunctionExecutor {
        FunctionExecutor::typed::<String, _>("output", |text, ctx| {
            ctx.yield_output(text);
            Ok(())
        })
    }

    fn pipeline() -> Workflow {
        WorkflowBuilder::new()
            .with_id("pipeline")
            .add_executor(upper())
            .add_executor(output())
            .set_start("upper")
            .add_edge("upper", "output")
            .build()
            .unwrap()
    }

    fn gated() -> Workflow {
        WorkflowBuilder::new()
            .with_id("gated")
            .add_executor(FunctionExecutor::new("ask", |message, ctx| {
                ctx.send_message(message);
                Ok(())
            }))
            .add_executor(RequestInfoExecutor::new("gate"))
            .add_executor(FunctionExecutor::typed::<crate::pregel::request::RequestResponse, _>(
                "answer",
                |response, ctx| {
                    ctx.yield_output(response.data);
                    Ok(())
                },
            ))
            .set_start("ask")
            .add_edge("ask", "gate")
            .add_edge("gate", "answer")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_pipeline() {
        let workflow = pipeline();
        let result = workflow.run("hello").await.unwrap();

        assert_eq!(result.outputs(), vec![&Value::String("HELLO".into())]);
        assert_eq!(result.final_state(), RunState::Completed);
        assert_eq!(workflow.state(), RunState::Completed);

        let invoked: Vec<&str> = result
            .events()
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::ExecutorInvoked { executor_id, .. } => Some(executor_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(invoked, vec!["upper", "output"]);
    }

    #[tokio::test]
    async fn test_unaccepted_input_is_dropped() {
        let workflow = pipeline();
        let result = workflow.run(Message::json(serde_json::json!({"n": 1}))).await.unwrap();

        assert!(result.outputs().is_empty());
        assert_eq!(result.final_state(), RunState::Completed);
        assert!(result.events().iter().any(|e| matches!(
            e,
            WorkflowEvent::MessageDropped { source_id: None, reason: crate::pregel::events::DropReason::NotAccepted, .. }
        )));
    }

    #[tokio::test]
    async fn test_streaming_matches_batch() {
        let workflow = pipeline();
        let events: Vec<WorkflowEvent> = workflow
            .run_streaming("stream")
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(events.first().and_then(|e| e.as_state()), Some(RunState::Running));
        assert_eq!(events.last().and_then(|e| e.as_state()), Some(RunState::Completed));
        let outputs: Vec<&Value> = events.iter().filter_map(|e| e.as_output()).collect();
        assert_eq!(outputs, vec![&Value::String("STREAM".into())]);
    }

    #[tokio::test]
    async fn test_suspend_and_resume() {
        let workflow = gated();
        let result = workflow.run("question?").await.unwrap();

        assert_eq!(result.final_state(), RunState::Suspended);
        let requests = result.request_info_events();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request_kind, TEXT_KIND);
        let request_id = requests[0].request_id.clone();

        let err = workflow.run("again").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));

        let err = workflow
            .send_responses(HashMap::from([("nope".to_string(), Value::from(1))]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownRequest(id) if id == "nope"));
        assert_eq!(workflow.state(), RunState::Suspended);
        assert_eq!(workflow.pending_requests().await.len(), 1);

        let result = workflow
            .send_responses(HashMap::from([(request_id, Value::from("yes"))]))
            .await
            .unwrap();
        assert_eq!(result.outputs(), vec![&Value::String("yes".into())]);
        assert_eq!(result.final_state(), RunState::Completed);
        assert!(workflow.pending_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_streaming_precondition_error_is_single_item() {
        let workflow = pipeline();
        let items: Vec<_> = workflow
            .send_responses_streaming(HashMap::new())
            .collect()
            .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(WorkflowError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_executor_failure_fails_run() {
        let workflow = WorkflowBuilder::new()
            .add_executor(FunctionExecutor::new("boom", |_message, _ctx| {
                Err(WorkflowError::config_error("exploded"))
            }))
            .set_start("boom")
            .build()
            .unwrap();

        let err = workflow.run("x").await.unwrap_err();
        match err {
            WorkflowError::ExecutorFailure { executor_id, input, .. } => {
                assert_eq!(executor_id.as_str(), "boom");
                assert_eq!(input.and_then(|m| m.as_text().map(String::from)).as_deref(), Some("x"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(workflow.state(), RunState::Failed);

        // Streaming reports the failure as events
        let events: Vec<_> = workflow.run_streaming("y").collect().await;
        assert!(events.iter().all(|item| item.is_ok()));
        assert!(events
            .iter()
            .any(|item| matches!(item, Ok(WorkflowEvent::Failed { .. }))));
    }

    #[tokio::test]
    async fn test_max_supersteps() {
        let workflow = WorkflowBuilder::new()
            .add_executor(FunctionExecutor::new("loop", |message, ctx| {
                ctx.send_message(message);
                Ok(())
            }))
            .set_start("loop")
            .add_edge("loop", "loop")
            .with_config(WorkflowConfig::new().with_max_supersteps(5))
            .build()
            .unwrap();

        let err = workflow.run("spin").await.unwrap_err();
        assert!(matches!(err, WorkflowError::MaxSuperstepsExceeded(5)));
        assert_eq!(workflow.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_run() {
        let workflow = WorkflowBuilder::new()
            .add_executor(FunctionExecutor::new_async("tick", |message, ctx| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    ctx.send_message(message);
                    Ok(())
                })
            }))
            .set_start("tick")
            .add_edge("tick", "tick")
            .with_config(WorkflowConfig::new().with_max_supersteps(100_000))
            .build()
            .unwrap();

        let mut states = workflow.watch_state();
        let running = workflow.clone();
        let handle = tokio::spawn(async move { running.run("go").await });

        states.wait_for(|s| *s == RunState::Running).await.unwrap();
        workflow.cancel();

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.final_state(), RunState::Cancelled);
        assert!(matches!(result.error(), Some(WorkflowError::Cancelled)));
        assert_eq!(workflow.state(), RunState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancellation_handle_reaches_executors() {
        let workflow = WorkflowBuilder::new()
            .add_executor(FunctionExecutor::new_async("tick", |message, ctx| {
                Box::pin(async move {
                    // Stop feeding the loop once asked to
                    if ctx.is_cancelled() {
                        return Ok(());
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    ctx.send_message(message);
                    Ok(())
                })
            }))
            .set_start("tick")
            .add_edge("tick", "tick")
            .with_config(WorkflowConfig::new().with_max_supersteps(100_000))
            .build()
            .unwrap();

        let handle = workflow.cancellation_handle();
        let mut states = workflow.watch_state();
        let running = workflow.clone();
        let task = tokio::spawn(async move { running.run("go").await });

        states.wait_for(|s| *s == RunState::Running).await.unwrap();
        handle.cancel();

        let result = task.await.unwrap().unwrap();
        assert_eq!(result.final_state(), RunState::Cancelled);
        assert!(matches!(result.error(), Some(WorkflowError::Cancelled)));

        // Observed and cleared, so the next run is not cancelled up front
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_checkpoint_now_requires_store() {
        let err = pipeline().checkpoint_now().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));

        let workflow = WorkflowBuilder::new()
            .with_id("stored")
            .add_executor(upper())
            .add_executor(output())
            .set_start("upper")
            .add_edge("upper", "output")
            .with_checkpointing(Arc::new(MemoryCheckpointStore::new()))
            .build()
            .unwrap();
        let id = workflow.checkpoint_now().await.unwrap();
        let listed = workflow.list_checkpoints().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].checkpoint_id, id);
    }
}
