//! Superstep scheduler
//!
//! The runtime drives a run through synchronized supersteps. Each superstep
//! follows the sequence: Drain → Invoke → Publish → Route.
//!
//! - **Drain** takes every queued delivery in FIFO order.
//! - **Invoke** runs all deliveries concurrently, bounded by `parallelism`.
//! - **Publish** emits each invocation's buffered events in queue order.
//! - **Route** passes emitted messages through the edge router; each routed
//!   copy gets the next sequence number and is queued for the next superstep.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use super::checkpoint::{Checkpoint, CheckpointStore};
use super::config::WorkflowConfig;
use super::context::{CancellationHandle, ExecutorEffects, WorkflowContext};
use super::error::WorkflowError;
use super::events::{DropReason, RequestInfoEvent, RunState, WorkflowEvent};
use super::executor::ExecutorId;
use super::message::Message;
use super::request::{PendingRequest, RequestLedger};
use super::state::SharedState;
use crate::workflow::edge::EdgeGroup;
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::router::{EdgeRouter, FanInBuffers};

/// Receives events in publication order
pub type EventSink<'a> = &'a mut (dyn FnMut(WorkflowEvent) + Send);

/// Mutable state of one run
#[derive(Debug)]
pub(crate) struct Run {
    pub run_id: String,
    pub state: RunState,
    /// Number of completed supersteps
    pub superstep: usize,
    pub next_seq: u64,
    pub next_batch: u64,
    pub queue: VecDeque<(ExecutorId, Message)>,
    pub fan_in: FanInBuffers,
    pub requests: RequestLedger,
    pub shared_state: SharedState,
    last_checkpoint: Option<usize>,
    /// Answers were recorded since the last checkpoint
    answers_unsaved: bool,
}

impl Default for Run {
    fn default() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            state: RunState::NotStarted,
            superstep: 0,
            next_seq: 0,
            next_batch: 0,
            queue: VecDeque::new(),
            fan_in: FanInBuffers::default(),
            requests: RequestLedger::default(),
            shared_state: SharedState::new(),
            last_checkpoint: None,
            answers_unsaved: false,
        }
    }
}

impl Run {
    /// A fresh run with a new id and empty shared state
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a run from a checkpoint, checking it against the graph
    pub fn from_checkpoint(graph: &WorkflowGraph, checkpoint: Checkpoint) -> Result<Self, WorkflowError> {
        if checkpoint.workflow_id != graph.id() {
            return Err(WorkflowError::checkpoint_mismatch(graph.id(), checkpoint.workflow_id));
        }

        let unknown = |id: &ExecutorId| {
            WorkflowError::checkpoint_error(format!(
                "checkpoint {} references unknown executor {}",
                checkpoint.checkpoint_id, id
            ))
        };
        for id in checkpoint.in_flight_messages.keys() {
            if !graph.contains(id) {
                return Err(unknown(id));
            }
        }
        for request in &checkpoint.outstanding_requests {
            if !graph.contains(&request.event.source_executor_id) {
                return Err(unknown(&request.event.source_executor_id));
            }
        }
        for buffer in &checkpoint.fan_in_buffers {
            let valid = matches!(graph.groups().get(buffer.group), Some(EdgeGroup::FanIn { .. }));
            if !valid {
                return Err(WorkflowError::checkpoint_error(format!(
                    "checkpoint {} references fan-in group {} which does not exist",
                    checkpoint.checkpoint_id, buffer.group
                )));
            }
        }

        let queue = checkpoint.queued_deliveries().into_iter().collect();
        Ok(Self {
            run_id: checkpoint.run_id,
            state: RunState::NotStarted,
            superstep: checkpoint.superstep,
            next_seq: checkpoint.next_seq,
            next_batch: checkpoint.next_batch,
            queue,
            fan_in: FanInBuffers::from_snapshot(checkpoint.fan_in_buffers),
            requests: RequestLedger::from_pending(checkpoint.outstanding_requests),
            shared_state: SharedState::from_snapshot(checkpoint.shared_state),
            last_checkpoint: Some(checkpoint.superstep),
            answers_unsaved: false,
        })
    }

    /// Snapshot the run
    pub async fn to_checkpoint(&self, workflow_id: &str, state: RunState) -> Checkpoint {
        let mut in_flight: BTreeMap<ExecutorId, Vec<Message>> = BTreeMap::new();
        for (target, message) in &self.queue {
            in_flight.entry(target.clone()).or_default().push(message.clone());
        }

        let mut checkpoint = Checkpoint::new(workflow_id, self.run_id.clone(), self.superstep);
        checkpoint.state = state;
        checkpoint.next_seq = self.next_seq;
        checkpoint.next_batch = self.next_batch;
        checkpoint.in_flight_messages = in_flight;
        checkpoint.shared_state = self.shared_state.snapshot().await;
        checkpoint.outstanding_requests = self.requests.all().to_vec();
        checkpoint.fan_in_buffers = self.fan_in.snapshot();
        checkpoint
    }

    /// Queue a delivery, assigning the next sequence number
    pub fn enqueue(&mut self, target: ExecutorId, message: Message) {
        let message = message.with_seq(self.next_seq);
        self.next_seq += 1;
        self.queue.push_back((target, message));
    }

    /// Requests still awaiting an answer
    pub fn pending_requests(&self) -> Vec<RequestInfoEvent> {
        self.requests.unanswered()
    }

    /// Record validated answers and take the batches they complete
    pub fn record_answers(&mut self, answers: HashMap<String, Value>) -> Vec<PendingRequest> {
        self.requests.record(answers);
        self.answers_unsaved = true;
        self.requests.take_ready()
    }

    /// Whether the suspended run differs from its last checkpoint
    fn needs_suspension_checkpoint(&self) -> bool {
        self.last_checkpoint != Some(self.superstep) || self.answers_unsaved
    }
}

/// Drives runs of one graph
pub(crate) struct Runtime<'a> {
    pub graph: &'a WorkflowGraph,
    pub config: &'a WorkflowConfig,
    pub store: Option<&'a Arc<dyn CheckpointStore>>,
    pub cancellation: &'a CancellationHandle,
    pub state_tx: &'a watch::Sender<RunState>,
}

impl<'a> Runtime<'a> {
    /// Record and publish a state transition
    pub fn set_state(&self, run: &mut Run, state: RunState, emit: EventSink<'_>) {
        if run.state == state {
            return;
        }
        info!(
            workflow_id = %self.graph.id(),
            run_id = %run.run_id,
            superstep = run.superstep,
            from = %run.state,
            to = %state,
            "Run state changed"
        );
        run.state = state;
        self.state_tx.send_replace(state);
        emit(WorkflowEvent::RunStateChanged { state });
    }

    /// Queue external input for the start executor
    pub fn inject_input(&self, run: &mut Run, message: Message, emit: EventSink<'_>) {
        let start = self.graph.start().clone();
        let accepted = self
            .graph
            .executor(&start)
            .is_some_and(|executor| executor.accepts(&message));
        if accepted {
            run.enqueue(start, message);
        } else {
            debug!(start = %start, kind = %message.kind, "Input dropped: start executor does not accept it");
            emit(WorkflowEvent::MessageDropped {
                source_id: None,
                kind: message.kind,
                reason: DropReason::NotAccepted,
            });
        }
    }

    /// Route released responses as if emitted by their gates
    pub fn inject_responses(
        &self,
        run: &mut Run,
        ready: Vec<PendingRequest>,
        emit: EventSink<'_>,
    ) -> Result<(), WorkflowError> {
        for request in ready {
            debug!(request_id = %request.request_id(), gate = %request.event.source_executor_id, "Releasing response");
            let message = request.into_response()?;
            self.route(run, message, emit)?;
        }
        Ok(())
    }

    /// Drive until the run completes, suspends, fails or is cancelled.
    ///
    /// Returns `Err` when the run ends `Failed` or `Exhausted`; the error has
    /// also been published as a [`WorkflowEvent::Failed`].
    pub async fn drive(&self, run: &mut Run, emit: EventSink<'_>) -> Result<(), WorkflowError> {
        self.set_state(run, RunState::Running, emit);

        loop {
            if self.cancellation.is_cancelled() {
                info!(workflow_id = %self.graph.id(), run_id = %run.run_id, "Run cancelled");
                self.cancellation.reset();
                if let Err(e) = self.checkpoint(run, RunState::Cancelled, emit).await {
                    return self.fail(run, e, emit);
                }
                emit(WorkflowEvent::Failed {
                    error: WorkflowError::Cancelled,
                });
                self.set_state(run, RunState::Cancelled, emit);
                return Ok(());
            }

            if run.queue.is_empty() {
                if run.requests.is_empty() {
                    self.set_state(run, RunState::Completed, emit);
                } else {
                    if run.needs_suspension_checkpoint() {
                        if let Err(e) = self.checkpoint(run, RunState::Suspended, emit).await {
                            return self.fail(run, e, emit);
                        }
                    }
                    self.set_state(run, RunState::Suspended, emit);
                }
                return Ok(());
            }

            if self.config.should_checkpoint(run.superstep) && run.last_checkpoint != Some(run.superstep) {
                if let Err(e) = self.checkpoint(run, RunState::Running, emit).await {
                    return self.fail(run, e, emit);
                }
            }

            if run.superstep >= self.config.max_supersteps {
                return self.fail(run, WorkflowError::MaxSuperstepsExceeded(self.config.max_supersteps), emit);
            }

            match self.superstep(run, emit).await {
                Ok(true) if self.config.stop_on_output => {
                    self.discard_requests(run, emit);
                    self.set_state(run, RunState::Completed, emit);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return self.fail(run, e, emit),
            }
        }
    }

    /// Drop outstanding requests of a run that completes without them
    fn discard_requests(&self, run: &mut Run, emit: EventSink<'_>) {
        let discarded = run.requests.drain();
        if discarded.is_empty() {
            return;
        }
        let request_ids: Vec<String> = discarded.iter().map(|r| r.request_id().to_string()).collect();
        warn!(
            workflow_id = %self.graph.id(),
            run_id = %run.run_id,
            requests = ?request_ids,
            "Run completed with unanswered requests; discarding them"
        );
        emit(WorkflowEvent::RequestsDiscarded { request_ids });
    }

    /// Publish a run-ending error and return it
    pub fn fail(&self, run: &mut Run, err: WorkflowError, emit: EventSink<'_>) -> Result<(), WorkflowError> {
        error!(
            workflow_id = %self.graph.id(),
            run_id = %run.run_id,
            superstep = run.superstep,
            error = %err,
            "Run failed"
        );
        let state = match err {
            WorkflowError::OrchestrationExhausted { .. } => RunState::Exhausted,
            _ => RunState::Failed,
        };
        emit(WorkflowEvent::Failed { error: err.clone() });
        self.set_state(run, state, emit);
        Err(err)
    }

    /// Execute one superstep, returning whether any executor yielded output
    async fn superstep(&self, run: &mut Run, emit: EventSink<'_>) -> Result<bool, WorkflowError> {
        let step = run.superstep;
        let deliveries: Vec<(ExecutorId, Message)> = run.queue.drain(..).collect();
        if self.config.tracing_enabled {
            debug!(superstep = step, deliveries = deliveries.len(), "Superstep started");
        }
        emit(WorkflowEvent::SuperstepStarted { superstep: step });

        let results = self.invoke_all(run, &deliveries, step).await;

        let mut yielded = false;
        let mut batch = None;
        for ((executor_id, input), result) in deliveries.into_iter().zip(results) {
            emit(WorkflowEvent::ExecutorInvoked {
                executor_id: executor_id.clone(),
                kind: input.kind,
            });
            let effects = result?;

            for event in effects.events {
                emit(event);
            }
            emit(WorkflowEvent::ExecutorCompleted {
                executor_id: executor_id.clone(),
            });
            yielded |= effects.yielded_output;

            for message in effects.messages {
                self.route(run, message, emit)?;
            }

            if !effects.requests.is_empty() {
                let batch_id = match batch {
                    Some(b) => b,
                    None => {
                        let b = run.next_batch;
                        run.next_batch += 1;
                        batch = Some(b);
                        b
                    }
                };
                for request in effects.requests {
                    debug!(request_id = %request.event.request_id, gate = %executor_id, batch = batch_id, "Request registered");
                    run.requests.register(request, batch_id);
                }
            }
        }

        run.superstep += 1;
        if self.config.tracing_enabled {
            debug!(superstep = step, queued = run.queue.len(), "Superstep completed");
        }
        emit(WorkflowEvent::SuperstepCompleted { superstep: step });
        Ok(yielded)
    }

    /// Invoke every delivery concurrently, returning results in queue order
    async fn invoke_all(
        &self,
        run: &Run,
        deliveries: &[(ExecutorId, Message)],
        superstep: usize,
    ) -> Vec<Result<ExecutorEffects, WorkflowError>> {
        let semaphore = Arc::new(Semaphore::new(self.config.effective_parallelism()));
        let mut handles = Vec::with_capacity(deliveries.len());

        for (executor_id, message) in deliveries {
            let executor = self.graph.executor(executor_id).cloned();
            let semaphore = Arc::clone(&semaphore);
            let shared_state = run.shared_state.clone();
            let cancellation = self.cancellation.clone();
            let id = executor_id.clone();
            let input = message.clone();
            let tracing_enabled = self.config.tracing_enabled;

            let handle = tokio::spawn(async move {
                let executor = executor
                    .ok_or_else(|| WorkflowError::executor_failure(id.clone(), "executor not registered"))?;

                // Acquire semaphore permit for parallelism control
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| WorkflowError::executor_failure(id.clone(), e.to_string()))?;

                if tracing_enabled {
                    debug!(executor_id = %id, kind = %input.kind, seq = input.seq, "Invoking executor");
                }

                let mut ctx = WorkflowContext::new(id.clone(), superstep, shared_state, cancellation);
                match executor.handle(input.clone(), &mut ctx).await {
                    Ok(()) => Ok(ctx.into_effects()),
                    Err(e) => Err(attribute_failure(e, &id, input)),
                }
            });

            handles.push((executor_id.clone(), message.clone(), handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (executor_id, message, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(WorkflowError::executor_failure_with_input(
                    executor_id,
                    format!("executor task failed: {}", e),
                    message,
                )),
            };
            results.push(result);
        }
        results
    }

    fn route(&self, run: &mut Run, message: Message, emit: EventSink<'_>) -> Result<(), WorkflowError> {
        let outcome = EdgeRouter::new(self.graph).route(message, &mut run.fan_in)?;
        for event in outcome.events {
            emit(event);
        }
        for (target, message) in outcome.deliveries {
            run.enqueue(target, message);
        }
        Ok(())
    }

    /// Persist the run if a store is configured
    pub async fn checkpoint(
        &self,
        run: &mut Run,
        state: RunState,
        emit: EventSink<'_>,
    ) -> Result<Option<String>, WorkflowError> {
        let Some(store) = self.store else {
            return Ok(None);
        };

        let checkpoint = run.to_checkpoint(self.graph.id(), state).await;
        let checkpoint_id = store.save(&checkpoint).await?;
        run.last_checkpoint = Some(run.superstep);
        run.answers_unsaved = false;

        info!(
            workflow_id = %self.graph.id(),
            checkpoint_id = %checkpoint_id,
            superstep = run.superstep,
            pending_messages = checkpoint.pending_message_count(),
            "Checkpoint saved"
        );
        emit(WorkflowEvent::CheckpointCreated {
            checkpoint_id: checkpoint_id.clone(),
            superstep: run.superstep,
        });
        Ok(Some(checkpoint_id))
    }
}

/// Attach executor id and input to an error raised by an executor
fn attribute_failure(err: WorkflowError, executor_id: &ExecutorId, input: Message) -> WorkflowError {
    match err {
        WorkflowError::OrchestrationExhausted { .. }
        | WorkflowError::FanInContractViolation { .. }
        | WorkflowError::Cancelled => err,
        WorkflowError::ExecutorFailure {
            executor_id: failed,
            message,
            input: None,
        } => WorkflowError::executor_failure_with_input(failed, message, input),
        WorkflowError::ExecutorFailure { .. } => err,
        other => WorkflowError::executor_failure_with_input(executor_id.clone(), other.to_string(), input),
    }
}
