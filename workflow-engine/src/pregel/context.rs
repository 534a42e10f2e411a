//! Per-invocation context handed to executors
//!
//! The context collects everything an invocation produces. The runtime
//! drains it after the invocation returns and publishes the effects in
//! queue order, so concurrent invocations never interleave their events.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::WorkflowError;
use super::events::{RequestInfoEvent, WorkflowEvent};
use super::executor::ExecutorId;
use super::message::{Message, MessagePayload};
use super::request::RaisedRequest;
use super::state::SharedState;

/// Cooperative cancellation flag shared between a workflow and its executors
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the next superstep boundary
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Everything one invocation produced
#[derive(Debug, Default)]
pub(crate) struct ExecutorEffects {
    pub messages: Vec<Message>,
    pub events: Vec<WorkflowEvent>,
    pub requests: Vec<RaisedRequest>,
    pub yielded_output: bool,
}

/// Context provided to an executor during one invocation
pub struct WorkflowContext {
    executor_id: ExecutorId,
    superstep: usize,
    shared_state: SharedState,
    cancellation: CancellationHandle,
    effects: ExecutorEffects,
}

impl WorkflowContext {
    /// Create a context for one invocation
    pub fn new(
        executor_id: ExecutorId,
        superstep: usize,
        shared_state: SharedState,
        cancellation: CancellationHandle,
    ) -> Self {
        Self {
            executor_id,
            superstep,
            shared_state,
            cancellation,
            effects: ExecutorEffects::default(),
        }
    }

    /// Get the current executor ID
    pub fn executor_id(&self) -> &ExecutorId {
        &self.executor_id
    }

    /// Current superstep number (0-indexed)
    pub fn superstep(&self) -> usize {
        self.superstep
    }

    /// Send a message along this executor's outgoing edges
    pub fn send_message(&mut self, message: impl Into<Message>) {
        let message = message.into().with_source(self.executor_id.clone());
        self.effects.messages.push(message);
    }

    /// Send a message to one connected downstream executor only
    pub fn send_message_to(&mut self, target: impl Into<ExecutorId>, message: impl Into<Message>) {
        let message = message
            .into()
            .with_source(self.executor_id.clone())
            .with_target(target);
        self.effects.messages.push(message);
    }

    /// Encode and send a typed payload
    pub fn send<T: MessagePayload>(&mut self, payload: &T) -> Result<(), WorkflowError> {
        let message = Message::from_payload(payload)?;
        self.send_message(message);
        Ok(())
    }

    /// Encode and send a typed payload to one downstream executor
    pub fn send_to<T: MessagePayload>(
        &mut self,
        target: impl Into<ExecutorId>,
        payload: &T,
    ) -> Result<(), WorkflowError> {
        let message = Message::from_payload(payload)?;
        self.send_message_to(target, message);
        Ok(())
    }

    /// Yield a workflow output
    pub fn yield_output(&mut self, data: impl Into<Value>) {
        self.effects.events.push(WorkflowEvent::Output {
            executor_id: self.executor_id.clone(),
            data: data.into(),
        });
        self.effects.yielded_output = true;
    }

    /// Publish an event
    pub fn add_event(&mut self, event: WorkflowEvent) {
        self.effects.events.push(event);
    }

    /// Publish a named custom event
    pub fn emit(&mut self, name: impl Into<String>, data: impl Into<Value>) {
        self.effects.events.push(WorkflowEvent::Custom {
            executor_id: self.executor_id.clone(),
            name: name.into(),
            data: data.into(),
        });
    }

    /// Raise a request for external input and return its id
    ///
    /// The run suspends once no other work is queued; answers come back as
    /// [`RequestResponse`](super::request::RequestResponse) messages routed
    /// along this executor's outgoing edges.
    pub fn request_info(&mut self, request: Message) -> String {
        let request_id = uuid::Uuid::new_v4().to_string();
        let event = RequestInfoEvent {
            request_id: request_id.clone(),
            source_executor_id: self.executor_id.clone(),
            request_kind: request.kind.clone(),
            data: request.payload.clone(),
        };
        self.effects.events.push(WorkflowEvent::RequestInfo(event.clone()));
        self.effects.requests.push(RaisedRequest { event, request });
        request_id
    }

    /// Handle to the run's shared state
    pub fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    pub async fn get_shared_state(&self, key: &str) -> Option<Value> {
        self.shared_state.get(key).await
    }

    pub async fn get_shared_state_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, WorkflowError> {
        self.shared_state.get_as(key).await
    }

    pub async fn set_shared_state<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<(), WorkflowError> {
        self.shared_state.set_as(key, value).await
    }

    pub async fn delete_shared_state(&self, key: &str) -> Option<Value> {
        self.shared_state.delete(key).await
    }

    /// Whether the caller asked the run to stop
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Messages queued so far in this invocation
    pub fn pending_messages(&self) -> &[Message] {
        &self.effects.messages
    }

    pub(crate) fn into_effects(self) -> ExecutorEffects {
        self.effects
    }
}
