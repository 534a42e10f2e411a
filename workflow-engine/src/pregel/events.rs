//! Run events and run states
//!
//! Events are published in the order the runtime's single dispatch loop
//! produces them, regardless of which task executed the work.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::WorkflowError;
use super::executor::ExecutorId;
use crate::agent::{AgentRunResponse, AgentRunUpdate};

/// Lifecycle state of a run
///
/// `NotStarted -> Running -> {Suspended <-> Running} -> {Completed | Failed | Exhausted | Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    NotStarted,
    Running,
    /// Idle with outstanding requests
    Suspended,
    Completed,
    Failed,
    /// Orchestration limits were exceeded
    Exhausted,
    Cancelled,
}

impl RunState {
    /// No further execution will happen without a new run or a checkpoint
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Exhausted | RunState::Cancelled
        )
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RunState::Suspended)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::NotStarted => "not_started",
            RunState::Running => "running",
            RunState::Suspended => "suspended",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Exhausted => "exhausted",
            RunState::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// A request for external input raised through a request gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfoEvent {
    /// Correlation id the caller answers with
    pub request_id: String,
    /// Gate that raised the request
    pub source_executor_id: ExecutorId,
    /// Kind of the original request message
    pub request_kind: String,
    /// Original request payload
    pub data: Value,
}

/// Why a message reached no destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The source has no outgoing edges
    NoEdge,
    /// No switch-case matched and there is no default
    NoMatchingCase,
    /// Edges exist but no target accepts the message kind
    NotAccepted,
    /// The explicit target is not connected to the source
    TargetNotConnected,
}

/// Items published on the event stream
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// Run state transition
    RunStateChanged { state: RunState },
    /// A dispatch cycle began
    SuperstepStarted { superstep: usize },
    /// A dispatch cycle finished and its messages were routed
    SuperstepCompleted { superstep: usize },
    /// An executor was invoked with a message
    ExecutorInvoked { executor_id: ExecutorId, kind: String },
    /// An executor invocation returned successfully
    ExecutorCompleted { executor_id: ExecutorId },
    /// Streaming chunk from an agent executor
    AgentUpdate {
        executor_id: ExecutorId,
        update: AgentRunUpdate,
    },
    /// Complete agent response
    AgentResponse {
        executor_id: ExecutorId,
        response: AgentRunResponse,
    },
    /// External input requested; the run suspends once idle
    RequestInfo(RequestInfoEvent),
    /// Output yielded by an executor
    Output { executor_id: ExecutorId, data: Value },
    /// A message was routed nowhere
    MessageDropped {
        source_id: Option<ExecutorId>,
        kind: String,
        reason: DropReason,
    },
    /// An edge predicate failed and the edge did not fire
    PredicateFailed { error: WorkflowError },
    /// Outstanding requests were dropped because the run ended without them
    RequestsDiscarded { request_ids: Vec<String> },
    /// A checkpoint was persisted
    CheckpointCreated { checkpoint_id: String, superstep: usize },
    /// The run failed, was exhausted or was cancelled
    Failed { error: WorkflowError },
    /// Executor-defined event
    Custom {
        executor_id: ExecutorId,
        name: String,
        data: Value,
    },
}

impl WorkflowEvent {
    /// Output payload, if this is an output event
    pub fn as_output(&self) -> Option<&Value> {
        match self {
            WorkflowEvent::Output { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Request details, if this is a request event
    pub fn as_request(&self) -> Option<&RequestInfoEvent> {
        match self {
            WorkflowEvent::RequestInfo(request) => Some(request),
            _ => None,
        }
    }

    /// New state, if this is a state transition
    pub fn as_state(&self) -> Option<RunState> {
        match self {
            WorkflowEvent::RunStateChanged { state } => Some(*state),
            _ => None,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::RunStateChanged { .. } => "run_state_changed",
            WorkflowEvent::SuperstepStarted { .. } => "superstep_started",
            WorkflowEvent::SuperstepCompleted { .. } => "superstep_completed",
            WorkflowEvent::ExecutorInvoked { .. } => "executor_invoked",
            WorkflowEvent::ExecutorCompleted { .. } => "executor_completed",
            WorkflowEvent::AgentUpdate { .. } => "agent_update",
            WorkflowEvent::AgentResponse { .. } => "agent_response",
            WorkflowEvent::RequestInfo(_) => "request_info",
            WorkflowEvent::Output { .. } => "output",
            WorkflowEvent::MessageDropped { .. } => "message_dropped",
            WorkflowEvent::PredicateFailed { .. } => "predicate_failed",
            WorkflowEvent::RequestsDiscarded { .. } => "requests_discarded",
            WorkflowEvent::CheckpointCreated { .. } => "checkpoint_created",
            WorkflowEvent::Failed { .. } => "failed",
            WorkflowEvent::Custom { .. } => "custom",
        }
    }
}

/// Events collected from one batch-mode operation
#[derive(Debug, Clone, Default)]
pub struct WorkflowRunResult {
    events: Vec<WorkflowEvent>,
}

impl WorkflowRunResult {
    pub fn new(events: Vec<WorkflowEvent>) -> Self {
        Self { events }
    }

    /// All events in publication order
    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<WorkflowEvent> {
        self.events
    }

    /// Outputs yielded during the operation
    pub fn outputs(&self) -> Vec<&Value> {
        self.events.iter().filter_map(WorkflowEvent::as_output).collect()
    }

    /// Requests raised during the operation
    pub fn request_info_events(&self) -> Vec<&RequestInfoEvent> {
        self.events.iter().filter_map(WorkflowEvent::as_request).collect()
    }

    /// The last state transition reported
    pub fn final_state(&self) -> RunState {
        self.events
            .iter()
            .rev()
            .find_map(WorkflowEvent::as_state)
            .unwrap_or_default()
    }

    /// The error that ended the run, if any
    pub fn error(&self) -> Option<&WorkflowError> {
        self.events.iter().rev().find_map(|event| match event {
            WorkflowEvent::Failed { error } => Some(error),
            _ => None,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.final_state() == RunState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_state_terminal() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Exhausted.is_terminal());
        assert!(!RunState::Suspended.is_terminal());
        assert!(RunState::Suspended.is_suspended());
        assert_eq!(RunState::default(), RunState::NotStarted);
    }

    #[test]
    fn test_run_result_accessors() {
        let request = RequestInfoEvent {
            request_id: "r1".into(),
            source_executor_id: "gate".into(),
            request_kind: "feedback".into(),
            data: json!({"prompt": "?"}),
        };
        let result = WorkflowRunResult::new(vec![
            WorkflowEvent::RunStateChanged { state: RunState::Running },
            WorkflowEvent::Output {
                executor_id: "final".into(),
                data: json!("done"),
            },
            WorkflowEvent::RequestInfo(request.clone()),
            WorkflowEvent::RunStateChanged { state: RunState::Suspended },
        ]);

        assert_eq!(result.outputs(), vec![&json!("done")]);
        assert_eq!(result.request_info_events(), vec![&request]);
        assert_eq!(result.final_state(), RunState::Suspended);
        assert!(result.error().is_none());
        assert!(!result.is_completed());
    }

    #[test]
    fn test_failed_event_surfaces_error() {
        let result = WorkflowRunResult::new(vec![
            WorkflowEvent::Failed {
                error: WorkflowError::executor_failure("boom", "bad input"),
            },
            WorkflowEvent::RunStateChanged { state: RunState::Failed },
        ]);
        assert_eq!(result.final_state(), RunState::Failed);
        assert_eq!(
            result.error().and_then(|e| e.executor_id()).map(|id| id.as_str()),
            Some("boom")
        );
    }
}
