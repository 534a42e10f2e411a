//! Error types for the workflow runtime
//!
//! `WorkflowError` is `Clone` so that a failure can be carried inside the
//! event stream as well as returned to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::executor::ExecutorId;
use super::message::Message;
use crate::workflow::graph::GraphValidationError;

/// Which orchestration limit was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationLimit {
    Round,
    Stall,
    Reset,
}

impl fmt::Display for OrchestrationLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestrationLimit::Round => "round",
            OrchestrationLimit::Stall => "stall",
            OrchestrationLimit::Reset => "reset",
        };
        write!(f, "{}", name)
    }
}

/// Errors that can occur while building or running a workflow
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    /// The graph failed build-time validation
    #[error("Graph validation failed: {0}")]
    GraphValidation(#[from] GraphValidationError),

    /// An edge predicate failed; the edge does not fire
    #[error("Routing predicate failed on {from} -> {to}: {message}")]
    RoutingPredicate {
        from: ExecutorId,
        to: ExecutorId,
        message: String,
    },

    /// An executor invocation returned an error or panicked
    #[error("Executor {executor_id} failed: {message}")]
    ExecutorFailure {
        executor_id: ExecutorId,
        message: String,
        input: Option<Box<Message>>,
    },

    /// A fan-in aggregator would have received a missing or duplicated source
    #[error("Fan-in contract violated for {aggregator}: {detail}")]
    FanInContractViolation { aggregator: ExecutorId, detail: String },

    /// Round, stall or reset limits of an orchestrator were exceeded
    #[error("Orchestration exhausted: {limit} limit of {max} exceeded")]
    OrchestrationExhausted { limit: OrchestrationLimit, max: usize },

    /// No checkpoint exists with the requested id
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Checkpoint storage failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Checkpoint belongs to another workflow
    #[error("Checkpoint workflow mismatch: expected {expected}, found {found}")]
    CheckpointMismatch { expected: String, found: String },

    /// A response was supplied for a request that is not outstanding
    #[error("Unknown request id: {0}")]
    UnknownRequest(String),

    /// The operation is not valid in the current run state
    #[error("Invalid run state: {0}")]
    InvalidState(String),

    /// Maximum supersteps exceeded
    #[error("Max supersteps exceeded: {0}")]
    MaxSuperstepsExceeded(usize),

    /// Payload encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Run cancelled by the caller
    #[error("Workflow cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkflowError {
    /// Create an executor failure without the triggering message
    pub fn executor_failure(executor_id: impl Into<ExecutorId>, message: impl Into<String>) -> Self {
        Self::ExecutorFailure {
            executor_id: executor_id.into(),
            message: message.into(),
            input: None,
        }
    }

    /// Create an executor failure that records the message being handled
    pub fn executor_failure_with_input(
        executor_id: impl Into<ExecutorId>,
        message: impl Into<String>,
        input: Message,
    ) -> Self {
        Self::ExecutorFailure {
            executor_id: executor_id.into(),
            message: message.into(),
            input: Some(Box::new(input)),
        }
    }

    /// Create a routing predicate error
    pub fn routing_predicate(
        from: impl Into<ExecutorId>,
        to: impl Into<ExecutorId>,
        message: impl Into<String>,
    ) -> Self {
        Self::RoutingPredicate {
            from: from.into(),
            to: to.into(),
            message: message.into(),
        }
    }

    /// Create a fan-in contract violation
    pub fn fan_in_violation(aggregator: impl Into<ExecutorId>, detail: impl Into<String>) -> Self {
        Self::FanInContractViolation {
            aggregator: aggregator.into(),
            detail: detail.into(),
        }
    }

    /// Create an orchestration exhausted error
    pub fn orchestration_exhausted(limit: OrchestrationLimit, max: usize) -> Self {
        Self::OrchestrationExhausted { limit, max }
    }

    /// Create a checkpoint error
    pub fn checkpoint_error(message: impl Into<String>) -> Self {
        Self::Checkpoint(message.into())
    }

    /// Create a checkpoint mismatch error
    pub fn checkpoint_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::CheckpointMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a config error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Errors the caller can correct and retry without rebuilding anything
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WorkflowError::CheckpointNotFound(_)
                | WorkflowError::UnknownRequest(_)
                | WorkflowError::InvalidState(_)
                | WorkflowError::RoutingPredicate { .. }
        )
    }

    /// Errors that end a run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkflowError::ExecutorFailure { .. }
                | WorkflowError::FanInContractViolation { .. }
                | WorkflowError::OrchestrationExhausted { .. }
                | WorkflowError::MaxSuperstepsExceeded(_)
                | WorkflowError::GraphValidation(_)
        )
    }

    /// The executor responsible for this error, if any
    pub fn executor_id(&self) -> Option<&ExecutorId> {
        match self {
            WorkflowError::ExecutorFailure { executor_id, .. } => Some(executor_id),
            WorkflowError::FanInContractViolation { aggregator, .. } => Some(aggregator),
            WorkflowError::RoutingPredicate { from, .. } => Some(from),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
