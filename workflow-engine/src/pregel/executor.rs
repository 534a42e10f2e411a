//! Executor abstractions
//!
//! An executor is an addressable unit of computation in a workflow graph.
//! It consumes one message per invocation and reports its effects (emitted
//! messages, outputs, requests, events) through a [`WorkflowContext`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::context::WorkflowContext;
use super::error::WorkflowError;
use super::message::Message;

/// Unique identifier for an executor in the workflow graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutorId(pub String);

impl ExecutorId {
    /// Create a new ExecutorId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExecutorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExecutorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&String> for ExecutorId {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

impl From<&ExecutorId> for ExecutorId {
    fn from(id: &ExecutorId) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broad category of an executor, used for diagram shapes and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// Plain computation
    #[default]
    Function,
    /// Wraps a chat agent
    Agent,
    /// Suspends the run pending external answers
    RequestGate,
    /// Coordinates participants across rounds
    Orchestrator,
    /// Consumes fan-in results
    Aggregator,
}

/// The core executor trait
///
/// # Example
///
/// ```ignore
/// struct Upper {
///     id: ExecutorId,
/// }
///
/// #[async_trait]
/// impl Executor for Upper {
///     fn id(&self) -> &ExecutorId {
///         &self.id
///     }
///
///     fn input_kinds(&self) -> Vec<String> {
///         vec![TEXT_KIND.to_string()]
///     }
///
///     async fn handle(&self, message: Message, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
///         let text: String = message.decode()?;
///         ctx.send(&text.to_uppercase())
///     }
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync {
    /// Get the executor's unique identifier
    fn id(&self) -> &ExecutorId;

    /// Message kinds this executor handles. An empty list accepts every kind.
    fn input_kinds(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether a message of this kind may be delivered here
    fn accepts(&self, message: &Message) -> bool {
        let kinds = self.input_kinds();
        kinds.is_empty() || kinds.iter().any(|k| *k == message.kind)
    }

    /// Executor category
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Function
    }

    /// Handle one message
    ///
    /// Returning an error ends the run; the runtime never retries.
    async fn handle(&self, message: Message, ctx: &mut WorkflowContext) -> Result<(), WorkflowError>;
}

/// Type alias for a shared executor
pub type BoxedExecutor = Arc<dyn Executor>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pregel::message::TEXT_KIND;

    struct TextOnly {
        id: ExecutorId,
    }

    #[async_trait]
    impl Executor for TextOnly {
        fn id(&self) -> &ExecutorId {
            &self.id
        }

        fn input_kinds(&self) -> Vec<String> {
            vec![TEXT_KIND.to_string()]
        }

        async fn handle(&self, _message: Message, _ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
            Ok(())
        }
    }

    struct AcceptsAll {
        id: ExecutorId,
    }

    #[async_trait]
    impl Executor for AcceptsAll {
        fn id(&self) -> &ExecutorId {
            &self.id
        }

        async fn handle(&self, _message: Message, _ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
            Ok(())
        }
    }

    #[test]
    fn test_executor_id_conversions() {
        let id = ExecutorId::new("stage1");
        assert_eq!(id.as_str(), "stage1");
        assert_eq!(ExecutorId::from("stage1"), id);
        assert_eq!(ExecutorId::from(String::from("stage1")), id);
        assert_eq!(format!("{}", id), "stage1");
    }

    #[test]
    fn test_accepts_by_kind() {
        let text_only = TextOnly { id: "t".into() };
        assert!(text_only.accepts(&Message::text("hi")));
        assert!(!text_only.accepts(&Message::json(serde_json::json!(1))));

        let all = AcceptsAll { id: "a".into() };
        assert!(all.accepts(&Message::json(serde_json::json!(1))));
        assert_eq!(all.kind(), ExecutorKind::Function);
    }
}
