//! Chat agent boundary
//!
//! The engine does not talk to model providers. It drives anything that
//! implements [`ChatAgent`]: a conversation goes in, response messages come
//! out, optionally as a stream of partial updates.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    /// Name of the agent or participant that wrote the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            author_name: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn with_author(mut self, name: impl Into<String>) -> Self {
        self.author_name = Some(name.into());
        self
    }
}

/// Complete response of one agent run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResponse {
    pub messages: Vec<ChatMessage>,
}

impl AgentRunResponse {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Single assistant message response
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::assistant(text)])
    }

    /// Concatenated text of all messages
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Assemble a response from streamed updates
    pub fn from_updates(updates: &[AgentRunUpdate], author_name: Option<&str>) -> Self {
        let text: String = updates.iter().map(|u| u.text.as_str()).collect();
        let mut message = ChatMessage::assistant(text);
        message.author_name = author_name
            .map(String::from)
            .or_else(|| updates.iter().find_map(|u| u.author_name.clone()));
        Self::new(vec![message])
    }
}

/// Partial update streamed during an agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunUpdate {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
}

/// Errors reported by chat agents
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Agent request failed: {0}")]
    Request(String),

    #[error("Invalid agent response: {0}")]
    InvalidResponse(String),

    #[error("Agent stream failed: {0}")]
    Stream(String),
}

/// Stream of partial updates
pub type AgentRunStream = Pin<Box<dyn Stream<Item = Result<AgentRunUpdate, AgentError>> + Send>>;

/// A conversational agent
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct Echo;
///
/// #[async_trait]
/// impl ChatAgent for Echo {
///     fn name(&self) -> &str { "echo" }
///
///     async fn run(&self, messages: &[ChatMessage]) -> Result<AgentRunResponse, AgentError> {
///         let last = messages.last().map(|m| m.text.clone()).unwrap_or_default();
///         Ok(AgentRunResponse::from_text(last))
///     }
/// }
/// ```
#[async_trait]
pub trait ChatAgent: Send + Sync {
    /// Agent name, used as the author of its messages
    fn name(&self) -> &str;

    /// Short description of what the agent is good at
    fn description(&self) -> &str {
        ""
    }

    /// Produce a response to the conversation (non-streaming)
    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentRunResponse, AgentError>;

    /// Produce a response as a stream of updates
    ///
    /// Default implementation falls back to `run()` and yields one chunk.
    async fn run_stream(&self, messages: &[ChatMessage]) -> Result<AgentRunStream, AgentError> {
        let response = self.run(messages).await?;
        let update = AgentRunUpdate {
            text: response.text(),
            author_name: Some(self.name().to_string()),
        };
        Ok(Box::pin(futures::stream::once(async move { Ok(update) })))
    }
}
