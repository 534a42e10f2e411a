//! Chat agent executor
//!
//! Wraps a [`ChatAgent`] as a graph node. The conversation so far is cached in
//! shared state under `agent_conversation::{executor_id}`, so the executor
//! itself holds no run state and re-dispatch after a restore is safe.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::agent::{AgentRunResponse, AgentRunUpdate, ChatAgent, ChatMessage};
use crate::pregel::context::WorkflowContext;
use crate::pregel::error::WorkflowError;
use crate::pregel::events::WorkflowEvent;
use crate::pregel::executor::{Executor, ExecutorId, ExecutorKind};
use crate::pregel::message::{Message, MessagePayload, TEXT_KIND};

/// Messages for an agent executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentExecutorRequest {
    pub messages: Vec<ChatMessage>,
    /// Run the agent after extending the conversation
    pub should_respond: bool,
    /// Drop the cached conversation first
    #[serde(default)]
    pub reset: bool,
}

impl MessagePayload for AgentExecutorRequest {
    const KIND: &'static str = "agent_request";
}

impl AgentExecutorRequest {
    pub fn respond_to(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            should_respond: true,
            reset: false,
        }
    }

    /// Extend the conversation without a reply
    pub fn context_only(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            should_respond: false,
            reset: false,
        }
    }

    pub fn with_reset(mut self) -> Self {
        self.reset = true;
        self
    }
}

/// What an agent executor sends downstream after responding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentExecutorResponse {
    pub executor_id: ExecutorId,
    pub agent_run_response: AgentRunResponse,
    /// Cached conversation including the response
    pub full_conversation: Vec<ChatMessage>,
}

impl MessagePayload for AgentExecutorResponse {
    const KIND: &'static str = "agent_response";
}

/// Executor that runs a chat agent
pub struct AgentExecutor {
    id: ExecutorId,
    agent: Arc<dyn ChatAgent>,
    streaming: bool,
    output_response: bool,
}

impl AgentExecutor {
    pub fn new(id: impl Into<ExecutorId>, agent: Arc<dyn ChatAgent>) -> Self {
        Self {
            id: id.into(),
            agent,
            streaming: false,
            output_response: false,
        }
    }

    /// Publish an `AgentUpdate` event per streamed chunk
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Also yield the response text as a workflow output
    pub fn with_output_response(mut self, output: bool) -> Self {
        self.output_response = output;
        self
    }

    pub fn agent(&self) -> &Arc<dyn ChatAgent> {
        &self.agent
    }

    fn cache_key(&self) -> String {
        format!("agent_conversation::{}", self.id)
    }

    async fn load_cache(&self, ctx: &WorkflowContext) -> Result<Vec<ChatMessage>, WorkflowError> {
        Ok(ctx.get_shared_state_as(&self.cache_key()).await?.unwrap_or_default())
    }

    async fn run_agent(
        &self,
        conversation: &[ChatMessage],
        ctx: &mut WorkflowContext,
    ) -> Result<AgentRunResponse, WorkflowError> {
        let failure = |e: crate::agent::AgentError| WorkflowError::executor_failure(self.id.clone(), e.to_string());

        if !self.streaming {
            return self.agent.run(conversation).await.map_err(failure);
        }

        let mut stream = self.agent.run_stream(conversation).await.map_err(failure)?;
        let mut updates: Vec<AgentRunUpdate> = Vec::new();
        while let Some(update) = stream.next().await {
            let update = update.map_err(failure)?;
            ctx.add_event(WorkflowEvent::AgentUpdate {
                executor_id: self.id.clone(),
                update: update.clone(),
            });
            updates.push(update);
        }
        Ok(AgentRunResponse::from_updates(&updates, Some(self.agent.name())))
    }

    async fn respond(&self, mut conversation: Vec<ChatMessage>, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        debug!(executor_id = %self.id, agent = %self.agent.name(), messages = conversation.len(), "Running agent");

        let mut response = self.run_agent(&conversation, ctx).await?;
        for message in &mut response.messages {
            if message.author_name.is_none() {
                message.author_name = Some(self.agent.name().to_string());
            }
        }
        if response.messages.is_empty() {
            warn!(executor_id = %self.id, "Agent returned no messages");
        }

        ctx.add_event(WorkflowEvent::AgentResponse {
            executor_id: self.id.clone(),
            response: response.clone(),
        });
        if self.output_response {
            ctx.yield_output(response.text());
        }

        conversation.extend(response.messages.iter().cloned());
        ctx.set_shared_state(self.cache_key(), &conversation).await?;
        ctx.send(&AgentExecutorResponse {
            executor_id: self.id.clone(),
            agent_run_response: response,
            full_conversation: conversation,
        })
    }
}

#[async_trait]
impl Executor for AgentExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_kinds(&self) -> Vec<String> {
        vec![
            TEXT_KIND.to_string(),
            AgentExecutorRequest::KIND.to_string(),
            AgentExecutorResponse::KIND.to_string(),
        ]
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Agent
    }

    async fn handle(&self, message: Message, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        let mut conversation = self.load_cache(ctx).await?;

        if message.is::<String>() {
            let text: String = message.decode()?;
            conversation.push(ChatMessage::user(text));
            return self.respond(conversation, ctx).await;
        }

        if message.is::<AgentExecutorRequest>() {
            let request: AgentExecutorRequest = message.decode()?;
            if request.reset {
                conversation.clear();
            }
            conversation.extend(request.messages);
            return if request.should_respond {
                self.respond(conversation, ctx).await
            } else {
                ctx.set_shared_state(self.cache_key(), &conversation).await
            };
        }

        if message.is::<AgentExecutorResponse>() {
            let previous: AgentExecutorResponse = message.decode()?;
            conversation.extend(previous.full_conversation);
            return self.respond(conversation, ctx).await;
        }

        Err(WorkflowError::executor_failure(
            self.id.clone(),
            format!("unsupported message kind '{}'", message.kind),
        ))
    }
}

impl std::fmt::Debug for AgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentExecutor")
            .field("id", &self.id)
            .field("agent", &self.agent.name())
            .field("streaming", &self.streaming)
            .finish()
    }
}
