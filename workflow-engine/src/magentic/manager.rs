//! Magentic managers
//!
//! A manager plans the work and judges progress each round. The
//! [`AgentMagenticManager`] delegates all four decisions to a chat agent
//! and parses the progress ledger from its JSON reply.

use async_trait::async_trait;
use std::sync::Arc;

use super::{MagenticContext, ProgressLedger};
use crate::agent::{AgentError, ChatAgent, ChatMessage};

/// Planning and progress decisions for a Magentic orchestration
#[async_trait]
pub trait MagenticManager: Send + Sync {
    /// Initial plan for the task
    async fn plan(&self, ctx: &MagenticContext) -> Result<String, AgentError>;

    /// New plan after a reset or a review asking for revision
    async fn replan(&self, ctx: &MagenticContext) -> Result<String, AgentError>;

    /// Assess the conversation and pick the next speaker
    async fn progress(&self, ctx: &MagenticContext) -> Result<ProgressLedger, AgentError>;

    /// Final answer once the request is satisfied
    async fn finalize(&self, ctx: &MagenticContext) -> Result<String, AgentError>;
}

const PLAN_PROMPT: &str = "We are working to address the following user request:

{task}

To answer this request we have assembled the following team:

{team}

Based on the team composition, devise a short bullet-point plan for addressing the request. \
Assign each step to a team member by name.";

const REPLAN_PROMPT: &str = "We are working to address the following user request:

{task}

The team is:

{team}

Our previous plan was:

{plan}

{feedback}

Devise a new short bullet-point plan that overcomes the problems above. \
Assign each step to a team member by name.";

const PROGRESS_PROMPT: &str = "Recall we are working on the following request:

{task}

And we have assembled the following team:

{team}

To make progress on the request, answer the following questions:

- Is the request fully satisfied?
- Are we in a loop, repeating the same requests or responses?
- Are we making forward progress?
- Who should speak next? Select one of: {names}
- What instruction or question would you give this team member?

Reply with a single JSON object and nothing else, using this schema:

{\"request_satisfied\": bool, \"in_loop\": bool, \"progress_being_made\": bool, \
\"next_speaker\": string, \"instruction\": string, \"reason\": string}";

const FINAL_PROMPT: &str = "We are working on the following request:

{task}

We have completed the task. Based on the conversation above, write the final answer to the request. \
Address the user directly.";

/// Manager backed by a chat agent
pub struct AgentMagenticManager {
    agent: Arc<dyn ChatAgent>,
}

impl AgentMagenticManager {
    pub fn new(agent: Arc<dyn ChatAgent>) -> Self {
        Self { agent }
    }

    fn fill(template: &str, ctx: &MagenticContext) -> String {
        let names: Vec<&str> = ctx.participants.iter().map(|p| p.name.as_str()).collect();
        let feedback = match &ctx.review_comments {
            Some(comments) => format!("The reviewer asked for these changes:\n\n{}", comments),
            None => "The team got stuck and made no further progress.".to_string(),
        };
        template
            .replace("{task}", &ctx.task)
            .replace("{team}", &ctx.team_description())
            .replace("{names}", &names.join(", "))
            .replace("{plan}", &ctx.plan)
            .replace("{feedback}", &feedback)
    }

    async fn ask(&self, ctx: &MagenticContext, prompt: String, with_history: bool) -> Result<String, AgentError> {
        let mut conversation = Vec::new();
        if with_history {
            conversation.extend(ctx.chat_history.iter().cloned());
        }
        conversation.push(ChatMessage::user(prompt));
        let response = self.agent.run(&conversation).await?;
        Ok(response.text())
    }
}

#[async_trait]
impl MagenticManager for AgentMagenticManager {
    async fn plan(&self, ctx: &MagenticContext) -> Result<String, AgentError> {
        self.ask(ctx, Self::fill(PLAN_PROMPT, ctx), false).await
    }

    async fn replan(&self, ctx: &MagenticContext) -> Result<String, AgentError> {
        self.ask(ctx, Self::fill(REPLAN_PROMPT, ctx), true).await
    }

    async fn progress(&self, ctx: &MagenticContext) -> Result<ProgressLedger, AgentError> {
        let reply = self.ask(ctx, Self::fill(PROGRESS_PROMPT, ctx), true).await?;
        parse_progress_ledger(&reply)
    }

    async fn finalize(&self, ctx: &MagenticContext) -> Result<String, AgentError> {
        self.ask(ctx, Self::fill(FINAL_PROMPT, ctx), true).await
    }
}

/// Parse the JSON object in a manager reply, ignoring surrounding prose or
/// code fences
pub fn parse_progress_ledger(reply: &str) -> Result<ProgressLedger, AgentError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(AgentError::InvalidResponse(format!(
                "no JSON object in progress reply: {}",
                reply
            )))
        }
    };
    serde_json::from_str(json).map_err(|e| AgentError::InvalidResponse(format!("progress ledger: {}", e)))
}
