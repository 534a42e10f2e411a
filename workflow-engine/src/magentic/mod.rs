//! Magentic orchestration
//!
//! A manager-led multi-agent pattern assembled from ordinary workflow parts:
//!
//! ```text
//!                 ┌──────────────┐
//!   task ───────▶ │ orchestrator │ ◀──── plan review gate (optional)
//!                 └──┬────────▲──┘
//!      instruction   │        │  response
//!                 ┌──▼────────┴──┐
//!                 │ participants │
//!                 └──────────────┘
//! ```
//!
//! Each round the [`MagenticManager`] inspects the conversation and returns a
//! [`ProgressLedger`]: is the task done, is the team stuck, who speaks next.
//! Stalls accumulate; too many trigger a reset and replan. Round, stall and
//! reset budgets come from [`MagenticLimits`].

pub mod builder;
pub mod manager;
pub mod orchestrator;

use serde::{Deserialize, Serialize};

use crate::agent::ChatMessage;
use crate::pregel::message::MessagePayload;

pub use builder::MagenticBuilder;
pub use manager::{AgentMagenticManager, MagenticManager};
pub use orchestrator::MagenticOrchestrator;

/// Executor id of the orchestrator
pub const ORCHESTRATOR_ID: &str = "magentic_orchestrator";

/// Executor id of the plan review gate
pub const PLAN_REVIEW_ID: &str = "magentic_plan_review";

/// Name of the custom event carrying orchestrator narration
pub const ORCHESTRATOR_EVENT: &str = "orchestrator_message";

/// Orchestration budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagenticLimits {
    pub max_round_count: usize,
    pub max_stall_count: usize,
    pub max_reset_count: usize,
}

impl Default for MagenticLimits {
    fn default() -> Self {
        Self {
            max_round_count: 20,
            max_stall_count: 3,
            max_reset_count: 2,
        }
    }
}

impl MagenticLimits {
    pub fn new(max_round_count: usize, max_stall_count: usize, max_reset_count: usize) -> Self {
        Self {
            max_round_count,
            max_stall_count,
            max_reset_count,
        }
    }
}

/// A team member the manager can pick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub name: String,
    pub description: String,
}

/// Orchestration ledger, kept in shared state between invocations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MagenticContext {
    pub task: String,
    pub participants: Vec<ParticipantInfo>,
    pub plan: String,
    /// Revision number of the plan under review
    pub plan_revision: u32,
    /// Reviewer comments on the last plan, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_comments: Option<String>,
    pub chat_history: Vec<ChatMessage>,
    pub round_count: usize,
    pub stall_count: usize,
    pub reset_count: usize,
}

impl MagenticContext {
    pub fn new(task: impl Into<String>, participants: Vec<ParticipantInfo>) -> Self {
        Self {
            task: task.into(),
            participants,
            ..Default::default()
        }
    }

    pub fn has_participant(&self, name: &str) -> bool {
        self.participants.iter().any(|p| p.name == name)
    }

    /// `- name: description` lines
    pub fn team_description(&self) -> String {
        self.participants
            .iter()
            .map(|p| format!("- {}: {}", p.name, p.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Manager's assessment of one round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressLedger {
    pub request_satisfied: bool,
    pub in_loop: bool,
    pub progress_being_made: bool,
    /// Participant name to act next
    pub next_speaker: String,
    /// What the next speaker should do
    pub instruction: String,
    #[serde(default)]
    pub reason: String,
}

/// Plan sent out for human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagenticPlanReviewRequest {
    pub task: String,
    pub plan_text: String,
    pub revision: u32,
}

impl MessagePayload for MagenticPlanReviewRequest {
    const KIND: &'static str = "magentic_plan_review_request";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanReviewDecision {
    Approve,
    Revise,
}

/// Reviewer's answer to a [`MagenticPlanReviewRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagenticPlanReviewReply {
    pub decision: PlanReviewDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl MagenticPlanReviewReply {
    pub fn approve() -> Self {
        Self {
            decision: PlanReviewDecision::Approve,
            comments: None,
        }
    }

    pub fn revise(comments: impl Into<String>) -> Self {
        Self {
            decision: PlanReviewDecision::Revise,
            comments: Some(comments.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_limits_defaults_and_partial_config() {
        assert_eq!(MagenticLimits::default(), MagenticLimits::new(20, 3, 2));

        let limits: MagenticLimits = serde_json::from_value(json!({"max_round_count": 5})).unwrap();
        assert_eq!(limits, MagenticLimits::new(5, 3, 2));
    }

    #[test]
    fn test_review_reply_wire_format() {
        let value = serde_json::to_value(MagenticPlanReviewReply::approve()).unwrap();
        assert_eq!(value, json!({"decision": "approve"}));

        let reply: MagenticPlanReviewReply =
            serde_json::from_value(json!({"decision": "revise", "comments": "add a budget"})).unwrap();
        assert_eq!(reply, MagenticPlanReviewReply::revise("add a budget"));
    }

    #[test]
    fn test_team_description() {
        let ctx = MagenticContext::new(
            "t",
            vec![
                ParticipantInfo {
                    name: "researcher".into(),
                    description: "finds facts".into(),
                },
                ParticipantInfo {
                    name: "coder".into(),
                    description: "writes code".into(),
                },
            ],
        );
        assert_eq!(ctx.team_description(), "- researcher: finds facts\n- coder: writes code");
        assert!(ctx.has_participant("coder"));
        assert!(!ctx.has_participant("critic"));
    }
}
