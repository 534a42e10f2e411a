//! Magentic orchestrator executor
//!
//! Drives the plan → round → finalize loop. All orchestration state lives in
//! a [`MagenticContext`] stored in shared state under [`CONTEXT_KEY`], so a
//! run restored from a checkpoint picks up at the same round.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::manager::MagenticManager;
use super::{
    MagenticContext, MagenticLimits, MagenticPlanReviewReply, MagenticPlanReviewRequest, ParticipantInfo,
    PlanReviewDecision, ORCHESTRATOR_EVENT, ORCHESTRATOR_ID, PLAN_REVIEW_ID,
};
use crate::agent::{AgentError, ChatMessage};
use crate::pregel::context::WorkflowContext;
use crate::pregel::error::{OrchestrationLimit, WorkflowError};
use crate::pregel::executor::{Executor, ExecutorId, ExecutorKind};
use crate::pregel::message::{Message, MessagePayload, TEXT_KIND};
use crate::pregel::request::RequestResponse;
use crate::workflow::executors::{AgentExecutorRequest, AgentExecutorResponse};

/// Shared state key of the orchestration ledger
pub const CONTEXT_KEY: &str = "magentic::context";

/// Coordinates participants through a [`MagenticManager`]
pub struct MagenticOrchestrator {
    id: ExecutorId,
    manager: Arc<dyn MagenticManager>,
    participants: Vec<ParticipantInfo>,
    limits: MagenticLimits,
    plan_review: bool,
}

impl MagenticOrchestrator {
    pub fn new(
        manager: Arc<dyn MagenticManager>,
        participants: Vec<ParticipantInfo>,
        limits: MagenticLimits,
        plan_review: bool,
    ) -> Self {
        Self {
            id: ExecutorId::new(ORCHESTRATOR_ID),
            manager,
            participants,
            limits,
            plan_review,
        }
    }

    fn manager_failure(&self, err: AgentError) -> WorkflowError {
        WorkflowError::executor_failure(self.id.clone(), format!("manager: {}", err))
    }

    fn narrate(&self, ctx: &mut WorkflowContext, kind: &str, text: &str) {
        debug!(kind = %kind, "{}", text);
        ctx.emit(ORCHESTRATOR_EVENT, json!({ "kind": kind, "text": text }));
    }

    async fn load(&self, ctx: &WorkflowContext) -> Result<MagenticContext, WorkflowError> {
        ctx.get_shared_state_as::<MagenticContext>(CONTEXT_KEY)
            .await?
            .ok_or_else(|| WorkflowError::executor_failure(self.id.clone(), "no task has been started"))
    }

    async fn save(&self, ctx: &WorkflowContext, state: &MagenticContext) -> Result<(), WorkflowError> {
        ctx.set_shared_state(CONTEXT_KEY, state).await
    }

    async fn start(&self, task: String, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        info!(participants = self.participants.len(), "Starting Magentic orchestration");
        let mut state = MagenticContext::new(task, self.participants.clone());
        state.plan = self.manager.plan(&state).await.map_err(|e| self.manager_failure(e))?;
        self.narrate(ctx, "plan", &state.plan);

        if self.plan_review {
            return self.request_review(state, ctx).await;
        }
        self.begin_rounds(&mut state);
        self.run_round(state, ctx).await
    }

    async fn request_review(&self, state: MagenticContext, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        debug!(revision = state.plan_revision, "Requesting plan review");
        let request = MagenticPlanReviewRequest {
            task: state.task.clone(),
            plan_text: state.plan.clone(),
            revision: state.plan_revision,
        };
        self.save(ctx, &state).await?;
        ctx.send_to(PLAN_REVIEW_ID, &request)
    }

    async fn on_review(&self, response: RequestResponse, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        let reply: MagenticPlanReviewReply = response.data_as()?;
        let mut state = self.load(ctx).await?;

        match reply.decision {
            PlanReviewDecision::Approve => {
                info!(revision = state.plan_revision, "Plan approved");
                if let Some(comments) = reply.comments {
                    state.chat_history.push(ChatMessage::user(comments).with_author("reviewer"));
                }
                self.begin_rounds(&mut state);
                self.run_round(state, ctx).await
            }
            PlanReviewDecision::Revise => {
                info!(revision = state.plan_revision, "Plan revision requested");
                state.review_comments = reply.comments;
                state.plan = self.manager.replan(&state).await.map_err(|e| self.manager_failure(e))?;
                state.plan_revision += 1;
                self.narrate(ctx, "replan", &state.plan);
                self.request_review(state, ctx).await
            }
        }
    }

    /// Put the task ledger at the head of the conversation
    fn begin_rounds(&self, state: &mut MagenticContext) {
        let ledger = format!("Task:\n{}\n\nPlan:\n{}", state.task, state.plan);
        state
            .chat_history
            .insert(0, ChatMessage::assistant(ledger).with_author(ORCHESTRATOR_ID));
    }

    async fn run_round(&self, mut state: MagenticContext, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        loop {
            state.round_count += 1;
            if state.round_count > self.limits.max_round_count {
                warn!(rounds = state.round_count - 1, "Round limit reached");
                self.save(ctx, &state).await?;
                return Err(WorkflowError::orchestration_exhausted(
                    OrchestrationLimit::Round,
                    self.limits.max_round_count,
                ));
            }

            let ledger = self.manager.progress(&state).await.map_err(|e| self.manager_failure(e))?;
            debug!(
                round = state.round_count,
                satisfied = ledger.request_satisfied,
                in_loop = ledger.in_loop,
                progress = ledger.progress_being_made,
                next_speaker = %ledger.next_speaker,
                "Progress ledger"
            );

            if ledger.request_satisfied {
                let answer = self.manager.finalize(&state).await.map_err(|e| self.manager_failure(e))?;
                info!(rounds = state.round_count, "Magentic orchestration completed");
                self.narrate(ctx, "final", &answer);
                self.save(ctx, &state).await?;
                ctx.yield_output(answer);
                return Ok(());
            }

            let known_speaker = state.has_participant(&ledger.next_speaker);
            if !known_speaker {
                warn!(next_speaker = %ledger.next_speaker, "Manager picked an unknown participant");
            }
            if !ledger.progress_being_made || ledger.in_loop || !known_speaker {
                state.stall_count += 1;
            } else {
                state.stall_count = state.stall_count.saturating_sub(1);
            }

            if state.stall_count > self.limits.max_stall_count {
                state.reset_count += 1;
                if state.reset_count > self.limits.max_reset_count {
                    warn!(resets = state.reset_count - 1, "Reset limit reached");
                    self.save(ctx, &state).await?;
                    return Err(WorkflowError::orchestration_exhausted(
                        OrchestrationLimit::Reset,
                        self.limits.max_reset_count,
                    ));
                }

                info!(reset = state.reset_count, "Stalled; resetting and replanning");
                state.stall_count = 0;
                state.chat_history.clear();
                state.review_comments = None;
                state.plan = self.manager.replan(&state).await.map_err(|e| self.manager_failure(e))?;
                self.narrate(ctx, "reset", &state.plan);
                self.begin_rounds(&mut state);
                continue;
            }

            if !known_speaker {
                continue;
            }

            self.narrate(
                ctx,
                "instruction",
                &format!("{}: {}", ledger.next_speaker, ledger.instruction),
            );
            state
                .chat_history
                .push(ChatMessage::user(ledger.instruction).with_author(ORCHESTRATOR_ID));
            let request = AgentExecutorRequest::respond_to(state.chat_history.clone()).with_reset();
            self.save(ctx, &state).await?;
            return ctx.send_to(ledger.next_speaker.as_str(), &request);
        }
    }

    async fn on_participant_reply(
        &self,
        response: AgentExecutorResponse,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let mut state = self.load(ctx).await?;
        debug!(participant = %response.executor_id, "Participant replied");
        for mut message in response.agent_run_response.messages {
            if message.author_name.is_none() {
                message.author_name = Some(response.executor_id.to_string());
            }
            state.chat_history.push(message);
        }
        self.run_round(state, ctx).await
    }
}

#[async_trait]
impl Executor for MagenticOrchestrator {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_kinds(&self) -> Vec<String> {
        vec![
            TEXT_KIND.to_string(),
            AgentExecutorResponse::KIND.to_string(),
            RequestResponse::KIND.to_string(),
        ]
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Orchestrator
    }

    async fn handle(&self, message: Message, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        if message.is::<String>() {
            let task: String = message.decode()?;
            return self.start(task, ctx).await;
        }

        if message.is::<AgentExecutorResponse>() {
            let response: AgentExecutorResponse = message.decode()?;
            return self.on_participant_reply(response, ctx).await;
        }

        if message.is::<RequestResponse>() {
            let response: RequestResponse = message.decode()?;
            if !response.answers::<MagenticPlanReviewRequest>() {
                return Err(WorkflowError::executor_failure(
                    self.id.clone(),
                    format!("unexpected response to a '{}' request", response.original_kind),
                ));
            }
            return self.on_review(response, ctx).await;
        }

        Err(WorkflowError::executor_failure(
            self.id.clone(),
            format!("unsupported message kind '{}'", message.kind),
        ))
    }
}
