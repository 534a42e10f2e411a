//! Magentic workflow builder

use std::sync::Arc;

use super::manager::MagenticManager;
use super::orchestrator::MagenticOrchestrator;
use super::{MagenticLimits, MagenticPlanReviewRequest, ParticipantInfo, ORCHESTRATOR_ID, PLAN_REVIEW_ID};
use crate::agent::ChatAgent;
use crate::pregel::checkpoint::CheckpointStore;
use crate::pregel::config::WorkflowConfig;
use crate::pregel::error::WorkflowError;
use crate::workflow::executors::{AgentExecutor, RequestInfoExecutor};
use crate::workflow::graph::WorkflowBuilder;
use crate::workflow::Workflow;

/// Assembles a Magentic orchestration as an ordinary [`Workflow`].
///
/// ```ignore
/// let workflow = MagenticBuilder::new()
///     .participant("researcher", "Finds information", researcher)
///     .participant("coder", "Writes and runs code", coder)
///     .manager(Arc::new(AgentMagenticManager::new(manager_agent)))
///     .limits(MagenticLimits::new(5, 2, 1))
///     .with_plan_review()
///     .build()?;
/// ```
#[derive(Default)]
pub struct MagenticBuilder {
    participants: Vec<(ParticipantInfo, Arc<dyn ChatAgent>)>,
    manager: Option<Arc<dyn MagenticManager>>,
    limits: MagenticLimits,
    plan_review: bool,
    streaming: bool,
    id: Option<String>,
    config: Option<WorkflowConfig>,
    store: Option<Arc<dyn CheckpointStore>>,
}

impl MagenticBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant; its executor id is `name`
    pub fn participant(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        agent: Arc<dyn ChatAgent>,
    ) -> Self {
        let info = ParticipantInfo {
            name: name.into(),
            description: description.into(),
        };
        self.participants.push((info, agent));
        self
    }

    pub fn manager(mut self, manager: Arc<dyn MagenticManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn limits(mut self, limits: MagenticLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Ask a human to approve the plan before the first round
    pub fn with_plan_review(mut self) -> Self {
        self.plan_review = true;
        self
    }

    /// Stream participant output as `AgentUpdate` events
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_checkpointing(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let manager = self
            .manager
            .ok_or_else(|| WorkflowError::config_error("a Magentic workflow needs a manager"))?;
        if self.participants.is_empty() {
            return Err(WorkflowError::config_error("a Magentic workflow needs at least one participant"));
        }

        let infos: Vec<ParticipantInfo> = self.participants.iter().map(|(info, _)| info.clone()).collect();
        let orchestrator = MagenticOrchestrator::new(manager, infos, self.limits, self.plan_review);

        let mut builder = WorkflowBuilder::new()
            .with_id(self.id.unwrap_or_else(|| "magentic".to_string()))
            .add_executor(orchestrator)
            .set_start(ORCHESTRATOR_ID);

        for (info, agent) in self.participants {
            builder = builder
                .add_executor(AgentExecutor::new(info.name.as_str(), agent).with_streaming(self.streaming))
                .add_edge(ORCHESTRATOR_ID, info.name.as_str())
                .add_edge(info.name.as_str(), ORCHESTRATOR_ID);
        }

        if self.plan_review {
            builder = builder
                .add_executor(RequestInfoExecutor::for_payload::<MagenticPlanReviewRequest>(PLAN_REVIEW_ID))
                .add_edge(ORCHESTRATOR_ID, PLAN_REVIEW_ID)
                .add_edge(PLAN_REVIEW_ID, ORCHESTRATOR_ID);
        }

        if let Some(config) = self.config {
            builder = builder.with_config(config);
        }
        if let Some(store) = self.store {
            builder = builder.with_checkpointing(store);
        }

        Ok(builder.build()?)
    }
}
