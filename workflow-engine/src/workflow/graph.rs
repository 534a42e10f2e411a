//! WorkflowBuilder DSL.
//!
//! Provides a fluent API for registering executors and edge groups, then
//! validates the whole graph in one pass and produces an immutable
//! [`WorkflowGraph`] wrapped in a runnable [`Workflow`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use thiserror::Error;

use super::compiled::Workflow;
use super::edge::{Case, EdgeGroup, Predicate};
use crate::pregel::checkpoint::CheckpointStore;
use crate::pregel::config::WorkflowConfig;
use crate::pregel::executor::{BoxedExecutor, Executor, ExecutorId};
use crate::pregel::message::MessagePayload;

/// Errors that can occur while building a workflow graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphValidationError {
    #[error("workflow start executor not set")]
    NoStartExecutor,
    #[error("unknown executor id: {0}")]
    UnknownExecutor(String),
    #[error("duplicate executor id: {0}")]
    DuplicateExecutor(String),
    #[error("fan-in into {target} has no sources")]
    EmptyFanIn { target: String },
    #[error("fan-in into {target} lists source {source_id} more than once")]
    DuplicateFanInSource { target: String, source_id: String },
    #[error("fan-out from {from} has no targets")]
    EmptyFanOut { from: String },
    #[error("selection edge from {from} has no cases")]
    EmptyCases { from: String },
    #[error("{from} has both a switch-case and a multi-selection edge group")]
    ConflictingSelection { from: String },
    #[error("executors unreachable from start: {}", .0.join(", "))]
    Unreachable(Vec<String>),
}

/// Immutable executor graph: an arena of executors plus edge groups in
/// declaration order.
pub struct WorkflowGraph {
    id: String,
    name: Option<String>,
    executors: Vec<BoxedExecutor>,
    index: HashMap<ExecutorId, usize>,
    start: ExecutorId,
    groups: Vec<EdgeGroup>,
    outgoing: HashMap<ExecutorId, Vec<usize>>,
}

impl WorkflowGraph {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn start(&self) -> &ExecutorId {
        &self.start
    }

    pub fn executor(&self, id: &ExecutorId) -> Option<&BoxedExecutor> {
        self.index.get(id).map(|&idx| &self.executors[idx])
    }

    pub fn contains(&self, id: &ExecutorId) -> bool {
        self.index.contains_key(id)
    }

    /// Executors in registration order
    pub fn executors(&self) -> &[BoxedExecutor] {
        &self.executors
    }

    /// Edge groups in declaration order
    pub fn groups(&self) -> &[EdgeGroup] {
        &self.groups
    }

    /// Edge groups routing messages from `source`, with their indices
    pub fn outgoing(&self, source: &ExecutorId) -> impl Iterator<Item = (usize, &EdgeGroup)> {
        self.outgoing
            .get(source)
            .into_iter()
            .flatten()
            .map(move |&idx| (idx, &self.groups[idx]))
    }
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.executors.iter().map(|e| e.id().as_str()).collect();
        f.debug_struct("WorkflowGraph")
            .field("id", &self.id)
            .field("start", &self.start)
            .field("executors", &ids)
            .field("groups", &self.groups)
            .finish()
    }
}

/// Builder for constructing workflows with a fluent API.
///
/// ```ignore
/// let workflow = WorkflowBuilder::new()
///     .with_id("sequential")
///     .add_executor(upper)
///     .add_executor(reverse)
///     .set_start("upper")
///     .add_edge("upper", "reverse")
///     .build()?;
/// ```
#[derive(Default)]
pub struct WorkflowBuilder {
    id: Option<String>,
    name: Option<String>,
    executors: Vec<BoxedExecutor>,
    start: Option<ExecutorId>,
    groups: Vec<EdgeGroup>,
    config: WorkflowConfig,
    store: Option<Arc<dyn CheckpointStore>>,
}

impl WorkflowBuilder {
    /// Create a new workflow builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workflow id used to match checkpoints.
    ///
    /// Defaults to the name, or to the start executor id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the workflow name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Register an executor.
    pub fn add_executor(self, executor: impl Executor + 'static) -> Self {
        self.add_boxed_executor(Arc::new(executor))
    }

    /// Register a shared executor.
    pub fn add_boxed_executor(mut self, executor: BoxedExecutor) -> Self {
        self.executors.push(executor);
        self
    }

    /// Set the start executor.
    pub fn set_start(mut self, id: impl Into<ExecutorId>) -> Self {
        self.start = Some(id.into());
        self
    }

    /// Add an unconditional edge.
    pub fn add_edge(mut self, from: impl Into<ExecutorId>, to: impl Into<ExecutorId>) -> Self {
        self.groups.push(EdgeGroup::Direct {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Add an edge that fires when `predicate` holds.
    pub fn add_conditional_edge(
        mut self,
        from: impl Into<ExecutorId>,
        to: impl Into<ExecutorId>,
        predicate: Predicate,
    ) -> Self {
        self.groups.push(EdgeGroup::Conditional {
            from: from.into(),
            to: to.into(),
            predicate,
        });
        self
    }

    /// Broadcast every message from `from` to all `targets`.
    pub fn add_fan_out<I, T>(mut self, from: impl Into<ExecutorId>, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ExecutorId>,
    {
        self.groups.push(EdgeGroup::FanOut {
            from: from.into(),
            targets: targets.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Deliver one aggregated message to `target` per round of source results.
    ///
    /// Every message a source emits counts as its contribution. Use
    /// [`add_fan_in_of`](Self::add_fan_in_of) when a source also emits other
    /// kinds, such as requests toward a gate.
    pub fn add_fan_in<I, S>(self, sources: I, target: impl Into<ExecutorId>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ExecutorId>,
    {
        self.add_fan_in_kinds(sources, target, Vec::<String>::new())
    }

    /// Fan-in that only collects payloads of type `T`.
    pub fn add_fan_in_of<T, I, S>(self, sources: I, target: impl Into<ExecutorId>) -> Self
    where
        T: MessagePayload,
        I: IntoIterator<Item = S>,
        S: Into<ExecutorId>,
    {
        self.add_fan_in_kinds(sources, target, [T::KIND])
    }

    /// Fan-in that only collects messages of the listed kinds.
    pub fn add_fan_in_kinds<I, S, K>(
        mut self,
        sources: I,
        target: impl Into<ExecutorId>,
        kinds: impl IntoIterator<Item = K>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ExecutorId>,
        K: Into<String>,
    {
        self.groups.push(EdgeGroup::FanIn {
            sources: sources.into_iter().map(Into::into).collect(),
            target: target.into(),
            kinds: kinds.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Route to the first matching case, else to `default`.
    pub fn add_switch_case(
        mut self,
        from: impl Into<ExecutorId>,
        cases: Vec<Case>,
        default: Option<ExecutorId>,
    ) -> Self {
        self.groups.push(EdgeGroup::SwitchCase {
            from: from.into(),
            cases,
            default,
        });
        self
    }

    /// Route to every matching case.
    pub fn add_multi_selection(mut self, from: impl Into<ExecutorId>, cases: Vec<Case>) -> Self {
        self.groups.push(EdgeGroup::MultiSelection {
            from: from.into(),
            cases,
        });
        self
    }

    /// Connect executors in sequence with direct edges.
    pub fn add_chain<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ExecutorId>,
    {
        let ids: Vec<ExecutorId> = ids.into_iter().map(Into::into).collect();
        for pair in ids.windows(2) {
            self.groups.push(EdgeGroup::Direct {
                from: pair[0].clone(),
                to: pair[1].clone(),
            });
        }
        self
    }

    /// Set runtime configuration.
    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist checkpoints to `store`.
    pub fn with_checkpointing(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate and build the workflow.
    pub fn build(self) -> Result<Workflow, GraphValidationError> {
        let graph = Self::validate(self.id, self.name, self.executors, self.start, self.groups)?;
        Ok(Workflow::new(graph, self.config, self.store))
    }

    fn validate(
        id: Option<String>,
        name: Option<String>,
        executors: Vec<BoxedExecutor>,
        start: Option<ExecutorId>,
        groups: Vec<EdgeGroup>,
    ) -> Result<WorkflowGraph, GraphValidationError> {
        let mut index = HashMap::new();
        for (idx, executor) in executors.iter().enumerate() {
            if index.insert(executor.id().clone(), idx).is_some() {
                return Err(GraphValidationError::DuplicateExecutor(executor.id().to_string()));
            }
        }

        let start = start.ok_or(GraphValidationError::NoStartExecutor)?;
        if !index.contains_key(&start) {
            return Err(GraphValidationError::UnknownExecutor(start.to_string()));
        }

        let mut switch_sources = HashSet::new();
        let mut multi_sources = HashSet::new();
        for group in &groups {
            for id in group.sources().into_iter().chain(group.targets()) {
                if !index.contains_key(id) {
                    return Err(GraphValidationError::UnknownExecutor(id.to_string()));
                }
            }

            match group {
                EdgeGroup::FanIn { sources, target, .. } => {
                    if sources.is_empty() {
                        return Err(GraphValidationError::EmptyFanIn {
                            target: target.to_string(),
                        });
                    }
                    let mut seen = HashSet::new();
                    for source in sources {
                        if !seen.insert(source) {
                            return Err(GraphValidationError::DuplicateFanInSource {
                                target: target.to_string(),
                                source_id: source.to_string(),
                            });
                        }
                    }
                }
                EdgeGroup::FanOut { from, targets } if targets.is_empty() => {
                    return Err(GraphValidationError::EmptyFanOut { from: from.to_string() });
                }
                EdgeGroup::SwitchCase { from, cases, default } => {
                    if cases.is_empty() && default.is_none() {
                        return Err(GraphValidationError::EmptyCases { from: from.to_string() });
                    }
                    switch_sources.insert(from.clone());
                }
                EdgeGroup::MultiSelection { from, cases } => {
                    if cases.is_empty() {
                        return Err(GraphValidationError::EmptyCases { from: from.to_string() });
                    }
                    multi_sources.insert(from.clone());
                }
                _ => {}
            }
        }

        if let Some(from) = executors
            .iter()
            .map(|e| e.id())
            .find(|id| switch_sources.contains(*id) && multi_sources.contains(*id))
        {
            return Err(GraphValidationError::ConflictingSelection { from: from.to_string() });
        }

        let mut outgoing: HashMap<ExecutorId, Vec<usize>> = HashMap::new();
        for (idx, group) in groups.iter().enumerate() {
            for source in group.sources() {
                outgoing.entry(source.clone()).or_default().push(idx);
            }
        }

        // Breadth-first reachability over every edge kind
        let mut reachable = HashSet::new();
        let mut frontier = VecDeque::from([start.clone()]);
        reachable.insert(start.clone());
        while let Some(current) = frontier.pop_front() {
            for &idx in outgoing.get(&current).into_iter().flatten() {
                for target in groups[idx].targets() {
                    if reachable.insert(target.clone()) {
                        frontier.push_back(target.clone());
                    }
                }
            }
        }

        let unreachable: Vec<String> = executors
            .iter()
            .map(|e| e.id())
            .filter(|id| !reachable.contains(*id))
            .map(|id| id.to_string())
            .collect();
        if !unreachable.is_empty() {
            return Err(GraphValidationError::Unreachable(unreachable));
        }

        let id = id
            .or_else(|| name.clone())
            .unwrap_or_else(|| start.to_string());

        Ok(WorkflowGraph {
            id,
            name,
            executors,
            index,
            start,
            groups,
            outgoing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pregel::context::WorkflowContext;
    use crate::pregel::error::WorkflowError;
    use crate::pregel::message::Message;
    use crate::workflow::edge::Condition;
    use async_trait::async_trait;

    struct Noop(ExecutorId);

    #[async_trait]
    impl Executor for Noop {
        fn id(&self) -> &ExecutorId {
            &self.0
        }

        async fn handle(&self, _message: Message, _ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
            Ok(())
        }
    }

    fn with_nodes(ids: &[&str]) -> WorkflowBuilder {
        ids.iter()
            .fold(WorkflowBuilder::new(), |b, id| b.add_executor(Noop((*id).into())))
    }

    fn build_err(builder: WorkflowBuilder) -> GraphValidationError {
        builder.build().err().expect("expected validation error")
    }

    #[test]
    fn test_builder_basic_chain() {
        let workflow = with_nodes(&["upper", "reverse", "joiner"])
            .with_name("sequential")
            .set_start("upper")
            .add_chain(["upper", "reverse", "joiner"])
            .build()
            .unwrap();

        let graph = workflow.graph();
        assert_eq!(graph.id(), "sequential");
        assert_eq!(graph.start().as_str(), "upper");
        assert_eq!(graph.groups().len(), 2);
        assert_eq!(graph.outgoing(&"upper".into()).count(), 1);
        assert!(graph.contains(&"joiner".into()));
    }

    #[test]
    fn test_missing_start() {
        assert_eq!(build_err(with_nodes(&["a"])), GraphValidationError::NoStartExecutor);
    }

    #[test]
    fn test_unknown_executor() {
        let err = build_err(with_nodes(&["a"]).set_start("a").add_edge("a", "missing"));
        assert_eq!(err, GraphValidationError::UnknownExecutor("missing".into()));

        let err = build_err(with_nodes(&["a"]).set_start("ghost"));
        assert_eq!(err, GraphValidationError::UnknownExecutor("ghost".into()));
    }

    #[test]
    fn test_duplicate_executor() {
        let err = build_err(with_nodes(&["a", "a"]).set_start("a"));
        assert_eq!(err, GraphValidationError::DuplicateExecutor("a".into()));
    }

    #[test]
    fn test_fan_in_validation() {
        let empty: Vec<&str> = Vec::new();
        let err = build_err(with_nodes(&["a"]).set_start("a").add_fan_in(empty, "a"));
        assert_eq!(err, GraphValidationError::EmptyFanIn { target: "a".into() });

        let err = build_err(
            with_nodes(&["a", "b", "agg"])
                .set_start("a")
                .add_fan_out("a", ["b"])
                .add_fan_in(["b", "b"], "agg"),
        );
        assert_eq!(
            err,
            GraphValidationError::DuplicateFanInSource {
                target: "agg".into(),
                source_id: "b".into()
            }
        );
    }

    #[test]
    fn test_empty_fan_out_and_cases() {
        let none: Vec<&str> = Vec::new();
        let err = build_err(with_nodes(&["a"]).set_start("a").add_fan_out("a", none));
        assert_eq!(err, GraphValidationError::EmptyFanOut { from: "a".into() });

        let err = build_err(with_nodes(&["a"]).set_start("a").add_switch_case("a", vec![], None));
        assert_eq!(err, GraphValidationError::EmptyCases { from: "a".into() });

        let err = build_err(with_nodes(&["a"]).set_start("a").add_multi_selection("a", vec![]));
        assert_eq!(err, GraphValidationError::EmptyCases { from: "a".into() });
    }

    #[test]
    fn test_switch_with_only_default_is_valid() {
        let workflow = with_nodes(&["a", "b"])
            .set_start("a")
            .add_switch_case("a", vec![], Some("b".into()))
            .build();
        assert!(workflow.is_ok());
    }

    #[test]
    fn test_conflicting_selection() {
        let err = build_err(
            with_nodes(&["a", "b", "c"])
                .set_start("a")
                .add_switch_case("a", vec![Case::new("b", Predicate::always())], None)
                .add_multi_selection("a", vec![Case::new("c", Predicate::always())]),
        );
        assert_eq!(err, GraphValidationError::ConflictingSelection { from: "a".into() });
    }

    #[test]
    fn test_unreachable_executors() {
        let err = build_err(with_nodes(&["a", "b", "island"]).set_start("a").add_edge("a", "b"));
        assert_eq!(err, GraphValidationError::Unreachable(vec!["island".into()]));
    }

    #[test]
    fn test_cycles_and_fan_in_reachability() {
        let workflow = with_nodes(&["start", "sum", "count", "agg"])
            .set_start("start")
            .add_fan_out("start", ["sum", "count"])
            .add_fan_in(["sum", "count"], "agg")
            .add_conditional_edge(
                "agg",
                "start",
                Predicate::payload(Condition::IsTruthy),
            )
            .build();
        assert!(workflow.is_ok());
    }

    #[test]
    fn test_default_id_falls_back_to_start() {
        let workflow = with_nodes(&["entry"]).set_start("entry").build().unwrap();
        assert_eq!(workflow.id(), "entry");
    }
}
