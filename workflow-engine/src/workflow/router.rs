//! Edge router
//!
//! Turns one emitted message into zero or more deliveries by evaluating the
//! source's edge groups in declaration order. Fan-in groups buffer results
//! until every declared source has contributed, then release one
//! [`FanInMessage`] per round.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::edge::{Case, EdgeGroup};
use super::graph::WorkflowGraph;
use crate::pregel::error::WorkflowError;
use crate::pregel::events::{DropReason, WorkflowEvent};
use crate::pregel::executor::ExecutorId;
use crate::pregel::message::{FanInMessage, Message, MessagePayload};

/// Results buffered for one fan-in group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanInBuffer {
    /// Index of the edge group in declaration order
    pub group: usize,
    /// Next round number to emit
    pub round: u64,
    /// Buffered results per source, oldest first
    pub pending: BTreeMap<ExecutorId, VecDeque<Message>>,
}

impl FanInBuffer {
    fn new(group: usize) -> Self {
        Self {
            group,
            round: 0,
            pending: BTreeMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.pending.values().all(VecDeque::is_empty)
    }
}

/// Fan-in buffers of one run, keyed by group index.
#[derive(Debug, Clone, Default)]
pub(crate) struct FanInBuffers {
    buffers: HashMap<usize, FanInBuffer>,
}

impl FanInBuffers {
    pub fn from_snapshot(buffers: Vec<FanInBuffer>) -> Self {
        Self {
            buffers: buffers.into_iter().map(|b| (b.group, b)).collect(),
        }
    }

    /// Buffers worth persisting, ordered by group
    pub fn snapshot(&self) -> Vec<FanInBuffer> {
        let mut buffers: Vec<FanInBuffer> = self
            .buffers
            .values()
            .filter(|b| !b.is_empty() || b.round > 0)
            .cloned()
            .collect();
        buffers.sort_by_key(|b| b.group);
        buffers
    }

    /// Buffer a result and release a round if every source has one
    fn push(
        &mut self,
        group: usize,
        sources: &[ExecutorId],
        target: &ExecutorId,
        source: &ExecutorId,
        message: Message,
    ) -> Result<Option<Message>, WorkflowError> {
        if !sources.contains(source) {
            return Err(WorkflowError::fan_in_violation(
                target.clone(),
                format!("{} is not a declared source", source),
            ));
        }

        let buffer = self
            .buffers
            .entry(group)
            .or_insert_with(|| FanInBuffer::new(group));
        buffer
            .pending
            .entry(source.clone())
            .or_default()
            .push_back(message);

        let complete = sources
            .iter()
            .all(|s| buffer.pending.get(s).is_some_and(|q| !q.is_empty()));
        if !complete {
            return Ok(None);
        }

        let results: Vec<Message> = sources
            .iter()
            .filter_map(|s| buffer.pending.get_mut(s).and_then(VecDeque::pop_front))
            .collect();
        if results.len() != sources.len() {
            return Err(WorkflowError::fan_in_violation(
                target.clone(),
                format!("expected {} results, found {}", sources.len(), results.len()),
            ));
        }

        let aggregated = FanInMessage {
            round: buffer.round,
            sources: sources.to_vec(),
            results,
        };
        buffer.round += 1;

        Ok(Some(Message::from_payload(&aggregated)?.with_source(source.clone())))
    }
}

/// Outcome of routing one message
#[derive(Debug, Default)]
pub(crate) struct RouteOutcome {
    /// Deliveries in edge declaration order
    pub deliveries: Vec<(ExecutorId, Message)>,
    /// Drop and predicate-failure events
    pub events: Vec<WorkflowEvent>,
}

/// Routes messages along the edge groups of a graph
pub(crate) struct EdgeRouter<'g> {
    graph: &'g WorkflowGraph,
}

impl<'g> EdgeRouter<'g> {
    pub fn new(graph: &'g WorkflowGraph) -> Self {
        Self { graph }
    }

    /// Route a message emitted by its `source_id`.
    ///
    /// Only a fan-in contract violation is an error; predicate failures and
    /// undeliverable messages are reported as events.
    pub fn route(&self, message: Message, fan_in: &mut FanInBuffers) -> Result<RouteOutcome, WorkflowError> {
        let mut outcome = RouteOutcome::default();
        let Some(source) = message.source_id.clone() else {
            outcome.events.push(dropped(&message, DropReason::NoEdge));
            return Ok(outcome);
        };

        let groups: Vec<(usize, &EdgeGroup)> = self.graph.outgoing(&source).collect();
        if groups.is_empty() {
            debug!(source = %source, kind = %message.kind, "Message dropped: no outgoing edges");
            outcome.events.push(dropped(&message, DropReason::NoEdge));
            return Ok(outcome);
        }

        if let Some(target) = &message.target_id {
            let connected = groups
                .iter()
                .any(|(_, g)| g.targets().into_iter().any(|t| t == target));
            if !connected {
                debug!(source = %source, target = %target, "Message dropped: target not connected");
                outcome.events.push(dropped(&message, DropReason::TargetNotConnected));
                return Ok(outcome);
            }
        }

        let mut reported = false;
        for (idx, group) in groups {
            let candidates: Vec<ExecutorId> = match group {
                EdgeGroup::Direct { to, .. } => vec![to.clone()],
                EdgeGroup::FanOut { targets, .. } => targets.clone(),
                EdgeGroup::Conditional { to, predicate, .. } => {
                    match predicate.evaluate(&message) {
                        Ok(true) => vec![to.clone()],
                        Ok(false) => Vec::new(),
                        Err(e) => {
                            outcome.events.push(predicate_failed(&source, to, e));
                            Vec::new()
                        }
                    }
                }
                EdgeGroup::SwitchCase { cases, default, .. } => {
                    match self.first_match(&source, cases, &message, &mut outcome.events) {
                        Some(target) => vec![target],
                        None => match default {
                            Some(default) => vec![default.clone()],
                            None => {
                                debug!(source = %source, "Message dropped: no matching case");
                                outcome.events.push(dropped(&message, DropReason::NoMatchingCase));
                                reported = true;
                                Vec::new()
                            }
                        },
                    }
                }
                EdgeGroup::MultiSelection { cases, .. } => {
                    self.all_matches(&source, cases, &message, &mut outcome.events)
                }
                EdgeGroup::FanIn { sources, target, .. } => {
                    if message.target_id.as_ref().is_some_and(|t| t != target) {
                        continue;
                    }
                    if !group.collects(&message.kind) {
                        continue;
                    }
                    let accepts = self.graph.executor(target).is_some_and(|aggregator| {
                        let kinds = aggregator.input_kinds();
                        kinds.is_empty() || kinds.iter().any(|k| k == FanInMessage::KIND)
                    });
                    if !accepts {
                        debug!(aggregator = %target, "Fan-in target does not accept aggregated results");
                        continue;
                    }
                    reported = true;
                    if let Some(aggregated) = fan_in.push(idx, sources, target, &source, message.clone())? {
                        debug!(aggregator = %target, "Fan-in round complete");
                        outcome.deliveries.push((target.clone(), aggregated));
                    }
                    continue;
                }
            };

            for candidate in candidates {
                if message.target_id.as_ref().is_some_and(|t| *t != candidate) {
                    continue;
                }
                let accepted = self
                    .graph
                    .executor(&candidate)
                    .is_some_and(|executor| executor.accepts(&message));
                if accepted {
                    outcome.deliveries.push((candidate, message.clone()));
                    reported = true;
                }
            }
        }

        if !reported {
            debug!(source = %source, kind = %message.kind, "Message dropped: no accepting target");
            outcome.events.push(dropped(&message, DropReason::NotAccepted));
        }

        Ok(outcome)
    }

    fn first_match(
        &self,
        source: &ExecutorId,
        cases: &[Case],
        message: &Message,
        events: &mut Vec<WorkflowEvent>,
    ) -> Option<ExecutorId> {
        for case in cases {
            match case.predicate.evaluate(message) {
                Ok(true) => return Some(case.target.clone()),
                Ok(false) => {}
                Err(e) => events.push(predicate_failed(source, &case.target, e)),
            }
        }
        None
    }

    fn all_matches(
        &self,
        source: &ExecutorId,
        cases: &[Case],
        message: &Message,
        events: &mut Vec<WorkflowEvent>,
    ) -> Vec<ExecutorId> {
        let mut targets = Vec::new();
        for case in cases {
            match case.predicate.evaluate(message) {
                Ok(true) => targets.push(case.target.clone()),
                Ok(false) => {}
                Err(e) => events.push(predicate_failed(source, &case.target, e)),
            }
        }
        targets
    }
}

fn dropped(message: &Message, reason: DropReason) -> WorkflowEvent {
    WorkflowEvent::MessageDropped {
        source_id: message.source_id.clone(),
        kind: message.kind.clone(),
        reason,
    }
}

fn predicate_failed(from: &ExecutorId, to: &ExecutorId, error: String) -> WorkflowEvent {
    warn!(from = %from, to = %to, error = %error, "Edge predicate failed; edge not taken");
    WorkflowEvent::PredicateFailed {
        error: WorkflowError::routing_predicate(from.clone(), to.clone(), error),
    }
}
