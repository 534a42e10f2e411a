//! Mermaid and Graphviz diagrams for workflow graphs
//!
//! Read-only projections of a built [`WorkflowGraph`].
//!
//! # Node Shapes
//!
//! | ExecutorKind | Shape          | Mermaid Syntax  |
//! |--------------|----------------|-----------------|
//! | Function     | Rectangle      | `id[label]`     |
//! | Agent        | Subroutine     | `id[[label]]`   |
//! | RequestGate  | Diamond        | `id{label}`     |
//! | Orchestrator | Hexagon        | `id{{label}}`   |
//! | Aggregator   | Trapezoid      | `id[\label/]`   |
//! | start node   | Stadium        | `id([label])`   |
//!
//! Fan-in groups render through an intermediate `fan_in_N((fan-in))` node so
//! that the join is visible.

use std::fmt::Write;

use super::executor::{ExecutorId, ExecutorKind};
use crate::workflow::edge::EdgeGroup;
use crate::workflow::graph::WorkflowGraph;

// ============================================================================
// ID Sanitization
// ============================================================================

/// Sanitize an executor ID for use as a diagram node identifier.
///
/// Replaces anything other than alphanumerics and underscores.
///
/// ```ignore
/// assert_eq!(sanitize_id("my-node"), "my_node");
/// assert_eq!(sanitize_id("node.name"), "node_name");
/// ```
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn escape_label(label: &str) -> String {
    label.replace('"', "#quot;")
}

// ============================================================================
// Node / Edge Rendering
// ============================================================================

/// Render a Mermaid node declaration with the shape for its kind.
pub fn render_node(id: &ExecutorId, kind: ExecutorKind, is_start: bool) -> String {
    let safe_id = sanitize_id(id.as_str());
    let label = id.as_str();

    if is_start {
        return format!("    {}([{}])", safe_id, label);
    }
    match kind {
        ExecutorKind::Function => format!("    {}[{}]", safe_id, label),
        ExecutorKind::Agent => format!("    {}[[{}]]", safe_id, label),
        ExecutorKind::RequestGate => format!("    {}{{{}}}", safe_id, label),
        ExecutorKind::Orchestrator => format!("    {}{{{{{}}}}}", safe_id, label),
        ExecutorKind::Aggregator => format!("    {}[\\{}/]", safe_id, label),
    }
}

/// Render a Mermaid edge.
///
/// - Unconditional edges: solid arrow `-->`
/// - Labelled edges: dotted arrow `-. "label" .->`
pub fn render_edge(from: &str, to: &str, label: Option<&str>) -> String {
    let from_safe = sanitize_id(from);
    let to_safe = sanitize_id(to);

    match label {
        Some(label) => format!("    {} -. \"{}\" .-> {}", from_safe, escape_label(label), to_safe),
        None => format!("    {} --> {}", from_safe, to_safe),
    }
}

/// Edges of one group as `(from, to, label)` triples. Fan-in groups are
/// returned through their join node `fan_in_{index}`.
fn group_edges(index: usize, group: &EdgeGroup) -> Vec<(String, String, Option<String>)> {
    match group {
        EdgeGroup::Direct { from, to } => vec![(from.to_string(), to.to_string(), None)],
        EdgeGroup::Conditional { from, to, predicate } => {
            vec![(from.to_string(), to.to_string(), Some(predicate.label().to_string()))]
        }
        EdgeGroup::SwitchCase { from, cases, default } => {
            let mut edges: Vec<_> = cases
                .iter()
                .map(|case| (from.to_string(), case.target.to_string(), Some(case.predicate.label().to_string())))
                .collect();
            if let Some(default) = default {
                edges.push((from.to_string(), default.to_string(), Some("default".to_string())));
            }
            edges
        }
        EdgeGroup::MultiSelection { from, cases } => cases
            .iter()
            .map(|case| (from.to_string(), case.target.to_string(), Some(case.predicate.label().to_string())))
            .collect(),
        EdgeGroup::FanOut { from, targets } => targets
            .iter()
            .map(|target| (from.to_string(), target.to_string(), None))
            .collect(),
        EdgeGroup::FanIn { sources, target, kinds } => {
            let join = format!("fan_in_{}", index);
            let mut edges: Vec<_> = sources
                .iter()
                .map(|source| (source.to_string(), join.clone(), None))
                .collect();
            let label = (!kinds.is_empty()).then(|| kinds.join(" | "));
            edges.push((join, target.to_string(), label));
            edges
        }
    }
}

// ============================================================================
// Diagrams
// ============================================================================

/// Render the graph as a Mermaid `flowchart TD`.
pub fn to_mermaid(graph: &WorkflowGraph) -> String {
    let mut out = String::from("flowchart TD\n");

    for executor in graph.executors() {
        let is_start = executor.id() == graph.start();
        let _ = writeln!(out, "{}", render_node(executor.id(), executor.kind(), is_start));
    }
    for (index, group) in graph.groups().iter().enumerate() {
        if matches!(group, EdgeGroup::FanIn { .. }) {
            let _ = writeln!(out, "    fan_in_{}((fan-in))", index);
        }
    }

    for (index, group) in graph.groups().iter().enumerate() {
        for (from, to, label) in group_edges(index, group) {
            let _ = writeln!(out, "{}", render_edge(&from, &to, label.as_deref()));
        }
    }
    out
}

/// Render the graph as a Graphviz `digraph`.
pub fn to_dot(graph: &WorkflowGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", graph.id().replace('"', "\\\""));
    out.push_str("    rankdir=TD;\n");

    for executor in graph.executors() {
        let shape = match executor.kind() {
            ExecutorKind::Function => "box",
            ExecutorKind::Agent => "box3d",
            ExecutorKind::RequestGate => "diamond",
            ExecutorKind::Orchestrator => "hexagon",
            ExecutorKind::Aggregator => "trapezium",
        };
        let style = if executor.id() == graph.start() {
            ", style=bold"
        } else {
            ""
        };
        let _ = writeln!(out, "    \"{}\" [shape={}{}];", executor.id(), shape, style);
    }
    for (index, group) in graph.groups().iter().enumerate() {
        if matches!(group, EdgeGroup::FanIn { .. }) {
            let _ = writeln!(out, "    \"fan_in_{}\" [label=\"fan-in\", shape=circle];", index);
        }
    }

    for (index, group) in graph.groups().iter().enumerate() {
        for (from, to, label) in group_edges(index, group) {
            match label {
                Some(label) => {
                    let _ = writeln!(
                        out,
                        "    \"{}\" -> \"{}\" [label=\"{}\", style=dashed];",
                        from,
                        to,
                        label.replace('"', "\\\"")
                    );
                }
                None => {
                    let _ = writeln!(out, "    \"{}\" -> \"{}\";", from, to);
                }
            }
        }
    }
    out.push_str("}\n");
    out
}

// ============================================================================
// Tests
// ============================================================================
