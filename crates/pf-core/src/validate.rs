use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{FlowGraph, NodeId, NodeKind, NodeTag};

/// Inclusive degree bound; `max == None` means unbounded above.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    #[must_use]
    pub const fn exactly(count: usize) -> Self {
        Self {
            min: count,
            max: Some(count),
        }
    }

    #[must_use]
    pub const fn at_least(count: usize) -> Self {
        Self {
            min: count,
            max: None,
        }
    }

    #[must_use]
    pub const fn admits(self, count: usize) -> bool {
        count >= self.min
            && match self.max {
                Some(max) => count <= max,
                None => true,
            }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "exactly {max}"),
            Some(max) => write!(f, "between {} and {max}", self.min),
            None => write!(f, "at least {}", self.min),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EdgeDirection {
    Incoming,
    Outgoing,
}

impl EdgeDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for EdgeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (incoming, outgoing) bounds per node kind.
#[must_use]
pub const fn arity_for(kind: NodeKind) -> (Arity, Arity) {
    match kind {
        NodeKind::Start => (Arity::exactly(0), Arity::exactly(1)),
        NodeKind::End => (Arity::exactly(1), Arity::exactly(0)),
        NodeKind::Process | NodeKind::Input | NodeKind::Output => {
            (Arity::exactly(1), Arity::exactly(1))
        }
        NodeKind::Decision => (Arity::at_least(1), Arity::at_least(2)),
        NodeKind::Connector => (Arity::at_least(1), Arity::exactly(1)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("node {node} ({kind}) at line {line}: expected {expected} {direction} edge(s), found {actual}")]
pub struct ArityViolation {
    pub node: NodeId,
    pub kind: NodeKind,
    /// 1-based source line.
    pub line: usize,
    pub direction: EdgeDirection,
    pub expected: Arity,
    pub actual: usize,
}

/// Every degree mismatch in node creation order, incoming before outgoing.
/// Function-body members are exempt.
#[must_use]
pub fn violations(graph: &FlowGraph) -> Vec<ArityViolation> {
    let mut in_degree = vec![0_usize; graph.nodes.len()];
    let mut out_degree = vec![0_usize; graph.nodes.len()];
    for edge in &graph.edges {
        if let Some(count) = out_degree.get_mut(edge.from.0) {
            *count += 1;
        }
        if let Some(count) = in_degree.get_mut(edge.to.0) {
            *count += 1;
        }
    }

    let mut found = Vec::new();
    for (index, node) in graph.nodes.iter().enumerate() {
        if node.meta.has(NodeTag::FunctionMember) {
            continue;
        }
        let (incoming, outgoing) = arity_for(node.kind);
        let checks = [
            (EdgeDirection::Incoming, incoming, in_degree[index]),
            (EdgeDirection::Outgoing, outgoing, out_degree[index]),
        ];
        for (direction, expected, actual) in checks {
            if !expected.admits(actual) {
                found.push(ArityViolation {
                    node: node.id,
                    kind: node.kind,
                    line: node.pos.line + 1,
                    direction,
                    expected,
                    actual,
                });
            }
        }
    }
    found
}

/// Validation messages; an empty list means the graph is structurally valid.
#[must_use]
pub fn validate(graph: &FlowGraph) -> Vec<String> {
    violations(graph)
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Arity, EdgeDirection, arity_for, validate, violations};
    use crate::{FlowEdge, FlowGraph, FlowNode, NodeId, NodeKind, NodeTag, SourcePos};

    fn graph(kinds: &[NodeKind], edges: &[(usize, usize)]) -> FlowGraph {
        FlowGraph {
            nodes: kinds
                .iter()
                .enumerate()
                .map(|(index, kind)| FlowNode {
                    id: NodeId(index),
                    kind: *kind,
                    pos: SourcePos {
                        line: index,
                        ..SourcePos::default()
                    },
                    ..FlowNode::default()
                })
                .collect(),
            edges: edges
                .iter()
                .map(|(from, to)| FlowEdge::new(NodeId(*from), NodeId(*to), None))
                .collect(),
            start: NodeId(0),
            end: NodeId(kinds.len().saturating_sub(1)),
            errors: Vec::new(),
        }
    }

    #[test]
    fn arity_display_and_bounds() {
        assert_eq!(Arity::exactly(1).to_string(), "exactly 1");
        assert_eq!(Arity::at_least(2).to_string(), "at least 2");
        assert!(Arity::at_least(2).admits(7));
        assert!(!Arity::exactly(1).admits(2));
        assert_eq!(
            arity_for(NodeKind::Connector),
            (Arity::at_least(1), Arity::exactly(1))
        );
    }

    #[test]
    fn start_to_end_is_valid() {
        let graph = graph(&[NodeKind::Start, NodeKind::End], &[(0, 1)]);
        assert!(validate(&graph).is_empty());
    }

    #[test]
    fn decision_with_single_branch_is_reported() {
        let graph = graph(
            &[
                NodeKind::Start,
                NodeKind::Decision,
                NodeKind::Process,
                NodeKind::End,
            ],
            &[(0, 1), (1, 2), (2, 3)],
        );
        let found = violations(&graph);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node, NodeId(1));
        assert_eq!(found[0].direction, EdgeDirection::Outgoing);
        assert_eq!(found[0].line, 2);
        assert_eq!(
            found[0].to_string(),
            "node #1 (decision) at line 2: expected at least 2 outgoing edge(s), found 1"
        );
    }

    #[test]
    fn inputs_are_reported_before_outputs() {
        let graph = graph(
            &[NodeKind::Start, NodeKind::Process, NodeKind::End],
            &[(0, 2)],
        );
        let directions: Vec<(NodeId, EdgeDirection)> = violations(&graph)
            .iter()
            .map(|violation| (violation.node, violation.direction))
            .collect();
        assert_eq!(
            directions,
            vec![
                (NodeId(1), EdgeDirection::Incoming),
                (NodeId(1), EdgeDirection::Outgoing),
            ]
        );
    }

    #[test]
    fn function_members_are_exempt() {
        let mut graph = graph(
            &[NodeKind::Start, NodeKind::Process, NodeKind::End],
            &[(0, 2)],
        );
        graph.nodes[1].meta.tag(NodeTag::FunctionMember);
        assert!(validate(&graph).is_empty());
    }

    #[test]
    fn removing_a_required_edge_adds_one_violation_per_endpoint() {
        let full = graph(
            &[NodeKind::Start, NodeKind::Process, NodeKind::End],
            &[(0, 1), (1, 2)],
        );
        assert!(validate(&full).is_empty());

        let mut cut = full.clone();
        cut.edges.remove(1);
        let found = violations(&cut);
        assert_eq!(found.len(), 2);
        assert_eq!(
            (found[0].node, found[0].direction),
            (NodeId(1), EdgeDirection::Outgoing)
        );
        assert_eq!(
            (found[1].node, found[1].direction),
            (NodeId(2), EdgeDirection::Incoming)
        );
    }
}
