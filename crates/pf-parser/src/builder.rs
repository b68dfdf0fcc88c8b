use pf_core::{
    FlowEdge, FlowGraph, FlowNode, InlineKey, NodeId, NodeKind, NodeMeta, NodeTag, SourcePos,
    Span,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::grammar::Grammar;
use crate::segmenter::LogicalSegment;

pub(crate) const START: NodeId = NodeId(0);

/// Node/edge arena for one parse plus the wiring primitives the driver composes.
pub(crate) struct GraphBuilder {
    nodes: Vec<FlowNode>,
    edges: Vec<FlowEdge>,
    edge_set: FxHashSet<FlowEdge>,
    out_counts: FxHashMap<NodeId, usize>,
    in_counts: FxHashMap<NodeId, usize>,
    /// Node the next ordinary statement is wired from.
    pub(crate) cursor: Option<NodeId>,
    /// Loop-back target.
    pub(crate) recent_connector: Option<NodeId>,
    pending_jumps: Vec<NodeId>,
}

impl GraphBuilder {
    pub(crate) fn new() -> Self {
        let mut meta = NodeMeta::default();
        meta.tag(NodeTag::Synthetic);
        Self {
            nodes: vec![FlowNode {
                id: START,
                kind: NodeKind::Start,
                text: "start".to_string(),
                meta,
                ..FlowNode::default()
            }],
            edges: Vec::new(),
            edge_set: FxHashSet::default(),
            out_counts: FxHashMap::default(),
            in_counts: FxHashMap::default(),
            cursor: None,
            recent_connector: None,
            pending_jumps: Vec::new(),
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &FlowNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut FlowNode {
        &mut self.nodes[id.0]
    }

    pub(crate) fn tag(&mut self, id: NodeId, tag: NodeTag) {
        self.node_mut(id).meta.tag(tag);
    }

    /// Marks `id` as a body member of the function headed by `header`.
    pub(crate) fn enlist(&mut self, id: NodeId, header: NodeId) {
        let meta = &mut self.node_mut(id).meta;
        meta.tag(NodeTag::FunctionMember);
        meta.owner = Some(header);
    }

    /// Appends a comment line to the most recently created node.
    pub(crate) fn annotate_last(&mut self, note: &str) {
        if let Some(node) = self.nodes.last_mut() {
            node.meta.notes.push(note.to_string());
        }
    }

    pub(crate) fn make_node(
        &mut self,
        kind: NodeKind,
        segment: &LogicalSegment,
        text: impl Into<String>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut meta = NodeMeta::default();
        if !segment.comment.is_empty() {
            meta.notes.push(segment.comment.clone());
        }
        self.nodes.push(FlowNode {
            id,
            kind,
            pos: segment.pos(),
            span: segment.span,
            text: text.into(),
            meta,
        });
        id
    }

    /// Applies the inline keys: loop-back edges to the most recent connector, forward
    /// jumps are queued until the whole document is known.
    pub(crate) fn finalize_node(&mut self, id: NodeId, grammar: &Grammar) {
        if grammar.has_inline(InlineKey::LoopBack)
            && let Some(target) = self.recent_connector
        {
            self.add_edge(id, target, None);
            self.tag(id, NodeTag::LoopBack);
        }
        if grammar.has_inline(InlineKey::ForwardJump) {
            self.tag(id, NodeTag::ForwardJump);
            self.pending_jumps.push(id);
        }
    }

    /// Inserts `from -> to`; returns false if the exact triple already exists.
    pub(crate) fn add_edge(&mut self, from: NodeId, to: NodeId, label: Option<&str>) -> bool {
        let edge = FlowEdge::new(from, to, label);
        if !self.edge_set.insert(edge.clone()) {
            return false;
        }
        *self.out_counts.entry(from).or_default() += 1;
        *self.in_counts.entry(to).or_default() += 1;
        self.edges.push(edge);
        true
    }

    pub(crate) fn has_outgoing(&self, id: NodeId) -> bool {
        self.out_counts.contains_key(&id)
    }

    pub(crate) fn in_degree(&self, id: NodeId) -> usize {
        self.in_counts.get(&id).copied().unwrap_or_default()
    }

    pub(crate) fn last_non_sentinel_before(&self, target: NodeId) -> Option<NodeId> {
        self.nodes[..target.0.min(self.nodes.len())]
            .iter()
            .rev()
            .find(|node| !node.is_sentinel())
            .map(|node| node.id)
    }

    /// Nearest earlier node that can continue ordinary flow.
    fn last_flow_node_before(&self, target: NodeId) -> Option<NodeId> {
        self.nodes[..target.0.min(self.nodes.len())]
            .iter()
            .rev()
            .find(|node| !node.is_sentinel() && !node.meta.is_jump())
            .map(|node| node.id)
    }

    /// `None` when only Start could precede `target` and Start already leads elsewhere;
    /// the target is then unreachable by ordinary flow.
    fn resolve_predecessor(&self, target: NodeId) -> Option<NodeId> {
        let mut candidate = self.cursor.unwrap_or(START);
        let kind = self.node(candidate).kind;
        if (candidate == START && self.has_outgoing(START)) || kind == NodeKind::End {
            candidate = self.last_non_sentinel_before(target).unwrap_or(START);
        }
        let node = self.node(candidate);
        if node.meta.is_jump() || node.kind == NodeKind::Decision {
            candidate = self.last_flow_node_before(target).unwrap_or(START);
        }
        if candidate == START && self.has_outgoing(START) {
            return None;
        }
        Some(candidate)
    }

    /// Default "previous statement to this one" wiring. Connector targets only move the
    /// cursor; their incoming edges come from fan-in.
    pub(crate) fn wire_sequential(&mut self, target: NodeId, update_cursor: bool) {
        if self.node(target).kind == NodeKind::Connector {
            if update_cursor {
                self.cursor = Some(target);
            }
            return;
        }
        if let Some(from) = self.resolve_predecessor(target) {
            self.add_edge(from, target, None);
        }
        if update_cursor && !self.node(target).meta.is_jump() {
            self.cursor = Some(target);
        }
    }

    /// Wires the resolved predecessor into `target` regardless of its kind.
    pub(crate) fn wire_fallback_into(&mut self, target: NodeId) {
        if let Some(from) = self.resolve_predecessor(target)
            && from != target
        {
            self.add_edge(from, target, None);
        }
    }

    pub(crate) fn create_implicit_end(&mut self, pos: SourcePos, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut meta = NodeMeta::default();
        meta.tag(NodeTag::Synthetic);
        self.nodes.push(FlowNode {
            id,
            kind: NodeKind::End,
            pos,
            span,
            text: "end".to_string(),
            meta,
        });
        id
    }

    /// Converges the branch-terminal nodes above `connector` into it.
    ///
    /// The window opens after the nearest earlier Decision or Connector at the same
    /// indentation and closes at the connector's line. Candidates are the non-sentinel
    /// nodes inside it at the connector's indentation or deeper. A candidate feeds the
    /// connector unless it reaches another candidate through edges among candidates, is a
    /// jump, or already flows into an End.
    pub(crate) fn compute_connector_fanin(&mut self, connector: NodeId) {
        let SourcePos { line, indent, .. } = self.node(connector).pos;

        let lower_bound = self
            .nodes
            .iter()
            .filter(|node| {
                node.id != connector
                    && node.pos.line < line
                    && node.pos.indent == indent
                    && matches!(node.kind, NodeKind::Decision | NodeKind::Connector)
            })
            .map(|node| node.pos.line)
            .max();

        let candidates: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|node| {
                node.id != connector
                    && !node.is_sentinel()
                    && node.pos.indent >= indent
                    && node.pos.line <= line
                    && lower_bound.is_none_or(|bound| node.pos.line > bound)
            })
            .map(|node| node.id)
            .collect();

        let members: FxHashSet<NodeId> = candidates.iter().copied().collect();
        let mut adjacency: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        for edge in &self.edges {
            if edge.from != edge.to && members.contains(&edge.from) && members.contains(&edge.to)
            {
                adjacency.entry(edge.from).or_default().push(edge.to);
            }
        }

        let feeders: Vec<NodeId> = candidates
            .iter()
            .copied()
            .filter(|&candidate| {
                !self.node(candidate).meta.is_jump()
                    && !self.flows_into_end(candidate)
                    && !reaches_other(candidate, &adjacency)
            })
            .collect();
        debug!(connector = connector.0, ?lower_bound, feeders = ?feeders, "connector fan-in");
        for feeder in feeders {
            self.add_edge(feeder, connector, None);
        }

        if !self.has_outgoing(connector)
            && let Some(next) = self
                .nodes
                .iter()
                .filter(|node| {
                    !node.is_sentinel() && node.pos.indent == indent && node.pos.line > line
                })
                .min_by_key(|node| (node.pos.line, node.id))
                .map(|node| node.id)
        {
            self.add_edge(connector, next, None);
        }
    }

    fn flows_into_end(&self, id: NodeId) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.from == id && self.node(edge.to).kind == NodeKind::End)
    }

    /// End-of-document passes, then the synthetic End.
    pub(crate) fn finish(mut self) -> FlowGraph {
        self.resolve_forward_jumps();

        let leading: Vec<(NodeId, NodeKind)> = self
            .nodes
            .iter()
            .filter(|node| !node.is_sentinel())
            .map(|node| (node.id, node.kind))
            .take(2)
            .collect();
        let first = leading.first().copied();
        let second = leading.get(1).copied();

        if let Some((first_id, _)) = first
            && !self.has_outgoing(START)
        {
            self.add_edge(START, first_id, None);
        }
        if let (Some((first_id, first_kind)), Some((second_id, NodeKind::Connector))) =
            (first, second)
            && first_kind != NodeKind::Connector
        {
            self.add_edge(first_id, second_id, None);
        }

        let (fallthrough, pos, span) = self
            .nodes
            .iter()
            .rev()
            .find(|node| node.kind != NodeKind::End)
            .map_or((START, SourcePos::default(), Span::default()), |node| {
                (node.id, node.pos, node.span)
            });
        let end = self.create_implicit_end(pos, span);
        self.add_edge(fallthrough, end, None);

        FlowGraph {
            nodes: self.nodes,
            edges: self.edges,
            start: START,
            end,
            errors: Vec::new(),
        }
    }

    fn resolve_forward_jumps(&mut self) {
        for jump in std::mem::take(&mut self.pending_jumps) {
            let line = self.node(jump).pos.line;
            let target = self
                .nodes
                .iter()
                .filter(|node| node.kind == NodeKind::Connector && node.pos.line > line)
                .min_by_key(|node| (node.pos.line, node.id))
                .map(|node| node.id);
            if let Some(target) = target {
                self.add_edge(jump, target, None);
            } else {
                debug!(jump = jump.0, "forward jump has no following connector");
            }
        }
    }
}

/// Stack walk from `start` over the candidate subgraph; true once any other node is seen.
fn reaches_other(start: NodeId, adjacency: &FxHashMap<NodeId, Vec<NodeId>>) -> bool {
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    let mut stack = vec![start];
    visited.insert(start);
    while let Some(current) = stack.pop() {
        for &next in adjacency.get(&current).map(Vec::as_slice).unwrap_or_default() {
            if next != start {
                return true;
            }
            if visited.insert(next) {
                stack.push(next);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::{GraphBuilder, START, reaches_other};
    use crate::grammar::resolve_code;
    use crate::segmenter::segment;
    use pf_core::{Dialect, FlowEdge, NodeId, NodeKind, NodeTag};
    use rustc_hash::FxHashMap;

    /// Builds a node from the last statement of `source`; leading newlines set its line.
    fn statement(builder: &mut GraphBuilder, kind: NodeKind, source: &str) -> NodeId {
        let dialect = Dialect::default();
        let segments = segment(source, &dialect);
        let segment = segments.last().expect("segment");
        let grammar = resolve_code(&segment.code, &dialect).expect("grammar");
        let id = builder.make_node(kind, segment, grammar.text.clone());
        builder.finalize_node(id, &grammar);
        id
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let mut builder = GraphBuilder::new();
        let a = statement(&mut builder, NodeKind::Process, "do a");
        assert!(builder.add_edge(START, a, None));
        assert!(!builder.add_edge(START, a, None));
        assert!(builder.add_edge(START, a, Some("yes")));
        assert_eq!(builder.in_degree(a), 2);
        assert!(builder.has_outgoing(START));
        assert!(!builder.has_outgoing(a));
    }

    #[test]
    fn sequential_wiring_starts_at_start_and_follows_cursor() {
        let mut builder = GraphBuilder::new();
        let a = statement(&mut builder, NodeKind::Process, "do a");
        builder.wire_sequential(a, true);
        let b = statement(&mut builder, NodeKind::Process, "do b");
        builder.wire_sequential(b, true);
        let graph = builder.finish();
        assert!(graph.has_edge(START, a));
        assert!(graph.has_edge(a, b));
        assert!(graph.has_edge(b, graph.end));
    }

    #[test]
    fn jump_tagged_nodes_do_not_take_the_cursor() {
        let mut builder = GraphBuilder::new();
        let a = statement(&mut builder, NodeKind::Process, "do a");
        builder.wire_sequential(a, true);
        let jump = statement(&mut builder, NodeKind::Process, "do skip goto");
        builder.wire_sequential(jump, true);
        assert_eq!(builder.cursor, Some(a));
        assert!(builder.node(jump).meta.has(NodeTag::ForwardJump));
    }

    #[test]
    fn loop_back_links_to_recent_connector() {
        let mut builder = GraphBuilder::new();
        let a = statement(&mut builder, NodeKind::Process, "do a loop");
        assert!(!builder.node(a).meta.has(NodeTag::LoopBack));

        let connector = statement(&mut builder, NodeKind::Connector, "ii top");
        builder.recent_connector = Some(connector);
        let again = statement(&mut builder, NodeKind::Process, "do again loop");
        assert!(builder.node(again).meta.has(NodeTag::LoopBack));
        let graph = builder.finish();
        assert!(graph.has_edge(again, connector));
    }

    #[test]
    fn empty_builder_finishes_with_start_to_end() {
        let graph = GraphBuilder::new().finish();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.end, NodeId(1));
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.has_edge(START, graph.end));
        assert!(graph.node(graph.end).is_some_and(|end| end.kind == NodeKind::End));
    }

    #[test]
    fn leading_statement_links_to_following_connector() {
        let mut builder = GraphBuilder::new();
        let a = statement(&mut builder, NodeKind::Process, "do a");
        let join = statement(&mut builder, NodeKind::Connector, "\nii join");
        let graph = builder.finish();
        assert!(graph.has_edge(START, a));
        assert!(graph.has_edge(a, join));
        assert!(graph.has_edge(join, graph.end));
        assert_eq!(graph.edges.len(), 3);
    }

    #[test]
    fn dangling_connector_falls_through_to_next_statement_at_its_indent() {
        let mut builder = GraphBuilder::new();
        let merge = statement(&mut builder, NodeKind::Connector, "ii merge");
        let nested = statement(&mut builder, NodeKind::Process, "\n    do nested");
        let next = statement(&mut builder, NodeKind::Process, "\n\ndo next");
        builder.compute_connector_fanin(merge);

        assert_eq!(builder.in_degree(merge), 0);
        assert_eq!(builder.edges, vec![FlowEdge::new(merge, next, None)]);
        assert_eq!(builder.in_degree(nested), 0);
    }

    #[test]
    fn forward_jump_without_later_connector_is_skipped() {
        let mut builder = GraphBuilder::new();
        let early = statement(&mut builder, NodeKind::Connector, "ii early");
        builder.add_edge(START, early, None);
        let leap = statement(&mut builder, NodeKind::Process, "\ndo leap goto");
        builder.add_edge(early, leap, None);
        let graph = builder.finish();

        assert!(!graph.has_edge(leap, early));
        assert_eq!(graph.out_degree(leap), 1);
        assert!(graph.has_edge(leap, graph.end));
    }

    #[test]
    fn taken_start_is_not_reused_as_predecessor() {
        let mut builder = GraphBuilder::new();
        let leap = statement(&mut builder, NodeKind::Process, "do leap goto");
        builder.wire_sequential(leap, true);
        let stranded = statement(&mut builder, NodeKind::Process, "\ndo stranded");
        builder.wire_sequential(stranded, true);

        assert_eq!(builder.edges, vec![FlowEdge::new(START, leap, None)]);
        assert_eq!(builder.cursor, Some(stranded));
    }

    #[test]
    fn reachability_walk_handles_cycles() {
        let mut adjacency: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        adjacency.insert(NodeId(1), vec![NodeId(1)]);
        adjacency.insert(NodeId(2), vec![NodeId(3)]);
        adjacency.insert(NodeId(3), vec![NodeId(2)]);
        assert!(!reaches_other(NodeId(1), &adjacency));
        assert!(reaches_other(NodeId(2), &adjacency));
        assert!(!reaches_other(NodeId(4), &adjacency));
    }
}
