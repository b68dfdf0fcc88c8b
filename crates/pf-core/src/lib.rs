#![forbid(unsafe_code)]

mod dialect;
mod validate;

pub use dialect::{
    Dialect, DialectConfigError, DialectConfigParse, DialectError, InlineKey, NodeKey, SpecKey,
    parse_dialect_config_value,
};
pub use validate::{Arity, ArityViolation, EdgeDirection, arity_for, validate, violations};

use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// A point in the source text. `line` is 1-based, `col` counts grapheme clusters from 1,
/// `byte` is the absolute byte offset into the document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub col: usize,
    pub byte: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.end.byte.saturating_sub(self.start.byte)
    }

    /// Slice the covered text out of the document the span was produced from.
    #[must_use]
    pub fn slice<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start.byte..self.end.byte)
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum NodeKind {
    Start,
    End,
    #[default]
    Process,
    Decision,
    Connector,
    Input,
    Output,
}

impl NodeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Process => "process",
            Self::Decision => "decision",
            Self::Connector => "connector",
            Self::Input => "input",
            Self::Output => "output",
        }
    }

    /// Start and End nodes bracket the flow and never count as statements.
    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        matches!(self, Self::Start | Self::End)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed flags attached to a node while the graph is built.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum NodeTag {
    LoopBack,
    ForwardJump,
    FunctionMember,
    ExplicitEnd,
    CollapsedFunction,
    ExpandedFunction,
    FunctionFooter,
    Synthetic,
}

impl NodeTag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoopBack => "loop-back",
            Self::ForwardJump => "forward-jump",
            Self::FunctionMember => "function-member",
            Self::ExplicitEnd => "explicit-end",
            Self::CollapsedFunction => "collapsed-function",
            Self::ExpandedFunction => "expanded-function",
            Self::FunctionFooter => "function-footer",
            Self::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NodeMeta {
    /// Append-only; nothing in the builder ever clears a tag.
    pub tags: BTreeSet<NodeTag>,
    /// Function header owning this node, set together with `NodeTag::FunctionMember`.
    pub owner: Option<NodeId>,
    /// Body of a function header, filled in when the function closes.
    pub body: Vec<NodeId>,
    /// Branch labels parsed from a decision header.
    pub labels: Vec<String>,
    pub notes: Vec<String>,
}

impl NodeMeta {
    #[must_use]
    pub fn has(&self, tag: NodeTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn tag(&mut self, tag: NodeTag) {
        self.tags.insert(tag);
    }

    /// Loop-back and forward-jump nodes leave the sequential flow.
    #[must_use]
    pub fn is_jump(&self) -> bool {
        self.has(NodeTag::LoopBack) || self.has(NodeTag::ForwardJump)
    }
}

/// Where a statement came from: 0-based physical line, position of the piece in the
/// delimiter split, and indentation level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: usize,
    pub sub_index: usize,
    pub indent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FlowNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub pos: SourcePos,
    pub span: Span,
    pub text: String,
    pub meta: NodeMeta,
}

impl FlowNode {
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.kind.is_sentinel()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FlowEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub label: Option<String>,
}

impl FlowEdge {
    #[must_use]
    pub fn new(from: NodeId, to: NodeId, label: Option<&str>) -> Self {
        Self {
            from,
            to,
            label: label.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
    pub start: NodeId,
    pub end: NodeId,
    /// Validation messages; empty until [`FlowGraph::validate`] runs.
    pub errors: Vec<String>,
}

impl FlowGraph {
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&FlowNode> {
        self.nodes.get(id.0)
    }

    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &FlowEdge> + '_ {
        self.edges.iter().filter(move |edge| edge.from == id)
    }

    pub fn incoming(&self, id: NodeId) -> impl Iterator<Item = &FlowEdge> + '_ {
        self.edges.iter().filter(move |edge| edge.to == id)
    }

    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing(id).map(|edge| edge.to)
    }

    #[must_use]
    pub fn in_degree(&self, id: NodeId) -> usize {
        self.incoming(id).count()
    }

    #[must_use]
    pub fn out_degree(&self, id: NodeId) -> usize {
        self.outgoing(id).count()
    }

    /// True if an edge `from -> to` exists, regardless of its label.
    #[must_use]
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.from == from && edge.to == to)
    }

    #[must_use]
    pub fn has_labeled_edge(&self, from: NodeId, to: NodeId, label: &str) -> bool {
        self.edges.iter().any(|edge| {
            edge.from == from && edge.to == to && edge.label.as_deref() == Some(label)
        })
    }

    /// Finds the first node whose display text matches exactly.
    #[must_use]
    pub fn find_by_text(&self, text: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|node| node.text == text)
    }

    /// Runs the structural validator and stores its messages in `errors`.
    pub fn validate(&mut self) -> &[String] {
        self.errors = validate(self);
        &self.errors
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        violations(self).is_empty()
    }

    /// Plain-text adjacency listing, one node per line:
    /// `#id kind "text" -> #to [label], #to`.
    #[must_use]
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let _ = write!(out, "{} {} {:?}", node.id, node.kind, node.text);
            let targets: Vec<String> = self
                .outgoing(node.id)
                .map(|edge| match &edge.label {
                    Some(label) => format!("{} [{label}]", edge.to),
                    None => edge.to.to_string(),
                })
                .collect();
            if !targets.is_empty() {
                let _ = write!(out, " -> {}", targets.join(", "));
            }
            out.push('\n');
        }
        out
    }
}
