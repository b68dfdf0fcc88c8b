#![forbid(unsafe_code)]

mod builder;
mod driver;
mod grammar;
mod segmenter;

use pf_core::{Dialect, FlowGraph, Span};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::driver::ParserDriver;

pub use grammar::{Grammar, resolve_grammar};
pub use segmenter::{LogicalSegment, indent_level, segment, split_comment};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    pub graph: FlowGraph,
    /// Number of logical segments the document was split into.
    pub segments_count: usize,
    pub warnings: Vec<String>,
}

/// Parses a document with the default dialect. Never fails: malformed statements are
/// skipped and structural problems are left to the validator.
#[must_use]
pub fn parse(input: &str) -> ParseResult {
    parse_with_dialect(input, &Dialect::default())
}

#[must_use]
pub fn parse_with_dialect(input: &str, dialect: &Dialect) -> ParseResult {
    let segments = segment(input, dialect);
    let (graph, warnings) = ParserDriver::new(dialect).run(&segments);
    debug!(
        segments = segments.len(),
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        warnings = warnings.len(),
        "parsed document"
    );
    ParseResult {
        graph,
        segments_count: segments.len(),
        warnings,
    }
}

/// Parses with the default dialect and fills `errors` with validation messages.
#[must_use]
pub fn parse_and_validate(input: &str) -> FlowGraph {
    let mut graph = parse(input).graph;
    graph.validate();
    graph
}

/// Maps a node position (0-based line, sub-statement index) back to the text it was
/// parsed from.
#[must_use]
pub fn locate_statement(
    input: &str,
    line: usize,
    sub_index: usize,
    dialect: &Dialect,
) -> Option<Span> {
    segment(input, dialect)
        .into_iter()
        .find(|segment| segment.line == line && segment.sub_index == sub_index)
        .map(|segment| segment.span)
}

#[must_use]
pub fn parse_evidence_json(parsed: &ParseResult) -> String {
    let graph = &parsed.graph;
    let count = |kind: pf_core::NodeKind| graph.nodes.iter().filter(|n| n.kind == kind).count();
    let errors = pf_core::validate(graph);
    json!({
        "segment_count": parsed.segments_count,
        "node_count": graph.nodes.len(),
        "edge_count": graph.edges.len(),
        "decision_count": count(pf_core::NodeKind::Decision),
        "connector_count": count(pf_core::NodeKind::Connector),
        "end_count": count(pf_core::NodeKind::End),
        "valid": errors.is_empty(),
        "error_count": errors.len(),
        "warning_count": parsed.warnings.len(),
        "warnings": parsed.warnings.clone(),
    })
    .to_string()
}
