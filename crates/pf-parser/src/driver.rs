use pf_core::{Dialect, FlowGraph, NodeId, NodeKey, NodeKind, NodeTag, SpecKey};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::builder::GraphBuilder;
use crate::grammar::{Grammar, resolve_grammar};
use crate::segmenter::LogicalSegment;

/// One open multi-branch construct.
#[derive(Debug)]
struct DecisionContext {
    header: NodeId,
    header_indent: usize,
    line: usize,
    branches: Vec<NodeId>,
    tails: FxHashMap<usize, NodeId>,
    labels: Option<Vec<String>>,
    branch_indent: Option<usize>,
    explicit: bool,
    last_touched: Option<usize>,
}

impl DecisionContext {
    fn new(header: NodeId, segment: &LogicalSegment, labels: Option<Vec<String>>) -> Self {
        Self {
            header,
            header_indent: segment.indent,
            line: segment.line,
            branches: Vec::new(),
            tails: FxHashMap::default(),
            labels,
            branch_indent: None,
            explicit: false,
            last_touched: None,
        }
    }

    fn cutoff(&self) -> usize {
        self.branch_indent.unwrap_or(self.header_indent)
    }

    fn in_range(&self, indent: usize) -> bool {
        indent >= self.cutoff()
    }

    fn touch(&mut self, branch: usize, tail: NodeId) {
        self.tails.insert(branch, tail);
        self.last_touched = Some(branch);
        self.explicit = true;
    }

    fn rewind_target(&self) -> NodeId {
        self.last_touched
            .and_then(|branch| self.tails.get(&branch).copied())
            .unwrap_or(self.header)
    }
}

/// One open function block.
#[derive(Debug)]
struct FunContext {
    header: NodeId,
    line: usize,
    body: Vec<NodeId>,
    tail: Option<NodeId>,
}

/// Single forward pass over the segments of one document.
pub(crate) struct ParserDriver<'d> {
    dialect: &'d Dialect,
    builder: GraphBuilder,
    branch: Option<usize>,
    decisions: Vec<DecisionContext>,
    functions: Vec<FunContext>,
    warnings: Vec<String>,
}

impl<'d> ParserDriver<'d> {
    pub(crate) fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            builder: GraphBuilder::new(),
            branch: None,
            decisions: Vec::new(),
            functions: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn run(mut self, segments: &[LogicalSegment]) -> (FlowGraph, Vec<String>) {
        for segment in segments {
            self.handle_segment(segment);
        }

        let unclosed: Vec<String> = self
            .functions
            .iter()
            .map(|fun| {
                format!(
                    "function '{}' opened at line {} is never closed",
                    self.builder.node(fun.header).text,
                    fun.line + 1
                )
            })
            .collect();
        self.warnings.extend(unclosed);

        (self.builder.finish(), self.warnings)
    }

    fn handle_segment(&mut self, segment: &LogicalSegment) {
        if segment.is_comment_only() {
            self.builder.annotate_last(&segment.comment);
            return;
        }
        let Some(grammar) = resolve_grammar(segment, self.dialect) else {
            trace!(line = segment.line, sub = segment.sub_index, "skipping non-statement");
            return;
        };
        trace!(
            line = segment.line,
            sub = segment.sub_index,
            indent = segment.indent,
            spec_key = ?grammar.spec_key,
            node_key = ?grammar.node_key,
            text = %grammar.text,
            "statement"
        );

        let closes = self.closes_block(&segment.code);
        if closes && !self.functions.is_empty() {
            self.close_function(segment);
            return;
        }

        self.pop_decisions(segment.indent, grammar.has_branch_marker());

        match grammar.node_key {
            Some(NodeKey::Function) => self.open_function(segment, &grammar),
            Some(NodeKey::End) => self.handle_end(segment, &grammar),
            Some(NodeKey::Decision) => self.handle_decision(segment, &grammar),
            Some(NodeKey::Connector) => self.handle_connector(segment, &grammar),
            Some(NodeKey::Input) => self.handle_statement(NodeKind::Input, segment, &grammar),
            Some(NodeKey::Output) => self.handle_statement(NodeKind::Output, segment, &grammar),
            Some(NodeKey::Do) | None => {
                if closes {
                    self.warn(format!(
                        "stray '{}' at line {} has no open function",
                        self.dialect.close_token,
                        segment.line + 1
                    ));
                }
                self.handle_statement(NodeKind::Process, segment, &grammar);
            }
        }
    }

    fn closes_block(&self, code: &str) -> bool {
        code.trim_end().ends_with(self.dialect.close_token.as_str())
    }

    fn warn(&mut self, message: String) {
        debug!(%message, "parse warning");
        self.warnings.push(message);
    }

    /// Creates a node and, while a function is open, chains it into the function body.
    fn create(
        &mut self,
        kind: NodeKind,
        segment: &LogicalSegment,
        grammar: &Grammar,
        text: String,
    ) -> NodeId {
        let id = self.builder.make_node(kind, segment, text);
        self.builder.finalize_node(id, grammar);

        if let Some(fun) = self.functions.last_mut() {
            let tail = fun.tail.unwrap_or(fun.header);
            if !self.builder.node(tail).meta.is_jump() {
                self.builder.add_edge(tail, id, None);
            }
            fun.body.push(id);
            fun.tail = Some(id);
            self.builder.enlist(id, fun.header);
        }
        id
    }

    /// Default wiring; skipped inside functions. Advancing the cursor inside an active
    /// branch also advances that branch's tail.
    fn wire_default(&mut self, id: NodeId, update_cursor: bool) {
        if !self.functions.is_empty() {
            return;
        }
        self.builder.wire_sequential(id, update_cursor);
        if update_cursor && self.builder.cursor == Some(id) {
            self.advance_branch_tail(id);
        }
    }

    fn advance_branch_tail(&mut self, id: NodeId) {
        let (Some(branch), Some(ctx)) = (self.branch, self.decisions.last_mut()) else {
            return;
        };
        if ctx.tails.contains_key(&branch) {
            ctx.touch(branch, id);
        }
    }

    fn pop_decisions(&mut self, indent: usize, has_marker: bool) {
        while let Some(ctx) = self.decisions.last() {
            let cutoff = ctx.cutoff();
            if indent < cutoff {
                debug!(header = ctx.header.0, indent, cutoff, "decision closed by dedent");
                self.decisions.pop();
                self.branch = None;
            } else if indent == cutoff && !has_marker && ctx.explicit {
                let rewind = ctx.rewind_target();
                debug!(header = ctx.header.0, rewind = rewind.0, "decision closed at branch indent");
                self.decisions.pop();
                self.builder.cursor = Some(rewind);
                self.branch = None;
            } else {
                break;
            }
        }
    }

    /// Routes a node carrying a branch marker into the innermost decision. Returns false
    /// when there is no marker, no decision in range, or no open branch to continue.
    /// A branch whose tail is an End is closed.
    fn attach_to_decision(
        &mut self,
        id: NodeId,
        segment: &LogicalSegment,
        grammar: &Grammar,
    ) -> bool {
        let Some(spec_key) = grammar.spec_key else {
            return false;
        };
        let Some(ctx) = self.decisions.last_mut() else {
            return false;
        };
        if !ctx.in_range(segment.indent) {
            return false;
        }

        let mut overflow = None;
        let branch = match spec_key {
            SpecKey::BranchStart => {
                if ctx.branch_indent.is_none() {
                    ctx.branch_indent = Some(segment.indent);
                }
                let branch = ctx.branches.len();
                ctx.branches.push(id);
                let label = match ctx.labels.as_deref() {
                    Some(labels) => {
                        if branch >= labels.len() {
                            overflow = Some(format!(
                                "decision at line {} has more branches than its {} labels",
                                ctx.line + 1,
                                labels.len()
                            ));
                        }
                        labels.get(branch).map(String::as_str)
                    }
                    None => None,
                };
                self.builder.add_edge(ctx.header, id, label);
                branch
            }
            SpecKey::BranchContinue => {
                let Some(branch) = self.branch.or_else(|| ctx.branches.len().checked_sub(1))
                else {
                    return false;
                };
                let Some(&tail) = ctx.tails.get(&branch) else {
                    return false;
                };
                if self.builder.node(tail).kind == NodeKind::End {
                    return false;
                }
                self.builder.add_edge(tail, id, None);
                branch
            }
        };

        ctx.touch(branch, id);
        self.branch = Some(branch);
        if !self.builder.node(id).meta.is_jump() {
            self.builder.cursor = Some(id);
        }
        if let Some(message) = overflow {
            self.warn(message);
        }
        true
    }

    fn handle_statement(&mut self, kind: NodeKind, segment: &LogicalSegment, grammar: &Grammar) {
        let id = self.create(kind, segment, grammar, grammar.text.clone());
        if !self.attach_to_decision(id, segment, grammar) {
            self.wire_default(id, true);
        }
    }

    fn handle_end(&mut self, segment: &LogicalSegment, grammar: &Grammar) {
        let text = if grammar.text.is_empty() {
            self.dialect.end.clone()
        } else {
            grammar.text.clone()
        };
        let id = self.create(NodeKind::End, segment, grammar, text);
        self.builder.tag(id, NodeTag::ExplicitEnd);

        let in_range = self
            .decisions
            .last()
            .is_some_and(|ctx| ctx.in_range(segment.indent));
        if !self.attach_to_decision(id, segment, grammar) {
            self.wire_default(id, false);
        }
        self.branch = None;
        self.builder.cursor = if in_range {
            None
        } else {
            self.builder.last_non_sentinel_before(id)
        };
    }

    fn handle_decision(&mut self, segment: &LogicalSegment, grammar: &Grammar) {
        self.branch = None;
        let labels: Vec<String> = grammar
            .text
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .collect();
        let labels = (labels.len() > 1).then_some(labels);

        let id = self.create(NodeKind::Decision, segment, grammar, grammar.text.clone());
        if let Some(labels) = &labels {
            self.builder.node_mut(id).meta.labels = labels.clone();
        }
        if !self.attach_to_decision(id, segment, grammar) {
            self.wire_default(id, true);
        }

        debug!(header = id.0, line = segment.line, labels = ?labels, "decision opened");
        self.decisions
            .push(DecisionContext::new(id, segment, labels));
        self.branch = None;
    }

    fn handle_connector(&mut self, segment: &LogicalSegment, grammar: &Grammar) {
        let text = if grammar.text.is_empty() {
            self.dialect.connector.clone()
        } else {
            grammar.text.clone()
        };
        let previous = self.builder.cursor;
        let id = self.create(NodeKind::Connector, segment, grammar, text);
        self.builder.recent_connector = Some(id);
        self.builder.compute_connector_fanin(id);

        // A connector nothing converged into is reached by ordinary flow instead.
        if self.functions.is_empty() && self.builder.in_degree(id) == 0 {
            self.builder.cursor = previous;
            self.builder.wire_fallback_into(id);
        }
        self.builder.cursor = Some(id);
        if self.functions.is_empty() {
            self.advance_branch_tail(id);
        }
    }

    fn open_function(&mut self, segment: &LogicalSegment, grammar: &Grammar) {
        let name = grammar
            .text
            .strip_suffix('{')
            .map_or(grammar.text.as_str(), str::trim_end);
        let (text, form) = if grammar.collapsed {
            (format!("{name} {{...}}"), NodeTag::CollapsedFunction)
        } else {
            (name.to_string(), NodeTag::ExpandedFunction)
        };

        let id = self.create(NodeKind::Process, segment, grammar, text);
        self.builder.tag(id, form);
        if !self.attach_to_decision(id, segment, grammar) {
            self.wire_default(id, true);
        }

        debug!(header = id.0, line = segment.line, "function opened");
        self.functions.push(FunContext {
            header: id,
            line: segment.line,
            body: Vec::new(),
            tail: None,
        });
        self.branch = None;
    }

    fn close_function(&mut self, segment: &LogicalSegment) {
        let Some(fun) = self.functions.pop() else {
            return;
        };
        debug!(header = fun.header.0, body = fun.body.len(), "function closed");
        self.builder.node_mut(fun.header).meta.body = fun.body;
        self.branch = None;

        let Some(last) = fun.tail else {
            return;
        };
        let close_token = self.dialect.close_token.as_str();
        let before = segment
            .code
            .trim_end()
            .strip_suffix(close_token)
            .unwrap_or_default()
            .trim();
        let text = if before.is_empty() { close_token } else { before };

        let footer = self.builder.make_node(NodeKind::Process, segment, text);
        self.builder.tag(footer, NodeTag::FunctionFooter);
        self.builder.add_edge(last, footer, None);
        if let Some(outer) = self.functions.last_mut() {
            outer.body.push(footer);
            outer.tail = Some(footer);
            self.builder.enlist(footer, outer.header);
        }
        self.builder.cursor = Some(footer);
    }
}
