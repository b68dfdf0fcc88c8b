use pf_core::{Dialect, InlineKey, NodeKey, SpecKey};
use serde::Serialize;

use crate::segmenter::LogicalSegment;

/// Keyword classification of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Grammar {
    pub spec_key: Option<SpecKey>,
    pub node_key: Option<NodeKey>,
    pub inline_keys: Vec<InlineKey>,
    /// The collapsed-function literal was used.
    pub collapsed: bool,
    pub text: String,
}

impl Grammar {
    #[must_use]
    pub fn has_inline(&self, key: InlineKey) -> bool {
        self.inline_keys.contains(&key)
    }

    #[must_use]
    pub const fn has_branch_marker(&self) -> bool {
        self.spec_key.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
enum Token<'a> {
    Word(&'a str),
    CollapsedMarker,
}

/// Classifies a segment's code. Returns `None` for non-statements: empty code or code
/// made only of continuation characters.
#[must_use]
pub fn resolve_grammar(segment: &LogicalSegment, dialect: &Dialect) -> Option<Grammar> {
    resolve_code(&segment.code, dialect)
}

pub(crate) fn resolve_code(code: &str, dialect: &Dialect) -> Option<Grammar> {
    let code = code.trim();
    if code.is_empty()
        || code
            .chars()
            .all(|ch| ch == dialect.continuation || ch.is_whitespace())
    {
        return None;
    }

    let mut tokens: Vec<Token<'_>> = code.split_whitespace().map(Token::Word).collect();
    let mut grammar = Grammar::default();
    let mut consumed = 0;

    if let Some(Token::Word(first)) = tokens.first().copied() {
        let bare = dialect.strip_sigil(first);
        if let Some(key) = dialect.spec_key(bare) {
            grammar.spec_key = Some(key);
            consumed = 1;
        } else if let Some(key) = leading_node_key(&mut tokens, 0, bare, dialect) {
            grammar.node_key = Some(key);
            consumed = 1;
        }
    }

    // The second slot only fills the category the first token left open.
    if consumed == 1 {
        if let Some(Token::Word(second)) = tokens.get(1).copied() {
            let bare = dialect.strip_sigil(second);
            if grammar.spec_key.is_none() {
                if let Some(key) = dialect.spec_key(bare) {
                    grammar.spec_key = Some(key);
                    consumed = 2;
                }
            } else if let Some(key) = leading_node_key(&mut tokens, 1, bare, dialect) {
                grammar.node_key = Some(key);
                consumed = 2;
            }
        }
    }

    let mut words = Vec::new();
    for token in &tokens[consumed..] {
        match *token {
            Token::CollapsedMarker => grammar.collapsed = true,
            Token::Word(word) => match dialect.inline_key(dialect.strip_sigil(word)) {
                Some(key) => grammar.inline_keys.push(key),
                None => words.push(word),
            },
        }
    }
    grammar.text = words.join(" ");
    Some(grammar)
}

/// Node-key lookup at `index`; the collapsed-function literal maps to `Function` and
/// leaves a marker token right behind it.
fn leading_node_key(
    tokens: &mut Vec<Token<'_>>,
    index: usize,
    bare: &str,
    dialect: &Dialect,
) -> Option<NodeKey> {
    if dialect.is_collapsed_function(bare) {
        tokens.insert(index + 1, Token::CollapsedMarker);
        return Some(NodeKey::Function);
    }
    dialect.node_key(bare)
}
