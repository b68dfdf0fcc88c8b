use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Branch markers. They route a statement into the innermost open decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SpecKey {
    BranchStart,
    BranchContinue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Decision,
    Connector,
    End,
    Do,
    Function,
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum InlineKey {
    LoopBack,
    ForwardJump,
    Reserved1,
    Reserved2,
}

impl SpecKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BranchStart => "branch-start",
            Self::BranchContinue => "branch-continue",
        }
    }
}

impl NodeKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Connector => "connector",
            Self::End => "end",
            Self::Do => "do",
            Self::Function => "function",
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl InlineKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoopBack => "loop-back",
            Self::ForwardJump => "forward-jump",
            Self::Reserved1 => "reserved-1",
            Self::Reserved2 => "reserved-2",
        }
    }
}

/// Lexical characters and keyword spellings of the pseudocode markup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Dialect {
    pub delimiter: char,
    pub comment: char,
    pub sigil: char,
    pub continuation: char,
    pub close_token: String,
    pub branch_start: String,
    pub branch_continue: String,
    pub decision: String,
    pub connector: String,
    pub end: String,
    #[serde(rename = "do")]
    pub do_key: String,
    pub function: String,
    pub collapsed_function: String,
    pub input: String,
    pub output: String,
    pub loop_back: String,
    pub forward_jump: String,
    pub reserved: [String; 2],
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: ':',
            comment: '#',
            sigil: '@',
            continuation: '\\',
            close_token: "}".to_string(),
            branch_start: "else".to_string(),
            branch_continue: "then".to_string(),
            decision: "dec".to_string(),
            connector: "ii".to_string(),
            end: "end".to_string(),
            do_key: "do".to_string(),
            function: "fun".to_string(),
            collapsed_function: "fun-".to_string(),
            input: "in".to_string(),
            output: "out".to_string(),
            loop_back: "loop".to_string(),
            forward_jump: "goto".to_string(),
            reserved: ["break".to_string(), "continue".to_string()],
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DialectError {
    #[error("{first} and {second} must differ, both are {ch:?}")]
    ConflictingCharacters {
        first: &'static str,
        second: &'static str,
        ch: char,
    },
    #[error("{field} must not be whitespace")]
    WhitespaceCharacter { field: &'static str },
    #[error("keyword {field} must be a single non-empty token, got {value:?}")]
    InvalidKeyword { field: &'static str, value: String },
    #[error("keyword {keyword:?} is assigned to both {first} and {second}")]
    DuplicateKeyword {
        keyword: String,
        first: &'static str,
        second: &'static str,
    },
}

impl Dialect {
    /// Strips at most one leading sigil.
    #[must_use]
    pub fn strip_sigil<'a>(&self, token: &'a str) -> &'a str {
        token.strip_prefix(self.sigil).unwrap_or(token)
    }

    #[must_use]
    pub fn spec_key(&self, word: &str) -> Option<SpecKey> {
        if word == self.branch_start {
            Some(SpecKey::BranchStart)
        } else if word == self.branch_continue {
            Some(SpecKey::BranchContinue)
        } else {
            None
        }
    }

    /// Node-key lookup. The collapsed-function literal is not a node-key on its own;
    /// see [`Dialect::is_collapsed_function`].
    #[must_use]
    pub fn node_key(&self, word: &str) -> Option<NodeKey> {
        [
            (&self.decision, NodeKey::Decision),
            (&self.connector, NodeKey::Connector),
            (&self.end, NodeKey::End),
            (&self.do_key, NodeKey::Do),
            (&self.function, NodeKey::Function),
            (&self.input, NodeKey::Input),
            (&self.output, NodeKey::Output),
        ]
        .into_iter()
        .find_map(|(spelling, key)| (spelling == word).then_some(key))
    }

    #[must_use]
    pub fn is_collapsed_function(&self, word: &str) -> bool {
        word == self.collapsed_function
    }

    #[must_use]
    pub fn inline_key(&self, word: &str) -> Option<InlineKey> {
        if word == self.loop_back {
            Some(InlineKey::LoopBack)
        } else if word == self.forward_jump {
            Some(InlineKey::ForwardJump)
        } else if word == self.reserved[0] {
            Some(InlineKey::Reserved1)
        } else if word == self.reserved[1] {
            Some(InlineKey::Reserved2)
        } else {
            None
        }
    }

    /// Checks that the lexical characters are distinct and every keyword is a unique,
    /// whitespace-free token.
    pub fn validate(&self) -> Result<(), DialectError> {
        let chars = [
            ("delimiter", self.delimiter),
            ("comment", self.comment),
            ("sigil", self.sigil),
            ("continuation", self.continuation),
        ];
        for (index, (field, ch)) in chars.iter().enumerate() {
            if ch.is_whitespace() {
                return Err(DialectError::WhitespaceCharacter { field: *field });
            }
            if let Some((other, _)) = chars[index + 1..].iter().find(|(_, c)| c == ch) {
                return Err(DialectError::ConflictingCharacters {
                    first: *field,
                    second: *other,
                    ch: *ch,
                });
            }
        }

        let keywords = self.keywords();
        for (index, (field, value)) in keywords.iter().enumerate() {
            if value.is_empty() || value.chars().any(char::is_whitespace) {
                return Err(DialectError::InvalidKeyword {
                    field: *field,
                    value: (*value).to_string(),
                });
            }
            if let Some((other, _)) = keywords[index + 1..].iter().find(|(_, v)| v == value) {
                return Err(DialectError::DuplicateKeyword {
                    keyword: (*value).to_string(),
                    first: *field,
                    second: *other,
                });
            }
        }
        Ok(())
    }

    fn keywords(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("close_token", self.close_token.as_str()),
            ("branch_start", self.branch_start.as_str()),
            ("branch_continue", self.branch_continue.as_str()),
            ("decision", self.decision.as_str()),
            ("connector", self.connector.as_str()),
            ("end", self.end.as_str()),
            ("do", self.do_key.as_str()),
            ("function", self.function.as_str()),
            ("collapsed_function", self.collapsed_function.as_str()),
            ("input", self.input.as_str()),
            ("output", self.output.as_str()),
            ("loop_back", self.loop_back.as_str()),
            ("forward_jump", self.forward_jump.as_str()),
            ("reserved[0]", self.reserved[0].as_str()),
            ("reserved[1]", self.reserved[1].as_str()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DialectConfigError {
    pub field: String,
    pub value: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DialectConfigParse {
    pub dialect: Dialect,
    pub warnings: Vec<String>,
    pub errors: Vec<DialectConfigError>,
}

/// Reads a dialect from a JSON-shaped config value.
///
/// Unknown keys become warnings, values of the wrong type become errors and leave the
/// default in place. If the assembled dialect fails [`Dialect::validate`], the error is
/// recorded and the default dialect is returned instead.
#[must_use]
pub fn parse_dialect_config_value(value: &Value) -> DialectConfigParse {
    let mut parsed = DialectConfigParse::default();
    let Some(root) = value.as_object() else {
        parsed.errors.push(DialectConfigError {
            field: "$".to_string(),
            value: value.to_string(),
            message: "dialect config root must be an object".to_string(),
        });
        return parsed;
    };

    for (key, raw_value) in root {
        match key.as_str() {
            "delimiter" => {
                if let Some(ch) = read_char(&mut parsed, key, raw_value) {
                    parsed.dialect.delimiter = ch;
                }
            }
            "comment" => {
                if let Some(ch) = read_char(&mut parsed, key, raw_value) {
                    parsed.dialect.comment = ch;
                }
            }
            "sigil" => {
                if let Some(ch) = read_char(&mut parsed, key, raw_value) {
                    parsed.dialect.sigil = ch;
                }
            }
            "continuation" => {
                if let Some(ch) = read_char(&mut parsed, key, raw_value) {
                    parsed.dialect.continuation = ch;
                }
            }
            "close_token" | "closeToken" => {
                if let Some(text) = read_string(&mut parsed, key, raw_value) {
                    parsed.dialect.close_token = text;
                }
            }
            "keywords" => parse_keywords(&mut parsed, raw_value),
            other => push_warning(
                &mut parsed,
                format!("Unsupported dialect config key '{other}' ignored"),
            ),
        }
    }

    if let Err(err) = parsed.dialect.validate() {
        parsed.errors.push(DialectConfigError {
            field: "$".to_string(),
            value: value.to_string(),
            message: format!("{err}; falling back to the default dialect"),
        });
        parsed.dialect = Dialect::default();
    }

    parsed
}

fn parse_keywords(parsed: &mut DialectConfigParse, value: &Value) {
    let Some(keywords) = value.as_object() else {
        push_type_error(parsed, "keywords", value, "must be an object");
        return;
    };

    for (key, raw_value) in keywords {
        let field = format!("keywords.{key}");
        if key == "reserved" {
            match raw_value.as_array().map(Vec::as_slice) {
                Some([Value::String(first), Value::String(second)]) => {
                    parsed.dialect.reserved = [first.clone(), second.clone()];
                }
                _ => push_type_error(parsed, &field, raw_value, "must be an array of two strings"),
            }
            continue;
        }

        let Some(slot) = keyword_slot(&mut parsed.dialect, key) else {
            push_warning(
                parsed,
                format!("Unsupported dialect keyword '{key}' ignored"),
            );
            continue;
        };
        match raw_value.as_str() {
            Some(text) => *slot = text.to_string(),
            None => push_type_error(parsed, &field, raw_value, "must be a string"),
        }
    }
}

fn keyword_slot<'a>(dialect: &'a mut Dialect, key: &str) -> Option<&'a mut String> {
    let slot = match key {
        "branch_start" | "branchStart" => &mut dialect.branch_start,
        "branch_continue" | "branchContinue" => &mut dialect.branch_continue,
        "decision" => &mut dialect.decision,
        "connector" => &mut dialect.connector,
        "end" => &mut dialect.end,
        "do" => &mut dialect.do_key,
        "function" => &mut dialect.function,
        "collapsed_function" | "collapsedFunction" => &mut dialect.collapsed_function,
        "input" => &mut dialect.input,
        "output" => &mut dialect.output,
        "loop_back" | "loopBack" => &mut dialect.loop_back,
        "forward_jump" | "forwardJump" => &mut dialect.forward_jump,
        _ => return None,
    };
    Some(slot)
}

fn read_char(parsed: &mut DialectConfigParse, field: &str, value: &Value) -> Option<char> {
    let text = read_string(parsed, field, value)?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch),
        _ => {
            push_type_error(parsed, field, value, "must be a single character");
            None
        }
    }
}

fn read_string(parsed: &mut DialectConfigParse, field: &str, value: &Value) -> Option<String> {
    if let Some(text) = value.as_str() {
        Some(text.to_string())
    } else {
        push_type_error(parsed, field, value, "must be a string");
        None
    }
}

fn push_type_error(parsed: &mut DialectConfigParse, field: &str, value: &Value, message: &str) {
    parsed.errors.push(DialectConfigError {
        field: field.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    });
}

fn push_warning(parsed: &mut DialectConfigParse, message: String) {
    parsed.warnings.push(message);
}
