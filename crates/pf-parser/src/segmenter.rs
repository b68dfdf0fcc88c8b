use pf_core::{Dialect, Position, SourcePos, Span};
use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

/// One statement-sized piece of a physical line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalSegment {
    /// 0-based physical line index.
    pub line: usize,
    /// Position of the piece in the delimiter split, blank pieces included.
    pub sub_index: usize,
    /// Shared by every piece of the physical line.
    pub indent: usize,
    pub raw: String,
    pub code: String,
    pub comment: String,
    pub span: Span,
}

impl LogicalSegment {
    #[must_use]
    pub fn is_comment_only(&self) -> bool {
        self.code.is_empty() && !self.comment.is_empty()
    }

    #[must_use]
    pub const fn pos(&self) -> SourcePos {
        SourcePos {
            line: self.line,
            sub_index: self.sub_index,
            indent: self.indent,
        }
    }
}

/// Splits a document into logical segments. Lines break on `\n` (a trailing `\r` is
/// dropped), pieces on the dialect's delimiter; blank pieces produce nothing.
#[must_use]
pub fn segment(input: &str, dialect: &Dialect) -> Vec<LogicalSegment> {
    let mut segments = Vec::new();
    let mut line_start = 0;

    for (line_index, physical) in input.split('\n').enumerate() {
        let line = physical.strip_suffix('\r').unwrap_or(physical);
        let indent = indent_level(line);
        let mut piece_start = 0;

        for (sub_index, piece) in line.split(dialect.delimiter).enumerate() {
            let start = piece_start;
            let end = start + piece.len();
            piece_start = end + dialect.delimiter.len_utf8();
            if piece.trim().is_empty() {
                continue;
            }

            let (code, comment) = split_comment(piece, dialect.comment);
            segments.push(LogicalSegment {
                line: line_index,
                sub_index,
                indent,
                raw: piece.to_string(),
                code: code.trim().to_string(),
                comment: comment.trim().to_string(),
                span: Span::new(
                    position(line, line_index, line_start, start),
                    position(line, line_index, line_start, end),
                ),
            });
        }

        line_start += physical.len() + 1;
    }

    segments
}

fn position(line: &str, line_index: usize, line_start: usize, offset: usize) -> Position {
    let col = line
        .get(..offset)
        .map_or(0, |prefix| prefix.graphemes(true).count());
    Position {
        line: line_index + 1,
        col: col + 1,
        byte: line_start + offset,
    }
}

/// Indentation level: a tab is one level, four consecutive spaces are one level, a
/// trailing partial run counts for nothing and a tab resets the running space count.
#[must_use]
pub fn indent_level(line: &str) -> usize {
    let mut level = 0;
    let mut spaces = 0;
    for ch in line.chars() {
        match ch {
            '\t' => {
                level += 1;
                spaces = 0;
            }
            ' ' => {
                spaces += 1;
                if spaces == 4 {
                    level += 1;
                    spaces = 0;
                }
            }
            _ => break,
        }
    }
    level
}

/// Splits `piece` at the first comment introducer outside quotes. Quote tracking is a
/// plain toggle with no escapes; an unbalanced quote hides every later introducer.
#[must_use]
pub fn split_comment(piece: &str, comment: char) -> (&str, &str) {
    let mut in_single = false;
    let mut in_double = false;
    for (index, ch) in piece.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            c if c == comment && !in_single && !in_double => {
                return (&piece[..index], &piece[index + c.len_utf8()..]);
            }
            _ => {}
        }
    }
    (piece, "")
}

#[cfg(test)]
mod tests {
    use super::{indent_level, segment, split_comment};
    use pf_core::Dialect;

    #[test]
    fn indentation_counts_tabs_and_space_runs() {
        assert_eq!(indent_level("do a"), 0);
        assert_eq!(indent_level("   do a"), 0);
        assert_eq!(indent_level("    do a"), 1);
        assert_eq!(indent_level("\t\tdo a"), 2);
        assert_eq!(indent_level("  \t    do a"), 2);
        assert_eq!(indent_level("       do a"), 1);
    }

    #[test]
    fn comment_split_respects_quotes() {
        assert_eq!(split_comment("do a # note", '#'), ("do a ", " note"));
        assert_eq!(split_comment("out \"#1\" # n", '#'), ("out \"#1\" ", " n"));
        assert_eq!(split_comment("out 'it''s' #x", '#'), ("out 'it''s' ", "x"));
        assert_eq!(split_comment("out 'open # x", '#'), ("out 'open # x", ""));
    }

    #[test]
    fn delimiter_pieces_share_line_indent() {
        let segments = segment("    do a: do b :: # tail", &Dialect::default());
        let summary: Vec<(usize, usize, usize, &str, &str)> = segments
            .iter()
            .map(|s| (s.line, s.sub_index, s.indent, s.code.as_str(), s.comment.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, 0, 1, "do a", ""),
                (0, 1, 1, "do b", ""),
                (0, 3, 1, "", "tail"),
            ]
        );
        assert!(segments[2].is_comment_only());
    }

    #[test]
    fn spans_cover_pieces_with_grapheme_columns() {
        let source = "do é\r\nx: do ü";
        let segments = segment(source, &Dialect::default());
        assert_eq!(segments.len(), 3);

        let last = &segments[2];
        assert_eq!(last.span.start.line, 2);
        assert_eq!(last.span.start.col, 3);
        assert_eq!(last.span.end.col, 8);
        assert_eq!(last.span.slice(source), Some(" do ü"));
        assert_eq!(segments[1].span.slice(source), Some("x"));
    }

    #[test]
    fn empty_and_blank_input_yield_nothing() {
        assert!(segment("", &Dialect::default()).is_empty());
        assert!(segment("  \n\t\n : :", &Dialect::default()).is_empty());
    }
}
