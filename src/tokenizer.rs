use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Location, ParseError, ParseErrorKind};

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind<'a> {
    /// Plain text between markup.
    Literal,
    /// `{% ... %}`, holding the text between the delimiters with trim markers
    /// removed.
    TagMarkup(&'a str),
    /// `{{ ... }}`, holding the text between the delimiters with trim markers
    /// removed.
    OutputMarkup(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    /// Exact source text of the token, delimiters included.
    pub raw: &'a str,
    pub location: Location,
    /// `{%-` / `{{-`: strip whitespace before this token.
    pub trim_left: bool,
    /// `-%}` / `-}}`: strip whitespace after this token.
    pub trim_right: bool,
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// The starting location of the current line
    line_start_pos: usize,
}

impl<'a> Tokenizer<'a> {
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            line_start_pos: 0,
        }
    }

    const fn location(&self) -> Location {
        Location {
            line: self.line,
            column: self.pos.saturating_sub(self.line_start_pos).saturating_add(1),
        }
    }

    /// Moves to byte offset `to`, counting the newlines passed over.
    fn advance_to(&mut self, to: usize) {
        let skipped = self.input.get(self.pos..to).unwrap_or_default();
        for (offset, _) in skipped.match_indices('\n') {
            self.line = self.line.saturating_add(1);
            self.line_start_pos = self.pos.saturating_add(offset).saturating_add(1);
        }
        self.pos = to;
    }

    /// Byte offset of the next `{{` or `{%` at or after the cursor.
    fn next_markup_start(&self) -> Option<usize> {
        let rest = self.input.get(self.pos..)?;
        rest.match_indices('{')
            .find(|(offset, _)| {
                matches!(
                    rest.as_bytes().get(offset.saturating_add(1)).copied(),
                    Some(b'{' | b'%')
                )
            })
            .map(|(offset, _)| self.pos.saturating_add(offset))
    }

    fn literal(&self, end: usize) -> Token<'a> {
        Token {
            kind: TokenKind::Literal,
            raw: self.input.get(self.pos..end).unwrap_or_default(),
            location: self.location(),
            trim_left: false,
            trim_right: false,
        }
    }

    fn markup(&mut self, start: usize) -> ParseResult<Token<'a>> {
        let is_tag = self.input.as_bytes().get(start.saturating_add(1)) == Some(&b'%');
        let close = if is_tag { "%}" } else { "}}" };
        let body_start = start.saturating_add(2);
        let location = self.location();

        let Some(body_len) = self.input.get(body_start..).and_then(|rest| rest.find(close)) else {
            let token = self.input.get(start..).unwrap_or_default().to_string();
            let kind = if is_tag {
                ParseErrorKind::UnterminatedTag { token }
            } else {
                ParseErrorKind::UnterminatedOutput { token }
            };
            return Err(ParseError::new(kind, location));
        };

        let body_end = body_start.saturating_add(body_len);
        let end = body_end.saturating_add(close.len());
        let raw = self.input.get(start..end).unwrap_or_default();
        let body = self.input.get(body_start..body_end).unwrap_or_default();

        let (trim_left, body) = body.strip_prefix('-').map_or((false, body), |rest| (true, rest));
        let (trim_right, inner) = body.strip_suffix('-').map_or((false, body), |rest| (true, rest));

        self.advance_to(end);
        Ok(Token {
            kind: if is_tag {
                TokenKind::TagMarkup(inner)
            } else {
                TokenKind::OutputMarkup(inner)
            },
            raw,
            location,
            trim_left,
            trim_right,
        })
    }

    fn tokenize(mut self) -> ParseResult<Vec<Token<'a>>> {
        let mut tokens = Vec::new();
        while self.pos < self.input.len() {
            match self.next_markup_start() {
                Some(start) => {
                    if start > self.pos {
                        tokens.push(self.literal(start));
                        self.advance_to(start);
                    }
                    tokens.push(self.markup(start)?);
                }
                None => {
                    tokens.push(self.literal(self.input.len()));
                    self.advance_to(self.input.len());
                }
            }
        }
        Ok(tokens)
    }
}

/// Splits `source` into literal, tag and output tokens.
///
/// Concatenating the `raw` text of every token reproduces `source` exactly.
///
/// # Errors
///
/// A `{%` or `{{` with no matching closing delimiter is a syntax error.
pub fn tokenize(source: &str) -> ParseResult<Vec<Token<'_>>> {
    Tokenizer::new(source).tokenize()
}

static SHORTHAND_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\{|\{#|\{%-?\s*(raw|literal)\s*-?%\}").expect("valid regex")
});
static VERBATIM_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{%-?\s*end(raw|literal)\s*-?%\}").expect("valid regex")
});

/// Rewrites `{{{ text }}}` into a literal tag and `{# text #}` into a comment
/// tag. Text inside `raw`/`literal` regions is left untouched.
pub fn expand_shorthands(source: &str) -> Cow<'_, str> {
    if !source.contains("{{{") && !source.contains("{#") {
        return Cow::Borrowed(source);
    }

    let text = |from: usize, to: usize| source.get(from..to).unwrap_or_default();
    let after = |from: usize| source.get(from..).unwrap_or_default();

    let mut out = String::with_capacity(source.len().saturating_add(32));
    let mut pos = 0;
    while let Some(captures) = SHORTHAND_START.captures_at(source, pos) {
        let Some(open) = captures.get(0) else { break };
        out.push_str(text(pos, open.start()));

        if let Some(region) = captures.get(1) {
            out.push_str(open.as_str());
            let verbatim_end = VERBATIM_END
                .captures_iter(after(open.end()))
                .find(|end| end.get(1).map(|m| m.as_str()) == Some(region.as_str()))
                .and_then(|end| end.get(0))
                .map_or(source.len(), |end| open.end().saturating_add(end.end()));
            out.push_str(text(open.end(), verbatim_end));
            pos = verbatim_end;
            continue;
        }

        if open.as_str() == "{#" {
            match after(open.end()).find("#}") {
                Some(len) => {
                    let body_end = open.end().saturating_add(len);
                    out.push_str("{% comment %}");
                    out.push_str(text(open.end(), body_end));
                    out.push_str("{% endcomment %}");
                    pos = body_end.saturating_add(2);
                }
                None => {
                    out.push_str(open.as_str());
                    pos = open.end();
                }
            }
            continue;
        }

        match after(open.end()).find("}}}") {
            Some(len) => {
                let mut body_end = open.end().saturating_add(len);
                while source.as_bytes().get(body_end.saturating_add(3)) == Some(&b'}') {
                    body_end = body_end.saturating_add(1);
                }
                let body = text(open.end(), body_end);
                let body = body
                    .strip_prefix(|c: char| c.is_whitespace())
                    .unwrap_or(body)
                    .trim_end();
                out.push_str("{% literal %}");
                out.push_str(body);
                out.push_str("{% endliteral %}");
                pos = body_end.saturating_add(3);
            }
            None => {
                out.push_str(open.as_str());
                pos = open.end();
            }
        }
    }
    out.push_str(after(pos));
    Cow::Owned(out)
}
