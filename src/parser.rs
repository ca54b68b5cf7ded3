use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{Document, Node, NodeList, Tag};
use crate::config::Config;
use crate::error::{Location, ParseError, ParseErrorKind};
use crate::expression::Output;
use crate::tokenizer::{Token, TokenKind, tokenize};

type ParseResult<T> = Result<T, ParseError>;

/// Builds a tag from its header. Block tags consume their body from the
/// parser before returning.
pub type TagFactory = fn(&TagHeader<'_>, &mut Parser<'_>) -> ParseResult<Box<dyn Tag>>;

/// Tag name to factory. Names are matched exactly.
#[derive(Clone, Default)]
pub struct TagRegistry {
    factories: HashMap<String, TagFactory>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_tags() -> Self {
        let mut registry = Self::new();
        crate::tags::register_builtin(&mut registry);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: TagFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn get(&self, name: &str) -> Option<TagFactory> {
        self.factories.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}

/// `{% name markup %}`, split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader<'a> {
    pub name: &'a str,
    pub markup: &'a str,
    pub location: Location,
}

impl TagHeader<'_> {
    pub fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(kind, self.location)
    }

    /// Error for markup that does not match the tag's grammar.
    pub fn syntax_error(&self, usage: &str) -> ParseError {
        self.error(ParseErrorKind::InvalidSyntax {
            tag: self.name.to_string(),
            usage: usage.to_string(),
        })
    }
}

static TAG_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*(\w+)\s*(.*?)\s*$").expect("valid regex"));

fn split_header(inner: &str) -> Option<(&str, &str)> {
    let captures = TAG_HEADER.captures(inner)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

/// How a body parsed with [`Parser::parse_body`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyEnd {
    /// `{% end<name> %}` of the enclosing block.
    EndTag,
    /// One of the branch tags the caller asked to stop at, e.g. `else`.
    Branch {
        name: String,
        markup: String,
        location: Location,
    },
    /// End of input; only possible at document level.
    Eof,
}

struct PendingToken<'s> {
    token: Token<'s>,
    /// Literal text after whitespace control has been applied.
    text: &'s str,
}

/// Turns tokens into nodes, dispatching tag markup to the registered tag
/// factories.
pub struct Parser<'s> {
    tokens: VecDeque<PendingToken<'s>>,
    config: &'s Config,
}

impl<'s> Parser<'s> {
    fn new(tokens: Vec<Token<'s>>, config: &'s Config) -> Self {
        let mut pending: VecDeque<PendingToken<'s>> = VecDeque::with_capacity(tokens.len());
        for (index, token) in tokens.iter().enumerate() {
            let mut text = token.raw;
            if token.kind == TokenKind::Literal {
                let trim_before = index
                    .checked_sub(1)
                    .and_then(|previous| tokens.get(previous))
                    .is_some_and(|previous| previous.trim_right);
                let trim_after = tokens.get(index.saturating_add(1)).is_some_and(|next| next.trim_left);
                if trim_before {
                    text = text.trim_start();
                }
                if trim_after {
                    text = text.trim_end();
                }
            }
            pending.push_back(PendingToken {
                token: *token,
                text,
            });
        }
        Self {
            tokens: pending,
            config,
        }
    }

    pub const fn config(&self) -> &'s Config {
        self.config
    }

    /// Parses nodes until the block named `block` is closed, one of
    /// `branches` is reached, or input runs out (document level only).
    ///
    /// # Errors
    ///
    /// * Running out of input inside a block.
    /// * `else`-style or `end`-style tags that do not belong to `block`.
    /// * Tags missing from the registry, and tag rule violations.
    pub fn parse_body(
        &mut self,
        block: Option<&str>,
        branches: &[&str],
    ) -> ParseResult<(NodeList, BodyEnd)> {
        let delimiter = block.map(|name| format!("end{name}"));
        let mut nodes = NodeList::new();

        while let Some(PendingToken { token, text }) = self.tokens.pop_front() {
            match token.kind {
                TokenKind::Literal => {
                    if !text.is_empty() {
                        nodes.push(Node::Text(text.to_string()));
                    }
                }
                TokenKind::OutputMarkup(markup) => {
                    nodes.push(Node::Output(Output::parse(markup, self.config)));
                }
                TokenKind::TagMarkup(inner) => {
                    let Some((name, markup)) = split_header(inner) else {
                        return Err(ParseError::new(
                            ParseErrorKind::MalformedTag {
                                token: token.raw.to_string(),
                            },
                            token.location,
                        ));
                    };

                    if delimiter.as_deref() == Some(name) {
                        return Ok((nodes, BodyEnd::EndTag));
                    }
                    if branches.contains(&name) {
                        return Ok((
                            nodes,
                            BodyEnd::Branch {
                                name: name.to_string(),
                                markup: markup.to_string(),
                                location: token.location,
                            },
                        ));
                    }

                    let header = TagHeader {
                        name,
                        markup,
                        location: token.location,
                    };
                    let Some(factory) = self.config.tags().get(name) else {
                        return Err(unknown_tag(&header, block, delimiter.as_deref()));
                    };

                    tracing::trace!(tag = name, line = token.location.line, "parsing tag");
                    let tag = factory(&header, self)?;
                    tag.assert_rules(&nodes)?;
                    nodes.push(Node::Tag(tag));
                }
            }
        }

        match block {
            Some(block) => Err(ParseError {
                location: None,
                kind: ParseErrorKind::BlockNotClosed {
                    block: block.to_string(),
                },
            }),
            None => Ok((nodes, BodyEnd::Eof)),
        }
    }

    /// Collects the raw source up to `{% end_tag %}` without interpreting it.
    /// Trim markers on the surrounding tags do not reach into the body.
    pub fn raw_body(&mut self, block: &str) -> ParseResult<String> {
        let delimiter = format!("end{block}");
        let mut body = String::new();
        while let Some(PendingToken { token, .. }) = self.tokens.pop_front() {
            match token.kind {
                TokenKind::TagMarkup(inner)
                    if split_header(inner).is_some_and(|(name, _)| name == delimiter) =>
                {
                    return Ok(body);
                }
                TokenKind::Literal | TokenKind::TagMarkup(_) | TokenKind::OutputMarkup(_) => {
                    body.push_str(token.raw);
                }
            }
        }
        Err(ParseError {
            location: None,
            kind: ParseErrorKind::BlockNotClosed {
                block: block.to_string(),
            },
        })
    }
}

fn unknown_tag(header: &TagHeader<'_>, block: Option<&str>, delimiter: Option<&str>) -> ParseError {
    let tag = header.name.to_string();
    let kind = match (header.name, block) {
        ("else" | "elsif", None) => ParseErrorKind::UnexpectedBranch { tag },
        ("else" | "elsif", Some(block)) => ParseErrorKind::UnexpectedBranchIn {
            tag,
            block: block.to_string(),
        },
        (name, None) if name.starts_with("end") => ParseErrorKind::UnmatchedEnd { tag },
        (name, Some(block)) if name.starts_with("end") => ParseErrorKind::InvalidDelimiter {
            tag,
            block: block.to_string(),
            expected: delimiter.unwrap_or_default().to_string(),
        },
        _ => ParseErrorKind::UnknownTag { tag },
    };
    header.error(kind)
}

/// Parses a whole template into its root node list.
pub fn parse_document(source: &str, config: &Config) -> ParseResult<Document> {
    tracing::trace!(len = source.len(), "parsing template");
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens, config);
    let (nodes, _) = parser.parse_body(None, &[])?;
    Ok(Document { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::conditional::IfTag;

    fn parse(source: &str) -> ParseResult<Document> {
        parse_document(source, &Config::default())
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_input() {
        assert!(parse("").unwrap().nodes.is_empty());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_text_and_output() {
        let document = parse(" {{funk}} ").unwrap();
        assert_eq!(document.nodes.len(), 3);
        assert!(matches!(&document.nodes[0], Node::Text(text) if text == " "));
        assert!(matches!(&document.nodes[1], Node::Output(output) if output.expression.root_name() == Some("funk")));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_block_tags_become_tag_nodes() {
        let document = parse("{% if a %}x{% else %}y{% endif %} after").unwrap();
        assert_eq!(document.nodes.len(), 2);
        let tag = document.nodes[0].as_tag::<IfTag>().expect("if tag");
        assert_eq!(tag.children().len(), 2);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_whitespace_control() {
        let document = parse("a  {%- comment -%} x {%- endcomment -%}\n\n b").unwrap();
        assert!(matches!(&document.nodes[0], Node::Text(text) if text == "a"));
        assert!(matches!(document.nodes.last(), Some(Node::Text(text)) if text == "b"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_block() {
        let error = parse("{% if true %}open").unwrap_err();
        assert_eq!(
            error.kind,
            ParseErrorKind::BlockNotClosed {
                block: "if".to_string()
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unexpected_tags() {
        let error = parse("{% else %}").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::UnexpectedBranch { .. }));

        let error = parse("{% endfor %}").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::UnmatchedEnd { .. }));

        let error = parse("{% for a in b %}{% endif %}").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::InvalidDelimiter { ref expected, .. } if expected == "endfor"));

        let error = parse("{% capture x %}{% else %}{% endcapture %}").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::UnexpectedBranchIn { .. }));

        let error = parse("line one\n  {% nope %}").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::UnknownTag { tag: "nope".to_string() });
        assert_eq!(error.location, Some(Location { line: 2, column: 3 }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_tag_names_are_case_sensitive() {
        let error = parse("{% IF true %}x{% ENDIF %}").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::UnknownTag { ref tag } if tag == "IF"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_malformed_header() {
        let error = parse("{% %}").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::MalformedTag { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_raw_body_keeps_markup() {
        let tokens = tokenize("{{ a }} {% if %}text{% endraw %}rest").unwrap();
        let config = Config::default();
        let mut parser = Parser::new(tokens, &config);
        assert_eq!(parser.raw_body("raw").unwrap(), "{{ a }} {% if %}text");
        let (nodes, end) = parser.parse_body(None, &[]).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(end, BodyEnd::Eof);
    }
}
