use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::context::Context;
use crate::error::LoquatResult;
use crate::value::Value;

/// A quoted string or a run of characters that are not whitespace, commas or
/// pipes.
pub(crate) const QUOTED_FRAGMENT: &str = r#""[^"]*"|'[^']*'|(?:[^\s,|'"]|"[^"]*"|'[^']*')+"#;

static RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\((\S+)\.\.(\S+)\)$").expect("valid regex"));
static VARIABLE_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]|[\w-]+\??").expect("valid regex"));
static FILTER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\w+)\s*:?").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.name`, or a bare leading name.
    Key(String),
    /// `[expression]`
    Index(Box<Expression>),
}

/// A dotted/indexed lookup such as `product.variants[0]['title'].size`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariablePath {
    pub root: Segment,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    /// The `empty` keyword: equal to any zero-length string or sequence.
    Empty,
    /// `(start..end)`, inclusive.
    Range(Box<Expression>, Box<Expression>),
    Path(VariablePath),
}

impl Expression {
    /// Parses a single markup fragment. Never fails: anything that is not a
    /// recognisable literal is treated as a variable path.
    pub fn parse(markup: &str, config: &Config) -> Self {
        let markup = markup.trim();
        match markup {
            "" | "nil" | "null" => return Self::Literal(Value::Nil),
            "true" => return Self::Literal(Value::Bool(true)),
            "false" => return Self::Literal(Value::Bool(false)),
            "empty" | "blank" => return Self::Empty,
            _ => {}
        }

        if let Some(text) = unquote(markup) {
            return Self::Literal(Value::from(text));
        }

        if let Some(captures) = RANGE.captures(markup) {
            let bound = |index| {
                captures
                    .get(index)
                    .map_or(Self::Literal(Value::Nil), |m| Self::parse(m.as_str(), config))
            };
            return Self::Range(Box::new(bound(1)), Box::new(bound(2)));
        }

        if let Some(number) = config.parse_number(markup) {
            return Self::Literal(number);
        }

        VariablePath::parse(markup, config).map_or(Self::Literal(Value::Nil), Self::Path)
    }

    /// Top-level variable name, if this is a plain path.
    pub fn root_name(&self) -> Option<&str> {
        match self {
            Self::Path(VariablePath {
                root: Segment::Key(name),
                ..
            }) => Some(name),
            Self::Literal(_) | Self::Empty | Self::Range(..) | Self::Path(_) => None,
        }
    }
}

impl VariablePath {
    fn parse(markup: &str, config: &Config) -> Option<Self> {
        let mut parts = VARIABLE_PART.find_iter(markup).map(|part| {
            let part = part.as_str();
            match part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
                Some(inner) => Segment::Index(Box::new(Expression::parse(inner, config))),
                None => Segment::Key(part.to_string()),
            }
        });
        let root = parts.next()?;
        Some(Self {
            root,
            segments: parts.collect(),
        })
    }
}

/// Strips matching single or double quotes.
pub(crate) fn unquote(markup: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|quote| {
        markup
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
            .filter(|body| !body.contains(quote))
    })
}

/// Splits on `separator`, ignoring separators inside quoted strings.
pub(crate) fn split_outside_quotes(markup: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut start = 0;
    for (index, c) in markup.char_indices() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == separator => {
                parts.push(markup.get(start..index).unwrap_or_default());
                start = index.saturating_add(c.len_utf8());
            }
            None => {}
        }
    }
    parts.push(markup.get(start..).unwrap_or_default());
    parts
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub arguments: Vec<Expression>,
}

/// An expression followed by a filter pipeline, as found in `{{ ... }}` and
/// on the right-hand side of `assign`.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub expression: Expression,
    pub filters: Vec<FilterCall>,
}

impl Output {
    /// Empty pipeline stages (`{{ a | | b }}`) are ignored.
    pub fn parse(markup: &str, config: &Config) -> Self {
        let mut stages = split_outside_quotes(markup, '|').into_iter();
        let expression = Expression::parse(stages.next().unwrap_or_default(), config);

        let filters = stages
            .filter_map(|stage| {
                let captures = FILTER_NAME.captures(stage)?;
                let name = captures.get(1)?.as_str().to_string();
                let rest = stage.get(captures.get(0)?.end()..).unwrap_or_default();
                let arguments = split_outside_quotes(rest, ',')
                    .into_iter()
                    .filter(|argument| !argument.trim().is_empty())
                    .map(|argument| Expression::parse(argument, config))
                    .collect();
                Some(FilterCall { name, arguments })
            })
            .collect();

        Self {
            expression,
            filters,
        }
    }

    pub fn evaluate(&self, context: &mut Context) -> LoquatResult<Value> {
        let mut value = context.evaluate(&self.expression)?;
        for filter in &self.filters {
            let arguments = filter
                .arguments
                .iter()
                .map(|argument| context.evaluate(argument))
                .collect::<LoquatResult<Vec<_>>>()?;
            value = context.apply_filter(&filter.name, &value, &arguments)?;
        }
        Ok(value)
    }

    pub fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        let value = self.evaluate(context)?;
        out.push_str(&context.to_output(&value));
        Ok(())
    }
}
