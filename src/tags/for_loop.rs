use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{Node, NodeList, Tag, render_all};
use crate::context::Context;
use crate::error::{LoquatResult, ParseError};
use crate::expression::{Expression, QUOTED_FRAGMENT};
use crate::parser::{BodyEnd, Parser, TagHeader};
use crate::tags::parse_attributes;
use crate::value::Value;

static SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)^(\w+)\s+in\s+({QUOTED_FRAGMENT})\s*(reversed)?"))
        .expect("valid regex")
});

/// `{% for item in collection limit: n offset: n reversed %}`, with an
/// optional `{% else %}` rendered for empty collections.
///
/// Inside the body, `forloop` exposes `name`, `length`, `index`, `index0`,
/// `rindex`, `rindex0`, `first` and `last`.
#[derive(Debug)]
pub struct ForTag {
    variable: String,
    collection: Expression,
    /// `variable-collection`, the value of `forloop.name`.
    loop_name: String,
    reversed: bool,
    limit: Option<Expression>,
    offset: Option<Expression>,
    body: NodeList,
    else_body: NodeList,
}

pub fn parse(header: &TagHeader<'_>, parser: &mut Parser<'_>) -> Result<Box<dyn Tag>, ParseError> {
    let usage = "for [item] in [collection] [limit: n] [offset: n] [reversed]";
    let captures = SYNTAX
        .captures(header.markup)
        .ok_or_else(|| header.syntax_error(usage))?;
    let variable = captures.get(1).map_or("", |m| m.as_str()).to_string();
    let collection_markup = captures.get(2).map_or("", |m| m.as_str());
    let reversed = captures.get(3).is_some();

    let config = parser.config();
    let mut limit = None;
    let mut offset = None;
    for (key, value) in parse_attributes(header.markup, config) {
        match key.as_str() {
            "limit" => limit = Some(value),
            "offset" => offset = Some(value),
            _ => {}
        }
    }

    let (body, end) = parser.parse_body(Some("for"), &["else"])?;
    let else_body = match end {
        BodyEnd::Branch { .. } => parser.parse_body(Some("for"), &[])?.0,
        BodyEnd::EndTag | BodyEnd::Eof => NodeList::new(),
    };

    Ok(Box::new(ForTag {
        loop_name: format!("{variable}-{collection_markup}"),
        collection: Expression::parse(collection_markup, config),
        variable,
        reversed,
        limit,
        offset,
        body,
        else_body,
    }))
}

impl ForTag {
    fn bound(&self, expression: Option<&Expression>, context: &mut Context) -> LoquatResult<Option<usize>> {
        let Some(expression) = expression else {
            return Ok(None);
        };
        let value = context.evaluate(expression)?;
        Ok(value
            .to_integer()
            .map(|bound| usize::try_from(bound).unwrap_or(0)))
    }
}

fn forloop(name: &str, length: usize, index: usize) -> Value {
    Value::hash([
        ("name", Value::from(name)),
        ("length", Value::from(length)),
        ("index", Value::from(index.saturating_add(1))),
        ("index0", Value::from(index)),
        ("rindex", Value::from(length.saturating_sub(index))),
        ("rindex0", Value::from(length.saturating_sub(index).saturating_sub(1))),
        ("first", Value::from(index == 0)),
        ("last", Value::from(index.saturating_add(1) == length)),
    ])
}

impl Tag for ForTag {
    fn name(&self) -> &str {
        "for"
    }

    fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        let collection = context.collection(&self.collection)?;
        let offset = self.bound(self.offset.as_ref(), context)?.unwrap_or(0);
        let limit = self.bound(self.limit.as_ref(), context)?;

        let window = collection.window(offset, limit);
        if window.is_empty() {
            return render_all(&self.else_body, context, out);
        }

        let length = window.len();
        context.with_stack(|context| {
            for (index, item) in window.into_values(self.reversed).enumerate() {
                context.set(&self.variable, item);
                context.set("forloop", forloop(&self.loop_name, length, index));
                render_all(&self.body, context, out)?;
            }
            Ok(())
        })
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![&self.body, &self.else_body]
    }
}
