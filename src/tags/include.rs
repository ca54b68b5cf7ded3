use std::sync::LazyLock;

use regex::Regex;

use crate::ast::Tag;
use crate::context::{Collection, Context};
use crate::error::{LoquatResult, ParseError};
use crate::expression::{Expression, QUOTED_FRAGMENT};
use crate::parser::{Parser, TagHeader};
use crate::tags::{load_template, parse_attributes};
use crate::template::Template;

static SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s)^({QUOTED_FRAGMENT})(?:\s+(with|for)\s+({QUOTED_FRAGMENT}))?"
    ))
    .expect("valid regex")
});

#[derive(Debug)]
enum Binding {
    /// The variable named like the template, if any.
    Implicit,
    With(Expression),
    /// Renders once per item of a sequence, or once for any other value.
    For(Expression),
}

/// `{% include 'name' [with|for value] [key: value, ...] %}`.
///
/// The partial is loaded and parsed on every render. It sees the including
/// template's variables plus its own binding, which is stored under the
/// template name.
#[derive(Debug)]
pub struct IncludeTag {
    template_name: Expression,
    binding: Binding,
    attributes: Vec<(String, Expression)>,
}

pub fn parse(header: &TagHeader<'_>, parser: &mut Parser<'_>) -> Result<Box<dyn Tag>, ParseError> {
    let config = parser.config();
    let captures = SYNTAX
        .captures(header.markup)
        .ok_or_else(|| header.syntax_error("include '[template]' (with|for) [object|collection]"))?;

    let template_name = Expression::parse(captures.get(1).map_or("", |m| m.as_str()), config);
    let value = captures.get(3).map(|m| Expression::parse(m.as_str(), config));
    let binding = match (captures.get(2).map(|m| m.as_str()), value) {
        (Some("for"), Some(value)) => Binding::For(value),
        (Some(_), Some(value)) => Binding::With(value),
        _ => Binding::Implicit,
    };

    Ok(Box::new(IncludeTag {
        template_name,
        binding,
        attributes: parse_attributes(header.markup, config),
    }))
}

impl IncludeTag {
    fn render_partial(
        &self,
        name: &str,
        partial: &Template,
        context: &mut Context,
        out: &mut String,
    ) -> LoquatResult<()> {
        for (key, expression) in &self.attributes {
            let value = context.evaluate(expression)?;
            context.set(key, value);
        }

        match &self.binding {
            Binding::For(expression) => match context.collection(expression)? {
                Collection::Single(value) => {
                    context.set(name, value);
                    partial.render_nodes(context, out)
                }
                collection @ (Collection::Range { .. } | Collection::Items(_)) => {
                    for item in collection.window(0, None).into_values(false) {
                        context.set(name, item);
                        partial.render_nodes(context, out)?;
                    }
                    Ok(())
                }
            },
            Binding::With(expression) => {
                let value = context.evaluate(expression)?;
                context.set(name, value);
                partial.render_nodes(context, out)
            }
            Binding::Implicit => {
                let value = context.lookup_variable(name).unwrap_or_default();
                context.set(name, value);
                partial.render_nodes(context, out)
            }
        }
    }
}

impl Tag for IncludeTag {
    fn name(&self) -> &str {
        "include"
    }

    fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        let name = context.evaluate(&self.template_name)?;
        let name = context.to_output(&name);
        context.with_partial(&name, |context| {
            let partial = load_template(context, &name)?;
            context.with_stack(|context| self.render_partial(&name, &partial, context, out))
        })
    }
}
