use std::sync::LazyLock;

use regex::Regex;

use crate::ast::Tag;
use crate::context::Context;
use crate::error::{LoquatResult, ParseError};
use crate::expression::Output;
use crate::parser::{Parser, TagHeader};

static SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^([\w-]+)\s*=\s*(.*)$").expect("valid regex"));

/// `{% assign name = value | filter %}`. Writes to the outermost scope, so
/// the variable survives the end of any enclosing block.
#[derive(Debug)]
pub struct AssignTag {
    target: String,
    value: Output,
}

pub fn parse(header: &TagHeader<'_>, parser: &mut Parser<'_>) -> Result<Box<dyn Tag>, ParseError> {
    let captures = SYNTAX
        .captures(header.markup)
        .ok_or_else(|| header.syntax_error("assign [var] = [source]"))?;
    let target = captures.get(1).map_or("", |m| m.as_str()).to_string();
    let value = Output::parse(captures.get(2).map_or("", |m| m.as_str()), parser.config());
    Ok(Box::new(AssignTag { target, value }))
}

impl Tag for AssignTag {
    fn name(&self) -> &str {
        "assign"
    }

    fn render(&self, context: &mut Context, _out: &mut String) -> LoquatResult<()> {
        let value = self.value.evaluate(context)?;
        context.set_global(&self.target, value);
        Ok(())
    }
}
