use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{Node, NodeList, Tag, render_all};
use crate::context::Context;
use crate::error::{LoquatResult, ParseError};
use crate::parser::{Parser, TagHeader};

static SYNTAX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w+)$").expect("valid regex"));

/// `{% capture name %}...{% endcapture %}` renders its body into a string
/// variable instead of the output.
#[derive(Debug)]
pub struct CaptureTag {
    target: String,
    body: NodeList,
}

pub fn parse(header: &TagHeader<'_>, parser: &mut Parser<'_>) -> Result<Box<dyn Tag>, ParseError> {
    let target = SYNTAX
        .captures(header.markup)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| header.syntax_error("capture [var]"))?
        .as_str()
        .to_string();
    let (body, _) = parser.parse_body(Some("capture"), &[])?;
    Ok(Box::new(CaptureTag { target, body }))
}

impl Tag for CaptureTag {
    fn name(&self) -> &str {
        "capture"
    }

    fn render(&self, context: &mut Context, _out: &mut String) -> LoquatResult<()> {
        let mut captured = String::new();
        context.with_stack(|context| render_all(&self.body, context, &mut captured))?;
        context.set(&self.target, captured);
        Ok(())
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![&self.body]
    }
}
