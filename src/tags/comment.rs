use crate::ast::Tag;
use crate::context::Context;
use crate::error::{LoquatResult, ParseError};
use crate::parser::{Parser, TagHeader};

/// `{% comment %}...{% endcomment %}`, also produced by `{# ... #}`. The body
/// is skipped without being parsed.
#[derive(Debug)]
pub struct CommentTag;

pub fn parse_comment(
    _header: &TagHeader<'_>,
    parser: &mut Parser<'_>,
) -> Result<Box<dyn Tag>, ParseError> {
    parser.raw_body("comment")?;
    Ok(Box::new(CommentTag))
}

impl Tag for CommentTag {
    fn name(&self) -> &str {
        "comment"
    }

    fn render(&self, _context: &mut Context, _out: &mut String) -> LoquatResult<()> {
        Ok(())
    }
}

/// `raw` and `literal`: the body is written out verbatim, markup included.
#[derive(Debug)]
pub struct RawTag {
    name: &'static str,
    body: String,
}

pub fn parse_raw(
    _header: &TagHeader<'_>,
    parser: &mut Parser<'_>,
) -> Result<Box<dyn Tag>, ParseError> {
    let body = parser.raw_body("raw")?;
    Ok(Box::new(RawTag { name: "raw", body }))
}

pub fn parse_literal(
    _header: &TagHeader<'_>,
    parser: &mut Parser<'_>,
) -> Result<Box<dyn Tag>, ParseError> {
    let body = parser.raw_body("literal")?;
    Ok(Box::new(RawTag {
        name: "literal",
        body,
    }))
}

impl RawTag {
    pub fn body(&self) -> &str {
        &self.body
    }
}

impl Tag for RawTag {
    fn name(&self) -> &str {
        self.name
    }

    fn render(&self, _context: &mut Context, out: &mut String) -> LoquatResult<()> {
        out.push_str(&self.body);
        Ok(())
    }
}
