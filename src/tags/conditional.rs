use crate::ast::{Node, NodeList, Tag, render_all};
use crate::condition::Condition;
use crate::context::Context;
use crate::error::{LoquatResult, ParseError};
use crate::parser::{BodyEnd, Parser, TagHeader};

/// `if` and `unless`, with any number of `elsif` branches and an optional
/// `else`. Neither pushes a scope.
#[derive(Debug)]
pub struct IfTag {
    name: &'static str,
    /// The first branch's condition is negated (`unless`).
    negated: bool,
    branches: Vec<(Condition, NodeList)>,
}

pub fn parse_if(header: &TagHeader<'_>, parser: &mut Parser<'_>) -> Result<Box<dyn Tag>, ParseError> {
    parse_branches("if", false, header, parser)
}

pub fn parse_unless(
    header: &TagHeader<'_>,
    parser: &mut Parser<'_>,
) -> Result<Box<dyn Tag>, ParseError> {
    parse_branches("unless", true, header, parser)
}

fn parse_branches(
    name: &'static str,
    negated: bool,
    header: &TagHeader<'_>,
    parser: &mut Parser<'_>,
) -> Result<Box<dyn Tag>, ParseError> {
    if header.markup.is_empty() {
        return Err(header.syntax_error(&format!("{name} [expression]")));
    }

    let mut branches = Vec::new();
    let mut condition = Condition::parse(header.markup, parser.config());
    loop {
        let (body, end) = parser.parse_body(Some(name), &["elsif", "else"])?;
        branches.push((condition, body));
        condition = match end {
            BodyEnd::Branch { name: branch, .. } if branch == "else" => Condition::Else,
            BodyEnd::Branch { markup, .. } => Condition::parse(&markup, parser.config()),
            BodyEnd::EndTag | BodyEnd::Eof => break,
        };
    }

    Ok(Box::new(IfTag {
        name,
        negated,
        branches,
    }))
}

impl Tag for IfTag {
    fn name(&self) -> &str {
        self.name
    }

    fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        for (index, (condition, body)) in self.branches.iter().enumerate() {
            let mut holds = condition.evaluate(context)?;
            if index == 0 && self.negated {
                holds = !holds;
            }
            if holds {
                return render_all(body, context, out);
            }
        }
        Ok(())
    }

    fn children(&self) -> Vec<&[Node]> {
        self.branches.iter().map(|(_, body)| body.as_slice()).collect()
    }
}
