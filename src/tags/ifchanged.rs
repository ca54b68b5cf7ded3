use crate::ast::{Node, NodeList, Tag, render_all};
use crate::context::Context;
use crate::error::{LoquatResult, ParseError};
use crate::parser::{Parser, TagHeader};
use crate::value::Value;

const REGISTER: &str = "ifchanged";

/// Writes its rendered body only when it differs from the previous
/// `ifchanged` output of the same render.
#[derive(Debug)]
pub struct IfChangedTag {
    body: NodeList,
}

pub fn parse(_header: &TagHeader<'_>, parser: &mut Parser<'_>) -> Result<Box<dyn Tag>, ParseError> {
    let (body, _) = parser.parse_body(Some("ifchanged"), &[])?;
    Ok(Box::new(IfChangedTag { body }))
}

impl Tag for IfChangedTag {
    fn name(&self) -> &str {
        "ifchanged"
    }

    fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        context.with_stack(|context| {
            let mut rendered = String::new();
            render_all(&self.body, context, &mut rendered)?;
            let previous = context.registers().get(REGISTER).and_then(Value::as_str);
            if previous != Some(rendered.as_str()) {
                out.push_str(&rendered);
                context.registers_mut().insert(REGISTER, Value::Str(rendered));
            }
            Ok(())
        })
    }

    fn children(&self) -> Vec<&[Node]> {
        vec![&self.body]
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Scope;
    use crate::tags::test_support::render;

    #[test]
    #[ntest::timeout(100)]
    fn test_suppresses_repeats() {
        let source = "{% for item in array %}{% ifchanged %}{{ item }}{% endifchanged %}{% endfor %}";
        assert_eq!(
            render(source, Scope::new().with("array", vec![1_i64, 1, 2, 2, 3, 1])),
            "1231"
        );
        assert_eq!(render(source, Scope::new().with("array", vec![1_i64, 1, 1])), "1");
    }
}
