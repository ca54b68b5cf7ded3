use std::sync::LazyLock;

use regex::Regex;

use crate::ast::Tag;
use crate::config::Config;
use crate::context::Context;
use crate::error::{LoquatResult, ParseError};
use crate::expression::{Expression, QUOTED_FRAGMENT, split_outside_quotes};
use crate::parser::{Parser, TagHeader};
use crate::value::{Hash, Value};

const REGISTER: &str = "cycle";
const USAGE: &str = "cycle [name :] var [, var2, var3 ...]";

static NAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)^({QUOTED_FRAGMENT})\s*:\s*(.*)$")).expect("valid regex")
});
static SIMPLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^(?:{QUOTED_FRAGMENT})")).expect("valid regex"));

/// `{% cycle 'a', 'b' %}` writes the next value of its group on each call.
///
/// Groups are keyed by the optional `name:` prefix, or by the raw values
/// written back to back, so `a, bc` and `ab, c` share a position. Positions
/// are kept in the `cycle` register.
#[derive(Debug)]
pub struct CycleTag {
    group: Expression,
    values: Vec<Expression>,
}

pub fn parse(header: &TagHeader<'_>, parser: &mut Parser<'_>) -> Result<Box<dyn Tag>, ParseError> {
    let config = parser.config();
    let (group, values) = if let Some(captures) = NAMED.captures(header.markup) {
        let group = captures.get(1).map_or("", |m| m.as_str());
        let values = captures.get(2).map_or("", |m| m.as_str());
        (Expression::parse(group, config), parse_values(values, config))
    } else if SIMPLE.is_match(header.markup) {
        let values = parse_values(header.markup, config);
        let key = split_outside_quotes(header.markup, ',')
            .into_iter()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .collect::<String>();
        (Expression::Literal(Value::Str(key)), values)
    } else {
        return Err(header.syntax_error(USAGE));
    };

    if values.is_empty() {
        return Err(header.syntax_error(USAGE));
    }
    Ok(Box::new(CycleTag { group, values }))
}

fn parse_values(markup: &str, config: &Config) -> Vec<Expression> {
    split_outside_quotes(markup, ',')
        .into_iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| Expression::parse(value, config))
        .collect()
}

impl Tag for CycleTag {
    fn name(&self) -> &str {
        "cycle"
    }

    fn render(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        context.with_stack(|context| {
            let group = context.evaluate(&self.group)?;
            let key = context.to_output(&group);

            let position = if let Some(Value::Hash(positions)) = context.registers().get(REGISTER) {
                positions.get(&key).and_then(Value::as_int)
            } else {
                None
            };
            let index = position
                .and_then(|position| usize::try_from(position).ok())
                .unwrap_or(0)
                .checked_rem(self.values.len())
                .unwrap_or(0);

            if let Some(expression) = self.values.get(index) {
                let value = context.evaluate(expression)?;
                out.push_str(&context.to_output(&value));
            }

            let next = Value::from(index.saturating_add(1).checked_rem(self.values.len()).unwrap_or(0));
            let registers = context.registers_mut();
            if let Some(Value::Hash(positions)) = registers.get_mut(REGISTER) {
                positions.insert(key, next);
            } else {
                let mut positions = Hash::new();
                positions.insert(key, next);
                registers.insert(REGISTER, Value::Hash(positions));
            }
            Ok(())
        })
    }
}
