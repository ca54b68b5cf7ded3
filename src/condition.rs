use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::context::Context;
use crate::error::{LoquatError, LoquatResult};
use crate::expression::{Expression, QUOTED_FRAGMENT};
use crate::value::Value;

static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:"[^"]*"|'[^']*'|[^\s'"])+"#).expect("valid regex")
});
static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\s*({QUOTED_FRAGMENT})\s*([=!<>a-zA-Z_]+)?\s*({QUOTED_FRAGMENT})?"
    ))
    .expect("valid regex")
});

/// A boolean test as used by `if`, `elsif` and `unless`.
///
/// `and`/`or` chains associate to the right, so `a and b or c` means
/// `a and (b or c)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        left: Expression,
        operator: Option<String>,
        right: Option<Expression>,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    /// The condition of an `else` branch.
    Else,
}

impl Condition {
    /// Parses condition markup. The grammar is permissive: parentheses are
    /// ignored and anything after the first comparison of each clause is
    /// dropped.
    pub fn parse(markup: &str, config: &Config) -> Self {
        let mut clauses: Vec<Vec<&str>> = vec![Vec::new()];
        let mut connectives = Vec::new();
        for word in WORD.find_iter(markup).map(|word| word.as_str()) {
            match word {
                "and" | "or" => {
                    connectives.push(word);
                    clauses.push(Vec::new());
                }
                _ => {
                    if let Some(clause) = clauses.last_mut() {
                        clause.push(word);
                    }
                }
            }
        }

        let mut clauses = clauses
            .into_iter()
            .map(|words| Self::comparison(&words.join(" "), config))
            .rev();
        let mut condition = clauses.next().unwrap_or(Self::Else);
        for (clause, connective) in clauses.zip(connectives.into_iter().rev()) {
            condition = if connective == "and" {
                Self::And(Box::new(clause), Box::new(condition))
            } else {
                Self::Or(Box::new(clause), Box::new(condition))
            };
        }
        condition
    }

    fn comparison(clause: &str, config: &Config) -> Self {
        let Some(captures) = COMPARISON.captures(clause) else {
            return Self::Compare {
                left: Expression::Literal(Value::Nil),
                operator: None,
                right: None,
            };
        };
        Self::Compare {
            left: captures
                .get(1)
                .map_or(Expression::Literal(Value::Nil), |m| {
                    Expression::parse(m.as_str(), config)
                }),
            operator: captures.get(2).map(|m| m.as_str().to_string()),
            right: captures
                .get(3)
                .map(|m| Expression::parse(m.as_str(), config)),
        }
    }

    pub fn evaluate(&self, context: &mut Context) -> LoquatResult<bool> {
        match self {
            Self::Else => Ok(true),
            Self::And(left, right) => Ok(left.evaluate(context)? && right.evaluate(context)?),
            Self::Or(left, right) => Ok(left.evaluate(context)? || right.evaluate(context)?),
            Self::Compare {
                left,
                operator,
                right,
            } => {
                let left = Operand::evaluate(left, context)?;
                let Some(operator) = operator else {
                    return Ok(left.is_truthy());
                };
                let right = match right {
                    Some(right) => Operand::evaluate(right, context)?,
                    None => Operand::Value(Value::Nil),
                };
                compare(&left, operator, &right, context)
            }
        }
    }
}

enum Operand {
    Value(Value),
    /// The `empty` keyword.
    Empty,
}

impl Operand {
    fn evaluate(expression: &Expression, context: &mut Context) -> LoquatResult<Self> {
        match expression {
            Expression::Empty => Ok(Self::Empty),
            Expression::Literal(_) | Expression::Range(..) | Expression::Path(_) => {
                context.evaluate(expression).map(Self::Value)
            }
        }
    }

    const fn is_truthy(&self) -> bool {
        match self {
            Self::Value(value) => value.is_truthy(),
            Self::Empty => true,
        }
    }

    fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Empty, Self::Value(value)) | (Self::Value(value), Self::Empty) => {
                value.is_empty()
            }
            (Self::Value(left), Self::Value(right)) => left.liquid_eq(right),
        }
    }

    fn ordering(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Value(Value::Nil), _) | (_, Self::Value(Value::Nil)) => None,
            (Self::Value(left), Self::Value(right)) => left.liquid_cmp(right),
            (Self::Empty, _) | (_, Self::Empty) => None,
        }
    }
}

fn compare(left: &Operand, operator: &str, right: &Operand, context: &Context) -> LoquatResult<bool> {
    let ordered = |accept: fn(Ordering) -> bool| left.ordering(right).is_some_and(accept);
    match operator {
        "==" => Ok(left.equals(right)),
        "!=" | "<>" => Ok(!left.equals(right)),
        "<" => Ok(ordered(Ordering::is_lt)),
        ">" => Ok(ordered(Ordering::is_gt)),
        "<=" => Ok(ordered(Ordering::is_le)),
        ">=" => Ok(ordered(Ordering::is_ge)),
        "contains" => Ok(contains(left, right, context)),
        other => Err(LoquatError::runtime(format!("Unknown operator {other}"))),
    }
}

fn contains(left: &Operand, right: &Operand, context: &Context) -> bool {
    let (Operand::Value(haystack), Operand::Value(needle)) = (left, right) else {
        return false;
    };
    if needle.is_nil() {
        return false;
    }
    match haystack {
        Value::Str(text) => text.contains(&context.to_output(needle)),
        Value::Array(items) => items.iter().any(|item| item.liquid_eq(needle)),
        Value::Hash(hash) => hash.contains_key(&context.to_output(needle)),
        Value::Nil
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::Drop(_)
        | Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::Scope;

    fn check(markup: &str, scope: Scope) -> LoquatResult<bool> {
        let config = Arc::new(Config::default());
        let condition = Condition::parse(markup, &config);
        let mut ctx = Context::new(config).with_environment(scope);
        condition.evaluate(&mut ctx)
    }

    fn holds(markup: &str) -> bool {
        check(markup, Scope::new()).unwrap()
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_basic_comparisons() {
        assert!(holds("1 == 1"));
        assert!(holds("1 != 2"));
        assert!(holds("1 <> 2"));
        assert!(holds("1 < 2"));
        assert!(holds("2 >= 2"));
        assert!(!holds("2 > 2"));
        assert!(holds("1.0 == 1"));
        assert!(holds("'a' < 'b'"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_nil_never_orders() {
        assert!(!holds("nil < 1"));
        assert!(!holds("1 <= nil"));
        assert!(!holds("missing > 0"));
        assert!(holds("missing == nil"));
        assert!(holds("missing == null"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_contains() {
        let scope = Scope::new()
            .with("list", vec!["a", "b"])
            .with("text", "hello world");
        assert!(check("list contains 'b'", scope.clone()).unwrap());
        assert!(!check("list contains 'z'", scope.clone()).unwrap());
        assert!(check("text contains 'lo w'", scope.clone()).unwrap());
        assert!(!check("text contains nil", scope).unwrap());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_keyword() {
        let scope = Scope::new()
            .with("none", Vec::<Value>::new())
            .with("some", vec![1_i64])
            .with("nothing", "");
        assert!(check("none == empty", scope.clone()).unwrap());
        assert!(check("empty == nothing", scope.clone()).unwrap());
        assert!(check("some != empty", scope.clone()).unwrap());
        assert!(!check("missing == empty", scope).unwrap());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_connectives_associate_right() {
        // false and (true or true) is false; (false and true) or true would be true.
        assert!(!holds("false and true or true"));
        assert!(holds("true or false and false"));
        assert!(holds("true and true and true"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_parentheses_are_ignored() {
        let scope = Scope::new().with("a", "x").with("b", "bar").with("c", "baz");
        assert!(check(
            "a == 'foo' or (b == 'bar' and c == 'baz') or false",
            scope
        )
        .unwrap());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unrecognised_connectives_are_swallowed() {
        assert!(holds("true && false"));
        assert!(!holds("false || true"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unknown_operator() {
        let error = check("1 =! 2", Scope::new()).unwrap_err();
        assert_eq!(error.to_string(), "Unknown operator =!");
    }
}
