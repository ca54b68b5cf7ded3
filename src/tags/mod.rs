//! The built-in tags. Each module exposes its tag type and the factory that
//! [`register_builtin`] installs.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::config::Config;
use crate::context::Context;
use crate::error::LoquatResult;
use crate::expression::{Expression, QUOTED_FRAGMENT};
use crate::parser::TagRegistry;
use crate::template::Template;

pub mod assign;
pub mod capture;
pub mod comment;
pub mod conditional;
pub mod cycle;
pub mod for_loop;
pub mod ifchanged;
pub mod include;
pub mod inheritance;

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(\w+)\s*:\s*({QUOTED_FRAGMENT})")).expect("valid regex")
});

pub(crate) fn register_builtin(registry: &mut TagRegistry) {
    registry.register("assign", assign::parse);
    registry.register("capture", capture::parse);
    registry.register("comment", comment::parse_comment);
    registry.register("raw", comment::parse_raw);
    registry.register("literal", comment::parse_literal);
    registry.register("cycle", cycle::parse);
    registry.register("for", for_loop::parse);
    registry.register("if", conditional::parse_if);
    registry.register("unless", conditional::parse_unless);
    registry.register("ifchanged", ifchanged::parse);
    registry.register("include", include::parse);
    registry.register("extends", inheritance::parse_extends);
    registry.register("block", inheritance::parse_block);
}

/// Loads a partial through the context's file system, parsing its source
/// unless the file system already holds it parsed.
pub(crate) fn load_template(context: &Context, name: &str) -> LoquatResult<Arc<Template>> {
    let file_system = context.file_system();
    if let Some(template) = file_system.parsed_template(context, name) {
        return Ok(template);
    }
    let source = file_system.read_template_file(context, name)?;
    Template::parse_with(&source, Arc::clone(context.config())).map(Arc::new)
}

/// `key: value` pairs trailing a tag's main arguments, in source order.
pub(crate) fn parse_attributes(markup: &str, config: &Config) -> Vec<(String, Expression)> {
    ATTRIBUTE
        .captures_iter(markup)
        .filter_map(|captures| {
            let key = captures.get(1)?.as_str().to_string();
            let value = Expression::parse(captures.get(2)?.as_str(), config);
            Some((key, value))
        })
        .collect()
}
