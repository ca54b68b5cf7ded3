use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ast::{Document, Node};
use crate::config::{Config, Filters};
use crate::context::{Context, Registers, Scope};
use crate::error::{LoquatError, LoquatResult};
use crate::parser::parse_document;
use crate::tokenizer::expand_shorthands;
use crate::value::Hash;

/// What a single render sees besides the template itself.
///
/// ```
/// use loquat::{RenderParameters, Scope, Template};
///
/// let template = Template::parse("Hello, {{ name }}!").unwrap();
/// let output = template
///     .render_with(RenderParameters::new().locals(Scope::new().with("name", "World")))
///     .unwrap();
/// assert_eq!(output, "Hello, World!");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RenderParameters {
    /// Searched after every scope and before the template's assigns.
    pub locals: Option<Scope>,
    /// Merged over the configured filters for this render.
    pub filters: Option<Filters>,
    pub registers: Option<Registers>,
    /// Return the first render error instead of writing it into the output.
    pub rethrow_errors: bool,
}

impl RenderParameters {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn locals(mut self, locals: impl Into<Scope>) -> Self {
        self.locals = Some(locals.into());
        self
    }

    #[must_use]
    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    #[must_use]
    pub fn registers(mut self, registers: Registers) -> Self {
        self.registers = Some(registers);
        self
    }

    #[must_use]
    pub const fn rethrow_errors(mut self, rethrow: bool) -> Self {
        self.rethrow_errors = rethrow;
        self
    }
}

/// A parsed template.
///
/// Parsing happens once; the node tree is immutable afterwards and a
/// `Template` may be rendered from several threads at once. Each render gets
/// its own [`Context`]. The only state shared between renders is the
/// instance-assign scope (variables set by `assign`, carried into the next
/// render) and the error list of the most recent render.
#[derive(Debug)]
pub struct Template {
    source: String,
    document: Document,
    config: Arc<Config>,
    assigns: Hash,
    instance_assigns: Mutex<Hash>,
    errors: Mutex<Vec<LoquatError>>,
}

impl Template {
    /// Parses `source` with the shared default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LoquatError::Syntax`] for malformed markup, unknown tags and
    /// unclosed blocks.
    pub fn parse(source: &str) -> LoquatResult<Self> {
        Self::parse_with(source, Config::shared())
    }

    /// Parses `source` with a custom tag set, filters, file system and
    /// naming convention.
    ///
    /// # Errors
    ///
    /// Same as [`Template::parse`].
    pub fn parse_with(source: &str, config: Arc<Config>) -> LoquatResult<Self> {
        let expanded = expand_shorthands(source);
        let document = parse_document(&expanded, &config)?;
        Ok(Self {
            source: source.to_string(),
            document,
            config,
            assigns: Hash::new(),
            instance_assigns: Mutex::default(),
            errors: Mutex::default(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &[Node] {
        &self.document.nodes
    }

    pub const fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Variables visible to every render, searched after the render's locals.
    pub const fn assigns(&self) -> &Hash {
        &self.assigns
    }

    pub const fn assigns_mut(&mut self) -> &mut Hash {
        &mut self.assigns
    }

    /// Snapshot of the variables `assign` left behind in the last render.
    pub fn instance_assigns(&self) -> Hash {
        lock(&self.instance_assigns).clone()
    }

    /// Errors raised by the most recent render.
    pub fn errors(&self) -> Vec<LoquatError> {
        lock(&self.errors).clone()
    }

    /// # Errors
    ///
    /// Only fails when errors are rethrown; see [`Template::render_to`].
    pub fn render(&self) -> LoquatResult<String> {
        self.render_with(RenderParameters::default())
    }

    /// # Errors
    ///
    /// See [`Template::render_to`].
    pub fn render_with(&self, parameters: RenderParameters) -> LoquatResult<String> {
        let mut out = String::new();
        self.render_to(&mut out, parameters)?;
        Ok(out)
    }

    /// Renders into `out`.
    ///
    /// # Errors
    ///
    /// Render errors are normally written into the output and collected in
    /// [`Template::errors`]. With `rethrow_errors` set, the first one is
    /// returned instead and `out` holds whatever was rendered before it.
    pub fn render_to(&self, out: &mut String, parameters: RenderParameters) -> LoquatResult<()> {
        let RenderParameters {
            locals,
            filters,
            registers,
            rethrow_errors,
        } = parameters;

        let mut context = Context::new(Arc::clone(&self.config));
        if let Some(locals) = locals {
            context = context.with_environment(locals);
        }
        context = context
            .with_environment(Scope::from(self.assigns.clone()))
            .with_registers(registers.unwrap_or_default())
            .with_rethrow_errors(rethrow_errors);
        if let Some(filters) = &filters {
            context = context.with_filters(filters);
        }
        let instance_assigns = lock(&self.instance_assigns).clone();
        let mut context = context.with_outer_scope(instance_assigns);

        tracing::trace!(len = self.source.len(), "rendering template");
        let result = self.document.render(&mut context, out);

        *lock(&self.instance_assigns) = context.take_outer_scope();
        *lock(&self.errors) = context.take_errors();
        result
    }

    /// Renders with a caller-owned context, e.g. to share registers or
    /// scopes between templates. Instance assigns are not involved.
    ///
    /// # Errors
    ///
    /// See [`Template::render_to`]; the context decides whether errors are
    /// rethrown.
    pub fn render_in(&self, context: &mut Context) -> LoquatResult<String> {
        context.reset_aborting();
        let mut out = String::new();
        self.document.render(context, &mut out)?;
        Ok(out)
    }

    /// Renders the node tree into an existing render, as `include` and
    /// `extends` do.
    pub(crate) fn render_nodes(&self, context: &mut Context, out: &mut String) -> LoquatResult<()> {
        self.document.render(context, out)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(feature = "serde")]
impl serde::Serialize for Template {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Template", 1)?;
        state.serialize_field("source", &self.source)?;
        state.end()
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct TemplateHelper {
            source: String,
        }

        let helper = TemplateHelper::deserialize(deserializer)?;
        Self::parse(&helper.source)
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse template: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::value::Value;

    #[test]
    #[ntest::timeout(100)]
    fn test_instance_assigns_persist() {
        let template = Template::parse("{{ foo }}{% assign foo = 'foo' %}{{ foo }}").unwrap();
        assert_eq!(template.render().unwrap(), "foo");
        assert_eq!(template.render().unwrap(), "foofoo");
        assert_eq!(template.instance_assigns().get("foo"), Some(&Value::from("foo")));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_environments_squash_instance_assigns() {
        let mut template = Template::parse("{{ test }}{% assign test = 'bar' %}{{ test }}").unwrap();
        template.assigns_mut().insert("test".to_string(), Value::from("baz"));
        assert_eq!(template.render().unwrap(), "bazbar");
        assert_eq!(template.render().unwrap(), "bazbar");
        let output = template
            .render_with(RenderParameters::new().locals(Scope::new().with("test", "foo")))
            .unwrap();
        assert_eq!(output, "foobar");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_errors_inline_or_rethrown() {
        let template = Template::parse("a{{ x | nope }}b").unwrap();
        assert_eq!(
            template.render().unwrap(),
            "aLiquid error: Error - Filter 'nope' could not be foundb"
        );
        assert_eq!(template.errors().len(), 1);

        let error = template
            .render_with(RenderParameters::new().rethrow_errors(true))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Runtime);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_errors_are_replaced_each_render() {
        let template = Template::parse("{{ x | nope }}").unwrap();
        template.render().unwrap();
        template.render().unwrap();
        assert_eq!(template.errors().len(), 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_render_parameters_filters() {
        let template = Template::parse("{{ 'a' | twice }}").unwrap();
        let filters = Filters::new().with("twice", |input, _| {
            Ok(Value::from(input.as_str().unwrap_or_default().repeat(2)))
        });
        let output = template
            .render_with(RenderParameters::new().filters(filters))
            .unwrap();
        assert_eq!(output, "aa");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_render_in_shared_context() {
        let config = Config::shared();
        let mut context = Context::new(Arc::clone(&config)).with_environment(Scope::new().with("n", 1));
        let first = Template::parse("{% assign shared = n %}").unwrap();
        let second = Template::parse("{{ shared }}").unwrap();
        assert_eq!(first.render_in(&mut context).unwrap(), "");
        assert_eq!(second.render_in(&mut context).unwrap(), "1");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_source_is_kept() {
        let template = Template::parse("{{{ raw }}}").unwrap();
        assert_eq!(template.source(), "{{{ raw }}}");
        assert_eq!(template.root().len(), 1);
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_concurrent_renders() {
        let template = Arc::new(Template::parse("{% for i in (1..3) %}{{ i }}{% endfor %}").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let template = Arc::clone(&template);
                std::thread::spawn(move || template.render().unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "123");
        }
    }
}
