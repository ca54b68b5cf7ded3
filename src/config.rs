use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::drop::SafeTypeRegistry;
use crate::error::LoquatResult;
use crate::file_system::{BlankFileSystem, FileSystem};
use crate::naming::{NamingConvention, RubyNamingConvention};
use crate::parser::{TagFactory, TagRegistry};
use crate::value::Value;

/// Deepest chain of nested `include`/`extends` a render may build.
pub const MAX_INCLUDE_DEPTH: usize = 64;

pub type FilterFn = Arc<dyn Fn(&Value, &[Value]) -> LoquatResult<Value> + Send + Sync>;

/// Parses a numeric literal such as `42` or `1.5`.
pub type NumberParser = fn(&str) -> Option<Value>;

/// Named filter functions applied with `{{ value | name: arg }}`.
#[derive(Clone, Default)]
pub struct Filters {
    filters: BTreeMap<String, FilterFn>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> LoquatResult<Value> + Send + Sync + 'static,
    {
        self.insert(name, filter);
        self
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value, &[Value]) -> LoquatResult<Value> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    /// Adds every filter of `other`, replacing same-named entries.
    pub fn extend(&mut self, other: &Self) {
        self.filters.extend(
            other
                .filters
                .iter()
                .map(|(name, filter)| (name.clone(), Arc::clone(filter))),
        );
    }

    pub(crate) fn find(&self, name: &str, convention: &dyn NamingConvention) -> Option<&FilterFn> {
        self.filters.get(name).or_else(|| {
            self.filters
                .iter()
                .find(|(declared, _)| convention.matches(&convention.member_name(declared), name))
                .map(|(_, filter)| filter)
        })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Debug for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.filters.keys()).finish()
    }
}

/// Invariant-culture numeric literals: `-12`, `+3`, `4.25`.
pub fn invariant_number(text: &str) -> Option<Value> {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if digits.chars().all(|c| c.is_ascii_digit()) {
        return text
            .trim_start_matches('+')
            .parse::<i64>()
            .map(Value::Int)
            .ok()
            .or_else(|| text.parse::<f64>().ok().map(Value::Float));
    }
    let (whole, fraction) = digits.split_once('.')?;
    if whole.chars().all(|c| c.is_ascii_digit())
        && !fraction.is_empty()
        && fraction.chars().all(|c| c.is_ascii_digit())
    {
        text.parse::<f64>().ok().map(Value::Float)
    } else {
        None
    }
}

/// Everything a template needs to parse and render. Built once and shared
/// through an [`Arc`].
#[derive(Clone)]
pub struct Config {
    tags: TagRegistry,
    filters: Filters,
    naming_convention: Arc<dyn NamingConvention>,
    file_system: Arc<dyn FileSystem>,
    safe_types: SafeTypeRegistry,
    number_parser: NumberParser,
    max_include_depth: usize,
    strict_variables: bool,
}

static SHARED: LazyLock<Arc<Config>> = LazyLock::new(|| Arc::new(Config::default()));

impl Config {
    /// The default configuration used by [`crate::Template::parse`].
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED)
    }

    /// Registers (or replaces) a tag.
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, factory: TagFactory) -> Self {
        self.tags.register(name, factory);
        self
    }

    #[must_use]
    pub fn with_filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> LoquatResult<Value> + Send + Sync + 'static,
    {
        self.filters.insert(name, filter);
        self
    }

    #[must_use]
    pub fn with_naming_convention(mut self, convention: impl NamingConvention + 'static) -> Self {
        self.naming_convention = Arc::new(convention);
        self
    }

    #[must_use]
    pub fn with_file_system(mut self, file_system: impl FileSystem + 'static) -> Self {
        self.file_system = Arc::new(file_system);
        self
    }

    #[must_use]
    pub fn with_safe_types(mut self, safe_types: SafeTypeRegistry) -> Self {
        self.safe_types = safe_types;
        self
    }

    #[must_use]
    pub fn with_number_parser(mut self, parser: NumberParser) -> Self {
        self.number_parser = parser;
        self
    }

    #[must_use]
    pub const fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    #[must_use]
    pub const fn with_strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }

    pub const fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    pub const fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn naming_convention(&self) -> Arc<dyn NamingConvention> {
        Arc::clone(&self.naming_convention)
    }

    pub fn file_system(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.file_system)
    }

    pub const fn safe_types(&self) -> &SafeTypeRegistry {
        &self.safe_types
    }

    pub fn parse_number(&self, text: &str) -> Option<Value> {
        (self.number_parser)(text)
    }

    pub const fn max_include_depth(&self) -> usize {
        self.max_include_depth
    }

    pub const fn strict_variables(&self) -> bool {
        self.strict_variables
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tags: TagRegistry::with_builtin_tags(),
            filters: Filters::new(),
            naming_convention: Arc::new(RubyNamingConvention),
            file_system: Arc::new(BlankFileSystem),
            safe_types: SafeTypeRegistry::new(),
            number_parser: invariant_number,
            max_include_depth: MAX_INCLUDE_DEPTH,
            strict_variables: false,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("tags", &self.tags)
            .field("filters", &self.filters)
            .field("naming_convention", &self.naming_convention)
            .field("file_system", &self.file_system)
            .field("max_include_depth", &self.max_include_depth)
            .field("strict_variables", &self.strict_variables)
            .finish_non_exhaustive()
    }
}
