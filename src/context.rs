use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::config::{Config, Filters};
use crate::drop::invoke as invoke_member;
use crate::error::{LoquatError, LoquatResult};
use crate::expression::{Expression, Segment, VariablePath};
use crate::file_system::FileSystem;
use crate::naming::NamingConvention;
use crate::tags::inheritance::BlockRenderState;
use crate::value::{Hash, Value};

const INCLUDE_DEPTH: &str = "include_depth";
/// Longest range expanded into an array outside of a loop.
const MAX_RANGE_LENGTH: usize = 1_000_000;

/// One level of variable bindings.
///
/// A strict scope used as an environment turns a lookup that misses every
/// scope into a runtime error instead of `nil`.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: Hash,
    strict: bool,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            variables: Hash::new(),
            strict: true,
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    pub const fn variables(&self) -> &Hash {
        &self.variables
    }

    pub fn into_variables(self) -> Hash {
        self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    fn lookup(&self, key: &str, convention: &dyn NamingConvention) -> Option<&Value> {
        lookup_key(&self.variables, key, convention)
    }
}

impl From<Hash> for Scope {
    fn from(variables: Hash) -> Self {
        Self {
            variables,
            strict: false,
        }
    }
}

fn lookup_key<'h>(hash: &'h Hash, key: &str, convention: &dyn NamingConvention) -> Option<&'h Value> {
    hash.get(key).or_else(|| {
        hash.iter()
            .find(|(candidate, _)| convention.matches(candidate, key))
            .map(|(_, value)| value)
    })
}

/// Per-render mutable slots used by stateful tags, plus an optional file
/// system that takes precedence over the configured one.
#[derive(Debug, Clone, Default)]
pub struct Registers {
    values: Hash,
    file_system: Option<Arc<dyn FileSystem>>,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file_system(mut self, file_system: impl FileSystem + 'static) -> Self {
        self.file_system = Some(Arc::new(file_system));
        self
    }

    pub fn set_file_system(&mut self, file_system: Arc<dyn FileSystem>) {
        self.file_system = Some(file_system);
    }

    pub fn file_system(&self) -> Option<Arc<dyn FileSystem>> {
        self.file_system.clone()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.values.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }
}

/// Render-time state: the scope stack, the read-only environments behind it,
/// registers and the errors collected so far.
///
/// Lookups search the scopes innermost first, then each environment in
/// order. The outermost scope holds the template's instance assigns and is
/// where `assign` writes.
pub struct Context {
    config: Arc<Config>,
    convention: Arc<dyn NamingConvention>,
    filters: Filters,
    environments: Vec<Scope>,
    scopes: Vec<Scope>,
    registers: Registers,
    errors: Vec<LoquatError>,
    rethrow_errors: bool,
    aborting: bool,
    block_state: Option<BlockRenderState>,
}

impl Context {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            convention: config.naming_convention(),
            filters: config.filters().clone(),
            config,
            environments: Vec::new(),
            scopes: vec![Scope::new()],
            registers: Registers::new(),
            errors: Vec::new(),
            rethrow_errors: false,
            aborting: false,
            block_state: None,
        }
    }

    /// Appends a read-only environment, searched after every scope and after
    /// the environments added before it.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<Scope>) -> Self {
        self.environments.push(environment.into());
        self
    }

    #[must_use]
    pub fn with_registers(mut self, registers: Registers) -> Self {
        self.registers = registers;
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: &Filters) -> Self {
        self.filters.extend(filters);
        self
    }

    #[must_use]
    pub const fn with_rethrow_errors(mut self, rethrow: bool) -> Self {
        self.rethrow_errors = rethrow;
        self
    }

    /// Installs `variables` as the outermost scope. Keys that also exist in
    /// an environment take the environment's value.
    #[must_use]
    pub(crate) fn with_outer_scope(mut self, mut variables: Hash) -> Self {
        for (key, value) in &mut variables {
            let shadowed = self
                .environments
                .iter()
                .find_map(|environment| environment.lookup(key, self.convention.as_ref()));
            if let Some(shadowed) = shadowed {
                *value = shadowed.clone();
            }
        }
        if let Some(outer) = self.scopes.first_mut() {
            outer.variables = variables;
        }
        self
    }

    pub(crate) fn take_outer_scope(&mut self) -> Hash {
        self.scopes
            .first_mut()
            .map(|outer| std::mem::take(&mut outer.variables))
            .unwrap_or_default()
    }

    pub const fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn naming_convention(&self) -> Arc<dyn NamingConvention> {
        Arc::clone(&self.convention)
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn environments(&self) -> &[Scope] {
        &self.environments
    }

    pub const fn registers(&self) -> &Registers {
        &self.registers
    }

    pub const fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// The loader for `include` and `extends`: the registers' file system if
    /// one was set, otherwise the configured one.
    pub fn file_system(&self) -> Arc<dyn FileSystem> {
        self.registers
            .file_system()
            .unwrap_or_else(|| self.config.file_system())
    }

    pub fn errors(&self) -> &[LoquatError] {
        &self.errors
    }

    pub(crate) fn take_errors(&mut self) -> Vec<LoquatError> {
        std::mem::take(&mut self.errors)
    }

    pub const fn rethrow_errors(&self) -> bool {
        self.rethrow_errors
    }

    pub(crate) const fn is_aborting(&self) -> bool {
        self.aborting
    }

    pub(crate) const fn reset_aborting(&mut self) {
        self.aborting = false;
    }

    /// Binds `key` in the innermost scope.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let key = self.convention.normalize(key).into_owned();
        if let Some(scope) = self.scopes.last_mut() {
            scope.variables.insert(key, value.into());
        }
    }

    /// Binds `key` in the outermost scope, where it outlives every pushed
    /// scope.
    pub fn set_global(&mut self, key: &str, value: impl Into<Value>) {
        let key = self.convention.normalize(key).into_owned();
        if let Some(scope) = self.scopes.first_mut() {
            scope.variables.insert(key, value.into());
        }
    }

    /// Runs `body` with a fresh innermost scope. The scope is popped whether
    /// or not `body` succeeds.
    pub fn with_stack<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> LoquatResult<T>,
    ) -> LoquatResult<T> {
        self.with_scope(Scope::new(), body)
    }

    pub fn with_scope<T>(
        &mut self,
        scope: Scope,
        body: impl FnOnce(&mut Self) -> LoquatResult<T>,
    ) -> LoquatResult<T> {
        self.scopes.push(scope);
        let result = body(self);
        self.scopes.pop();
        result
    }

    /// Runs `body` one level deeper in the include/extends chain.
    pub(crate) fn with_partial<T>(
        &mut self,
        template_name: &str,
        body: impl FnOnce(&mut Self) -> LoquatResult<T>,
    ) -> LoquatResult<T> {
        let depth = self
            .registers
            .get(INCLUDE_DEPTH)
            .and_then(Value::as_int)
            .unwrap_or(0);
        if usize::try_from(depth).unwrap_or(usize::MAX) >= self.config.max_include_depth() {
            tracing::debug!(template = template_name, depth, "include depth exceeded");
            return Err(LoquatError::resource_exhausted("Stack level too deep"));
        }

        tracing::debug!(template = template_name, depth, "rendering partial");
        self.registers.insert(INCLUDE_DEPTH, Value::Int(depth.saturating_add(1)));
        let result = body(self);
        self.registers.insert(INCLUDE_DEPTH, Value::Int(depth));
        result
    }

    pub(crate) const fn block_state(&self) -> Option<&BlockRenderState> {
        self.block_state.as_ref()
    }

    pub(crate) const fn block_state_mut(&mut self) -> Option<&mut BlockRenderState> {
        self.block_state.as_mut()
    }

    pub(crate) fn replace_block_state(
        &mut self,
        state: Option<BlockRenderState>,
    ) -> Option<BlockRenderState> {
        std::mem::replace(&mut self.block_state, state)
    }

    /// Records a render error and returns the text that replaces the failed
    /// node, or the error itself when errors are rethrown.
    pub(crate) fn handle_error(&mut self, error: LoquatError) -> LoquatResult<String> {
        let error = error.unwrap_member_call();
        tracing::debug!(kind = ?error.kind(), %error, "render error");
        self.errors.push(error.clone());
        if self.rethrow_errors {
            self.aborting = true;
            return Err(error);
        }
        Ok(error.inline_message())
    }

    /// Evaluates a markup fragment such as `forloop.index` or
    /// `product.variants[0].title`.
    pub fn resolve(&mut self, markup: &str) -> LoquatResult<Value> {
        let expression = Expression::parse(markup, &self.config);
        self.evaluate(&expression)
    }

    pub fn evaluate(&mut self, expression: &Expression) -> LoquatResult<Value> {
        match expression {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Empty => Ok(Value::Nil),
            Expression::Range(start, end) => {
                let (start, end) = self.range_bounds(start, end)?;
                if range_length(start, end) > MAX_RANGE_LENGTH {
                    return Err(LoquatError::resource_exhausted(format!(
                        "Range ({start}..{end}) is too long to expand"
                    )));
                }
                Ok(Value::Array((start..=end).map(Value::Int).collect()))
            }
            Expression::Path(path) => self.resolve_path(path),
        }
    }

    fn range_bounds(&mut self, start: &Expression, end: &Expression) -> LoquatResult<(i64, i64)> {
        let start = self.evaluate(start)?.to_integer().unwrap_or(0);
        let end = self.evaluate(end)?.to_integer().unwrap_or(0);
        Ok((start, end))
    }

    fn resolve_path(&mut self, path: &VariablePath) -> LoquatResult<Value> {
        let name = match &path.root {
            Segment::Key(name) => name.clone(),
            Segment::Index(expression) => {
                let key = self.evaluate(expression)?;
                self.to_output(&key)
            }
        };

        let mut current = self.find_variable(&name)?;
        for segment in &path.segments {
            if current.is_nil() {
                break;
            }
            let key = match segment {
                Segment::Key(key) => Value::Str(key.clone()),
                Segment::Index(expression) => self.evaluate(expression)?,
            };
            current = self.lookup_member(current, &key)?;
        }
        Ok(current)
    }

    /// Top-level variable by name, ignoring strictness.
    pub(crate) fn lookup_variable(&self, name: &str) -> Option<Value> {
        let convention = self.convention.as_ref();
        self.scopes
            .iter()
            .rev()
            .chain(&self.environments)
            .find_map(|scope| scope.lookup(name, convention))
            .cloned()
    }

    fn find_variable(&self, name: &str) -> LoquatResult<Value> {
        if let Some(value) = self.lookup_variable(name) {
            return Ok(value);
        }

        if self.config.strict_variables() || self.environments.iter().any(Scope::is_strict) {
            return Err(LoquatError::runtime(format!("Unknown variable '{name}'")));
        }
        Ok(Value::Nil)
    }

    /// Reads `key` from `target`. Anything unresolvable is `nil`.
    pub fn lookup_member(&mut self, target: Value, key: &Value) -> LoquatResult<Value> {
        match target {
            Value::Hash(hash) => {
                let name = self.to_output(key);
                Ok(lookup_key(&hash, &name, self.convention.as_ref())
                    .cloned()
                    .or_else(|| (name == "size").then(|| Value::from(hash.len())))
                    .unwrap_or_default())
            }
            Value::Array(items) => Ok(sequence_member(&items, key)),
            Value::Str(text) => Ok(if key.as_str() == Some("size") {
                Value::from(text.chars().count())
            } else {
                Value::Nil
            }),
            Value::Drop(drop) => {
                if let Value::Int(_) = key {
                    if let Some(items) = drop.to_sequence(self) {
                        return Ok(sequence_member(&items, key));
                    }
                }
                let name = self.to_output(key);
                invoke_member(&drop, &name, self)
            }
            Value::Object(object) => {
                let name = self.to_output(key);
                let config = Arc::clone(&self.config);
                if let Some(value) = config.safe_types().member(&object, &name, self) {
                    return Ok(value);
                }
                match config.safe_types().transformed(&object) {
                    Some(Value::Object(_)) | None => Ok(Value::Nil),
                    Some(transformed) => self.lookup_member(transformed, key),
                }
            }
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) => Ok(Value::Nil),
        }
    }

    /// Evaluates what a loop walks over. A range literal keeps its bounds
    /// instead of being expanded.
    pub(crate) fn collection(&mut self, expression: &Expression) -> LoquatResult<Collection> {
        if let Expression::Range(start, end) = expression {
            let (start, end) = self.range_bounds(start, end)?;
            return Ok(Collection::Range { start, end });
        }

        Ok(match self.evaluate(expression)? {
            Value::Array(items) => Collection::Items(items),
            Value::Hash(hash) => Collection::Items(
                hash.into_iter()
                    .map(|(key, value)| Value::Array(vec![Value::Str(key), value]))
                    .collect(),
            ),
            Value::Drop(drop) => match drop.to_sequence(self) {
                Some(items) => Collection::Items(items),
                None => Collection::Single(Value::Drop(drop)),
            },
            value @ (Value::Nil
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::Object(_)) => Collection::Single(value),
        })
    }

    /// Text written for a value. Drops, hashes and unregistered host objects
    /// render as nothing.
    pub fn to_output(&self, value: &Value) -> String {
        match value {
            Value::Nil | Value::Hash(_) | Value::Drop(_) => String::new(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Str(value) => value.clone(),
            Value::Array(items) => items.iter().map(|item| self.to_output(item)).collect(),
            Value::Object(object) => match self.config.safe_types().transformed(object) {
                Some(Value::Object(_)) | None => String::new(),
                Some(transformed) => self.to_output(&transformed),
            },
        }
    }

    pub fn apply_filter(&self, name: &str, input: &Value, arguments: &[Value]) -> LoquatResult<Value> {
        let filter = self
            .filters
            .find(name, self.convention.as_ref())
            .ok_or_else(|| LoquatError::runtime(format!("Error - Filter '{name}' could not be found")))?;
        filter(input, arguments)
    }
}

/// What `for` and `include ... for` walk over.
#[derive(Debug)]
pub(crate) enum Collection {
    /// `(start..end)`, inclusive and not yet expanded.
    Range { start: i64, end: i64 },
    Items(Vec<Value>),
    /// A value that is not a sequence.
    Single(Value),
}

impl Collection {
    /// Drops the first `offset` items and keeps at most `limit` of the rest.
    /// A non-empty string is a sequence of itself; other single values are
    /// empty.
    pub(crate) fn window(self, offset: usize, limit: Option<usize>) -> Window {
        let limit = limit.unwrap_or(usize::MAX);
        match self {
            Self::Range { start, end } => {
                let Some(first) = i64::try_from(offset)
                    .ok()
                    .and_then(|offset| start.checked_add(offset))
                else {
                    return Window::Items(Vec::new());
                };
                let last = i64::try_from(limit)
                    .ok()
                    .and_then(|limit| first.checked_add(limit))
                    .and_then(|past| past.checked_sub(1))
                    .map_or(end, |last| last.min(end));
                Window::Range(first..=last)
            }
            Self::Items(items) => Window::Items(items.into_iter().skip(offset).take(limit).collect()),
            Self::Single(Value::Str(text)) if !text.is_empty() => {
                Window::Items(std::iter::once(Value::Str(text)).skip(offset).take(limit).collect())
            }
            Self::Single(_) => Window::Items(Vec::new()),
        }
    }
}

/// The part of a [`Collection`] a loop visits.
#[derive(Debug)]
pub(crate) enum Window {
    Range(RangeInclusive<i64>),
    Items(Vec<Value>),
}

impl Window {
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Range(range) => range_length(*range.start(), *range.end()),
            Self::Items(items) => items.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The values in order, or back to front when `reversed`. Range values
    /// are produced one at a time.
    pub(crate) fn into_values(self, reversed: bool) -> Box<dyn Iterator<Item = Value>> {
        match (self, reversed) {
            (Self::Range(range), false) => Box::new(range.map(Value::Int)),
            (Self::Range(range), true) => Box::new(range.rev().map(Value::Int)),
            (Self::Items(items), false) => Box::new(items.into_iter()),
            (Self::Items(items), true) => Box::new(items.into_iter().rev()),
        }
    }
}

fn range_length(start: i64, end: i64) -> usize {
    if end < start {
        return 0;
    }
    usize::try_from(end.abs_diff(start)).map_or(usize::MAX, |length| length.saturating_add(1))
}

fn sequence_member(items: &[Value], key: &Value) -> Value {
    let index = match key {
        Value::Int(index) => Some(*index),
        Value::Str(name) => match name.as_str() {
            "size" => return Value::from(items.len()),
            "first" => return items.first().cloned().unwrap_or_default(),
            "last" => return items.last().cloned().unwrap_or_default(),
            other => other.parse().ok(),
        },
        Value::Nil
        | Value::Bool(_)
        | Value::Float(_)
        | Value::Array(_)
        | Value::Hash(_)
        | Value::Drop(_)
        | Value::Object(_) => None,
    };

    index
        .and_then(|index| {
            if index < 0 {
                i64::try_from(items.len()).ok()?.checked_add(index)
            } else {
                Some(index)
            }
        })
        .and_then(|index| usize::try_from(index).ok())
        .and_then(|index| items.get(index).cloned())
        .unwrap_or_default()
}
