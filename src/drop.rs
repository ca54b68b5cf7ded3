use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{LoquatError, LoquatResult};
use crate::value::{HostObject, Value};

/// Gives trait objects access to their concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A host object that decides for itself which members a template may read.
///
/// Lookups are resolved in this order:
///
/// 1. [`LiquidDrop::declared_member`], usually backed by a [`MemberTable`]
///    (properties before zero-argument methods)
/// 2. [`LiquidDrop::before_member`], the catch-all hook
///
/// A drop never renders itself: `{{ product }}` produces nothing. The
/// [`Context`] is handed to every call and must not be retained.
pub trait LiquidDrop: AsAny + Send + Sync {
    fn declared_member(&self, name: &str, context: &mut Context) -> Option<LoquatResult<Value>> {
        let _ = (name, context);
        None
    }

    fn before_member(&self, name: &str, context: &mut Context) -> LoquatResult<Value> {
        let _ = (name, context);
        Ok(Value::Nil)
    }

    /// Items for `for` loops. `None` for drops that are not enumerable.
    fn to_sequence(&self, context: &mut Context) -> Option<Vec<Value>> {
        let _ = context;
        None
    }
}

pub type Accessor<T> = fn(&T, &mut Context) -> LoquatResult<Value>;

/// Static member map for a drop type.
///
/// ```
/// use std::sync::LazyLock;
/// use loquat::{Context, LiquidDrop, LoquatResult, MemberTable, Template, Value};
///
/// struct Product;
///
/// static MEMBERS: LazyLock<MemberTable<Product>> = LazyLock::new(|| {
///     MemberTable::new().property("Title", |_, _| Ok(Value::from("Snowboard")))
/// });
///
/// impl LiquidDrop for Product {
///     fn declared_member(&self, name: &str, ctx: &mut Context) -> Option<LoquatResult<Value>> {
///         MEMBERS.resolve(self, name, ctx)
///     }
/// }
///
/// let template = Template::parse("{{ product.title }}").unwrap();
/// let locals: loquat::Hash = [("product".to_string(), Value::from_drop(Product))].into_iter().collect();
/// let output = template
///     .render_with(loquat::RenderParameters::new().locals(locals))
///     .unwrap();
/// assert_eq!(output, "Snowboard");
/// ```
pub struct MemberTable<T: 'static> {
    properties: Vec<(&'static str, Accessor<T>)>,
    methods: Vec<(&'static str, Accessor<T>)>,
}

impl<T: 'static> MemberTable<T> {
    pub const fn new() -> Self {
        Self {
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn property(mut self, name: &'static str, accessor: Accessor<T>) -> Self {
        self.properties.push((name, accessor));
        self
    }

    #[must_use]
    pub fn method(mut self, name: &'static str, accessor: Accessor<T>) -> Self {
        self.methods.push((name, accessor));
        self
    }

    pub fn resolve(
        &self,
        target: &T,
        name: &str,
        context: &mut Context,
    ) -> Option<LoquatResult<Value>> {
        let convention = context.naming_convention();
        let found = self
            .properties
            .iter()
            .chain(&self.methods)
            .find(|(declared, _)| convention.matches(&convention.member_name(declared), name));

        if let Some((_, accessor)) = found {
            return Some(accessor(target, context));
        }

        self.properties
            .iter()
            .chain(&self.methods)
            .map(|(declared, _)| (*declared, convention.member_name(declared)))
            .find(|(declared, converted)| *declared == name && converted != declared)
            .map(|(_, converted)| {
                Ok(Value::Str(format!(
                    "Missing property. Did you mean '{converted}'?"
                )))
            })
    }
}

impl<T: 'static> Default for MemberTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the drop lookup order for a single member.
pub(crate) fn invoke(
    drop: &Arc<dyn LiquidDrop>,
    name: &str,
    context: &mut Context,
) -> LoquatResult<Value> {
    let result = match drop.declared_member(name, context) {
        Some(result) => result,
        None => drop.before_member(name, context),
    };
    result.map_err(|error| LoquatError::MemberCall {
        member: name.to_string(),
        source: Box::new(error),
    })
}

type ErasedAccessor = Arc<dyn Fn(&dyn Any) -> Value + Send + Sync>;

#[derive(Default, Clone)]
struct SafeType {
    members: Vec<(String, ErasedAccessor)>,
    transform: Option<ErasedAccessor>,
}

/// Host types that templates may see without implementing [`LiquidDrop`].
///
/// A registered type exposes an allow-list of members and/or a transform
/// producing the value that is rendered in its place. Unregistered host
/// objects render as nothing and expose no members.
#[derive(Default, Clone)]
pub struct SafeTypeRegistry {
    types: HashMap<TypeId, SafeType>,
}

pub struct SafeTypeEntry<'r, T> {
    entry: &'r mut SafeType,
    _type: PhantomData<fn(&T)>,
}

impl<T: Any> SafeTypeEntry<'_, T> {
    pub fn member<F>(self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.entry.members.push((name.into(), erase(accessor)));
        self
    }

    pub fn transform<F>(self, transform: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.entry.transform = Some(erase(transform));
        self
    }
}

fn erase<T: Any, F>(accessor: F) -> ErasedAccessor
where
    F: Fn(&T) -> Value + Send + Sync + 'static,
{
    Arc::new(move |any: &dyn Any| any.downcast_ref::<T>().map_or(Value::Nil, &accessor))
}

impl SafeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Any>(&mut self) -> SafeTypeEntry<'_, T> {
        SafeTypeEntry {
            entry: self.types.entry(TypeId::of::<T>()).or_default(),
            _type: PhantomData,
        }
    }

    pub fn is_registered(&self, type_id: TypeId) -> bool {
        self.types.contains_key(&type_id)
    }

    /// Value rendered for the object, if its type has a transform.
    pub(crate) fn transformed(&self, object: &HostObject) -> Option<Value> {
        let transform = self.types.get(&object.type_id())?.transform.as_ref()?;
        Some(transform(object.as_any()))
    }

    pub(crate) fn member(
        &self,
        object: &HostObject,
        name: &str,
        context: &Context,
    ) -> Option<Value> {
        let convention = context.naming_convention();
        let safe_type = self.types.get(&object.type_id())?;
        safe_type
            .members
            .iter()
            .find(|(declared, _)| convention.matches(&convention.member_name(declared), name))
            .map(|(_, accessor)| accessor(object.as_any()))
    }
}
