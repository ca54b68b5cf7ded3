use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::drop::{AsAny, LiquidDrop};

/// Mapping type used for scopes, locals and hash values.
pub type Hash = BTreeMap<String, Value>;

/// An opaque host value. Exposes nothing to templates unless its type has
/// been registered in the [`crate::SafeTypeRegistry`].
#[derive(Clone)]
pub struct HostObject(Arc<dyn Any + Send + Sync>);

impl HostObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn type_id(&self) -> TypeId {
        self.0.as_ref().type_id()
    }

    pub fn as_any(&self) -> &dyn Any {
        self.0.as_ref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_ref().downcast_ref::<T>()
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({:?})", self.type_id())
    }
}

/// Every value a template can see.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Hash(Hash),
    Drop(Arc<dyn LiquidDrop>),
    Object(HostObject),
}

impl Value {
    pub fn from_drop<D: LiquidDrop + 'static>(drop: D) -> Self {
        Self::Drop(Arc::new(drop))
    }

    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::Object(HostObject::new(value))
    }

    /// Builds a [`Value::Hash`] from key/value pairs.
    pub fn hash<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Self>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Hash(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Everything except `nil` and `false` is truthy.
    pub const fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// True for zero-length strings and sequences.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Str(text) => text.is_empty(),
            Self::Array(items) => items.is_empty(),
            Self::Nil
            | Self::Bool(_)
            | Self::Int(_)
            | Self::Float(_)
            | Self::Hash(_)
            | Self::Drop(_)
            | Self::Object(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            Self::Nil
            | Self::Bool(_)
            | Self::Int(_)
            | Self::Float(_)
            | Self::Array(_)
            | Self::Hash(_)
            | Self::Drop(_)
            | Self::Object(_) => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(number) => Some(*number),
            Self::Nil
            | Self::Bool(_)
            | Self::Float(_)
            | Self::Str(_)
            | Self::Array(_)
            | Self::Hash(_)
            | Self::Drop(_)
            | Self::Object(_) => None,
        }
    }

    /// Integer view used by ranges, `limit:`/`offset:` and indexing.
    #[allow(clippy::cast_possible_truncation, reason = "liquid truncates floats")]
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Self::Int(number) => Some(*number),
            Self::Float(number) => Some(number.trunc() as i64),
            Self::Str(text) => text.trim().parse().ok(),
            Self::Nil
            | Self::Bool(_)
            | Self::Array(_)
            | Self::Hash(_)
            | Self::Drop(_)
            | Self::Object(_) => None,
        }
    }

    /// Downcasts a [`Value::Drop`] to its concrete type.
    pub fn downcast_drop<T: LiquidDrop + 'static>(&self) -> Option<&T> {
        match self {
            Self::Drop(drop) => AsAny::as_any(drop.as_ref()).downcast_ref::<T>(),
            Self::Nil
            | Self::Bool(_)
            | Self::Int(_)
            | Self::Float(_)
            | Self::Str(_)
            | Self::Array(_)
            | Self::Hash(_)
            | Self::Object(_) => None,
        }
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Hash(_) => "hash",
            Self::Drop(_) => "drop",
            Self::Object(_) => "object",
        }
    }

    /// Equality as templates see it: numbers compare across int/float and
    /// drops or host objects compare by identity.
    pub fn liquid_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.liquid_cmp(other) == Some(Ordering::Equal)
            }
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.liquid_eq(y))
            }
            (Self::Hash(a), Self::Hash(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.liquid_eq(vb))
            }
            (Self::Drop(a), Self::Drop(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (
                Self::Nil
                | Self::Bool(_)
                | Self::Int(_)
                | Self::Float(_)
                | Self::Str(_)
                | Self::Array(_)
                | Self::Hash(_)
                | Self::Drop(_)
                | Self::Object(_),
                _,
            ) => false,
        }
    }

    /// Ordering for `<`, `>`, `<=` and `>=`. `None` when the operands are not
    /// comparable.
    #[allow(clippy::cast_precision_loss, reason = "mixed numeric comparison")]
    pub fn liquid_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (
                Self::Nil
                | Self::Bool(_)
                | Self::Int(_)
                | Self::Float(_)
                | Self::Str(_)
                | Self::Array(_)
                | Self::Hash(_)
                | Self::Drop(_)
                | Self::Object(_),
                _,
            ) => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "Nil"),
            Self::Bool(value) => write!(f, "Bool({value})"),
            Self::Int(value) => write!(f, "Int({value})"),
            Self::Float(value) => write!(f, "Float({value})"),
            Self::Str(value) => write!(f, "Str({value:?})"),
            Self::Array(items) => f.debug_list().entries(items).finish(),
            Self::Hash(hash) => f.debug_map().entries(hash).finish(),
            Self::Drop(_) => write!(f, "Drop(..)"),
            Self::Object(object) => object.fmt(f),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.liquid_eq(other)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or(Self::Nil, Self::Int)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Hash> for Value {
    fn from(value: Hash) -> Self {
        Self::Hash(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use std::fmt;

    use serde::de::{self, MapAccess, SeqAccess, Visitor};
    use serde::ser::{SerializeMap, SerializeSeq};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Hash, Value};

    /// Drops and host objects have no data representation and serialize as
    /// `null`.
    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Self::Nil | Self::Drop(_) | Self::Object(_) => serializer.serialize_unit(),
                Self::Bool(value) => serializer.serialize_bool(*value),
                Self::Int(value) => serializer.serialize_i64(*value),
                Self::Float(value) => serializer.serialize_f64(*value),
                Self::Str(value) => serializer.serialize_str(value),
                Self::Array(items) => {
                    let mut seq = serializer.serialize_seq(Some(items.len()))?;
                    for item in items {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
                Self::Hash(hash) => {
                    let mut map = serializer.serialize_map(Some(hash.len()))?;
                    for (key, value) in hash {
                        map.serialize_entry(key, value)?;
                    }
                    map.end()
                }
            }
        }
    }

    struct ValueVisitor;

    impl<'de> Visitor<'de> for ValueVisitor {
        type Value = Value;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("any template value")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
            Ok(Value::Nil)
        }

        fn visit_none<E: de::Error>(self) -> Result<Value, E> {
            Ok(Value::Nil)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
            Value::deserialize(deserializer)
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<Value, E> {
            Ok(Value::Bool(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Value, E> {
            Ok(Value::Int(value))
        }

        #[allow(clippy::cast_precision_loss, reason = "out of range integers widen")]
        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Value, E> {
            Ok(i64::try_from(value).map_or(Value::Float(value as f64), Value::Int))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Value, E> {
            Ok(Value::Float(value))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Value, E> {
            Ok(Value::Str(value.to_string()))
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<Value, E> {
            Ok(Value::Str(value))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
            let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(item) = seq.next_element()? {
                items.push(item);
            }
            Ok(Value::Array(items))
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
            let mut hash = Hash::new();
            while let Some((key, value)) = map.next_entry::<String, Value>()? {
                hash.insert(key, value);
            }
            Ok(Value::Hash(hash))
        }
    }

    impl<'de> Deserialize<'de> for Value {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(ValueVisitor)
        }
    }
}
