//! Field shapes: which named fields a type exposes and how to write them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use super::value::Value;
use crate::error::DrainError;

/// Static description of an enumeration's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumInfo {
    pub name: &'static str,
    pub members: &'static [(&'static str, i64)],
}

impl EnumInfo {
    pub fn by_name(&self, name: &str) -> Option<i64> {
        self.members
            .iter()
            .find(|(member, _)| *member == name)
            .map(|(_, discriminant)| *discriminant)
    }

    pub fn is_defined(&self, discriminant: i64) -> bool {
        self.members.iter().any(|(_, value)| *value == discriminant)
    }
}

/// Base type of a field, ignoring nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Text,
    Timestamp,
    Interval,
    Bytes,
    Uuid,
    Json,
    Enum(EnumInfo),
}

impl TypeTag {
    pub fn is_enum(&self) -> bool {
        matches!(self, Self::Enum(_))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Text => "String",
            Self::Timestamp => "OffsetDateTime",
            Self::Interval => "Duration",
            Self::Bytes => "Vec<u8>",
            Self::Uuid => "Uuid",
            Self::Json => "serde_json::Value",
            Self::Enum(info) => info.name,
        };
        f.write_str(name)
    }
}

/// Declared type of a field: base type plus whether null is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredType {
    pub tag: TypeTag,
    pub nullable: bool,
}

impl DeclaredType {
    pub const fn required(tag: TypeTag) -> Self {
        Self {
            tag,
            nullable: false,
        }
    }

    pub const fn nullable(tag: TypeTag) -> Self {
        Self {
            tag,
            nullable: true,
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "Option<{}>", self.tag)
        } else {
            write!(f, "{}", self.tag)
        }
    }
}

/// Plain (non-optional, non-enum) field types.
pub trait Scalar: Sized + Send + 'static {
    const TAG: TypeTag;

    /// Value assigned when the column holds null.
    fn zero() -> Self;

    /// Unwrap a coerced value, handing it back when the variant differs.
    fn from_value(value: Value) -> Result<Self, Value>;
}

/// Any type a registered field may be declared with.
pub trait FieldType: Sized + Send + 'static {
    fn declared() -> DeclaredType;

    fn from_value(value: Value) -> Result<Self, Value>;
}

macro_rules! scalar {
    ($ty:ty, $tag:ident, $zero:expr, $pattern:pat => $out:expr) => {
        impl Scalar for $ty {
            const TAG: TypeTag = TypeTag::$tag;

            fn zero() -> Self {
                $zero
            }

            fn from_value(value: Value) -> Result<Self, Value> {
                match value {
                    $pattern => $out,
                    other => Err(other),
                }
            }
        }

        impl FieldType for $ty {
            fn declared() -> DeclaredType {
                DeclaredType::required(TypeTag::$tag)
            }

            fn from_value(value: Value) -> Result<Self, Value> {
                match value {
                    Value::Null => Ok(<$ty as Scalar>::zero()),
                    other => <$ty as Scalar>::from_value(other),
                }
            }
        }
    };
}

macro_rules! integer_scalar {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(scalar!($ty, $tag, 0, Value::Int(n) => <$ty>::try_from(n).map_err(|_| Value::Int(n)));)*
    };
}

integer_scalar!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
);

scalar!(bool, Bool, false, Value::Bool(b) => Ok(b));
scalar!(f32, F32, 0.0, Value::Float(f) => Ok(f as f32));
scalar!(f64, F64, 0.0, Value::Float(f) => Ok(f));
scalar!(String, Text, String::new(), Value::Text(s) => Ok(s));
scalar!(OffsetDateTime, Timestamp, OffsetDateTime::UNIX_EPOCH, Value::Timestamp(ts) => Ok(ts));
scalar!(time::Duration, Interval, time::Duration::ZERO, Value::Interval(d) => Ok(d));
scalar!(Vec<u8>, Bytes, Vec::new(), Value::Bytes(b) => Ok(b));
scalar!(Uuid, Uuid, Uuid::nil(), Value::Uuid(id) => Ok(id));
scalar!(serde_json::Value, Json, serde_json::Value::Null, Value::Json(j) => Ok(j));

impl<S: Scalar> FieldType for Option<S> {
    fn declared() -> DeclaredType {
        DeclaredType::nullable(S::TAG)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Null => Ok(None),
            other => S::from_value(other).map(Some),
        }
    }
}

/// Enumerations backed by integral discriminants.
///
/// ```
/// use rowdrain::mapping::DbEnum;
///
/// #[derive(Debug, Clone, Copy, Default, PartialEq)]
/// enum Tag {
///     #[default]
///     None = 0,
///     Red = 1,
/// }
///
/// impl DbEnum for Tag {
///     const NAME: &'static str = "Tag";
///     const MEMBERS: &'static [(&'static str, i64)] = &[("None", 0), ("Red", 1)];
///
///     fn from_discriminant(value: i64) -> Option<Self> {
///         match value {
///             0 => Some(Self::None),
///             1 => Some(Self::Red),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait DbEnum: Sized + Copy + Default + Send + 'static {
    const NAME: &'static str;
    const MEMBERS: &'static [(&'static str, i64)];

    fn from_discriminant(value: i64) -> Option<Self>;

    fn info() -> EnumInfo {
        EnumInfo {
            name: Self::NAME,
            members: Self::MEMBERS,
        }
    }
}

fn enum_from_value<E: DbEnum>(value: Value) -> Result<E, Value> {
    match value {
        Value::Int(d) => E::from_discriminant(d).ok_or(Value::Int(d)),
        other => Err(other),
    }
}

/// Writes an already coerced value into a field; hands the value back on
/// a variant mismatch.
pub type RawSetter<T> = Arc<dyn Fn(&mut T, Value) -> Result<(), Value> + Send + Sync>;

/// One named field of an entity type.
pub struct FieldDescriptor<T> {
    name: &'static str,
    declared: DeclaredType,
    setter: Option<RawSetter<T>>,
}

impl<T> FieldDescriptor<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn declared(&self) -> DeclaredType {
        self.declared
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    pub fn setter(&self) -> Option<&RawSetter<T>> {
        self.setter.as_ref()
    }
}

impl<T> Clone for FieldDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            declared: self.declared,
            setter: self.setter.clone(),
        }
    }
}

impl<T> fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("declared", &self.declared)
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Ordered field list of an entity type.
pub struct EntityShape<T> {
    fields: Vec<FieldDescriptor<T>>,
}

impl<T: 'static> EntityShape<T> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Register a writable field.
    pub fn field<V, F>(self, name: &'static str, setter: F) -> Self
    where
        V: FieldType,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let raw: RawSetter<T> = Arc::new(move |target: &mut T, value: Value| {
            setter(target, V::from_value(value)?);
            Ok(())
        });
        self.push(name, V::declared(), Some(raw))
    }

    /// Register a writable enumeration field; null maps to `E::default()`.
    pub fn enum_field<E, F>(self, name: &'static str, setter: F) -> Self
    where
        E: DbEnum,
        F: Fn(&mut T, E) + Send + Sync + 'static,
    {
        let raw: RawSetter<T> = Arc::new(move |target: &mut T, value: Value| {
            let member = match value {
                Value::Null => E::default(),
                other => enum_from_value::<E>(other)?,
            };
            setter(target, member);
            Ok(())
        });
        self.push(name, DeclaredType::required(TypeTag::Enum(E::info())), Some(raw))
    }

    /// Register a writable optional enumeration field.
    pub fn nullable_enum_field<E, F>(self, name: &'static str, setter: F) -> Self
    where
        E: DbEnum,
        F: Fn(&mut T, Option<E>) + Send + Sync + 'static,
    {
        let raw: RawSetter<T> = Arc::new(move |target: &mut T, value: Value| {
            let member = match value {
                Value::Null => None,
                other => Some(enum_from_value::<E>(other)?),
            };
            setter(target, member);
            Ok(())
        });
        self.push(name, DeclaredType::nullable(TypeTag::Enum(E::info())), Some(raw))
    }

    /// Register a field that can be read but never assigned.
    pub fn read_only<V: FieldType>(self, name: &'static str) -> Self {
        self.push(name, V::declared(), None)
    }

    fn push(mut self, name: &'static str, declared: DeclaredType, setter: Option<RawSetter<T>>) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            declared,
            setter,
        });
        self
    }
}

impl<T> EntityShape<T> {
    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reject blank or case-insensitively duplicated field names.
    pub fn validate(&self) -> Result<(), DrainError> {
        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(DrainError::argument_invalid("shape", "field names must not be blank"));
            }
            if !seen.insert(field.name.to_lowercase()) {
                return Err(DrainError::argument_invalid(
                    "shape",
                    format!("field `{}` is registered twice", field.name),
                ));
            }
        }
        Ok(())
    }
}

impl<T: 'static> Default for EntityShape<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Types the materializer can populate from rows.
pub trait Entity: Default + 'static {
    /// Name used in logs and error messages.
    fn entity_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    fn shape() -> EntityShape<Self>;
}
