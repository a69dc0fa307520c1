//! # Typed Bindings
//!
//! Bridges Rust types and the dynamic [`Value`] graph the engine walks.
//!
//! - [`Describe`]: the declared [`TypeRef`] of a Rust type
//! - [`ToValue`] / [`FromValue`]: conversion into and out of values
//! - [`BinaryObject`]: a registered user type with a member table
//!
//! User types are normally wired up with [`binary_object!`](crate::binary_object) and
//! [`binary_enum!`](crate::binary_enum) rather than by hand.
//!
//! ```rust
//! use afrs::binary_object;
//!
//! #[derive(Debug, Clone, PartialEq, Default)]
//! struct Item {
//!     id: u32,
//!     label: String,
//! }
//!
//! binary_object! {
//!     Item => "Item", schema = 1 {
//!         id: u32 = 0 [required],
//!         label: String = 1,
//!     }
//! }
//! ```

use crate::core::value::{Decimal, Object, ObjectRef, Value};
use crate::error::{ErrorCode, Result, SerializerError};
use crate::metadata::descriptor::{TypeCode, TypeRef};
use crate::metadata::registry::{TypeRegistration, TypeRegistry};
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use uuid::Uuid;

/// Declared wire type of a Rust type.
pub trait Describe {
    fn type_ref() -> TypeRef;

    /// Register any user types this type refers to.
    fn register_into(_registry: &TypeRegistry) -> Result<()> {
        Ok(())
    }
}

pub trait ToValue {
    fn to_value(&self) -> Value;
}

pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;

    /// Value for a member absent from the decoded object.
    fn from_missing(member: &str) -> Result<Self> {
        Err(SerializerError::new(
            ErrorCode::MissingRequiredMember,
            format!("member '{member}' is missing"),
        ))
    }
}

/// A user type with a registered member table.
pub trait BinaryObject: Sized {
    const TYPE_NAME: &'static str;

    fn registration() -> Result<TypeRegistration>;

    /// Register the user types referenced by members.
    fn register_dependencies(_registry: &TypeRegistry) -> Result<()> {
        Ok(())
    }

    fn to_object(&self) -> Object;

    fn from_object(object: &Object) -> Result<Self>;
}

pub(crate) fn type_mismatch(expected: impl std::fmt::Display, found: &Value) -> SerializerError {
    SerializerError::new(
        ErrorCode::TypeMismatch,
        format!("expected {expected}, found {}", found.kind_name()),
    )
}

/// Decode member `member` of `object`, or its missing-member value.
pub fn read_member<T: FromValue>(object: &Object, member: &str) -> Result<T> {
    let result = match object.get(member) {
        Some(value) => T::from_value(value.clone()),
        None => T::from_missing(member),
    };
    result.map_err(|e| {
        SerializerError::new(
            e.code(),
            format!("{}.{member}: {e}", object.type_name()),
        )
    })
}

/// Run `f` against the object inside `value`, checking its type name.
pub fn with_object<T>(
    value: Value,
    type_name: &str,
    f: impl FnOnce(&Object) -> Result<T>,
) -> Result<T> {
    match value {
        Value::Object(handle) => {
            let object = handle.read()?;
            if object.type_name() != type_name {
                return Err(SerializerError::new(
                    ErrorCode::TypeMismatch,
                    format!("expected {type_name}, found {}", object.type_name()),
                ));
            }
            f(&object)
        }
        other => Err(type_mismatch(type_name, &other)),
    }
}

macro_rules! builtin_binding {
    ($($ty:ty => $variant:ident, $code:ident);* $(;)?) => {
        $(
            impl Describe for $ty {
                fn type_ref() -> TypeRef {
                    TypeRef::Builtin(TypeCode::$code)
                }
            }

            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(type_mismatch(TypeCode::$code.name(), &other)),
                    }
                }
            }
        )*
    };
}

builtin_binding! {
    bool => Bool, Bool;
    i8 => I8, I8;
    u8 => U8, U8;
    i16 => I16, I16;
    u16 => U16, U16;
    i32 => I32, I32;
    u32 => U32, U32;
    i64 => I64, I64;
    u64 => U64, U64;
    f32 => F32, F32;
    f64 => F64, F64;
    Decimal => Decimal, Decimal;
    char => Char, Char;
    String => String, String;
    DateTime<Utc> => DateTime, DateTime;
    TimeDelta => TimeSpan, TimeSpan;
    Uuid => Guid, Guid;
    Bytes => Bytes, ByteArray;
    DateTime<FixedOffset> => DateTimeOffset, DateTimeOffset;
}

impl<T: Describe> Describe for Option<T> {
    fn type_ref() -> TypeRef {
        T::type_ref()
    }

    fn register_into(registry: &TypeRegistry) -> Result<()> {
        T::register_into(registry)
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn from_missing(_member: &str) -> Result<Self> {
        Ok(None)
    }
}

impl<T: Describe> Describe for Box<T> {
    fn type_ref() -> TypeRef {
        T::type_ref()
    }

    fn register_into(registry: &TypeRegistry) -> Result<()> {
        T::register_into(registry)
    }
}

impl<T: ToValue> ToValue for Box<T> {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: FromValue> FromValue for Box<T> {
    fn from_value(value: Value) -> Result<Self> {
        T::from_value(value).map(Box::new)
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn type_ref() -> TypeRef {
        TypeRef::list(T::type_ref())
    }

    fn register_into(registry: &TypeRegistry) -> Result<()> {
        T::register_into(registry)
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(type_mismatch("array", &other)),
        }
    }
}

impl<K: Describe, V: Describe> Describe for HashMap<K, V> {
    fn type_ref() -> TypeRef {
        TypeRef::map(K::type_ref(), V::type_ref())
    }

    fn register_into(registry: &TypeRegistry) -> Result<()> {
        K::register_into(registry)?;
        V::register_into(registry)
    }
}

impl<K: ToValue, V: ToValue> ToValue for HashMap<K, V> {
    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.to_value(), v.to_value()))
                .collect(),
        )
    }
}

impl<K: FromValue + Eq + Hash, V: FromValue> FromValue for HashMap<K, V> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(type_mismatch("map", &other)),
        }
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn type_ref() -> TypeRef {
        TypeRef::map(K::type_ref(), V::type_ref())
    }

    fn register_into(registry: &TypeRegistry) -> Result<()> {
        K::register_into(registry)?;
        V::register_into(registry)
    }
}

impl<K: ToValue, V: ToValue> ToValue for BTreeMap<K, V> {
    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.to_value(), v.to_value()))
                .collect(),
        )
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(type_mismatch("map", &other)),
        }
    }
}

impl Describe for Value {
    fn type_ref() -> TypeRef {
        TypeRef::Any
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }

    fn from_missing(_member: &str) -> Result<Self> {
        Ok(Value::Null)
    }
}

impl Describe for ObjectRef {
    fn type_ref() -> TypeRef {
        TypeRef::Any
    }
}

impl ToValue for ObjectRef {
    fn to_value(&self) -> Value {
        Value::Object(self.clone())
    }
}

impl FromValue for ObjectRef {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(handle) => Ok(handle),
            other => Err(type_mismatch("object", &other)),
        }
    }
}

/// Implement [`BinaryObject`] and the value conversions for an existing struct.
///
/// Every struct field is listed either as a member (`name: Type = key`, optionally
/// followed by `[required]`, `[nullable]`, `[deprecated]`, ...) or in a trailing
/// `skip { .. }` block; skipped fields never travel and decode as `Default::default()`.
#[macro_export]
macro_rules! binary_object {
    (
        $ty:ty => $name:literal, schema = $schema:literal {
            $( $field:ident : $fty:ty = $key:literal $( [ $($flag:ident),* ] )? ),* $(,)?
        }
        $( skip { $( $skipped:ident ),* $(,)? } )?
    ) => {
        impl $crate::core::bind::Describe for $ty {
            fn type_ref() -> $crate::metadata::descriptor::TypeRef {
                $crate::metadata::descriptor::TypeRef::named($name)
            }

            fn register_into(
                registry: &$crate::metadata::registry::TypeRegistry,
            ) -> $crate::error::Result<()> {
                registry.register_type::<$ty>().map(|_| ())
            }
        }

        impl $crate::core::bind::ToValue for $ty {
            fn to_value(&self) -> $crate::core::value::Value {
                $crate::core::value::Value::object(
                    <$ty as $crate::core::bind::BinaryObject>::to_object(self),
                )
            }
        }

        impl $crate::core::bind::FromValue for $ty {
            fn from_value(value: $crate::core::value::Value) -> $crate::error::Result<Self> {
                $crate::core::bind::with_object(
                    value,
                    $name,
                    <$ty as $crate::core::bind::BinaryObject>::from_object,
                )
            }
        }

        impl $crate::core::bind::BinaryObject for $ty {
            const TYPE_NAME: &'static str = $name;

            fn registration() -> $crate::error::Result<$crate::metadata::registry::TypeRegistration> {
                $crate::metadata::registry::TypeRegistration::builder($name)
                    .schema_version($schema)
                    $(
                        .member(
                            $crate::metadata::member::MemberSpec::field(
                                stringify!($field),
                                <$fty as $crate::core::bind::Describe>::type_ref(),
                            )
                            .key($key)
                            $( $( .$flag() )* )?
                        )
                    )*
                    .build()
            }

            fn register_dependencies(
                registry: &$crate::metadata::registry::TypeRegistry,
            ) -> $crate::error::Result<()> {
                $( <$fty as $crate::core::bind::Describe>::register_into(registry)?; )*
                Ok(())
            }

            fn to_object(&self) -> $crate::core::value::Object {
                $crate::core::value::Object::new($name)
                    $( .with(stringify!($field), $crate::core::bind::ToValue::to_value(&self.$field)) )*
            }

            fn from_object(object: &$crate::core::value::Object) -> $crate::error::Result<Self> {
                Ok(Self {
                    $( $field: $crate::core::bind::read_member(object, stringify!($field))?, )*
                    $( $( $skipped: ::core::default::Default::default(), )* )?
                })
            }
        }
    };
}

/// Implement the value conversions for a field-less enum with explicit discriminants.
#[macro_export]
macro_rules! binary_enum {
    ($ty:ty { $( $variant:ident = $value:literal ),* $(,)? }) => {
        impl $crate::core::bind::Describe for $ty {
            fn type_ref() -> $crate::metadata::descriptor::TypeRef {
                $crate::metadata::descriptor::TypeRef::Enum
            }
        }

        impl $crate::core::bind::ToValue for $ty {
            fn to_value(&self) -> $crate::core::value::Value {
                $crate::core::value::Value::Enum(match self {
                    $( Self::$variant => $value, )*
                })
            }
        }

        impl $crate::core::bind::FromValue for $ty {
            fn from_value(value: $crate::core::value::Value) -> $crate::error::Result<Self> {
                match value {
                    $( $crate::core::value::Value::Enum($value) => Ok(Self::$variant), )*
                    $crate::core::value::Value::Enum(other) => Err($crate::error::SerializerError::new(
                        $crate::error::ErrorCode::InvalidEnumValue,
                        format!("{} is not a valid {}", other, stringify!($ty)),
                    )),
                    other => Err($crate::error::SerializerError::new(
                        $crate::error::ErrorCode::TypeMismatch,
                        format!("expected enum, found {}", other.kind_name()),
                    )),
                }
            }
        }
    };
}
