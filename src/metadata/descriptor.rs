//! Type classification.
//!
//! A [`TypeRef`] names the declared type of a member or root; a [`TypeDescriptor`] is the
//! classified, cached view of it. Built-ins carry a non-zero [`TypeCode`] and never
//! have a member table.

use crate::core::value::{Decimal, Value};
use bitflags::bitflags;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Built-in type codes. `Custom` (0) marks everything with a member table.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
pub enum TypeCode {
    Custom = 0,
    Bool = 1,
    I8 = 2,
    U8 = 3,
    I16 = 4,
    U16 = 5,
    I32 = 6,
    U32 = 7,
    I64 = 8,
    U64 = 9,
    F32 = 10,
    F64 = 11,
    Decimal = 12,
    Char = 13,
    String = 14,
    DateTime = 15,
    TimeSpan = 16,
    Guid = 17,
    ByteArray = 18,
    DateTimeOffset = 19,
}

impl TypeCode {
    pub fn as_u8(self) -> u8 {
        self.into()
    }

    pub fn is_builtin(self) -> bool {
        self != TypeCode::Custom
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeCode::Custom => "custom",
            TypeCode::Bool => "bool",
            TypeCode::I8 => "i8",
            TypeCode::U8 => "u8",
            TypeCode::I16 => "i16",
            TypeCode::U16 => "u16",
            TypeCode::I32 => "i32",
            TypeCode::U32 => "u32",
            TypeCode::I64 => "i64",
            TypeCode::U64 => "u64",
            TypeCode::F32 => "f32",
            TypeCode::F64 => "f64",
            TypeCode::Decimal => "decimal",
            TypeCode::Char => "char",
            TypeCode::String => "string",
            TypeCode::DateTime => "datetime",
            TypeCode::TimeSpan => "timespan",
            TypeCode::Guid => "guid",
            TypeCode::ByteArray => "bytes",
            TypeCode::DateTimeOffset => "datetimeoffset",
        }
    }

    pub fn category(self) -> TypeCategory {
        match self {
            TypeCode::Custom => TypeCategory::Object,
            TypeCode::Bool => TypeCategory::Boolean,
            TypeCode::I8
            | TypeCode::U8
            | TypeCode::I16
            | TypeCode::U16
            | TypeCode::I32
            | TypeCode::U32
            | TypeCode::I64
            | TypeCode::U64 => TypeCategory::Integer,
            TypeCode::F32 | TypeCode::F64 => TypeCategory::Float,
            TypeCode::Decimal => TypeCategory::Decimal,
            TypeCode::Char => TypeCategory::Char,
            TypeCode::String => TypeCategory::String,
            TypeCode::DateTime | TypeCode::DateTimeOffset => TypeCategory::DateTime,
            TypeCode::TimeSpan => TypeCategory::TimeSpan,
            TypeCode::Guid => TypeCategory::Guid,
            TypeCode::ByteArray => TypeCategory::ByteArray,
        }
    }

    /// Zero value used when a missing member is defaulted.
    pub fn zero_value(self) -> Value {
        match self {
            TypeCode::Custom => Value::Null,
            TypeCode::Bool => Value::Bool(false),
            TypeCode::I8 => Value::I8(0),
            TypeCode::U8 => Value::U8(0),
            TypeCode::I16 => Value::I16(0),
            TypeCode::U16 => Value::U16(0),
            TypeCode::I32 => Value::I32(0),
            TypeCode::U32 => Value::U32(0),
            TypeCode::I64 => Value::I64(0),
            TypeCode::U64 => Value::U64(0),
            TypeCode::F32 => Value::F32(0.0),
            TypeCode::F64 => Value::F64(0.0),
            TypeCode::Decimal => Value::Decimal(Decimal::default()),
            TypeCode::Char => Value::Char('\0'),
            TypeCode::String => Value::String(String::new()),
            TypeCode::DateTime => Value::DateTime(DateTime::<Utc>::default()),
            TypeCode::TimeSpan => Value::TimeSpan(TimeDelta::zero()),
            TypeCode::Guid => Value::Guid(Uuid::nil()),
            TypeCode::ByteArray => Value::Bytes(Bytes::new()),
            TypeCode::DateTimeOffset => Value::DateTimeOffset(DateTime::<FixedOffset>::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCategory {
    Boolean,
    Integer,
    Float,
    Decimal,
    Char,
    String,
    DateTime,
    TimeSpan,
    Guid,
    ByteArray,
    Enum,
    Array,
    Collection,
    Dictionary,
    Struct,
    Object,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DescriptorFlags: u16 {
        const VALUE_TYPE = 0x0001;
        const NULLABLE = 0x0002;
        const GENERIC = 0x0004;
        const COLLECTION = 0x0008;
        const DICTIONARY = 0x0010;
        const BLITTABLE = 0x0020;
        const HAS_DEFAULT_CONSTRUCTOR = 0x0040;
        const INTERFACE = 0x0080;
        const ABSTRACT = 0x0100;
        const SEALED = 0x0200;
    }
}

/// Declared type of a member, element or root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Builtin(TypeCode),
    Enum,
    /// Fixed-length sequence.
    Array(Box<TypeRef>),
    /// Growable sequence.
    List(Box<TypeRef>),
    Map(Box<TypeRef>, Box<TypeRef>),
    /// Registered type, by name.
    Named(String),
    /// Unconstrained; objects need a type tag.
    Any,
}

impl TypeRef {
    pub fn array(element: TypeRef) -> Self {
        TypeRef::Array(Box::new(element))
    }

    pub fn list(element: TypeRef) -> Self {
        TypeRef::List(Box::new(element))
    }

    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        TypeRef::Map(Box::new(key), Box::new(value))
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// Element type of a sequence.
    pub fn element(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Array(e) | TypeRef::List(e) => Some(e),
            _ => None,
        }
    }

    pub fn named_type(&self) -> Option<&str> {
        match self {
            TypeRef::Named(name) => Some(name),
            _ => None,
        }
    }

    /// Zero value for non-object types. Named types yield `None`; building their
    /// default needs the registry.
    pub fn zero_value(&self) -> Option<Value> {
        match self {
            TypeRef::Builtin(code) => Some(code.zero_value()),
            TypeRef::Enum => Some(Value::Enum(0)),
            TypeRef::Array(_) | TypeRef::List(_) => Some(Value::Array(Vec::new())),
            TypeRef::Map(_, _) => Some(Value::Map(Vec::new())),
            TypeRef::Any => Some(Value::Null),
            TypeRef::Named(_) => None,
        }
    }

    /// Whether `value` may be stored under this declared type. Object identity against
    /// `Named` is checked separately, against the registry.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (TypeRef::Any, _) => true,
            (TypeRef::Builtin(code), v) => v.type_code() == Some(*code),
            (TypeRef::Enum, Value::Enum(_)) => true,
            (TypeRef::Array(_) | TypeRef::List(_), Value::Array(_)) => true,
            (TypeRef::Map(_, _), Value::Map(_)) => true,
            (TypeRef::Named(_), Value::Object(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Builtin(code) => f.write_str(code.name()),
            TypeRef::Enum => f.write_str("enum"),
            TypeRef::Array(e) => write!(f, "[{e}]"),
            TypeRef::List(e) => write!(f, "List<{e}>"),
            TypeRef::Map(k, v) => write!(f, "Map<{k}, {v}>"),
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::Any => f.write_str("any"),
        }
    }
}

/// Classified view of a type. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    name: String,
    category: TypeCategory,
    type_code: TypeCode,
    flags: DescriptorFlags,
    element_type: Option<TypeRef>,
    generic_arguments: Vec<TypeRef>,
}

impl TypeDescriptor {
    pub fn builtin(code: TypeCode) -> Self {
        let flags = match code.category() {
            TypeCategory::String | TypeCategory::ByteArray => {
                DescriptorFlags::NULLABLE | DescriptorFlags::SEALED
            }
            TypeCategory::Boolean
            | TypeCategory::Integer
            | TypeCategory::Float
            | TypeCategory::Char => {
                DescriptorFlags::VALUE_TYPE
                    | DescriptorFlags::BLITTABLE
                    | DescriptorFlags::HAS_DEFAULT_CONSTRUCTOR
                    | DescriptorFlags::SEALED
            }
            _ => {
                DescriptorFlags::VALUE_TYPE
                    | DescriptorFlags::HAS_DEFAULT_CONSTRUCTOR
                    | DescriptorFlags::SEALED
            }
        };
        Self {
            name: code.name().to_string(),
            category: code.category(),
            type_code: code,
            flags,
            element_type: None,
            generic_arguments: Vec::new(),
        }
    }

    pub fn enumeration() -> Self {
        Self {
            name: "enum".to_string(),
            category: TypeCategory::Enum,
            type_code: TypeCode::Custom,
            flags: DescriptorFlags::VALUE_TYPE
                | DescriptorFlags::BLITTABLE
                | DescriptorFlags::HAS_DEFAULT_CONSTRUCTOR,
            element_type: None,
            generic_arguments: Vec::new(),
        }
    }

    pub fn array(element: TypeRef) -> Self {
        Self {
            name: TypeRef::array(element.clone()).to_string(),
            category: TypeCategory::Array,
            type_code: TypeCode::Custom,
            flags: DescriptorFlags::NULLABLE | DescriptorFlags::COLLECTION,
            element_type: Some(element),
            generic_arguments: Vec::new(),
        }
    }

    pub fn collection(element: TypeRef) -> Self {
        Self {
            name: TypeRef::list(element.clone()).to_string(),
            category: TypeCategory::Collection,
            type_code: TypeCode::Custom,
            flags: DescriptorFlags::NULLABLE
                | DescriptorFlags::COLLECTION
                | DescriptorFlags::GENERIC
                | DescriptorFlags::HAS_DEFAULT_CONSTRUCTOR,
            element_type: Some(element.clone()),
            generic_arguments: vec![element],
        }
    }

    pub fn dictionary(key: TypeRef, value: TypeRef) -> Self {
        Self {
            name: TypeRef::map(key.clone(), value.clone()).to_string(),
            category: TypeCategory::Dictionary,
            type_code: TypeCode::Custom,
            flags: DescriptorFlags::NULLABLE
                | DescriptorFlags::COLLECTION
                | DescriptorFlags::DICTIONARY
                | DescriptorFlags::GENERIC
                | DescriptorFlags::HAS_DEFAULT_CONSTRUCTOR,
            element_type: None,
            generic_arguments: vec![key, value],
        }
    }

    /// Registered user type. Value types classify as `Struct`, everything else as `Object`.
    pub fn user_type(name: impl Into<String>, flags: DescriptorFlags) -> Self {
        let category = if flags.contains(DescriptorFlags::VALUE_TYPE) {
            TypeCategory::Struct
        } else {
            TypeCategory::Object
        };
        Self {
            name: name.into(),
            category,
            type_code: TypeCode::Custom,
            flags,
            element_type: None,
            generic_arguments: Vec::new(),
        }
    }

    /// Unregistered or unconstrained type.
    pub fn any() -> Self {
        Self {
            name: "any".to_string(),
            category: TypeCategory::Object,
            type_code: TypeCode::Custom,
            flags: DescriptorFlags::NULLABLE,
            element_type: None,
            generic_arguments: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> TypeCategory {
        self.category
    }

    pub fn type_code(&self) -> TypeCode {
        self.type_code
    }

    pub fn flags(&self) -> DescriptorFlags {
        self.flags
    }

    pub fn element_type(&self) -> Option<&TypeRef> {
        self.element_type.as_ref()
    }

    pub fn generic_arguments(&self) -> &[TypeRef] {
        &self.generic_arguments
    }

    /// Built-ins are encoded directly and never consult a member table.
    pub fn is_builtin(&self) -> bool {
        self.type_code.is_builtin()
    }

    pub fn needs_member_table(&self) -> bool {
        matches!(self.category, TypeCategory::Struct | TypeCategory::Object)
            && !self.flags.intersects(DescriptorFlags::INTERFACE | DescriptorFlags::ABSTRACT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_codes_have_builtin_categories() {
        for raw in 1..=19u8 {
            let code = TypeCode::try_from(raw).unwrap_or(TypeCode::Custom);
            assert!(code.is_builtin());
            let desc = TypeDescriptor::builtin(code);
            assert!(desc.is_builtin());
            assert!(!desc.needs_member_table());
            assert_ne!(desc.category(), TypeCategory::Object);
            assert_ne!(desc.category(), TypeCategory::Struct);
        }
    }

    #[test]
    fn test_zero_values_match_their_codes() {
        for raw in 1..=19u8 {
            let code = TypeCode::try_from(raw).unwrap_or(TypeCode::Custom);
            assert_eq!(code.zero_value().type_code(), Some(code));
        }
    }

    #[test]
    fn test_accepts() {
        let int = TypeRef::Builtin(TypeCode::I32);
        assert!(int.accepts(&Value::I32(1)));
        assert!(int.accepts(&Value::Null));
        assert!(!int.accepts(&Value::I64(1)));
        assert!(TypeRef::list(int.clone()).accepts(&Value::Array(vec![])));
        assert!(TypeRef::Any.accepts(&Value::String("x".into())));
    }

    #[test]
    fn test_display_of_nested_refs() {
        let r = TypeRef::map(
            TypeRef::Builtin(TypeCode::String),
            TypeRef::list(TypeRef::named("Item")),
        );
        assert_eq!(r.to_string(), "Map<string, List<Item>>");
    }

    #[test]
    fn test_user_type_classification() {
        let s = TypeDescriptor::user_type("Vec3", DescriptorFlags::VALUE_TYPE);
        assert_eq!(s.category(), TypeCategory::Struct);
        let o = TypeDescriptor::user_type("Shape", DescriptorFlags::ABSTRACT);
        assert_eq!(o.category(), TypeCategory::Object);
        assert!(!o.needs_member_table());
    }
}
