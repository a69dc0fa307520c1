//! Dynamic object graph.
//!
//! The encoder and decoder operate on [`Value`] trees. Objects are shared, lockable
//! nodes ([`ObjectRef`]) so one graph can hold the same object twice or refer back to an
//! ancestor. Equality is structural and cycle-aware: two graphs are equal when every
//! reachable pair of nodes is equal, with repeated pairs assumed equal.
//!
//! Cyclic graphs built from `ObjectRef` keep themselves alive. Break the cycle (for
//! example by clearing a field) when the graph is no longer needed.

use crate::error::{constants, ErrorCode, Result, SerializerError};
use crate::metadata::descriptor::TypeCode;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Largest decimal scale accepted on the wire.
pub const MAX_DECIMAL_SCALE: u8 = 28;

/// Fixed-point decimal: `mantissa * 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

impl Decimal {
    pub fn new(mantissa: i128, scale: u8) -> Result<Self> {
        if scale > MAX_DECIMAL_SCALE {
            return Err(SerializerError::new(
                ErrorCode::InvalidData,
                format!("decimal scale {scale} exceeds {MAX_DECIMAL_SCALE}"),
            ));
        }
        Ok(Self { mantissa, scale })
    }

    pub fn mantissa(self) -> i128 {
        self.mantissa
    }

    pub fn scale(self) -> u8 {
        self.scale
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let (int, frac) = padded.split_at(padded.len() - scale);
        let sign = if self.mantissa < 0 { "-" } else { "" };
        write!(f, "{sign}{int}.{frac}")
    }
}

/// A wire member the current type does not declare, kept for migrators.
#[derive(Debug, Clone)]
pub struct UnknownMember {
    pub key: u32,
    pub wire_name: Option<String>,
    pub value: Value,
}

/// One node of the graph: a type name and its member values.
#[derive(Debug, Clone, Default)]
pub struct Object {
    type_name: String,
    fields: Vec<(String, Value)>,
    unknown: Vec<UnknownMember>,
}

impl Object {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
            unknown: Vec::new(),
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Insert or replace a field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(index).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn unknown(&self) -> &[UnknownMember] {
        &self.unknown
    }

    pub fn push_unknown(&mut self, member: UnknownMember) {
        self.unknown.push(member);
    }

    /// Remove and return the retained unknown members.
    pub fn take_unknown(&mut self) -> Vec<UnknownMember> {
        std::mem::take(&mut self.unknown)
    }
}

/// Shared handle to an [`Object`]. Cloning the handle shares the node.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<Object>>);

impl ObjectRef {
    pub fn new(object: Object) -> Self {
        Self(Arc::new(RwLock::new(object)))
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, Object>> {
        self.0
            .read()
            .map_err(|_| SerializerError::new(ErrorCode::InternalError, constants::ERR_LOCK_POISONED))
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Object>> {
        self.0
            .write()
            .map_err(|_| SerializerError::new(ErrorCode::InternalError, constants::ERR_LOCK_POISONED))
    }

    /// True when both handles point at the same node.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity of the node for the lifetime of the graph.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn type_name(&self) -> Result<String> {
        Ok(self.read()?.type_name().to_string())
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never walks into the node, so cyclic graphs print finitely.
        match self.0.try_read() {
            Ok(obj) => write!(f, "ObjectRef({} @ {:#x})", obj.type_name(), self.addr()),
            Err(_) => write!(f, "ObjectRef(<locked> @ {:#x})", self.addr()),
        }
    }
}

impl From<Object> for ObjectRef {
    fn from(object: Object) -> Self {
        ObjectRef::new(object)
    }
}

/// Dynamic value of any wire-representable type.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Char(char),
    String(String),
    DateTime(DateTime<Utc>),
    TimeSpan(TimeDelta),
    Guid(Uuid),
    Bytes(Bytes),
    DateTimeOffset(DateTime<FixedOffset>),
    Enum(i64),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Object(ObjectRef),
}

impl Value {
    pub fn object(object: Object) -> Self {
        Value::Object(ObjectRef::new(object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Built-in type code, `None` for null, enums, collections and objects.
    pub fn type_code(&self) -> Option<TypeCode> {
        Some(match self {
            Value::Bool(_) => TypeCode::Bool,
            Value::I8(_) => TypeCode::I8,
            Value::U8(_) => TypeCode::U8,
            Value::I16(_) => TypeCode::I16,
            Value::U16(_) => TypeCode::U16,
            Value::I32(_) => TypeCode::I32,
            Value::U32(_) => TypeCode::U32,
            Value::I64(_) => TypeCode::I64,
            Value::U64(_) => TypeCode::U64,
            Value::F32(_) => TypeCode::F32,
            Value::F64(_) => TypeCode::F64,
            Value::Decimal(_) => TypeCode::Decimal,
            Value::Char(_) => TypeCode::Char,
            Value::String(_) => TypeCode::String,
            Value::DateTime(_) => TypeCode::DateTime,
            Value::TimeSpan(_) => TypeCode::TimeSpan,
            Value::Guid(_) => TypeCode::Guid,
            Value::Bytes(_) => TypeCode::ByteArray,
            Value::DateTimeOffset(_) => TypeCode::DateTimeOffset,
            Value::Null | Value::Enum(_) | Value::Array(_) | Value::Map(_) | Value::Object(_) => {
                return None
            }
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Enum(_) => "enum",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            other => other.type_code().map(TypeCode::name).unwrap_or("unknown"),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer variant that fits in `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v as i64),
            Value::U8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::I64(v) | Value::Enum(v) => Some(v),
            Value::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut seen = HashSet::new();
        values_equal(self, other, &mut seen)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        let mut seen = HashSet::new();
        objects_equal(self, other, &mut seen)
    }
}

fn values_equal(a: &Value, b: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::I8(x), Value::I8(y)) => x == y,
        (Value::U8(x), Value::U8(y)) => x == y,
        (Value::I16(x), Value::I16(y)) => x == y,
        (Value::U16(x), Value::U16(y)) => x == y,
        (Value::I32(x), Value::I32(y)) => x == y,
        (Value::U32(x), Value::U32(y)) => x == y,
        (Value::I64(x), Value::I64(y)) => x == y,
        (Value::U64(x), Value::U64(y)) => x == y,
        // Bitwise so that a NaN survives a round-trip comparison.
        (Value::F32(x), Value::F32(y)) => x.to_bits() == y.to_bits(),
        (Value::F64(x), Value::F64(y)) => x.to_bits() == y.to_bits(),
        (Value::Decimal(x), Value::Decimal(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::DateTime(x), Value::DateTime(y)) => x == y,
        (Value::TimeSpan(x), Value::TimeSpan(y)) => x == y,
        (Value::Guid(x), Value::Guid(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::DateTimeOffset(x), Value::DateTimeOffset(y)) => {
            x == y && x.offset() == y.offset()
        }
        (Value::Enum(x), Value::Enum(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(p, q, seen))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter().zip(y).all(|((k1, v1), (k2, v2))| {
                    values_equal(k1, k2, seen) && values_equal(v1, v2, seen)
                })
        }
        (Value::Object(x), Value::Object(y)) => objects_equal(x, y, seen),
        _ => false,
    }
}

fn objects_equal(a: &ObjectRef, b: &ObjectRef, seen: &mut HashSet<(usize, usize)>) -> bool {
    if a.ptr_eq(b) {
        return true;
    }
    // A pair already under comparison is assumed equal; any difference is found on
    // the first visit.
    if !seen.insert((a.addr(), b.addr())) {
        return true;
    }
    let (Ok(x), Ok(y)) = (a.read(), b.read()) else {
        return false;
    };
    x.type_name == y.type_name
        && x.fields.len() == y.fields.len()
        && x.fields.iter().all(|(name, value)| {
            y.get(name)
                .map(|other| values_equal(value, other, seen))
                .unwrap_or(false)
        })
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    char => Char,
    String => String,
    Decimal => Decimal,
    Uuid => Guid,
    Bytes => Bytes,
    ObjectRef => Object,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::object(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_display() {
        assert_eq!(Decimal::new(12345, 2).map(|d| d.to_string()).ok().as_deref(), Some("123.45"));
        assert_eq!(Decimal::new(-5, 3).map(|d| d.to_string()).ok().as_deref(), Some("-0.005"));
        assert!(Decimal::new(1, 29).is_err());
    }

    #[test]
    fn test_set_replaces_existing_field() {
        let mut obj = Object::new("Player").with("id", 1u32);
        obj.set("id", 2u32);
        assert_eq!(obj.len(), 1);
        assert_eq!(obj.get("id"), Some(&Value::U32(2)));
    }

    #[test]
    fn test_field_order_does_not_affect_equality() {
        let a = Value::object(Object::new("P").with("x", 1i32).with("y", 2i32));
        let b = Value::object(Object::new("P").with("y", 2i32).with("x", 1i32));
        assert_eq!(a, b);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_cyclic_graphs_compare_without_looping() {
        let a = ObjectRef::new(Object::new("Node").with("n", 1i32));
        a.write().unwrap().set("next", a.clone());

        let b = ObjectRef::new(Object::new("Node").with("n", 1i32));
        b.write().unwrap().set("next", b.clone());

        assert_eq!(Value::Object(a.clone()), Value::Object(b.clone()));

        b.write().unwrap().set("n", 2i32);
        assert_ne!(Value::Object(a.clone()), Value::Object(b.clone()));

        // break the cycles
        a.write().unwrap().remove("next");
        b.write().unwrap().remove("next");
    }

    #[test]
    fn test_nan_is_equal_to_itself() {
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
        assert_ne!(Value::F64(0.0), Value::F64(-0.0));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_debug_of_cycle_terminates() {
        let a = ObjectRef::new(Object::new("Node"));
        if let Ok(mut obj) = a.write() {
            obj.set("me", a.clone());
        }
        let rendered = format!("{:?}", a.read().map(|o| format!("{o:?}")).unwrap_or_default());
        assert!(rendered.contains("ObjectRef(Node"));
        let mut obj = a.write().unwrap();
        obj.remove("me");
    }
}
