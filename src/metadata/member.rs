//! Per-member wire bindings.
//!
//! Bindings are declared with [`MemberSpec`] and resolved into immutable
//! [`MemberBinding`]s when their type registration is built. Resolution fills in the
//! declaring type and the positional defaults:
//!
//! - `order` unset: declaration index
//! - `key` unset: `order`

use crate::core::value::Value;
use crate::metadata::descriptor::TypeRef;
use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemberKind {
    #[default]
    Field,
    Property,
    /// Accessor supplied by hand-written conversion code.
    Custom,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberFlags: u16 {
        const READABLE = 0x0001;
        const WRITABLE = 0x0002;
        const REQUIRED = 0x0004;
        const IGNORED = 0x0008;
        const READONLY = 0x0010;
        const NULLABLE = 0x0020;
        const COLLECTION = 0x0040;
        const DEPRECATED = 0x0080;
    }
}

/// Declaration of one member, before its type registration resolves it.
#[derive(Debug, Clone)]
pub struct MemberSpec {
    name: String,
    wire_name: Option<String>,
    value_type: TypeRef,
    order: Option<u32>,
    key: Option<u32>,
    kind: MemberKind,
    flags: MemberFlags,
    default_value: Option<Value>,
}

impl MemberSpec {
    fn new(name: impl Into<String>, value_type: TypeRef, kind: MemberKind) -> Self {
        let mut flags = MemberFlags::READABLE | MemberFlags::WRITABLE;
        if matches!(
            value_type,
            TypeRef::Array(_) | TypeRef::List(_) | TypeRef::Map(_, _)
        ) {
            flags |= MemberFlags::COLLECTION;
        }
        Self {
            name: name.into(),
            wire_name: None,
            value_type,
            order: None,
            key: None,
            kind,
            flags,
            default_value: None,
        }
    }

    pub fn field(name: impl Into<String>, value_type: TypeRef) -> Self {
        Self::new(name, value_type, MemberKind::Field)
    }

    pub fn property(name: impl Into<String>, value_type: TypeRef) -> Self {
        Self::new(name, value_type, MemberKind::Property)
    }

    pub fn custom(name: impl Into<String>, value_type: TypeRef) -> Self {
        Self::new(name, value_type, MemberKind::Custom)
    }

    pub fn key(mut self, key: u32) -> Self {
        self.key = Some(key);
        self
    }

    pub fn order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn wire_name(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = Some(wire_name.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.flags |= MemberFlags::REQUIRED;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.flags |= MemberFlags::IGNORED;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.flags |= MemberFlags::READONLY;
        self.flags.remove(MemberFlags::WRITABLE);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.flags |= MemberFlags::NULLABLE;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.flags |= MemberFlags::DEPRECATED;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn resolve(self, declaring_type: &str, index: u32) -> MemberBinding {
        let order = self.order.unwrap_or(index);
        let key = self.key.unwrap_or(order);
        MemberBinding {
            wire_name: self.wire_name.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            declaring_type: declaring_type.to_string(),
            value_type: self.value_type,
            order,
            key,
            kind: self.kind,
            flags: self.flags,
            default_value: self.default_value,
        }
    }
}

/// Resolved member binding. Immutable after its registration is built.
#[derive(Debug, Clone)]
pub struct MemberBinding {
    name: String,
    wire_name: String,
    declaring_type: String,
    value_type: TypeRef,
    order: u32,
    key: u32,
    kind: MemberKind,
    flags: MemberFlags,
    default_value: Option<Value>,
}

impl MemberBinding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn value_type(&self) -> &TypeRef {
        &self.value_type
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn key(&self) -> u32 {
        self.key
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn flags(&self) -> MemberFlags {
        self.flags
    }

    pub fn is_required(&self) -> bool {
        self.flags.contains(MemberFlags::REQUIRED)
    }

    pub fn is_ignored(&self) -> bool {
        self.flags.contains(MemberFlags::IGNORED)
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(MemberFlags::WRITABLE)
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Explicit default, else the declared type's zero value. `None` for registered
    /// object types without an explicit default.
    pub fn fallback_value(&self) -> Option<Value> {
        self.default_value
            .clone()
            .or_else(|| self.value_type.zero_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::descriptor::TypeCode;

    #[test]
    fn test_key_and_order_default_to_declaration_index() {
        let m = MemberSpec::field("hp", TypeRef::Builtin(TypeCode::I32)).resolve("Player", 3);
        assert_eq!(m.order(), 3);
        assert_eq!(m.key(), 3);
        assert_eq!(m.wire_name(), "hp");
        assert_eq!(m.declaring_type(), "Player");
    }

    #[test]
    fn test_key_defaults_to_explicit_order() {
        let m = MemberSpec::field("hp", TypeRef::Builtin(TypeCode::I32))
            .order(7)
            .resolve("Player", 0);
        assert_eq!(m.key(), 7);
    }

    #[test]
    fn test_readonly_clears_writable() {
        let m = MemberSpec::property("id", TypeRef::Builtin(TypeCode::U64))
            .readonly()
            .resolve("Player", 0);
        assert!(!m.is_writable());
        assert!(m.flags().contains(MemberFlags::READONLY | MemberFlags::READABLE));
    }

    #[test]
    fn test_collection_flag_follows_type() {
        let m = MemberSpec::field("tags", TypeRef::list(TypeRef::Builtin(TypeCode::String)))
            .resolve("Player", 0);
        assert!(m.flags().contains(MemberFlags::COLLECTION));
        assert_eq!(m.fallback_value(), Some(Value::Array(vec![])));
    }
}
