//! Object graph to tagged payload.
//!
//! The encoder walks a [`Value`] graph against its declared types and writes the
//! preamble followed by the root value. Which wire features it uses comes from the
//! [`Capabilities`] of the options; the same set is recorded in the header flags so
//! the decoder can mirror every choice made here.

use super::buffer::WireWriter;
use super::header::HeaderFlags;
use super::mode::Capabilities;
use super::stack;
use super::value::{Object, ObjectRef, UnknownMember, Value};
use super::{tag, STREAM_CHUNK_SIZE};
use crate::config::{BehaviorFlags, SerializeOptions, StringEncoding};
use crate::error::{ErrorCode, Result, SerializerError};
use crate::metadata::{MemberBinding, TypeCode, TypeRef, TypeRegistration, TypeRegistry};
use crate::policy::{ReferenceTracker, ResourceGuard};
use std::collections::HashMap;
use tracing::trace;

pub(crate) static ANY: TypeRef = TypeRef::Any;

/// Field name under which an anonymous object stores the member with `key`.
pub fn anonymous_member_name(key: u32) -> String {
    format!("#{key}")
}

fn anonymous_member_key(name: &str) -> Result<u32> {
    name.strip_prefix('#')
        .and_then(|k| k.parse().ok())
        .ok_or_else(|| {
            SerializerError::new(
                ErrorCode::InvalidData,
                format!("anonymous member {name:?} is not of the form #<key>"),
            )
        })
}

/// Prefix a member path onto plain failures. Structured errors pass through unchanged.
pub(crate) fn in_member(err: SerializerError, type_name: &str, member: &str) -> SerializerError {
    match err {
        SerializerError::Failed { code, message } => {
            SerializerError::new(code, format!("{type_name}.{member}: {message}"))
        }
        other => other,
    }
}

fn mismatch(declared: &TypeRef, found: &str) -> SerializerError {
    SerializerError::new(
        ErrorCode::TypeMismatch,
        format!("declared {declared} holds {found}"),
    )
}

/// Encoded body plus what the frame header needs to know about it.
#[derive(Debug)]
pub struct EncodedPayload {
    pub bytes: Vec<u8>,
    pub flags: HeaderFlags,
    /// Hash of the root object's registered type, 0 for non-object roots.
    pub type_hash: u32,
    pub object_count: usize,
    pub peak_depth: usize,
}

/// One-shot encoder; consumed by [`Encoder::encode`].
pub struct Encoder<'r> {
    registry: &'r TypeRegistry,
    caps: Capabilities,
    encoding: StringEncoding,
    flags: BehaviorFlags,
    writer: WireWriter,
    refs: ReferenceTracker,
    guard: ResourceGuard,
    interned: HashMap<String, u32>,
    envelope_depth: usize,
    /// Active `encode_value` calls.
    nesting: usize,
}

impl<'r> Encoder<'r> {
    /// `buf` is reused as the output buffer; it is cleared first.
    pub fn new(registry: &'r TypeRegistry, options: &SerializeOptions, mut buf: Vec<u8>) -> Self {
        buf.clear();
        let caps = options.capabilities();
        let limits = *options.limits();
        Self {
            registry,
            caps,
            encoding: options.string_encoding(),
            flags: options.flags(),
            writer: WireWriter::new(
                buf,
                options.endianness(),
                caps.bit_packed,
                limits.max_payload_size,
            ),
            refs: ReferenceTracker::new(),
            guard: ResourceGuard::new(limits, options.timeout_ms(), None),
            interned: HashMap::new(),
            envelope_depth: 0,
            nesting: 0,
        }
    }

    /// Write the preamble and `root`, declared as `declared`.
    pub fn encode(mut self, root: &Value, declared: &TypeRef) -> Result<EncodedPayload> {
        let root_type = match root {
            Value::Object(handle) => {
                let name = handle.type_name()?;
                if name.is_empty() {
                    None
                } else {
                    Some(self.registry.resolve(&name)?)
                }
            }
            _ => None,
        };

        let mut flags = self.caps.to_flags();
        let schema = root_type.as_ref().map_or(0, |r| r.schema_version());
        self.writer.write_varint(u64::from(schema))?;
        self.writer.write_u8(self.encoding.id())?;
        if let Some(registration) = &root_type {
            if self.flags.contains(BehaviorFlags::INCLUDE_TYPE_INFO) {
                self.write_name(registration.name())?;
                flags |= HeaderFlags::HAS_TYPE_INFO;
            }
        }
        if self.flags.contains(BehaviorFlags::INTERN_STRINGS) {
            flags |= HeaderFlags::STRING_INTERN;
        }

        self.encode_value(root, declared)?;

        trace!(
            bytes = self.writer.len(),
            objects = self.guard.object_count(),
            interned = self.interned.len(),
            "payload encoded"
        );
        Ok(EncodedPayload {
            type_hash: root_type.as_ref().map_or(0, |r| r.type_hash()),
            object_count: self.guard.object_count(),
            peak_depth: self.guard.peak_depth(),
            flags,
            bytes: self.writer.into_inner(),
        })
    }

    fn encode_value(&mut self, value: &Value, declared: &TypeRef) -> Result<()> {
        self.nesting += 1;
        let level = self.nesting;
        let result = stack::grow(level, || self.write_value(value, declared));
        self.nesting -= 1;
        result
    }

    fn write_value(&mut self, value: &Value, declared: &TypeRef) -> Result<()> {
        if !declared.accepts(value) {
            return Err(mismatch(declared, value.kind_name()));
        }
        match value {
            Value::Null => self.writer.write_u8(tag::NULL),
            Value::Enum(v) => {
                self.writer.write_u8(tag::ENUM)?;
                self.writer.write_i64(*v)
            }
            Value::Array(items) => {
                let element = declared.element().unwrap_or(&ANY);
                self.writer.write_u8(tag::ARRAY)?;
                self.write_sequence(items, |enc, item| enc.encode_value(item, element))
            }
            Value::Map(entries) => {
                let (key_type, value_type) = match declared {
                    TypeRef::Map(k, v) => (k.as_ref(), v.as_ref()),
                    _ => (&ANY, &ANY),
                };
                self.writer.write_u8(tag::MAP)?;
                self.write_sequence(entries, |enc, (k, v)| {
                    enc.encode_value(k, key_type)?;
                    enc.encode_value(v, value_type)
                })
            }
            Value::Object(handle) => self.encode_object(handle, declared),
            Value::String(s) => self.encode_string(s),
            other => self.encode_builtin(other),
        }
    }

    fn encode_builtin(&mut self, value: &Value) -> Result<()> {
        let code = value.type_code().ok_or_else(|| {
            SerializerError::new(
                ErrorCode::InternalError,
                format!("{} is not a built-in value", value.kind_name()),
            )
        })?;
        let w = &mut self.writer;
        w.write_u8(code.as_u8())?;
        match value {
            Value::Bool(b) => w.write_u8(u8::from(*b)),
            Value::I8(v) => w.write_u8(*v as u8),
            Value::U8(v) => w.write_u8(*v),
            Value::I16(v) => w.write_i16(*v),
            Value::U16(v) => w.write_u16(*v),
            Value::I32(v) => w.write_i32(*v),
            Value::U32(v) => w.write_u32(*v),
            Value::I64(v) => w.write_i64(*v),
            Value::U64(v) => w.write_u64(*v),
            Value::F32(v) => w.write_f32(*v),
            Value::F64(v) => w.write_f64(*v),
            Value::Decimal(d) => {
                w.write_i128_fixed(d.mantissa())?;
                w.write_u8(d.scale())
            }
            Value::Char(c) => w.write_u32(u32::from(*c)),
            Value::DateTime(t) => {
                w.write_i64(t.timestamp())?;
                w.write_u32(t.timestamp_subsec_nanos())
            }
            Value::TimeSpan(d) => {
                w.write_i64(d.num_seconds())?;
                w.write_i32(d.subsec_nanos())
            }
            Value::Guid(id) => w.write_bytes(id.as_bytes()),
            Value::Bytes(bytes) => {
                w.write_len(bytes.len())?;
                w.write_bytes(bytes)
            }
            Value::DateTimeOffset(t) => {
                w.write_i64(t.timestamp())?;
                w.write_u32(t.timestamp_subsec_nanos())?;
                w.write_i32(t.offset().local_minus_utc())
            }
            _ => Err(SerializerError::new(
                ErrorCode::InternalError,
                format!("no wire form for {}", value.kind_name()),
            )),
        }
    }

    fn interning_active(&self) -> bool {
        self.flags.contains(BehaviorFlags::INTERN_STRINGS) && self.envelope_depth == 0
    }

    fn encode_string(&mut self, s: &str) -> Result<()> {
        if self.interning_active() {
            if let Some(&index) = self.interned.get(s) {
                self.writer.write_u8(tag::INTERNED_STRING)?;
                return self.writer.write_varint(u64::from(index));
            }
            let index = self.interned.len() as u32;
            self.interned.insert(s.to_owned(), index);
        }
        self.writer.write_u8(TypeCode::String.as_u8())?;
        self.write_string(s)
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        let max = self.guard.limits().max_string_length;
        let check = |units: usize| -> Result<()> {
            if units > max {
                return Err(SerializerError::new(
                    ErrorCode::StringTooLong,
                    format!("string of {units} units exceeds {max}"),
                ));
            }
            Ok(())
        };
        match self.encoding {
            StringEncoding::Utf8 => {
                check(s.len())?;
                self.writer.write_len(s.len())?;
                self.writer.write_bytes(s.as_bytes())
            }
            StringEncoding::Utf16 => {
                let units: Vec<u16> = s.encode_utf16().collect();
                check(units.len())?;
                self.writer.write_len(units.len())?;
                for unit in units {
                    self.writer.write_u16_fixed(unit)?;
                }
                Ok(())
            }
            StringEncoding::Ascii => {
                if !s.is_ascii() {
                    return Err(SerializerError::new(
                        ErrorCode::InvalidEncoding,
                        "string is not ASCII",
                    ));
                }
                check(s.len())?;
                self.writer.write_len(s.len())?;
                self.writer.write_bytes(s.as_bytes())
            }
            StringEncoding::Latin1 => {
                let bytes = s
                    .chars()
                    .map(|c| {
                        u8::try_from(u32::from(c)).map_err(|_| {
                            SerializerError::new(
                                ErrorCode::InvalidEncoding,
                                format!("{c:?} is outside Latin-1"),
                            )
                        })
                    })
                    .collect::<Result<Vec<u8>>>()?;
                check(bytes.len())?;
                self.writer.write_len(bytes.len())?;
                self.writer.write_bytes(&bytes)
            }
        }
    }

    /// Type and member names; never interned.
    fn write_name(&mut self, name: &str) -> Result<()> {
        self.writer.write_varint(name.len() as u64)?;
        self.writer.write_bytes(name.as_bytes())
    }

    /// Count-prefixed elements, or 0-terminated chunks when streaming.
    fn write_sequence<T>(
        &mut self,
        items: &[T],
        mut encode: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        let max = self.guard.limits().max_collection_count;
        if items.len() > max {
            return Err(SerializerError::new(
                ErrorCode::CollectionTooLarge,
                format!("collection of {} elements exceeds {max}", items.len()),
            ));
        }
        self.guard.enter()?;
        if self.caps.streaming {
            for chunk in items.chunks(STREAM_CHUNK_SIZE) {
                self.guard.check_interrupt()?;
                self.writer.write_len(chunk.len())?;
                for item in chunk {
                    encode(self, item)?;
                }
            }
            self.writer.write_len(0)?;
        } else {
            self.writer.write_len(items.len())?;
            for (index, item) in items.iter().enumerate() {
                self.guard.tick(index)?;
                encode(self, item)?;
            }
        }
        self.guard.exit();
        Ok(())
    }

    /// Run `encode` against an empty buffer and return what it wrote.
    fn nested(&mut self, encode: impl FnOnce(&mut Self) -> Result<()>) -> Result<Vec<u8>> {
        let outer = self.writer.replace_buffer(Vec::new());
        let result = encode(self);
        let inner = self.writer.replace_buffer(outer);
        result.map(|_| inner)
    }

    fn encode_object(&mut self, handle: &ObjectRef, declared: &TypeRef) -> Result<()> {
        let addr = handle.addr();
        if let Some(index) = self.refs.active_index(addr) {
            if !self.caps.references {
                return Err(self.refs.cycle_error(index).into());
            }
        }
        if self.caps.references {
            if let Some(id) = self.refs.lookup(addr) {
                self.writer.write_u8(tag::BACK_REFERENCE)?;
                return self.writer.write_varint(u64::from(id));
            }
        }

        let node = handle.read()?;
        if node.type_name().is_empty() {
            if let TypeRef::Named(name) = declared {
                return Err(mismatch(declared, &format!("an anonymous object, not {name}")));
            }
            return self.encode_anonymous(addr, &node);
        }

        let registration = self.registry.resolve(node.type_name())?;
        match declared {
            TypeRef::Named(name) if name == registration.name() => {
                self.encode_body(addr, &node, &registration)
            }
            _ if self.caps.type_tags => {
                if let TypeRef::Named(name) = declared {
                    if !self.registry.is_assignable(&registration, name) {
                        return Err(mismatch(declared, registration.name()));
                    }
                }
                self.encode_envelope(addr, &node, &registration)
            }
            _ => Err(SerializerError::new(
                ErrorCode::TypeMismatch,
                format!(
                    "declared {declared} holds {}; the mode has no type tags",
                    registration.name()
                ),
            )),
        }
    }

    fn encode_envelope(
        &mut self,
        addr: usize,
        node: &Object,
        registration: &TypeRegistration,
    ) -> Result<()> {
        let ids_before = self.refs.allocated();
        self.envelope_depth += 1;
        let payload = self.nested(|enc| enc.encode_body(addr, node, registration));
        self.envelope_depth -= 1;
        let payload = payload?;

        self.writer.write_u8(tag::ENVELOPE)?;
        self.writer.write_u32_fixed(registration.type_hash())?;
        self.writer
            .write_varint(u64::from(self.refs.allocated() - ids_before))?;
        self.writer.write_len(payload.len())?;
        self.writer.write_bytes(&payload)
    }

    fn encode_body(
        &mut self,
        addr: usize,
        node: &Object,
        registration: &TypeRegistration,
    ) -> Result<()> {
        self.guard.enter()?;
        self.guard.enter_object()?;
        self.refs.enter(addr, registration.name());
        self.writer.write_u8(tag::OBJECT)?;
        if self.caps.debug_info {
            self.write_name(registration.name())?;
        }
        if self.caps.keyed {
            self.encode_keyed(node, registration)?;
        } else {
            self.encode_positional(node, registration)?;
        }
        self.refs.exit();
        self.guard.exit();
        Ok(())
    }

    fn encode_positional(&mut self, node: &Object, registration: &TypeRegistration) -> Result<()> {
        for member in registration.bind(false) {
            let fallback;
            let value = match node.get(member.name()) {
                Some(v) => v,
                None => {
                    fallback = member.fallback_value().unwrap_or(Value::Null);
                    &fallback
                }
            };
            self.encode_value(value, member.value_type())
                .map_err(|e| in_member(e, registration.name(), member.name()))?;
        }
        Ok(())
    }

    fn encode_keyed(&mut self, node: &Object, registration: &TypeRegistration) -> Result<()> {
        let skip_null = self.flags.contains(BehaviorFlags::IGNORE_NULL_VALUES);
        let skip_default = self.flags.contains(BehaviorFlags::IGNORE_DEFAULT_VALUES);

        let mut entries: Vec<(&MemberBinding, &Value)> = Vec::new();
        for member in registration.bind(true) {
            let Some(value) = node.get(member.name()) else {
                continue;
            };
            if skip_null && value.is_null() {
                continue;
            }
            if skip_default && member.fallback_value().as_ref() == Some(value) {
                continue;
            }
            entries.push((member, value));
        }
        let retained: Vec<&UnknownMember> = node
            .unknown()
            .iter()
            .filter(|u| registration.member_by_key(u.key).is_none())
            .collect();

        self.writer.write_len(entries.len() + retained.len())?;
        for (member, value) in entries {
            self.write_entry(member.key(), member.wire_name(), |enc| {
                enc.encode_value(value, member.value_type())
            })
            .map_err(|e| in_member(e, registration.name(), member.name()))?;
        }
        for unknown in retained {
            let wire_name = unknown
                .wire_name
                .clone()
                .unwrap_or_else(|| anonymous_member_name(unknown.key));
            self.write_entry(unknown.key, &wire_name, |enc| {
                enc.encode_value(&unknown.value, &ANY)
            })?;
        }
        Ok(())
    }

    /// Objects decoded without a registration; their fields are named `#<key>`.
    fn encode_anonymous(&mut self, addr: usize, node: &Object) -> Result<()> {
        if !self.caps.keyed {
            return Err(SerializerError::new(
                ErrorCode::TypeMismatch,
                "anonymous objects need a keyed layout",
            ));
        }
        self.guard.enter()?;
        self.guard.enter_object()?;
        self.refs.enter(addr, "<anonymous>");
        self.writer.write_u8(tag::OBJECT)?;
        if self.caps.debug_info {
            self.write_name("")?;
        }
        self.writer.write_len(node.len())?;
        for (name, value) in node.fields() {
            let key = anonymous_member_key(name)?;
            self.write_entry(key, name, |enc| enc.encode_value(value, &ANY))?;
        }
        self.refs.exit();
        self.guard.exit();
        Ok(())
    }

    /// `key [wire name] len value`
    fn write_entry(
        &mut self,
        key: u32,
        wire_name: &str,
        encode: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.writer.write_varint(u64::from(key))?;
        if self.caps.debug_info {
            self.write_name(wire_name)?;
        }
        let value = self.nested(encode)?;
        self.writer.write_len(value.len())?;
        self.writer.write_bytes(&value)
    }
}
