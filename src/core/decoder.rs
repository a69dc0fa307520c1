//! Tagged payload to object graph.
//!
//! The decoder mirrors [`Encoder`](super::encoder::Encoder) choice for choice, driven by
//! the capabilities recorded in the header rather than by the caller's options. Input
//! is untrusted: every count and length passes through the [`ResourceGuard`] before
//! anything is allocated for it, and every failure is reported as a
//! [`DeserializationError`] carrying the byte position and, where known, the type and
//! member being decoded.

use super::buffer::WireReader;
use super::encoder::{anonymous_member_name, ANY};
use super::header::{HeaderFlags, WireHeader};
use super::mode::Capabilities;
use super::stack;
use super::value::{Decimal, Object, ObjectRef, UnknownMember, Value};
use super::{tag, STREAM_CHUNK_SIZE};
use crate::config::{BehaviorFlags, DeserializeOptions, StringEncoding};
use crate::error::{constants, DeserializationError, ErrorCode, Result, SerializerError};
use crate::metadata::{TypeCode, TypeRef, TypeRegistration, TypeRegistry};
use crate::policy::guard::StringAdmission;
use crate::policy::version::UnknownMemberAction;
use crate::policy::{
    MigrationContext, MigrationPolicy, ReferenceTable, ResourceGuard, UnionFallbackBehavior,
};
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, TimeDelta};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

fn failure(code: ErrorCode, message: impl Into<std::borrow::Cow<'static, str>>) -> SerializerError {
    SerializerError::new(code, message)
}

fn mismatch(declared: &TypeRef, found: &str) -> SerializerError {
    failure(
        ErrorCode::TypeMismatch,
        format!("declared {declared}, payload holds {found}"),
    )
}

/// Registered default instance: every member with an explicit default or zero value.
pub fn default_instance(registration: &TypeRegistration) -> Object {
    let mut object = Object::new(registration.name());
    for member in registration.bind(false) {
        if let Some(value) = member.fallback_value() {
            object.set(member.name(), value);
        }
    }
    object
}

/// Result of decoding one payload.
#[derive(Debug)]
pub struct DecodedPayload {
    pub value: Value,
    /// Schema version recorded by the writer.
    pub schema_version: u32,
    /// Registered root type, when the root is an object.
    pub type_name: Option<String>,
    pub object_count: usize,
    pub peak_depth: usize,
    /// Objects handed to the migrator.
    pub migrations: usize,
    pub layout_reinterpreted: bool,
}

/// Decode `payload`, the plain body of the frame described by `header`.
///
/// `declared` is the caller's expected root type; `None` takes the type from the
/// header.
pub fn decode_payload(
    registry: &TypeRegistry,
    options: &DeserializeOptions,
    header: &WireHeader,
    payload: &[u8],
    declared: Option<&TypeRef>,
) -> Result<DecodedPayload> {
    let flags = header.flags();
    let caps = Capabilities::from_flags(flags);
    let guard = ResourceGuard::new(
        *options.limits(),
        options.timeout_ms(),
        options.cancellation().cloned(),
    );
    let mut decoder = Decoder {
        registry,
        options,
        reader: WireReader::new(payload, header.endianness(), caps.bit_packed),
        caps,
        encoding: StringEncoding::Utf8,
        interning: flags.contains(HeaderFlags::STRING_INTERN),
        interned: Vec::new(),
        refs: ReferenceTable::new(),
        guard,
        policy: None,
        root_type: None,
        envelope_depth: 0,
        discarding: 0,
        migrations: 0,
        nesting: 0,
    };
    decoder
        .run(flags, header.type_hash(), declared)
        .map_err(|e| decoder.locate(e, None, None))
}

#[derive(Default)]
struct Body {
    fields: Vec<(String, Value)>,
    unknown: Vec<UnknownMember>,
    skipped: Vec<String>,
    saw_unknown: bool,
}

impl Body {
    fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name) || self.skipped.iter().any(|n| n == name)
    }
}

struct Decoder<'a> {
    registry: &'a TypeRegistry,
    options: &'a DeserializeOptions,
    reader: WireReader<'a>,
    caps: Capabilities,
    encoding: StringEncoding,
    interning: bool,
    interned: Vec<String>,
    refs: ReferenceTable,
    guard: ResourceGuard,
    /// Set once the preamble is read.
    policy: Option<MigrationPolicy>,
    root_type: Option<String>,
    envelope_depth: usize,
    /// Nesting of ignored members being parsed only to keep ids and interning aligned.
    discarding: usize,
    migrations: usize,
    /// Active `decode_value` calls.
    nesting: usize,
}

impl<'a> Decoder<'a> {
    fn run(
        &mut self,
        flags: HeaderFlags,
        type_hash: u32,
        declared: Option<&TypeRef>,
    ) -> Result<DecodedPayload> {
        self.guard.check_interrupt()?;

        let schema_version = u32::try_from(self.reader.read_varint()?).map_err(|_| {
            failure(ErrorCode::DataCorrupted, "schema version exceeds 32 bits")
        })?;
        self.encoding = StringEncoding::from_id(self.reader.read_u8()?)?;
        let preamble_name = if flags.contains(HeaderFlags::HAS_TYPE_INFO) {
            Some(self.read_name()?)
        } else {
            None
        };

        let root = self.resolve_root(type_hash, preamble_name.as_deref(), declared)?;
        let target_schema = self
            .options
            .target_schema_version()
            .unwrap_or_else(|| root.as_ref().map_or(0, |r| r.schema_version()));
        let policy = MigrationPolicy::evaluate(
            self.options.migration(),
            schema_version,
            target_schema,
            self.caps.keyed,
            self.options.migrator().is_some(),
            self.options.flags(),
        )?;
        if policy.migration_required {
            debug!(
                from = schema_version,
                to = target_schema,
                strategy = ?self.options.migration(),
                "reconciling schema versions"
            );
        }
        self.policy = Some(policy);
        self.root_type = root.as_ref().map(|r| r.name().to_owned());

        let declared = match (declared, &root) {
            (Some(d), _) => d.clone(),
            (None, Some(r)) => TypeRef::named(r.name()),
            (None, None) => TypeRef::Any,
        };
        let value = self.decode_value(&declared)?.unwrap_or(Value::Null);

        if !self.reader.is_exhausted()
            && !self
                .options
                .has_flag(BehaviorFlags::ALLOW_TRAILING_DATA)
        {
            return Err(failure(
                ErrorCode::TrailingData,
                format!(
                    "{}: {} bytes",
                    constants::ERR_TRAILING_BYTES,
                    self.reader.remaining()
                ),
            ));
        }

        trace!(
            objects = self.guard.object_count(),
            peak_depth = self.guard.peak_depth(),
            "payload decoded"
        );
        Ok(DecodedPayload {
            value,
            schema_version,
            type_name: self.root_type.clone(),
            object_count: self.guard.object_count(),
            peak_depth: self.guard.peak_depth(),
            migrations: self.migrations,
            layout_reinterpreted: policy.reinterpreted_layout,
        })
    }

    fn resolve_root(
        &self,
        type_hash: u32,
        preamble_name: Option<&str>,
        declared: Option<&TypeRef>,
    ) -> Result<Option<Arc<TypeRegistration>>> {
        if type_hash == 0 {
            return Ok(None);
        }
        let registration = self.registry.get_by_hash(type_hash).ok_or_else(|| {
            failure(
                ErrorCode::UnknownType,
                format!(
                    "root type hash {type_hash:#010x} ({}) is not registered",
                    preamble_name.unwrap_or("unnamed")
                ),
            )
        })?;
        if let Some(name) = preamble_name {
            if name != registration.name() {
                return Err(failure(
                    ErrorCode::DataCorrupted,
                    format!(
                        "preamble names {name} but the header hash belongs to {}",
                        registration.name()
                    ),
                ));
            }
        }
        if let Some(TypeRef::Named(expected)) = declared {
            if !self.registry.is_assignable(&registration, expected) {
                return Err(mismatch(
                    &TypeRef::named(expected.as_str()),
                    registration.name(),
                ));
            }
        }
        Ok(Some(registration))
    }

    fn policy(&self) -> Result<MigrationPolicy> {
        self.policy.ok_or_else(|| {
            failure(ErrorCode::InternalError, "member walk started before the preamble")
        })
    }

    /// Attach the current position and context to plain failures.
    fn locate(
        &self,
        err: SerializerError,
        type_name: Option<&str>,
        member: Option<&str>,
    ) -> SerializerError {
        let (code, message) = match err {
            SerializerError::Deserialization(_) | SerializerError::CircularReference(_) => {
                return err
            }
            SerializerError::Failed { code, message } => (code, message.into_owned()),
            other => (other.code(), other.to_string()),
        };
        SerializerError::Deserialization(Box::new(DeserializationError {
            code,
            message,
            type_name: type_name.map(str::to_owned),
            member: member.map(str::to_owned),
            position: self.reader.position(),
        }))
    }

    /// `None` when a union fallback asked for the member to be skipped.
    fn decode_value(&mut self, declared: &TypeRef) -> Result<Option<Value>> {
        self.nesting += 1;
        let level = self.nesting;
        let result = stack::grow(level, || self.read_value(declared));
        self.nesting -= 1;
        result
    }

    fn read_value(&mut self, declared: &TypeRef) -> Result<Option<Value>> {
        let tag_byte = self.reader.read_u8()?;
        let value = match tag_byte {
            tag::NULL => Value::Null,
            tag::ENUM => Value::Enum(self.reader.read_i64()?),
            tag::ARRAY => {
                let element = match declared {
                    TypeRef::Array(e) | TypeRef::List(e) => e.as_ref(),
                    TypeRef::Any => &ANY,
                    other => return Err(mismatch(other, "array")),
                };
                Value::Array(self.read_sequence(1, |dec| {
                    Ok(dec.decode_value(element)?.unwrap_or(Value::Null))
                })?)
            }
            tag::MAP => {
                let (key_type, value_type) = match declared {
                    TypeRef::Map(k, v) => (k.as_ref(), v.as_ref()),
                    TypeRef::Any => (&ANY, &ANY),
                    other => return Err(mismatch(other, "map")),
                };
                Value::Map(self.read_sequence(2, |dec| {
                    let key = dec.decode_value(key_type)?.unwrap_or(Value::Null);
                    let value = dec.decode_value(value_type)?.unwrap_or(Value::Null);
                    Ok((key, value))
                })?)
            }
            tag::OBJECT => self.decode_object(declared)?,
            tag::ENVELOPE => return self.decode_envelope(declared),
            tag::BACK_REFERENCE => self.decode_back_reference(declared)?,
            tag::INTERNED_STRING => {
                if !self.interning || self.envelope_depth > 0 {
                    return Err(failure(
                        ErrorCode::UnexpectedToken,
                        "interned string outside an interning context",
                    ));
                }
                let index = self.reader.read_varint()?;
                let text = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.interned.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        failure(
                            ErrorCode::DataCorrupted,
                            format!(
                                "interned string {index} referenced before its first use ({} known)",
                                self.interned.len()
                            ),
                        )
                    })?;
                Value::String(text)
            }
            code => match TypeCode::try_from(code) {
                Ok(TypeCode::String) => {
                    let text = self.read_string()?;
                    if self.interning && self.envelope_depth == 0 {
                        self.interned.push(text.clone());
                    }
                    Value::String(text)
                }
                Ok(builtin) if builtin.is_builtin() => self.decode_builtin(builtin)?,
                _ => {
                    return Err(failure(
                        ErrorCode::UnexpectedToken,
                        format!("unknown value tag {code:#04x}"),
                    ))
                }
            },
        };
        if !declared.accepts(&value) {
            return Err(mismatch(declared, value.kind_name()));
        }
        Ok(Some(value))
    }

    fn decode_builtin(&mut self, code: TypeCode) -> Result<Value> {
        let invalid = |what: &str| failure(ErrorCode::InvalidData, format!("invalid {what}"));
        let r = &mut self.reader;
        Ok(match code {
            TypeCode::Bool => match r.read_u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => return Err(invalid(&format!("bool byte {other}"))),
            },
            TypeCode::I8 => Value::I8(r.read_u8()? as i8),
            TypeCode::U8 => Value::U8(r.read_u8()?),
            TypeCode::I16 => Value::I16(r.read_i16()?),
            TypeCode::U16 => Value::U16(r.read_u16()?),
            TypeCode::I32 => Value::I32(r.read_i32()?),
            TypeCode::U32 => Value::U32(r.read_u32()?),
            TypeCode::I64 => Value::I64(r.read_i64()?),
            TypeCode::U64 => Value::U64(r.read_u64()?),
            TypeCode::F32 => Value::F32(r.read_f32()?),
            TypeCode::F64 => Value::F64(r.read_f64()?),
            TypeCode::Decimal => {
                let mantissa = r.read_i128_fixed()?;
                let scale = r.read_u8()?;
                Value::Decimal(Decimal::new(mantissa, scale)?)
            }
            TypeCode::Char => {
                let raw = r.read_u32()?;
                Value::Char(char::from_u32(raw).ok_or_else(|| invalid(&format!("char {raw:#x}")))?)
            }
            TypeCode::DateTime => {
                let secs = r.read_i64()?;
                let nanos = r.read_u32()?;
                Value::DateTime(
                    DateTime::from_timestamp(secs, nanos).ok_or_else(|| invalid("timestamp"))?,
                )
            }
            TypeCode::TimeSpan => {
                let secs = r.read_i64()?;
                let nanos = r.read_i32()?;
                let span = TimeDelta::try_seconds(secs)
                    .and_then(|d| d.checked_add(&TimeDelta::nanoseconds(i64::from(nanos))))
                    .ok_or_else(|| invalid("time span"))?;
                Value::TimeSpan(span)
            }
            TypeCode::Guid => Value::Guid(
                Uuid::from_slice(r.read_slice(16)?).map_err(|e| invalid(&e.to_string()))?,
            ),
            TypeCode::ByteArray => {
                let len = r.read_len()?;
                if len > r.remaining() {
                    return Err(failure(
                        ErrorCode::DataTruncated,
                        format!("byte array of {len} bytes, {} remaining", r.remaining()),
                    ));
                }
                Value::Bytes(Bytes::copy_from_slice(r.read_slice(len)?))
            }
            TypeCode::DateTimeOffset => {
                let secs = r.read_i64()?;
                let nanos = r.read_u32()?;
                let offset = r.read_i32()?;
                let offset =
                    FixedOffset::east_opt(offset).ok_or_else(|| invalid("utc offset"))?;
                let utc = DateTime::from_timestamp(secs, nanos).ok_or_else(|| invalid("timestamp"))?;
                Value::DateTimeOffset(utc.with_timezone(&offset))
            }
            TypeCode::String | TypeCode::Custom => {
                return Err(failure(
                    ErrorCode::UnexpectedToken,
                    format!("{} is not a fixed built-in", code.name()),
                ))
            }
        })
    }

    fn read_string(&mut self) -> Result<String> {
        let units = self.reader.read_len()?;
        let admission = self.guard.check_string(
            units,
            self.encoding.unit_size(),
            self.reader.remaining(),
            self.options.out_of_range(),
        )?;
        let bad = |what: String| failure(ErrorCode::InvalidEncoding, what);
        let mut text = match self.encoding {
            StringEncoding::Utf8 => std::str::from_utf8(self.reader.read_slice(units)?)
                .map_err(|e| bad(format!("invalid UTF-8: {e}")))?
                .to_owned(),
            StringEncoding::Ascii => {
                let bytes = self.reader.read_slice(units)?;
                if !bytes.is_ascii() {
                    return Err(bad("non-ASCII byte in ASCII string".to_owned()));
                }
                bytes.iter().map(|&b| char::from(b)).collect()
            }
            StringEncoding::Latin1 => self
                .reader
                .read_slice(units)?
                .iter()
                .map(|&b| char::from(b))
                .collect(),
            StringEncoding::Utf16 => {
                let mut buf = Vec::with_capacity(units);
                for _ in 0..units {
                    buf.push(self.reader.read_u16_fixed()?);
                }
                if let StringAdmission::Truncate(max) = admission {
                    buf.truncate(max);
                    // Never split a surrogate pair.
                    if buf.last().is_some_and(|u| (0xD800..0xDC00).contains(u)) {
                        buf.pop();
                    }
                }
                String::from_utf16(&buf).map_err(|e| bad(format!("invalid UTF-16: {e}")))?
            }
        };
        match admission {
            StringAdmission::Full => {}
            StringAdmission::Empty => text.clear(),
            StringAdmission::Truncate(_) if self.encoding == StringEncoding::Utf16 => {}
            StringAdmission::Truncate(max) if self.encoding == StringEncoding::Utf8 => {
                let mut end = max.min(text.len());
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                text.truncate(end);
            }
            StringAdmission::Truncate(max) => text = text.chars().take(max).collect(),
        }
        Ok(text)
    }

    fn read_name(&mut self) -> Result<String> {
        let len = usize::try_from(self.reader.read_varint()?).unwrap_or(usize::MAX);
        let max = self.guard.limits().max_string_length;
        if len > max {
            return Err(failure(
                ErrorCode::StringTooLong,
                format!("name of {len} bytes exceeds {max}"),
            ));
        }
        std::str::from_utf8(self.reader.read_slice(len)?)
            .map(str::to_owned)
            .map_err(|e| failure(ErrorCode::InvalidEncoding, format!("type or member name: {e}")))
    }

    fn read_key(&mut self) -> Result<u32> {
        u32::try_from(self.reader.read_varint()?)
            .map_err(|_| failure(ErrorCode::DataCorrupted, "member key exceeds 32 bits"))
    }

    /// Count-prefixed elements, or 0-terminated chunks when streaming. Counts are
    /// admitted before anything is reserved for them.
    fn read_sequence<T>(
        &mut self,
        min_bytes_per_element: usize,
        mut decode: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        self.guard.enter()?;
        let mut items = Vec::new();
        if self.caps.streaming {
            loop {
                let chunk = self.reader.read_len()?;
                if chunk == 0 {
                    break;
                }
                if chunk > STREAM_CHUNK_SIZE {
                    return Err(failure(
                        ErrorCode::DataCorrupted,
                        format!("stream chunk of {chunk} elements exceeds {STREAM_CHUNK_SIZE}"),
                    ));
                }
                self.guard.check_collection(items.len() + chunk, 0, 0)?;
                self.guard
                    .check_collection(chunk, min_bytes_per_element, self.reader.remaining())?;
                items.reserve(chunk);
                for _ in 0..chunk {
                    self.guard.tick(items.len())?;
                    items.push(decode(self)?);
                }
            }
        } else {
            let count = self.reader.read_len()?;
            self.guard
                .check_collection(count, min_bytes_per_element, self.reader.remaining())?;
            items.reserve_exact(count);
            for index in 0..count {
                self.guard.tick(index)?;
                items.push(decode(self)?);
            }
        }
        self.guard.exit();
        Ok(items)
    }

    /// Decode one keyed entry value and check it spans exactly `len` bytes.
    fn read_entry(&mut self, len: usize, declared: &TypeRef) -> Result<Option<Value>> {
        let start = self.reader.position();
        let value = self.decode_value(declared)?;
        let consumed = self.reader.position() - start;
        if consumed != len {
            return Err(failure(
                ErrorCode::DataCorrupted,
                format!("entry declares {len} bytes but its value spans {consumed}"),
            ));
        }
        Ok(value)
    }

    /// Drop an unknown entry. Payloads with ids or interned strings are parsed anyway,
    /// since skipping their bytes would desynchronize both tables.
    fn discard_entry(&mut self, len: usize) -> Result<()> {
        if !self.caps.references && !self.interning {
            return self.reader.skip(len);
        }
        self.discarding += 1;
        let result = self.read_entry(len, &ANY);
        self.discarding -= 1;
        result.map(|_| ())
    }

    fn read_entry_header(&mut self) -> Result<(u32, Option<String>, usize)> {
        let key = self.read_key()?;
        let wire_name = if self.caps.debug_info {
            Some(self.read_name()?)
        } else {
            None
        };
        let len = self.reader.read_len()?;
        if len > self.reader.remaining() {
            return Err(failure(
                ErrorCode::DataTruncated,
                format!(
                    "entry {key} declares {len} bytes, {} remaining",
                    self.reader.remaining()
                ),
            ));
        }
        Ok((key, wire_name, len))
    }

    fn decode_object(&mut self, declared: &TypeRef) -> Result<Value> {
        let wire_name = if self.caps.debug_info {
            Some(self.read_name()?)
        } else {
            None
        };
        match declared {
            TypeRef::Named(name) => {
                if let Some(wire) = wire_name.as_deref() {
                    if wire != name {
                        return Err(mismatch(declared, wire));
                    }
                }
                let registration = self.registry.resolve(name)?;
                self.decode_body(&registration)
            }
            TypeRef::Any => self.decode_anonymous(),
            other => Err(mismatch(other, "object")),
        }
    }

    fn decode_body(&mut self, registration: &TypeRegistration) -> Result<Value> {
        registration.ensure_constructible()?;
        self.guard.enter()?;
        self.guard.enter_object()?;
        let handle = ObjectRef::new(Object::new(registration.name()));
        self.refs.register(handle.clone());

        let mut body = Body::default();
        if self.caps.keyed {
            self.read_keyed(registration, &mut body)?;
        } else {
            self.read_positional(registration, &mut body)?;
        }
        let missing = self.fill_missing(registration, &mut body)?;

        {
            let mut node = handle.write()?;
            for (name, value) in body.fields {
                node.set(name, value);
            }
            for member in body.unknown {
                node.push_unknown(member);
            }
            self.maybe_migrate(registration, &mut node, body.saw_unknown, missing)
                .map_err(|e| self.locate(e, Some(registration.name()), None))?;
        }
        self.guard.exit();
        Ok(Value::Object(handle))
    }

    fn read_positional(&mut self, registration: &TypeRegistration, body: &mut Body) -> Result<()> {
        for member in registration.bind(false) {
            let decoded = self
                .decode_value(member.value_type())
                .map_err(|e| self.locate(e, Some(registration.name()), Some(member.name())))?;
            match decoded {
                Some(value) => body.fields.push((member.name().to_owned(), value)),
                None => body.skipped.push(member.name().to_owned()),
            }
        }
        Ok(())
    }

    fn read_keyed(&mut self, registration: &TypeRegistration, body: &mut Body) -> Result<()> {
        let policy = self.policy()?;
        let count = self.reader.read_len()?;
        self.guard
            .check_collection(count, 2, self.reader.remaining())?;
        let mut seen = HashSet::with_capacity(count);
        for index in 0..count {
            self.guard.tick(index)?;
            let (key, wire_name, len) = self.read_entry_header()?;
            if !seen.insert(key) {
                return Err(self.locate(
                    failure(ErrorCode::DataCorrupted, format!("member key {key} repeated")),
                    Some(registration.name()),
                    None,
                ));
            }

            let declared = registration
                .member_by_key(key)
                .filter(|m| !m.is_ignored());
            if let Some(member) = declared {
                let decoded = self
                    .read_entry(len, member.value_type())
                    .map_err(|e| self.locate(e, Some(registration.name()), Some(member.name())))?;
                match decoded {
                    Some(value) => body.fields.push((member.name().to_owned(), value)),
                    None => body.skipped.push(member.name().to_owned()),
                }
                continue;
            }

            body.saw_unknown = true;
            match policy.unknown_members {
                UnknownMemberAction::Reject => {
                    return Err(self.locate(
                        failure(
                            ErrorCode::MemberNotFound,
                            format!("{} declares no member with key {key}", registration.name()),
                        ),
                        Some(registration.name()),
                        wire_name.as_deref(),
                    ));
                }
                UnknownMemberAction::Ignore => {
                    trace!(type_name = registration.name(), key, "ignoring unknown member");
                    self.discard_entry(len)?;
                }
                UnknownMemberAction::Retain => {
                    let value = self.read_entry(len, &ANY)?.unwrap_or(Value::Null);
                    body.unknown.push(UnknownMember {
                        key,
                        wire_name,
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply defaults or fail for declared members the payload did not carry.
    /// Returns their names.
    fn fill_missing(&self, registration: &TypeRegistration, body: &mut Body) -> Result<Vec<String>> {
        if !self.caps.keyed {
            return Ok(Vec::new());
        }
        let policy = self.policy()?;
        let mut missing = Vec::new();
        for member in registration.bind(true) {
            if body.has(member.name()) {
                continue;
            }
            if member.is_required() && policy.enforce_required {
                return Err(self.locate(
                    failure(
                        ErrorCode::MissingRequiredMember,
                        format!("required member {} is missing", member.name()),
                    ),
                    Some(registration.name()),
                    Some(member.name()),
                ));
            }
            missing.push(member.name().to_owned());
            if policy.use_default_for_missing {
                if let Some(value) = member.fallback_value() {
                    body.fields.push((member.name().to_owned(), value));
                }
            }
        }
        Ok(missing)
    }

    fn maybe_migrate(
        &mut self,
        registration: &TypeRegistration,
        node: &mut Object,
        saw_unknown: bool,
        missing_members: Vec<String>,
    ) -> Result<()> {
        let policy = self.policy()?;
        if self.root_type.as_deref() != Some(registration.name())
            || !policy.should_invoke(saw_unknown)
        {
            return Ok(());
        }
        let Some(migrator) = self.options.migrator() else {
            // Hybrid without a migrator keeps the retained members as they are.
            return Ok(());
        };
        let context = MigrationContext {
            type_name: registration.name().to_owned(),
            from_schema: policy.data_schema,
            to_schema: policy.target_schema,
            missing_members,
        };
        migrator.migrate(node, &context)?;
        self.migrations += 1;
        debug!(
            type_name = registration.name(),
            from = policy.data_schema,
            to = policy.target_schema,
            "object migrated"
        );
        Ok(())
    }

    /// Object decoded without a registration; fields are named `#<key>`.
    fn decode_anonymous(&mut self) -> Result<Value> {
        if !self.caps.keyed {
            return Err(failure(
                ErrorCode::UnexpectedToken,
                "untyped object in a positional payload",
            ));
        }
        self.guard.enter()?;
        self.guard.enter_object()?;
        let handle = ObjectRef::new(Object::new(""));
        self.refs.register(handle.clone());

        let count = self.reader.read_len()?;
        self.guard
            .check_collection(count, 2, self.reader.remaining())?;
        let mut fields = Vec::with_capacity(count);
        for index in 0..count {
            self.guard.tick(index)?;
            let (key, _, len) = self.read_entry_header()?;
            let value = self.read_entry(len, &ANY)?.unwrap_or(Value::Null);
            fields.push((anonymous_member_name(key), value));
        }
        {
            let mut node = handle.write()?;
            for (name, value) in fields {
                node.set(name, value);
            }
        }
        self.guard.exit();
        Ok(Value::Object(handle))
    }

    fn decode_back_reference(&mut self, declared: &TypeRef) -> Result<Value> {
        if !self.caps.references {
            return Err(failure(
                ErrorCode::UnexpectedToken,
                "back-reference in a payload without reference tracking",
            ));
        }
        let id = u32::try_from(self.reader.read_varint()?)
            .map_err(|_| failure(ErrorCode::InvalidReference, "back-reference id exceeds 32 bits"))?;
        let handle = self.refs.resolve(id)?;
        if let TypeRef::Named(expected) = declared {
            let actual = handle.type_name()?;
            let assignable = actual == *expected
                || self
                    .registry
                    .get(&actual)
                    .is_some_and(|r| self.registry.is_assignable(&r, expected));
            if !assignable {
                return Err(mismatch(declared, &actual));
            }
        }
        Ok(Value::Object(handle))
    }

    fn decode_envelope(&mut self, declared: &TypeRef) -> Result<Option<Value>> {
        if !self.caps.type_tags {
            return Err(failure(
                ErrorCode::UnexpectedToken,
                "type envelope in a payload without type tags",
            ));
        }
        let type_hash = self.reader.read_u32_fixed()?;
        let ids = usize::try_from(self.reader.read_varint()?)
            .map_err(|_| failure(ErrorCode::DataCorrupted, "envelope id count overflows"))?;
        let len = self.reader.read_len()?;
        if len > self.reader.remaining() {
            return Err(failure(
                ErrorCode::DataTruncated,
                format!("envelope declares {len} bytes, {} remaining", self.reader.remaining()),
            ));
        }

        match self.registry.get_by_hash(type_hash) {
            Some(registration) => {
                match declared {
                    TypeRef::Named(expected) => {
                        if !self.registry.is_assignable(&registration, expected) {
                            return Err(mismatch(declared, registration.name()));
                        }
                    }
                    TypeRef::Any => {}
                    other => return Err(mismatch(other, registration.name())),
                }
                self.read_envelope(len, ids, &registration, true).map(Some)
            }
            None if self.discarding > 0 => {
                self.skip_envelope(len, ids)?;
                Ok(Some(Value::Null))
            }
            None => self.union_fallback(type_hash, len, ids, declared),
        }
    }

    /// Decode the object inside an envelope. With `exact_ids` the declared id count
    /// must match; otherwise unused ids are burned so later back-references line up.
    fn read_envelope(
        &mut self,
        len: usize,
        ids: usize,
        registration: &TypeRegistration,
        exact_ids: bool,
    ) -> Result<Value> {
        let start = self.reader.position();
        let ids_before = self.refs.len();
        self.envelope_depth += 1;
        let result = self.read_enveloped_object(registration);
        self.envelope_depth -= 1;
        let value = result?;

        let consumed = self.reader.position() - start;
        if consumed != len {
            return Err(failure(
                ErrorCode::DataCorrupted,
                format!("envelope declares {len} bytes but its object spans {consumed}"),
            ));
        }
        let produced = self.refs.len() - ids_before;
        if produced > ids || (exact_ids && produced != ids) {
            return Err(failure(
                ErrorCode::DataCorrupted,
                format!("envelope declares {ids} objects but holds {produced}"),
            ));
        }
        self.refs.reserve(ids - produced);
        Ok(value)
    }

    fn read_enveloped_object(&mut self, registration: &TypeRegistration) -> Result<Value> {
        let tag_byte = self.reader.read_u8()?;
        if tag_byte != tag::OBJECT {
            return Err(failure(
                ErrorCode::UnexpectedToken,
                format!("envelope holds tag {tag_byte:#04x}, expected an object"),
            ));
        }
        if self.caps.debug_info {
            self.read_name()?;
        }
        self.decode_body(registration)
    }

    fn skip_envelope(&mut self, len: usize, ids: usize) -> Result<()> {
        self.refs.reserve(ids);
        self.reader.skip(len)
    }

    fn union_fallback(
        &mut self,
        type_hash: u32,
        len: usize,
        ids: usize,
        declared: &TypeRef,
    ) -> Result<Option<Value>> {
        let behavior = self.options.union_fallback();
        debug!(type_hash, ?behavior, "unregistered polymorphic type");
        match behavior {
            UnionFallbackBehavior::ThrowException => Err(failure(
                ErrorCode::UnknownType,
                format!("type hash {type_hash:#010x} is not registered"),
            )),
            UnionFallbackBehavior::ReturnNull => {
                self.skip_envelope(len, ids)?;
                Ok(Some(Value::Null))
            }
            UnionFallbackBehavior::Skip => {
                self.skip_envelope(len, ids)?;
                Ok(None)
            }
            UnionFallbackBehavior::ReturnDefault => {
                self.skip_envelope(len, ids)?;
                let value = match declared {
                    TypeRef::Named(name) => self
                        .registry
                        .get(name)
                        .filter(|r| r.kind().is_instantiable())
                        .map(|r| Value::object(default_instance(&r)))
                        .unwrap_or(Value::Null),
                    other => other.zero_value().unwrap_or(Value::Null),
                };
                Ok(Some(value))
            }
            UnionFallbackBehavior::UseFallbackType => {
                let name = self.options.fallback_type().ok_or_else(|| {
                    SerializerError::ConfigError(
                        "UseFallbackType requires a fallback type".to_owned(),
                    )
                })?;
                let registration = self.registry.resolve(name)?;
                self.read_envelope(len, ids, &registration, false).map(Some)
            }
        }
    }
}
