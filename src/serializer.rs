//! # Serializer Entry Points
//!
//! [`BinarySerializer`] ties the registry, the member walk and the transform pipeline
//! together. Every public call validates its options, runs to completion on the calling
//! thread, and reports through an [`Outcome`](crate::result::Outcome) instead of
//! panicking or returning early with `?`.
//!
//! ## Encode Path
//! ```text
//! options.validate -> Encoder (pooled buffer) -> seal -> frame
//! ```
//!
//! ## Decode Path
//! ```text
//! open_header -> mode check -> open_body (checksum, decrypt, decompress) -> decode_payload
//! ```
//!
//! ## Example
//! ```rust
//! use afrs::{binary_object, BinarySerializer, DeserializeOptions, SerializeOptions};
//!
//! #[derive(Debug, Clone, PartialEq, Default)]
//! struct Score {
//!     player: String,
//!     points: u32,
//! }
//!
//! binary_object! {
//!     Score => "docs.Score", schema = 1 {
//!         player: String = 0,
//!         points: u32 = 1,
//!     }
//! }
//!
//! let serializer = BinarySerializer::new();
//! let score = Score { player: "ada".into(), points: 12 };
//!
//! let frame = serializer
//!     .serialize(&score, &SerializeOptions::default())
//!     .into_value()
//!     .unwrap_or_default();
//! let back: Option<Score> = serializer
//!     .deserialize(&frame, &DeserializeOptions::default())
//!     .into_value();
//! assert_eq!(back, Some(score));
//! ```

use crate::config::{DeserializeOptions, SerializeOptions};
use crate::core::bind::{Describe, FromValue, ToValue};
use crate::core::decoder::{decode_payload, DecodedPayload};
use crate::core::encoder::Encoder;
use crate::core::header::{HeaderFlags, WireHeader};
use crate::core::mode::Capabilities;
use crate::core::value::Value;
use crate::error::{ErrorCode, Result, SerializerError};
use crate::metadata::descriptor::TypeRef;
use crate::metadata::registry::{self, TypeRegistration, TypeRegistry};
use crate::result::{DeserializeResult, Outcome, SerializeResult, Statistics};
use crate::transform::checksum::ChecksumAlgorithm;
use crate::transform::pipeline;
use crate::utils::buffer_pool::{global_pool, BufferPool};
use crate::utils::metrics::{global_metrics, Timer};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Header facts available without decoding the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInfo {
    pub header: WireHeader,
    pub capabilities: Capabilities,
    pub checksum: ChecksumAlgorithm,
    /// Registered name of the root type, when its hash is known to the registry.
    pub type_name: Option<String>,
}

impl FrameInfo {
    pub fn is_compressed(&self) -> bool {
        self.header.flags().contains(HeaderFlags::COMPRESSED)
    }

    pub fn is_encrypted(&self) -> bool {
        self.header.flags().contains(HeaderFlags::ENCRYPTED)
    }
}

fn record_failure(err: &SerializerError, serialize: bool) {
    let metrics = global_metrics();
    if serialize {
        metrics.record_serialize_failure();
    } else {
        metrics.record_deserialize_failure();
    }
    if matches!(
        err.code(),
        ErrorCode::ChecksumFailed | ErrorCode::AuthenticationFailed
    ) {
        metrics.record_integrity_failure();
    }
    debug!(code = err.code().as_u16(), error = %err, "operation failed");
}

/// Encodes and decodes frames against one type registry.
#[derive(Clone)]
pub struct BinarySerializer {
    registry: Arc<TypeRegistry>,
    pool: BufferPool,
}

impl Default for BinarySerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl BinarySerializer {
    /// Serializer over the process-wide registry and buffer pool.
    pub fn new() -> Self {
        Self::with_registry(registry::global())
    }

    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            pool: global_pool().clone(),
        }
    }

    /// Use `pool` for raw payload buffers instead of the global pool.
    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Register the user types `T` refers to.
    pub fn register<T: Describe>(&self) -> Result<()> {
        T::register_into(&self.registry)
    }

    /// Register a hand-built registration, e.g. for types only seen as [`Value`]s.
    pub fn register_type(&self, registration: TypeRegistration) -> Result<Arc<TypeRegistration>> {
        self.registry.register(registration)
    }

    /// Encode `value` into a frame.
    pub fn serialize<T: ToValue + Describe>(
        &self,
        value: &T,
        options: &SerializeOptions,
    ) -> SerializeResult {
        let prepared = T::register_into(&self.registry).map(|()| value.to_value());
        match prepared {
            Ok(root) => self.serialize_value(&root, &T::type_ref(), options),
            Err(err) => {
                record_failure(&err, true);
                err.into()
            }
        }
    }

    /// Encode a dynamic value declared as `declared`.
    #[instrument(skip_all, fields(mode = options.mode().name()))]
    pub fn serialize_value(
        &self,
        root: &Value,
        declared: &TypeRef,
        options: &SerializeOptions,
    ) -> SerializeResult {
        let result = self.try_serialize(root, declared, options);
        if let Err(err) = &result {
            record_failure(err, true);
        }
        result.into()
    }

    /// Decode a frame into `T`.
    pub fn deserialize<T: FromValue + Describe>(
        &self,
        bytes: &[u8],
        options: &DeserializeOptions,
    ) -> DeserializeResult<T> {
        if let Err(err) = T::register_into(&self.registry) {
            record_failure(&err, false);
            return err.into();
        }
        let declared = T::type_ref();
        self.deserialize_value(bytes, Some(&declared), options)
            .and_then(|value, stats| match T::from_value(value) {
                Ok(typed) => Outcome::success(typed, stats),
                Err(err) => {
                    record_failure(&err, false);
                    err.into()
                }
            })
    }

    /// Decode a frame into a dynamic value. `declared` of `None` accepts whatever root
    /// the frame carries.
    #[instrument(skip_all, fields(len = bytes.len()))]
    pub fn deserialize_value(
        &self,
        bytes: &[u8],
        declared: Option<&TypeRef>,
        options: &DeserializeOptions,
    ) -> DeserializeResult<Value> {
        let result = self.try_deserialize(bytes, declared, options);
        if let Err(err) = &result {
            record_failure(err, false);
        }
        result.into()
    }

    /// Parse and validate the header without touching the body.
    pub fn inspect(&self, bytes: &[u8]) -> Result<FrameInfo> {
        let header = WireHeader::read_from(bytes)?;
        header.validate()?;
        Ok(FrameInfo {
            capabilities: Capabilities::from_flags(header.flags()),
            checksum: pipeline::frame_checksum(&header)?,
            type_name: self
                .registry
                .get_by_hash(header.type_hash())
                .map(|r| r.name().to_string()),
            header,
        })
    }

    /// Check header and payload integrity without decrypting or decoding.
    pub fn verify(&self, bytes: &[u8], options: &DeserializeOptions) -> Result<FrameInfo> {
        options.validate_strict()?;
        let header = pipeline::open_header(bytes, options)?;
        let body_end = header.frame_len();
        header.validate_data_checksum(&bytes[crate::core::header::HEADER_SIZE..body_end])?;
        self.inspect(&bytes[..body_end])
    }

    fn try_serialize(
        &self,
        root: &Value,
        declared: &TypeRef,
        options: &SerializeOptions,
    ) -> Result<(Bytes, Statistics)> {
        let timer = Timer::start("serialize");
        options.validate_strict()?;

        let mut scratch = self.pool.try_acquire()?;
        let encoded = Encoder::new(&self.registry, options, scratch.take()).encode(root, declared)?;

        let mut frame = Vec::with_capacity(encoded.bytes.len() + crate::core::header::HEADER_SIZE);
        let sealed = pipeline::seal(
            &encoded.bytes,
            encoded.flags,
            encoded.type_hash,
            options,
            &mut frame,
        );
        scratch.restore(encoded.bytes);
        let report = sealed?;

        global_metrics().record_serialized(
            report.frame_size as u64,
            report.compressed,
            report.encrypted,
        );
        let stats = Statistics {
            bytes_written: report.frame_size,
            payload_size: report.payload_size,
            object_count: encoded.object_count,
            peak_depth: encoded.peak_depth,
            compressed: report.compressed,
            encrypted: report.encrypted,
            schema_version: 0,
            migrations: 0,
            layout_reinterpreted: false,
            bytes_read: 0,
            elapsed: timer.elapsed(),
        };
        debug!(
            frame = report.frame_size,
            payload = report.payload_size,
            objects = encoded.object_count,
            "serialized"
        );
        Ok((Bytes::from(frame), stats))
    }

    fn try_deserialize(
        &self,
        bytes: &[u8],
        declared: Option<&TypeRef>,
        options: &DeserializeOptions,
    ) -> Result<(Value, Statistics)> {
        let timer = Timer::start("deserialize");
        options.validate_strict()?;

        let header = pipeline::open_header(bytes, options)?;
        if let Some(expected) = options.expected_capabilities() {
            let actual = Capabilities::from_flags(header.flags());
            if !expected.structurally_matches(actual) {
                warn!(?expected, ?actual, "frame mode differs from configured mode");
                return Err(SerializerError::new(
                    ErrorCode::IncompatibleSchemaChange,
                    format!("frame was written with {actual:?}, expected {expected:?}"),
                ));
            }
        }

        let payload = pipeline::open_body(&header, bytes, options.key())?;
        let DecodedPayload {
            value,
            schema_version,
            type_name,
            object_count,
            peak_depth,
            migrations,
            layout_reinterpreted,
        } = decode_payload(&self.registry, options, &header, &payload, declared)?;

        let flags = header.flags();
        global_metrics().record_deserialized(header.frame_len() as u64);
        debug!(
            frame = header.frame_len(),
            root = type_name.as_deref().unwrap_or("-"),
            objects = object_count,
            migrations,
            "deserialized"
        );
        Ok((
            value,
            Statistics {
                bytes_read: header.frame_len(),
                payload_size: payload.len(),
                object_count,
                peak_depth,
                compressed: flags.contains(HeaderFlags::COMPRESSED),
                encrypted: flags.contains(HeaderFlags::ENCRYPTED),
                schema_version,
                migrations,
                layout_reinterpreted,
                bytes_written: 0,
                elapsed: timer.elapsed(),
            },
        ))
    }
}

/// [`BinarySerializer::serialize`] on the global registry.
pub fn serialize<T: ToValue + Describe>(value: &T, options: &SerializeOptions) -> SerializeResult {
    BinarySerializer::new().serialize(value, options)
}

/// [`BinarySerializer::deserialize`] on the global registry.
pub fn deserialize<T: FromValue + Describe>(
    bytes: &[u8],
    options: &DeserializeOptions,
) -> DeserializeResult<T> {
    BinarySerializer::new().deserialize(bytes, options)
}
