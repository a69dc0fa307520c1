//! # afrs
//!
//! Metadata-driven binary serialization with versioned framing.
//!
//! A frame is a fixed 32-byte header followed by a body. The body is the encoded object
//! graph, optionally compressed, then optionally encrypted, and covered by a checksum.
//! Member layout comes from registered type metadata, so old and new readers can
//! reconcile schema differences under a configurable migration policy.
//!
//! ## Modules
//! - [`core`]: header, byte cursors, value model, encoder and decoder
//! - [`metadata`]: type descriptors, member bindings and the type registry
//! - [`policy`]: version/migration, resource guard, reference and union handling
//! - [`transform`]: compression, encryption, checksums and the frame pipeline
//! - [`config`]: serialize and deserialize options with presets
//! - [`serializer`]: entry points returning [`Outcome`]s
//!
//! ## Quick Start
//! ```rust
//! use afrs::{binary_object, BinarySerializer, DeserializeOptions, SerializeOptions};
//!
//! #[derive(Debug, Clone, PartialEq, Default)]
//! struct Entity {
//!     id: u32,
//!     name: String,
//!     tags: Vec<String>,
//! }
//!
//! binary_object! {
//!     Entity => "quickstart.Entity", schema = 1 {
//!         id: u32 = 0,
//!         name: String = 1,
//!         tags: Vec<String> = 2,
//!     }
//! }
//!
//! let serializer = BinarySerializer::new();
//! let entity = Entity { id: 42, name: "x".into(), tags: vec!["a".into(), "b".into()] };
//!
//! let written = serializer.serialize(&entity, &SerializeOptions::for_network());
//! let bytes_written = written.stats().map(|s| s.bytes_written);
//! let frame = written.into_value().unwrap_or_default();
//!
//! let read = serializer.deserialize::<Entity>(&frame, &DeserializeOptions::safe());
//! assert_eq!(read.stats().map(|s| s.bytes_read), bytes_written);
//! assert_eq!(read.into_value(), Some(entity));
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod metadata;
pub mod policy;
pub mod result;
pub mod serializer;
pub mod transform;
pub mod utils;

pub use crate::config::{BehaviorFlags, DeserializeOptions, SerializeOptions, StringEncoding};
pub use crate::core::{
    BinaryObject, Describe, FromValue, Layout, Object, ObjectRef, SerializationMode, ToValue,
    Value,
};
pub use crate::error::{ErrorCategory, ErrorCode, Result, SerializerError};
pub use crate::result::{DeserializeResult, Failure, Outcome, SerializeResult, Statistics};
pub use crate::serializer::{deserialize, serialize, BinarySerializer, FrameInfo};
