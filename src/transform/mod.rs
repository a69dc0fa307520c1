//! # Payload Transforms
//!
//! Compression, authenticated encryption and checksums, and the pipeline that applies
//! them between the encoded payload and the frame on the wire.
//!
//! Algorithms are identified on the wire by a one-byte id that prefixes the transformed
//! body, so a reader never needs the writer's options to undo a transform.

pub mod checksum;
pub mod compression;
pub mod encryption;
pub mod pipeline;

pub use checksum::ChecksumAlgorithm;
pub use compression::CompressionAlgorithm;
pub use encryption::{EncryptionAlgorithm, EncryptionKey};
pub use pipeline::{open_body, open_header, seal, SealReport};
