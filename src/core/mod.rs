//! # Core Wire Components
//!
//! Frame header, byte cursors, the dynamic value model, and the member walk that turns
//! an object graph into a tagged payload and back.
//!
//! ## Frame Layout
//! ```text
//! [Header(32)] [Transformed Body(data_size)]
//!
//! Body, after decrypt/decompress:
//! [Schema(varint)] [Encoding(1)] [TypeName?] [Root Value]
//! ```
//!
//! ## Value Tags
//! Every value starts with a one-byte tag. Built-ins use their type code; the rest are:
//! ```text
//! 0x00 null        0x20 enum         0x21 array      0x22 map
//! 0x23 object      0x25 envelope     0x26 back-ref   0x27 interned string
//! ```
//!
//! ## Security
//! - Counts and lengths are checked against limits and remaining bytes before allocation
//! - Keyed entries carry their byte length, so unknown members are skipped without parsing
//! - Deep nesting continues on fresh stack segments instead of exhausting the caller's stack

pub mod bind;
pub mod buffer;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod mode;
pub mod stack;
pub mod value;

/// One-byte value tags that are not built-in type codes.
pub mod tag {
    pub const NULL: u8 = 0x00;
    pub const ENUM: u8 = 0x20;
    pub const ARRAY: u8 = 0x21;
    pub const MAP: u8 = 0x22;
    pub const OBJECT: u8 = 0x23;
    /// Type hash, id count, length, then a tagged object.
    pub const ENVELOPE: u8 = 0x25;
    pub const BACK_REFERENCE: u8 = 0x26;
    pub const INTERNED_STRING: u8 = 0x27;
}

/// Elements per chunk in streaming collections.
pub const STREAM_CHUNK_SIZE: usize = 256;

pub use bind::{BinaryObject, Describe, FromValue, ToValue};
pub use buffer::{Endianness, WireReader, WireWriter};
pub use header::{HeaderFlags, WireHeader, HEADER_SIZE};
pub use mode::{Capabilities, Layout, SerializationMode};
pub use value::{Decimal, Object, ObjectRef, UnknownMember, Value};
