//! # Error Types
//!
//! Structured error handling for the serialization engine.
//!
//! Every failure carries an integer-coded [`ErrorCode`] grouped by range, a derived
//! [`ErrorCategory`], and a message. Most failures travel as [`SerializerError::Failed`];
//! a handful of diagnostic errors carry richer context for tooling:
//!
//! - [`CircularReferenceError`]: reference path of a detected cycle
//! - [`BufferOverflowError`]: requested vs. available bytes at a cursor position
//! - [`DeserializationError`]: type, member and byte position of a decode failure
//!
//! All of them convert losslessly into the `Failure` variant of an operation result.
//!
//! ## Code Ranges
//! - `0`: success
//! - `1-99`: general
//! - `100-199`: type
//! - `200-299`: data
//! - `300-399`: buffer
//! - `400-499`: reference
//! - `500-599`: security (compression/encryption)
//! - `600-699`: I/O
//! - `700-799`: version
//! - `900-999`: internal
//!
//! ## Example Usage
//! ```rust
//! use afrs::error::{ErrorCode, SerializerError};
//!
//! let err = SerializerError::new(ErrorCode::ChecksumFailed, "payload checksum mismatch");
//! assert_eq!(err.code().as_u16(), 206);
//! assert!(!err.code().is_retryable());
//! ```

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Header validation
    pub const ERR_HEADER_TOO_SHORT: &str = "Frame shorter than the 32-byte header";
    pub const ERR_INVALID_MAGIC: &str = "Unrecognized frame magic";
    pub const ERR_HEADER_CHECKSUM: &str = "Header checksum mismatch";
    pub const ERR_PAYLOAD_CHECKSUM: &str = "Payload checksum mismatch";
    pub const ERR_ENDIAN_FLAG: &str = "BigEndian flag disagrees with magic byte order";
    pub const ERR_MAGIC_FLAGS: &str = "Frame magic disagrees with transform flags";
    pub const ERR_DATA_SIZE: &str = "Declared data size exceeds available bytes";

    /// Transform pipeline
    pub const ERR_COMPRESSION_FAILED: &str = "Compression failed";
    pub const ERR_DECOMPRESSION_FAILED: &str = "Decompression failed";
    pub const ERR_DECOMPRESSED_SIZE: &str = "Decompressed size disagrees with header";
    pub const ERR_ENCRYPTION_FAILED: &str = "Encryption failed";
    pub const ERR_DECRYPTION_FAILED: &str = "Decryption failed";
    pub const ERR_AUTHENTICATION_FAILED: &str = "Authentication tag verification failed";
    pub const ERR_MISSING_KEY: &str = "Encrypted frame but no key supplied";
    pub const ERR_NONCE_GENERATION: &str = "Failed to generate nonce";

    /// Decode
    pub const ERR_UNEXPECTED_END: &str = "Unexpected end of payload";
    pub const ERR_VARINT_OVERFLOW: &str = "Varint exceeds 64 bits";
    pub const ERR_TRAILING_BYTES: &str = "Trailing bytes after root object";

    /// Synchronization
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
    pub const ERR_REGISTRY_WRITE_LOCK: &str = "Failed to acquire write lock on type registry";
    pub const ERR_REGISTRY_READ_LOCK: &str = "Failed to acquire read lock on type registry";
}

/// Broad grouping of an [`ErrorCode`], derived from its numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Success,
    General,
    Type,
    Data,
    Buffer,
    Reference,
    Security,
    Io,
    Version,
    Internal,
}

impl ErrorCategory {
    pub fn name(self) -> &'static str {
        match self {
            ErrorCategory::Success => "success",
            ErrorCategory::General => "general",
            ErrorCategory::Type => "type",
            ErrorCategory::Data => "data",
            ErrorCategory::Buffer => "buffer",
            ErrorCategory::Reference => "reference",
            ErrorCategory::Security => "security",
            ErrorCategory::Io => "io",
            ErrorCategory::Version => "version",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer-coded error taxonomy. Discriminants are stable wire/ABI values.
#[repr(u16)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
pub enum ErrorCode {
    Success = 0,

    // General
    Unknown = 1,
    InvalidArgument = 2,
    InvalidOperation = 3,
    NotSupported = 4,
    Timeout = 5,
    Cancelled = 6,
    InvalidConfiguration = 7,

    // Type
    TypeNotSupported = 100,
    FormatterNotFound = 101,
    ConstructorNotFound = 102,
    TypeMismatch = 103,
    UnknownType = 104,
    AbstractTypeInstantiation = 105,
    DuplicateMemberKey = 106,
    MemberNotFound = 107,
    MissingRequiredMember = 108,
    InvalidEnumValue = 109,
    DuplicateTypeHash = 110,

    // Data
    InvalidData = 200,
    DataCorrupted = 201,
    DataTruncated = 202,
    DataTooLarge = 203,
    InvalidHeader = 204,
    InvalidMagicNumber = 205,
    ChecksumFailed = 206,
    InvalidEncoding = 207,
    UnexpectedToken = 208,
    StringTooLong = 209,
    CollectionTooLarge = 210,
    MaxDepthExceeded = 211,
    MaxObjectCountExceeded = 212,
    TrailingData = 213,

    // Buffer
    BufferOverflow = 300,
    BufferUnderflow = 301,
    BufferPoolExhausted = 302,
    OutOfMemory = 303,

    // Reference
    CircularReference = 400,
    InvalidReference = 401,
    UnresolvedReference = 402,

    // Security
    CompressionFailed = 500,
    DecompressionFailed = 501,
    EncryptionFailed = 502,
    DecryptionFailed = 503,
    AuthenticationFailed = 504,
    InvalidEncryptionKey = 505,
    UnsupportedAlgorithm = 506,

    // I/O
    IoError = 600,
    EndOfStream = 601,

    // Version
    VersionMismatch = 700,
    IncompatibleSchemaChange = 701,
    MigrationFailed = 702,
    MigratorNotFound = 703,

    // Internal
    InternalError = 900,
    AssertionFailed = 901,
    NotImplemented = 902,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self.into()
    }

    /// Map a raw code back to its variant.
    pub fn from_u16(raw: u16) -> Option<Self> {
        Self::try_from_primitive(raw).ok()
    }

    pub fn category(self) -> ErrorCategory {
        match self.as_u16() {
            0 => ErrorCategory::Success,
            1..=99 => ErrorCategory::General,
            100..=199 => ErrorCategory::Type,
            200..=299 => ErrorCategory::Data,
            300..=399 => ErrorCategory::Buffer,
            400..=499 => ErrorCategory::Reference,
            500..=599 => ErrorCategory::Security,
            600..=699 => ErrorCategory::Io,
            700..=799 => ErrorCategory::Version,
            _ => ErrorCategory::Internal,
        }
    }

    /// Non-recoverable conditions.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorCode::DataCorrupted
                | ErrorCode::OutOfMemory
                | ErrorCode::InternalError
                | ErrorCode::AssertionFailed
        )
    }

    /// Conditions where repeating the same call may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout | ErrorCode::IoError | ErrorCode::BufferPoolExhausted
        )
    }

    /// Fixed human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "Unknown error",
            ErrorCode::InvalidArgument => "Invalid argument",
            ErrorCode::InvalidOperation => "Invalid operation",
            ErrorCode::NotSupported => "Operation not supported",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::Cancelled => "Operation cancelled",
            ErrorCode::InvalidConfiguration => "Invalid configuration",
            ErrorCode::TypeNotSupported => "Type is not supported or not registered",
            ErrorCode::FormatterNotFound => "No formatter registered for type",
            ErrorCode::ConstructorNotFound => "Type has no usable constructor",
            ErrorCode::TypeMismatch => "Value does not match the declared type",
            ErrorCode::UnknownType => "Type tag is not registered",
            ErrorCode::AbstractTypeInstantiation => "Cannot instantiate abstract or interface type",
            ErrorCode::DuplicateMemberKey => "Duplicate member key in type registration",
            ErrorCode::MemberNotFound => "Member not found",
            ErrorCode::MissingRequiredMember => "Required member missing from payload",
            ErrorCode::InvalidEnumValue => "Invalid enum value",
            ErrorCode::DuplicateTypeHash => "Type hash collides with another registered type",
            ErrorCode::InvalidData => "Invalid data",
            ErrorCode::DataCorrupted => "Data corrupted",
            ErrorCode::DataTruncated => "Data truncated",
            ErrorCode::DataTooLarge => "Data exceeds configured size limit",
            ErrorCode::InvalidHeader => "Invalid frame header",
            ErrorCode::InvalidMagicNumber => "Invalid magic number",
            ErrorCode::ChecksumFailed => "Checksum verification failed",
            ErrorCode::InvalidEncoding => "Invalid string encoding",
            ErrorCode::UnexpectedToken => "Unexpected wire tag",
            ErrorCode::StringTooLong => "String exceeds maximum length",
            ErrorCode::CollectionTooLarge => "Collection exceeds maximum element count",
            ErrorCode::MaxDepthExceeded => "Maximum nesting depth exceeded",
            ErrorCode::MaxObjectCountExceeded => "Maximum object count exceeded",
            ErrorCode::TrailingData => "Unconsumed bytes after payload",
            ErrorCode::BufferOverflow => "Buffer overflow",
            ErrorCode::BufferUnderflow => "Buffer underflow",
            ErrorCode::BufferPoolExhausted => "Buffer pool exhausted",
            ErrorCode::OutOfMemory => "Out of memory",
            ErrorCode::CircularReference => "Circular reference detected",
            ErrorCode::InvalidReference => "Invalid back-reference",
            ErrorCode::UnresolvedReference => "Back-reference points at a skipped object",
            ErrorCode::CompressionFailed => "Compression failed",
            ErrorCode::DecompressionFailed => "Decompression failed",
            ErrorCode::EncryptionFailed => "Encryption failed",
            ErrorCode::DecryptionFailed => "Decryption failed",
            ErrorCode::AuthenticationFailed => "Authentication failed",
            ErrorCode::InvalidEncryptionKey => "Invalid encryption key",
            ErrorCode::UnsupportedAlgorithm => "Unsupported algorithm",
            ErrorCode::IoError => "I/O error",
            ErrorCode::EndOfStream => "End of stream",
            ErrorCode::VersionMismatch => "Version mismatch",
            ErrorCode::IncompatibleSchemaChange => "Incompatible schema change",
            ErrorCode::MigrationFailed => "Migration failed",
            ErrorCode::MigratorNotFound => "No migrator configured",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::AssertionFailed => "Assertion failed",
            ErrorCode::NotImplemented => "Not implemented",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.as_u16())
    }
}

/// A cycle found while walking an object graph in a mode without reference tracking.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Circular reference detected: {}", .path.join(" -> "))]
pub struct CircularReferenceError {
    /// Type names from the root to the repeated node (inclusive on both ends).
    pub path: Vec<String>,
    /// True when the object references itself directly.
    pub is_self_reference: bool,
    /// Number of edges in the cycle.
    pub depth: usize,
}

/// Whether a buffer bound was hit while writing or reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferDirection {
    Write,
    Read,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Buffer {}: requested {requested} bytes at position {position}, {available} available", direction_label(.direction))]
pub struct BufferOverflowError {
    pub direction: BufferDirection,
    pub requested: usize,
    pub available: usize,
    pub position: usize,
}

fn direction_label(direction: &BufferDirection) -> &'static str {
    match direction {
        BufferDirection::Write => "overflow",
        BufferDirection::Read => "underflow",
    }
}

impl BufferOverflowError {
    pub fn code(&self) -> ErrorCode {
        match self.direction {
            BufferDirection::Write => ErrorCode::BufferOverflow,
            BufferDirection::Read => ErrorCode::BufferUnderflow,
        }
    }
}

/// A decode failure with the location it happened at.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code} at byte {position}{}: {message}", location(.type_name, .member))]
pub struct DeserializationError {
    pub code: ErrorCode,
    pub message: String,
    pub type_name: Option<String>,
    pub member: Option<String>,
    pub position: usize,
}

fn location(type_name: &Option<String>, member: &Option<String>) -> String {
    match (type_name, member) {
        (Some(t), Some(m)) => format!(" in {t}.{m}"),
        (Some(t), None) => format!(" in {t}"),
        (None, Some(m)) => format!(" in .{m}"),
        (None, None) => String::new(),
    }
}

// SerializerError is the primary error type for all engine operations
#[derive(Error, Debug)]
pub enum SerializerError {
    #[error("{code}: {message}")]
    Failed {
        code: ErrorCode,
        message: Cow<'static, str>,
    },

    #[error(transparent)]
    CircularReference(#[from] CircularReferenceError),

    #[error(transparent)]
    BufferOverflow(#[from] BufferOverflowError),

    #[error(transparent)]
    Deserialization(#[from] Box<DeserializationError>),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SerializerError {
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        SerializerError::Failed {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SerializerError::Failed { code, .. } => *code,
            SerializerError::CircularReference(_) => ErrorCode::CircularReference,
            SerializerError::BufferOverflow(e) => e.code(),
            SerializerError::Deserialization(e) => e.code,
            SerializerError::Io(_) => ErrorCode::IoError,
            SerializerError::ConfigError(_) => ErrorCode::InvalidConfiguration,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Structured dump for logs and tooling.
    pub fn diagnostic_info(&self) -> String {
        let code = self.code();
        let mut out = format!(
            "code: {} ({:?})\ncategory: {}\ndescription: {}\nfatal: {}\nretryable: {}\nmessage: {}",
            code.as_u16(),
            code,
            code.category(),
            code.description(),
            code.is_fatal(),
            code.is_retryable(),
            self
        );
        match self {
            SerializerError::CircularReference(e) => {
                out.push_str(&format!(
                    "\npath: {}\nself_reference: {}\ncycle_depth: {}",
                    e.path.join(" -> "),
                    e.is_self_reference,
                    e.depth
                ));
            }
            SerializerError::BufferOverflow(e) => {
                out.push_str(&format!(
                    "\nposition: {}\nrequested: {}\navailable: {}",
                    e.position, e.requested, e.available
                ));
            }
            SerializerError::Deserialization(e) => {
                out.push_str(&format!("\nposition: {}", e.position));
                if let Some(t) = &e.type_name {
                    out.push_str(&format!("\ntype: {t}"));
                }
                if let Some(m) = &e.member {
                    out.push_str(&format!("\nmember: {m}"));
                }
            }
            _ => {}
        }
        out
    }
}

impl From<ErrorCode> for SerializerError {
    fn from(code: ErrorCode) -> Self {
        SerializerError::new(code, code.description())
    }
}

impl From<DeserializationError> for SerializerError {
    fn from(err: DeserializationError) -> Self {
        SerializerError::Deserialization(Box::new(err))
    }
}

/// Type alias for Results using SerializerError
pub type Result<T> = std::result::Result<T, SerializerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_ranges_map_to_categories() {
        assert_eq!(ErrorCode::Success.category(), ErrorCategory::Success);
        assert_eq!(ErrorCode::Timeout.category(), ErrorCategory::General);
        assert_eq!(ErrorCode::ConstructorNotFound.category(), ErrorCategory::Type);
        assert_eq!(ErrorCode::ChecksumFailed.category(), ErrorCategory::Data);
        assert_eq!(ErrorCode::BufferPoolExhausted.category(), ErrorCategory::Buffer);
        assert_eq!(ErrorCode::CircularReference.category(), ErrorCategory::Reference);
        assert_eq!(ErrorCode::AuthenticationFailed.category(), ErrorCategory::Security);
        assert_eq!(ErrorCode::IoError.category(), ErrorCategory::Io);
        assert_eq!(ErrorCode::VersionMismatch.category(), ErrorCategory::Version);
        assert_eq!(ErrorCode::InternalError.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_fatal_and_retryable_sets() {
        assert!(ErrorCode::DataCorrupted.is_fatal());
        assert!(ErrorCode::AssertionFailed.is_fatal());
        assert!(!ErrorCode::ChecksumFailed.is_fatal());

        assert!(ErrorCode::Timeout.is_retryable());
        assert!(ErrorCode::BufferPoolExhausted.is_retryable());
        assert!(!ErrorCode::Cancelled.is_retryable());
    }

    #[test]
    fn test_code_roundtrip_through_u16() {
        for code in [
            ErrorCode::InvalidMagicNumber,
            ErrorCode::MigratorNotFound,
            ErrorCode::UnresolvedReference,
        ] {
            assert_eq!(ErrorCode::from_u16(code.as_u16()), Some(code));
        }
        assert_eq!(ErrorCode::from_u16(999), None);
    }

    #[test]
    fn test_structured_errors_keep_their_code() {
        let err: SerializerError = CircularReferenceError {
            path: vec!["Node".into(), "Node".into()],
            is_self_reference: true,
            depth: 1,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::CircularReference);
        assert!(err.diagnostic_info().contains("self_reference: true"));

        let err: SerializerError = DeserializationError {
            code: ErrorCode::StringTooLong,
            message: "too long".into(),
            type_name: Some("Player".into()),
            member: Some("name".into()),
            position: 17,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::StringTooLong);
        assert!(err.to_string().contains("Player.name"));
        assert!(err.diagnostic_info().contains("position: 17"));
    }
}
