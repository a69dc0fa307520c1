//! # Operation Results
//!
//! Non-panicking outcome of one serialize or deserialize call.
//!
//! An [`Outcome`] is either a success carrying the produced value with its
//! [`Statistics`], or a [`Failure`] carrying an error code, its category, a message and
//! a structured diagnostic dump. Statistics exist only on success.
//!
//! ```rust
//! use afrs::error::{ErrorCode, SerializerError};
//! use afrs::result::{Outcome, Statistics};
//!
//! let ok: Outcome<u32> = Outcome::success(7, Statistics::default());
//! assert_eq!(ok.map(|v| v * 2).unwrap_or_default(), 14);
//!
//! let failed: Outcome<u32> = SerializerError::from(ErrorCode::Timeout).into();
//! assert!(failed.failure().is_some_and(|f| f.is_retryable()));
//! assert!(failed.stats().is_none());
//! ```

use crate::error::{ErrorCategory, ErrorCode, SerializerError};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Counters gathered during one successful operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    /// Frame bytes produced by serialize.
    pub bytes_written: usize,
    /// Frame bytes consumed by deserialize.
    pub bytes_read: usize,
    /// Size of the raw payload before compression and encryption.
    pub payload_size: usize,
    pub object_count: usize,
    pub peak_depth: usize,
    pub compressed: bool,
    pub encrypted: bool,
    /// Schema version recorded in the payload.
    pub schema_version: u32,
    /// Objects passed through a migrator.
    pub migrations: usize,
    /// A positional payload of another schema was bound by position alone, so its
    /// members are not guaranteed to line up with the current registration.
    pub layout_reinterpreted: bool,
    pub elapsed: Duration,
}

impl Statistics {
    /// Frame size over raw payload size; below 1.0 when transforms shrank the data.
    pub fn compression_ratio(&self) -> f64 {
        let frame = self.bytes_written.max(self.bytes_read);
        if self.payload_size == 0 {
            return 1.0;
        }
        frame as f64 / self.payload_size as f64
    }
}

/// Failure half of an [`Outcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct Failure {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
    /// Multi-line dump from [`SerializerError::diagnostic_info`].
    pub diagnostic: String,
}

impl Failure {
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }
}

impl From<SerializerError> for Failure {
    fn from(err: SerializerError) -> Self {
        let code = err.code();
        Failure {
            code,
            category: code.category(),
            message: err.to_string(),
            diagnostic: err.diagnostic_info(),
        }
    }
}

impl From<ErrorCode> for Failure {
    fn from(code: ErrorCode) -> Self {
        SerializerError::from(code).into()
    }
}

/// Result of one entry-point call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success { value: T, stats: Statistics },
    Failure(Failure),
}

/// Frame bytes on success.
pub type SerializeResult = Outcome<Bytes>;

/// Decoded value on success.
pub type DeserializeResult<T> = Outcome<T>;

impl<T> Outcome<T> {
    pub fn success(value: T, stats: Statistics) -> Self {
        Outcome::Success { value, stats }
    }

    pub fn failed(failure: impl Into<Failure>) -> Self {
        Outcome::Failure(failure.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success { value, .. } => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn stats(&self) -> Option<&Statistics> {
        match self {
            Outcome::Success { stats, .. } => Some(stats),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }

    /// `ErrorCode::Success` for successful outcomes.
    pub fn code(&self) -> ErrorCode {
        self.failure().map_or(ErrorCode::Success, |f| f.code)
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Success { value, .. } => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<(T, Statistics), Failure> {
        match self {
            Outcome::Success { value, stats } => Ok((value, stats)),
            Outcome::Failure(failure) => Err(failure),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success { value, stats } => Outcome::Success {
                value: f(value),
                stats,
            },
            Outcome::Failure(failure) => Outcome::Failure(failure),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T, Statistics) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Success { value, stats } => f(value, stats),
            Outcome::Failure(failure) => Outcome::Failure(failure),
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.into_value().unwrap_or(default)
    }

    pub fn unwrap_or_else(self, f: impl FnOnce(&Failure) -> T) -> T {
        match self {
            Outcome::Success { value, .. } => value,
            Outcome::Failure(failure) => f(&failure),
        }
    }

    pub fn unwrap_or_default(self) -> T
    where
        T: Default,
    {
        self.into_value().unwrap_or_default()
    }
}

impl<T> From<SerializerError> for Outcome<T> {
    fn from(err: SerializerError) -> Self {
        Outcome::Failure(err.into())
    }
}

impl<T> From<crate::error::Result<(T, Statistics)>> for Outcome<T> {
    fn from(result: crate::error::Result<(T, Statistics)>) -> Self {
        match result {
            Ok((value, stats)) => Outcome::Success { value, stats },
            Err(err) => err.into(),
        }
    }
}
