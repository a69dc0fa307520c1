//! # Resource Guard
//!
//! Limits enforced while decoding untrusted bytes. Every check runs before the
//! corresponding allocation, so a small frame that declares enormous counts fails
//! without reserving memory for them.
//!
//! Timeouts and cancellation are cooperative: the decoder polls
//! [`ResourceGuard::check_interrupt`] once per object and every
//! [`INTERRUPT_CHECK_INTERVAL`] collection elements.

use crate::error::{ErrorCode, Result, SerializerError};
use crate::utils::metrics::global_metrics;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Collection elements decoded between two interrupt checks.
pub const INTERRUPT_CHECK_INTERVAL: usize = 256;

pub const MIN_DEPTH: usize = 1;
pub const MAX_DEPTH: usize = 1024;

/// Numeric limits shared by serialize and deserialize options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_depth: usize,
    pub max_object_count: usize,
    pub max_collection_count: usize,
    /// In code units of the string encoding.
    pub max_string_length: usize,
    /// Upper bound for raw and transformed payload bytes.
    pub max_payload_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_object_count: 1_000_000,
            max_collection_count: 1_000_000,
            max_string_length: 1024 * 1024,
            max_payload_size: 16 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Tight limits for input from untrusted peers.
    pub fn restrictive() -> Self {
        Self {
            max_depth: 32,
            max_object_count: 10_000,
            max_collection_count: 10_000,
            max_string_length: 64 * 1024,
            max_payload_size: 1024 * 1024,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&self.max_depth) {
            issues.push(format!(
                "max_depth {} is outside {MIN_DEPTH}..={MAX_DEPTH}",
                self.max_depth
            ));
        }
        for (name, value) in [
            ("max_object_count", self.max_object_count),
            ("max_collection_count", self.max_collection_count),
            ("max_string_length", self.max_string_length),
            ("max_payload_size", self.max_payload_size),
        ] {
            if value == 0 {
                issues.push(format!("{name} must be greater than 0"));
            }
        }
        if self.max_payload_size > u32::MAX as usize {
            issues.push(format!(
                "max_payload_size {} exceeds the 32-bit frame size field",
                self.max_payload_size
            ));
        }
        issues
    }
}

/// What happens when a decoded string exceeds `max_string_length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutOfRangeHandling {
    /// Fail with `StringTooLong`.
    #[default]
    Error,
    /// Keep the first `max_string_length` units.
    Truncate,
    /// Replace with the empty string.
    Default,
}

/// How much of an over-long string to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringAdmission {
    Full,
    Truncate(usize),
    Empty,
}

/// Cooperative cancellation flag, shared between the caller and a running decode.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-call limit state.
#[derive(Debug)]
pub struct ResourceGuard {
    limits: Limits,
    depth: usize,
    peak_depth: usize,
    objects: usize,
    started: Instant,
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
}

fn violation(code: ErrorCode, message: String) -> SerializerError {
    global_metrics().record_guard_violation();
    warn!(?code, %message, "resource guard violation");
    SerializerError::new(code, message)
}

impl ResourceGuard {
    /// `timeout_ms` of -1 (or any negative value) disables the deadline.
    pub fn new(limits: Limits, timeout_ms: i64, cancellation: Option<CancellationToken>) -> Self {
        let started = Instant::now();
        let deadline = u64::try_from(timeout_ms)
            .ok()
            .and_then(|ms| started.checked_add(Duration::from_millis(ms)));
        Self {
            limits,
            depth: 0,
            peak_depth: 0,
            objects: 0,
            started,
            deadline,
            cancellation,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Descend one nesting level.
    pub fn enter(&mut self) -> Result<()> {
        if self.depth + 1 > self.limits.max_depth {
            return Err(violation(
                ErrorCode::MaxDepthExceeded,
                format!("nesting depth exceeds {}", self.limits.max_depth),
            ));
        }
        self.depth += 1;
        self.peak_depth = self.peak_depth.max(self.depth);
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Count one more live object and poll for timeout or cancellation.
    pub fn enter_object(&mut self) -> Result<()> {
        if self.objects + 1 > self.limits.max_object_count {
            return Err(violation(
                ErrorCode::MaxObjectCountExceeded,
                format!("object count exceeds {}", self.limits.max_object_count),
            ));
        }
        self.objects += 1;
        self.check_interrupt()
    }

    /// Admit a collection of `count` elements, each taking at least
    /// `min_bytes_per_element` of the `remaining` input.
    pub fn check_collection(
        &self,
        count: usize,
        min_bytes_per_element: usize,
        remaining: usize,
    ) -> Result<()> {
        if count > self.limits.max_collection_count {
            return Err(violation(
                ErrorCode::CollectionTooLarge,
                format!(
                    "collection of {count} elements exceeds {}",
                    self.limits.max_collection_count
                ),
            ));
        }
        if count.saturating_mul(min_bytes_per_element) > remaining {
            return Err(violation(
                ErrorCode::DataTruncated,
                format!("collection of {count} elements cannot fit in {remaining} remaining bytes"),
            ));
        }
        Ok(())
    }

    /// Admit a string of `units` code units of `unit_size` bytes each.
    pub fn check_string(
        &self,
        units: usize,
        unit_size: usize,
        remaining: usize,
        handling: OutOfRangeHandling,
    ) -> Result<StringAdmission> {
        if units.saturating_mul(unit_size) > remaining {
            return Err(violation(
                ErrorCode::DataTruncated,
                format!("string of {units} units cannot fit in {remaining} remaining bytes"),
            ));
        }
        if units <= self.limits.max_string_length {
            return Ok(StringAdmission::Full);
        }
        match handling {
            OutOfRangeHandling::Error => Err(violation(
                ErrorCode::StringTooLong,
                format!(
                    "string of {units} units exceeds {}",
                    self.limits.max_string_length
                ),
            )),
            OutOfRangeHandling::Truncate => {
                Ok(StringAdmission::Truncate(self.limits.max_string_length))
            }
            OutOfRangeHandling::Default => Ok(StringAdmission::Empty),
        }
    }

    /// Poll the index of a collection element; checks every
    /// [`INTERRUPT_CHECK_INTERVAL`] elements.
    pub fn tick(&self, index: usize) -> Result<()> {
        if index % INTERRUPT_CHECK_INTERVAL == 0 {
            self.check_interrupt()
        } else {
            Ok(())
        }
    }

    pub fn check_interrupt(&self) -> Result<()> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(SerializerError::new(ErrorCode::Cancelled, "decode cancelled"));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(violation(
                    ErrorCode::Timeout,
                    format!("decode exceeded {:?}", deadline - self.started),
                ));
            }
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn peak_depth(&self) -> usize {
        self.peak_depth
    }

    pub fn object_count(&self) -> usize {
        self.objects
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
