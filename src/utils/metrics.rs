//! Observability and Metrics
//!
//! Process-wide counters for serialization activity: operations, bytes moved through the
//! transform pipeline, and resource-guard violations.
//!
//! Uses atomic counters for thread-safe metrics collection. The library never installs a
//! subscriber; [`Metrics::log_metrics`] emits a snapshot through `tracing` when asked.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Global metrics collector for engine operations
#[derive(Debug)]
pub struct Metrics {
    /// Serialize calls that produced a frame
    pub serialize_success: AtomicU64,
    /// Serialize calls that failed
    pub serialize_failed: AtomicU64,
    /// Deserialize calls that produced a value
    pub deserialize_success: AtomicU64,
    /// Deserialize calls that failed
    pub deserialize_failed: AtomicU64,
    /// Total frame bytes written
    pub bytes_written: AtomicU64,
    /// Total frame bytes read
    pub bytes_read: AtomicU64,
    /// Frames whose body was compressed
    pub frames_compressed: AtomicU64,
    /// Frames whose body was encrypted
    pub frames_encrypted: AtomicU64,
    /// Depth, count, size, timeout and cancellation rejections
    pub guard_violations: AtomicU64,
    /// Checksum or authentication failures
    pub integrity_failures: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            serialize_success: AtomicU64::new(0),
            serialize_failed: AtomicU64::new(0),
            deserialize_success: AtomicU64::new(0),
            deserialize_failed: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            frames_compressed: AtomicU64::new(0),
            frames_encrypted: AtomicU64::new(0),
            guard_violations: AtomicU64::new(0),
            integrity_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a frame written
    pub fn record_serialized(&self, frame_size: u64, compressed: bool, encrypted: bool) {
        self.serialize_success.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(frame_size, Ordering::Relaxed);
        if compressed {
            self.frames_compressed.fetch_add(1, Ordering::Relaxed);
        }
        if encrypted {
            self.frames_encrypted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_serialize_failure(&self) {
        self.serialize_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame read
    pub fn record_deserialized(&self, frame_size: u64) {
        self.deserialize_success.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(frame_size, Ordering::Relaxed);
    }

    pub fn record_deserialize_failure(&self) {
        self.deserialize_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_guard_violation(&self) {
        self.guard_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            serialize_success: self.serialize_success.load(Ordering::Relaxed),
            serialize_failed: self.serialize_failed.load(Ordering::Relaxed),
            deserialize_success: self.deserialize_success.load(Ordering::Relaxed),
            deserialize_failed: self.deserialize_failed.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            frames_compressed: self.frames_compressed.load(Ordering::Relaxed),
            frames_encrypted: self.frames_encrypted.load(Ordering::Relaxed),
            guard_violations: self.guard_violations.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            serialize_success = snapshot.serialize_success,
            serialize_failed = snapshot.serialize_failed,
            deserialize_success = snapshot.deserialize_success,
            deserialize_failed = snapshot.deserialize_failed,
            bytes_written = snapshot.bytes_written,
            bytes_read = snapshot.bytes_read,
            frames_compressed = snapshot.frames_compressed,
            frames_encrypted = snapshot.frames_encrypted,
            guard_violations = snapshot.guard_violations,
            integrity_failures = snapshot.integrity_failures,
            uptime_seconds = snapshot.uptime_seconds,
            "Serializer metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub serialize_success: u64,
    pub serialize_failed: u64,
    pub deserialize_success: u64,
    pub deserialize_failed: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub frames_compressed: u64,
    pub frames_encrypted: u64,
    pub guard_violations: u64,
    pub integrity_failures: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}
