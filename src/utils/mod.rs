//! # Utility Modules
//!
//! Supporting utilities shared by the serializer entry points.
//!
//! ## Components
//! - **Buffer Pool**: recycled scratch buffers for raw payloads
//! - **Metrics**: thread-safe observability counters and an operation timer

pub mod buffer_pool;
pub mod metrics;

pub use buffer_pool::{global_pool, BufferPool, PooledBuffer};
pub use metrics::{global_metrics, Metrics, MetricsSnapshot, Timer};
