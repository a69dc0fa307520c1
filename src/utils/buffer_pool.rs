//! # Buffer Pool
//!
//! Object pool for the scratch buffers that hold raw payloads between the encoder and the
//! transform pipeline, so steady-state serialization does not allocate per call.
//!
//! Buffers are acquired and released within one call; a [`PooledBuffer`] returns itself to
//! its pool on drop. A bounded pool caps how many buffers may be checked out at once and
//! [`BufferPool::try_acquire`] fails with `BufferPoolExhausted` past that cap.
//!
//! ## Usage
//! ```rust
//! use afrs::utils::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(4);
//! let mut buffer = pool.acquire();
//! buffer.extend_from_slice(b"payload");
//! drop(buffer);
//! assert_eq!(pool.available(), 4);
//! ```

use crate::error::{ErrorCode, Result, SerializerError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Buffers that grew beyond this are dropped instead of pooled.
const MAX_POOLED_BUFFER_SIZE: usize = 64 * 1024;

const DEFAULT_BUFFER_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Shared {
    free: Mutex<Vec<Vec<u8>>>,
    outstanding: AtomicUsize,
}

/// A pooled buffer that returns itself to the pool when dropped
pub struct PooledBuffer {
    buffer: Vec<u8>,
    shared: Arc<Shared>,
}

impl PooledBuffer {
    /// Take the underlying buffer, leaving an empty one to be recycled.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Hand a buffer back so its capacity is recycled on drop.
    pub fn restore(&mut self, mut buffer: Vec<u8>) {
        buffer.clear();
        self.buffer = buffer;
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
        if self.buffer.capacity() == 0 || self.buffer.capacity() > MAX_POOLED_BUFFER_SIZE {
            return;
        }
        self.buffer.clear();
        if let Ok(mut free) = self.shared.free.lock() {
            free.push(std::mem::take(&mut self.buffer));
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

/// Thread-safe pool of payload buffers
#[derive(Debug, Clone)]
pub struct BufferPool {
    shared: Arc<Shared>,
    max_outstanding: Option<usize>,
}

impl BufferPool {
    /// Create an unbounded pool pre-filled with `pool_size` buffers
    pub fn new(pool_size: usize) -> Self {
        let free = (0..pool_size)
            .map(|_| Vec::with_capacity(DEFAULT_BUFFER_CAPACITY))
            .collect();
        Self {
            shared: Arc::new(Shared {
                free: Mutex::new(free),
                outstanding: AtomicUsize::new(0),
            }),
            max_outstanding: None,
        }
    }

    /// Create a pool that allows at most `max_outstanding` buffers checked out at once
    pub fn bounded(pool_size: usize, max_outstanding: usize) -> Self {
        Self {
            max_outstanding: Some(max_outstanding),
            ..Self::new(pool_size)
        }
    }

    /// Acquire a buffer, allocating when the pool is empty. Ignores the bound.
    pub fn acquire(&self) -> PooledBuffer {
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        self.checkout()
    }

    /// Acquire a buffer, failing with `BufferPoolExhausted` when the bound is reached.
    pub fn try_acquire(&self) -> Result<PooledBuffer> {
        if let Some(max) = self.max_outstanding {
            let reserved = self.shared.outstanding.fetch_update(
                Ordering::AcqRel,
                Ordering::Acquire,
                |current| (current < max).then_some(current + 1),
            );
            if reserved.is_err() {
                return Err(SerializerError::new(
                    ErrorCode::BufferPoolExhausted,
                    format!("all {max} pooled buffers are in use"),
                ));
            }
        } else {
            self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        }
        Ok(self.checkout())
    }

    fn checkout(&self) -> PooledBuffer {
        let buffer = self
            .shared
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_else(|| Vec::with_capacity(DEFAULT_BUFFER_CAPACITY));
        PooledBuffer {
            buffer,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Get the current number of idle buffers in the pool
    pub fn available(&self) -> usize {
        self.shared.free.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Buffers currently checked out
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(16)
    }
}

static POOL: once_cell::sync::Lazy<BufferPool> = once_cell::sync::Lazy::new(BufferPool::default);

/// Shared pool used by the serializer entry points
pub fn global_pool() -> &'static BufferPool {
    &POOL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_pool_basic() {
        let pool = BufferPool::new(10);
        assert_eq!(pool.available(), 10);

        let mut buf = pool.acquire();
        assert_eq!(pool.available(), 9);
        assert_eq!(pool.outstanding(), 1);

        buf.push(42);
        assert_eq!(buf[0], 42);

        drop(buf);
        assert_eq!(pool.available(), 10);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_buffer_pool_reuse_clears() {
        let pool = BufferPool::new(1);
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"test");
        }
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 4);
    }

    #[test]
    fn test_bounded_pool_exhausts() {
        let pool = BufferPool::bounded(1, 2);
        let first = pool.try_acquire();
        let second = pool.try_acquire();
        assert!(first.is_ok() && second.is_ok());

        match pool.try_acquire() {
            Err(err) => {
                assert_eq!(err.code(), ErrorCode::BufferPoolExhausted);
                assert!(err.code().is_retryable());
            }
            Ok(_) => panic!("third buffer should be refused"),
        }

        drop(first);
        assert!(pool.try_acquire().is_ok());
    }

    #[test]
    fn test_take_and_restore() {
        let pool = BufferPool::new(0);
        {
            let mut buf = pool.acquire();
            let mut owned = buf.take();
            owned.extend_from_slice(b"abc");
            buf.restore(owned);
            assert!(buf.is_empty());
        }
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_oversized_buffers_are_dropped() {
        let pool = BufferPool::new(0);
        {
            let mut buf = pool.acquire();
            buf.reserve(MAX_POOLED_BUFFER_SIZE + 1);
        }
        assert_eq!(pool.available(), 0);
    }
}
