//! Stack segments for the recursive member walk.
//!
//! Encoder and decoder recurse once per nesting level, and `max_depth` may be as large
//! as [`MAX_DEPTH`](crate::policy::guard::MAX_DEPTH). Rather than trusting the
//! caller's stack with all of that, every [`SEGMENT_DEPTH`] levels the walk continues
//! on a scoped thread with a stack of [`SEGMENT_STACK_SIZE`] bytes. Shallow payloads
//! never leave the calling thread.

use crate::error::{ErrorCode, Result, SerializerError};
use std::thread;
use tracing::Span;

/// Nesting levels run on one stack before the walk moves to a fresh segment.
pub const SEGMENT_DEPTH: usize = 32;

/// Stack reserved for each segment: 128 KiB per nesting level.
pub const SEGMENT_STACK_SIZE: usize = 4 * 1024 * 1024;

/// Run `walk` for nesting level `level`, on a new segment when `level` starts one.
pub(crate) fn grow<T, F>(level: usize, walk: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    if level == 0 || level % SEGMENT_DEPTH != 0 {
        return walk();
    }

    let span = Span::current();
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name(format!("afrs-walk-{level}"))
            .stack_size(SEGMENT_STACK_SIZE)
            .spawn_scoped(scope, move || span.in_scope(walk))
            .map_err(|e| {
                SerializerError::new(
                    ErrorCode::OutOfMemory,
                    format!("cannot start a stack segment at depth {level}: {e}"),
                )
            })?;
        handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    })
}
