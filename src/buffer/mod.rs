//! Shared buffers between a blocking worker thread and the non-blocking reactor.
//!
//! Each buffer is a bounded byte region behind one monitor (mutex plus
//! condition variable). The blocking side parks on the condition until it can
//! make progress; the non-blocking side only ever moves what fits and returns.
//!
//! - [`SharedInputBuffer`]: the reactor fills, the worker reads
//! - [`SharedOutputBuffer`]: the worker writes, the reactor flushes
//!
//! Either side may `abort()` a buffer, which permanently fails every pending
//! and future operation on it.

mod input;
mod output;

use std::time::{Duration, Instant};

use bytes::BytesMut;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{BridgeError, Result};

pub use input::SharedInputBuffer;
pub use output::SharedOutputBuffer;

/// Bounded byte region shared by both directions.
#[derive(Debug)]
struct Region {
    data: BytesMut,
    capacity: usize,
    end_stream: bool,
    aborted: bool,
}

impl Region {
    fn new(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
            end_stream: false,
            aborted: false,
        }
    }

    fn free(&self) -> usize {
        self.capacity - self.data.len()
    }

    fn check_aborted(&self) -> Result<()> {
        if self.aborted {
            return Err(BridgeError::Aborted);
        }
        Ok(())
    }

    /// Copy as much of `src` as fits.
    fn put(&mut self, src: &[u8]) -> usize {
        let n = self.free().min(src.len());
        self.data.extend_from_slice(&src[..n]);
        n
    }

    fn abort(&mut self) {
        self.aborted = true;
        self.data.clear();
    }
}

/// Mutex plus condition variable, with an optional bound on each wait.
#[derive(Debug)]
struct Monitor<T> {
    state: Mutex<T>,
    cond: Condvar,
    timeout: Option<Duration>,
}

impl<T> Monitor<T> {
    fn new(state: T, timeout: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(state),
            cond: Condvar::new(),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock()
    }

    /// Deadline for a blocking operation starting now. Unbounded when the
    /// timeout is too large to represent.
    fn deadline(&self) -> Option<Instant> {
        self.timeout
            .and_then(|timeout| Instant::now().checked_add(timeout))
    }

    /// Park until notified. Fails with `Timeout` once `deadline` has passed.
    fn wait(&self, guard: &mut MutexGuard<'_, T>, deadline: Option<Instant>) -> Result<()> {
        match deadline {
            Some(deadline) => {
                if self.cond.wait_until(guard, deadline).timed_out() {
                    return Err(BridgeError::Timeout);
                }
            }
            None => self.cond.wait(guard),
        }
        Ok(())
    }

    fn notify_all(&self) {
        self.cond.notify_all();
    }
}
