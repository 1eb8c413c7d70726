//! Input direction: the reactor fills, the worker reads.

use std::sync::Arc;

use bytes::Buf;

use super::{Monitor, Region};
use crate::channel::CapacityChannel;
use crate::config::BufferConfig;
use crate::error::{BridgeError, Result};

struct InputState {
    region: Region,
    capacity_channel: Option<Arc<dyn CapacityChannel>>,
    /// Capacity announced to the reactor and not yet used by `fill`.
    granted: usize,
    /// Failed capacity update, reported by the next `read`.
    deferred_error: Option<BridgeError>,
}

impl InputState {
    /// Free space not yet announced; counted as granted from here on.
    fn take_grant(&mut self) -> usize {
        let increment = self.region.free().saturating_sub(self.granted);
        self.granted += increment;
        increment
    }
}

/// Bounded buffer of inbound bytes.
///
/// `fill` never blocks and accepts only what fits; `read` blocks the worker
/// until data arrives, the stream ends, or the buffer is aborted. Bytes freed
/// by a read are reported to the last [`CapacityChannel`] seen.
///
/// Grants never overlap: buffered bytes plus capacity announced but not yet
/// filled stay within the buffer size.
pub struct SharedInputBuffer {
    monitor: Monitor<InputState>,
}

impl SharedInputBuffer {
    /// Create an empty input buffer. Fails on an invalid config.
    pub fn new(config: &BufferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            monitor: Monitor::new(
                InputState {
                    region: Region::new(config.buffer_size),
                    capacity_channel: None,
                    granted: 0,
                    deferred_error: None,
                },
                config.wait_timeout(),
            ),
        })
    }

    /// Copy as many bytes as fit, returning the count accepted (possibly 0).
    pub fn fill(&self, src: &[u8]) -> Result<usize> {
        let mut state = self.monitor.lock();
        state.region.check_aborted()?;
        if state.region.end_stream {
            return Err(BridgeError::IllegalState("fill after end of stream"));
        }
        let n = state.region.put(src);
        state.granted = state.granted.saturating_sub(n);
        if n > 0 {
            self.monitor.notify_all();
        }
        Ok(n)
    }

    /// Remember `channel` and grant it the free space not already granted.
    pub fn update_capacity(&self, channel: &Arc<dyn CapacityChannel>) -> Result<()> {
        let increment = {
            let mut state = self.monitor.lock();
            state.region.check_aborted()?;
            state.capacity_channel = Some(Arc::clone(channel));
            state.take_grant()
        };
        if increment > 0 {
            if let Err(e) = channel.update(increment) {
                self.revoke_grant(increment);
                return Err(e);
            }
        }
        Ok(())
    }

    fn revoke_grant(&self, increment: usize) {
        let mut state = self.monitor.lock();
        state.granted = state.granted.saturating_sub(increment);
    }

    /// Block until at least one byte is available and copy into `dst`.
    ///
    /// Returns `Ok(0)` once the stream has ended and every byte was read.
    pub fn read(&self, dst: &mut [u8]) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        let deadline = self.monitor.deadline();
        let mut state = self.monitor.lock();
        if let Some(e) = state.deferred_error.take() {
            return Err(e);
        }
        loop {
            state.region.check_aborted()?;
            if !state.region.data.is_empty() {
                break;
            }
            if state.region.end_stream {
                return Ok(0);
            }
            self.monitor.wait(&mut state, deadline)?;
        }

        let n = dst.len().min(state.region.data.len());
        dst[..n].copy_from_slice(&state.region.data[..n]);
        state.region.data.advance(n);
        let grant = match state.capacity_channel.clone() {
            Some(channel) if !state.region.end_stream => Some((channel, state.take_grant())),
            _ => None,
        };
        drop(state);

        if let Some((channel, increment)) = grant.filter(|(_, increment)| *increment > 0) {
            // The bytes are already in `dst`: report the failure next time
            if let Err(e) = channel.update(increment) {
                tracing::warn!("capacity update failed: {}", e);
                self.revoke_grant(increment);
                self.monitor.lock().deferred_error = Some(e);
            }
        }
        Ok(n)
    }

    /// No more bytes will be filled. Wakes blocked readers.
    pub fn mark_end_stream(&self) {
        let mut state = self.monitor.lock();
        state.region.end_stream = true;
        self.monitor.notify_all();
    }

    /// Fail every pending and future operation. Idempotent.
    pub fn abort(&self) {
        let mut state = self.monitor.lock();
        state.region.abort();
        self.monitor.notify_all();
    }

    /// Bytes buffered and not yet read.
    pub fn length(&self) -> usize {
        self.monitor.lock().region.data.len()
    }

    /// Buffer size in bytes.
    pub fn capacity(&self) -> usize {
        self.monitor.lock().region.capacity
    }

    /// Whether the reactor has marked end of stream.
    pub fn is_end_stream(&self) -> bool {
        self.monitor.lock().region.end_stream
    }

    /// Whether the buffer was aborted.
    pub fn is_aborted(&self) -> bool {
        self.monitor.lock().region.aborted
    }
}

impl std::fmt::Debug for SharedInputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("SharedInputBuffer")
            .field("length", &state.region.data.len())
            .field("capacity", &state.region.capacity)
            .field("end_stream", &state.region.end_stream)
            .field("aborted", &state.region.aborted)
            .finish()
    }
}
