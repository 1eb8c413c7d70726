//! Output direction: the worker writes, the reactor flushes.

use bytes::Buf;

use super::{Monitor, Region};
use crate::channel::DataChannel;
use crate::config::BufferConfig;
use crate::error::{BridgeError, Result};

struct OutputState {
    region: Region,
    /// Channel from the most recent flush, used to request output.
    channel: Option<DataChannel>,
    end_signalled: bool,
}

/// Bounded buffer of outbound bytes.
///
/// Writers block once the region is full rather than growing it, which keeps
/// a fast worker from outrunning a slow peer. The reactor drains the region
/// with `flush`, which signals end of stream on the channel once the writer
/// has completed and everything was accepted.
pub struct SharedOutputBuffer {
    monitor: Monitor<OutputState>,
}

impl SharedOutputBuffer {
    /// Create an empty output buffer. Fails on an invalid config.
    pub fn new(config: &BufferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            monitor: Monitor::new(
                OutputState {
                    region: Region::new(config.buffer_size),
                    channel: None,
                    end_signalled: false,
                },
                config.wait_timeout(),
            ),
        })
    }

    /// Write all of `src`, blocking while the region is full.
    pub fn write(&self, mut src: &[u8]) -> Result<()> {
        let deadline = self.monitor.deadline();
        while !src.is_empty() {
            let mut state = self.monitor.lock();
            loop {
                state.region.check_aborted()?;
                if state.region.end_stream {
                    return Err(BridgeError::IllegalState("write after end of stream"));
                }
                if state.region.free() > 0 {
                    break;
                }
                self.monitor.wait(&mut state, deadline)?;
            }
            let n = state.region.put(src);
            src = &src[n..];
            let channel = state.channel.clone();
            drop(state);

            if let Some(channel) = channel {
                channel.request_output();
            }
        }
        Ok(())
    }

    /// Mark the end of the stream and ask the reactor for a final flush.
    ///
    /// Does not wait for the buffered bytes to drain. Repeated calls are a
    /// no-op.
    pub fn write_completed(&self) -> Result<()> {
        let channel = {
            let mut state = self.monitor.lock();
            state.region.check_aborted()?;
            if state.region.end_stream {
                return Ok(());
            }
            state.region.end_stream = true;
            state.channel.clone()
        };
        if let Some(channel) = channel {
            channel.request_output();
        }
        Ok(())
    }

    /// Move as much as `channel` accepts; signal end of stream once the
    /// writer completed and the region is empty.
    pub fn flush(&self, channel: &DataChannel) -> Result<()> {
        let mut state = self.monitor.lock();
        state.channel = Some(channel.clone());
        state.region.check_aborted()?;

        if !state.region.data.is_empty() {
            let written = channel.write(&state.region.data)?;
            let written = written.min(state.region.data.len());
            state.region.data.advance(written);
            if written > 0 {
                self.monitor.notify_all();
            }
        }
        if state.region.data.is_empty() && state.region.end_stream && !state.end_signalled {
            state.end_signalled = true;
            channel.end_stream(None)?;
        }
        Ok(())
    }

    /// Fail every pending and future operation. Idempotent.
    ///
    /// The reactor is asked for output so it observes the failure.
    pub fn abort(&self) {
        let channel = {
            let mut state = self.monitor.lock();
            if state.region.aborted {
                return;
            }
            state.region.abort();
            self.monitor.notify_all();
            state.channel.clone()
        };
        if let Some(channel) = channel {
            channel.request_output();
        }
    }

    /// Bytes buffered and not yet flushed.
    pub fn length(&self) -> usize {
        self.monitor.lock().region.data.len()
    }

    /// Buffer size in bytes.
    pub fn capacity(&self) -> usize {
        self.monitor.lock().region.capacity
    }

    /// Whether end of stream was signalled on the channel.
    pub fn is_end_stream(&self) -> bool {
        self.monitor.lock().end_signalled
    }

    /// Whether the buffer was aborted.
    pub fn is_aborted(&self) -> bool {
        self.monitor.lock().region.aborted
    }
}

impl std::fmt::Debug for SharedOutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("SharedOutputBuffer")
            .field("length", &state.region.data.len())
            .field("capacity", &state.region.capacity)
            .field("end_stream", &state.region.end_stream)
            .field("end_signalled", &state.end_signalled)
            .field("aborted", &state.region.aborted)
            .finish()
    }
}
