//! In-memory data channel.
//!
//! Collects everything written to it, optionally accepting at most a fixed
//! number of bytes per `write` call to simulate a congested transport.

use bytes::{Bytes, BytesMut};
use http::HeaderMap;
use parking_lot::Mutex;

use super::DataStreamChannel;
use crate::error::{BridgeError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    data: BytesMut,
    writes: Vec<usize>,
    end_stream_calls: usize,
    output_requests: usize,
    trailers: Option<HeaderMap>,
    limit: Option<usize>,
}

/// A [`DataStreamChannel`] backed by memory.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    state: Mutex<MemoryState>,
}

impl MemoryChannel {
    /// Channel that accepts everything offered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel that accepts at most `limit` bytes per write.
    pub fn with_limit(limit: usize) -> Self {
        let channel = Self::default();
        channel.state.lock().limit = Some(limit);
        channel
    }

    /// Change the per-write limit. `None` removes it.
    pub fn set_limit(&self, limit: Option<usize>) {
        self.state.lock().limit = limit;
    }

    /// Everything accepted so far.
    pub fn data(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.lock().data)
    }

    /// Sizes of the non-empty writes accepted so far.
    pub fn writes(&self) -> Vec<usize> {
        self.state.lock().writes.clone()
    }

    /// Number of `end_stream` calls seen.
    pub fn end_stream_calls(&self) -> usize {
        self.state.lock().end_stream_calls
    }

    /// Whether `end_stream` was called.
    pub fn is_ended(&self) -> bool {
        self.end_stream_calls() > 0
    }

    /// Number of `request_output` calls seen.
    pub fn output_requests(&self) -> usize {
        self.state.lock().output_requests
    }

    /// Trailers passed to `end_stream`, if any.
    pub fn trailers(&self) -> Option<HeaderMap> {
        self.state.lock().trailers.clone()
    }
}

impl DataStreamChannel for MemoryChannel {
    fn write(&self, src: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if state.end_stream_calls > 0 {
            return Err(BridgeError::IllegalState("write after end of stream"));
        }
        let n = state.limit.map_or(src.len(), |limit| limit.min(src.len()));
        if n > 0 {
            state.data.extend_from_slice(&src[..n]);
            state.writes.push(n);
        }
        Ok(n)
    }

    fn request_output(&self) {
        self.state.lock().output_requests += 1;
    }

    fn end_stream(&self, trailers: Option<HeaderMap>) -> Result<()> {
        let mut state = self.state.lock();
        state.end_stream_calls += 1;
        state.trailers = trailers;
        Ok(())
    }
}
