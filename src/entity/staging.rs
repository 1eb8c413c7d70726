//! Fixed-capacity staging buffer.
//!
//! Bytes are appended at the back and drained from the front; after a partial
//! drain the unread remainder stays at the front. Capacity is a hard limit:
//! the buffer never grows past it.

use bytes::{Buf, BytesMut};

use crate::channel::DataStreamChannel;
use crate::error::Result;

/// Bounded byte buffer owned by one entity producer.
#[derive(Debug)]
pub struct StagingBuffer {
    buffer: BytesMut,
    capacity: usize,
}

impl StagingBuffer {
    /// Create an empty buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Fixed capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of staged bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Free space left.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Staged bytes, oldest first.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Copy as much of `src` as fits, returning the count copied.
    pub fn put(&mut self, src: &[u8]) -> usize {
        let n = self.remaining().min(src.len());
        self.buffer.extend_from_slice(&src[..n]);
        n
    }

    /// Let `fill` write directly into the free space.
    ///
    /// `fill` receives the free window and returns a value plus the number of
    /// bytes it wrote at the start of the window.
    pub fn write_with<T, F>(&mut self, fill: F) -> Result<T>
    where
        F: FnOnce(&mut [u8]) -> Result<(T, usize)>,
    {
        let start = self.buffer.len();
        self.buffer.resize(self.capacity, 0);
        match fill(&mut self.buffer[start..]) {
            Ok((value, written)) => {
                self.buffer.truncate(start + written.min(self.capacity - start));
                Ok(value)
            }
            Err(e) => {
                self.buffer.truncate(start);
                Err(e)
            }
        }
    }

    /// Offer the staged bytes to `channel` and drop whatever it accepted.
    ///
    /// Empty buffers are a no-op. Returns the number of bytes drained.
    pub fn flush_to(&mut self, channel: &dyn DataStreamChannel) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let written = channel.write(&self.buffer)?;
        self.buffer.advance(written.min(self.buffer.len()));
        Ok(written)
    }

    /// Drop every staged byte.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
