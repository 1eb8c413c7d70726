//! Blocking streams over the shared buffers, for use on the worker thread.

use std::io;
use std::sync::Arc;

use super::response::ResponseTrigger;
use crate::buffer::{SharedInputBuffer, SharedOutputBuffer};
use crate::error::Result;

const DRAIN_CHUNK: usize = 1024;

/// Request body as a blocking [`io::Read`].
#[derive(Debug)]
pub struct ContentInputStream {
    buffer: Arc<SharedInputBuffer>,
    closed: bool,
}

impl ContentInputStream {
    pub(crate) fn new(buffer: Arc<SharedInputBuffer>) -> Self {
        Self {
            buffer,
            closed: false,
        }
    }

    /// Discard unread bytes up to the end of the stream.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let mut scratch = [0u8; DRAIN_CHUNK];
        while self.buffer.read(&mut scratch)? > 0 {}
        self.closed = true;
        Ok(())
    }
}

impl io::Read for ContentInputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        Ok(self.buffer.read(buf)?)
    }
}

/// Response body as a blocking [`io::Write`].
///
/// The first write, or closing without having written, commits the response
/// head before any body byte becomes visible to the reactor.
pub struct ContentOutputStream {
    buffer: Arc<SharedOutputBuffer>,
    trigger: ResponseTrigger,
    closed: bool,
}

impl ContentOutputStream {
    pub(crate) fn new(buffer: Arc<SharedOutputBuffer>, trigger: ResponseTrigger) -> Self {
        Self {
            buffer,
            trigger,
            closed: false,
        }
    }

    /// Whether the response head has been sent.
    pub fn is_committed(&self) -> bool {
        self.trigger.is_committed()
    }

    /// Commit the response if needed and mark the body complete.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.trigger.commit()?;
        self.buffer.write_completed()?;
        self.closed = true;
        Ok(())
    }
}

impl io::Write for ContentOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.trigger.commit()?;
        self.buffer.write(buf)?;
        Ok(buf.len())
    }

    /// Bytes are handed to the reactor as they are written.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for ContentOutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentOutputStream")
            .field("buffer", &self.buffer)
            .field("committed", &self.trigger.is_committed())
            .field("closed", &self.closed)
            .finish()
    }
}
