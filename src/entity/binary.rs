//! Binary entity producer.
//!
//! Writes that fit are copied into the staging buffer without touching the
//! transport. A write that does not fit first flushes the buffer (when it is
//! full or past the fragment hint) and, if the buffer drained completely, goes
//! straight to the transport instead of being staged.
//!
//! A write that could neither be staged nor sent (buffer partly filled but
//! below the hint) asks for a flush at the end of the turn, so the next turn
//! starts from an empty buffer.

use super::details::ContentType;
use super::producer::{BufferedProducer, ChunkCoder, ContentSource};
use super::staging::StagingBuffer;
use crate::channel::DataStreamChannel;
use crate::config::ProducerConfig;
use crate::error::Result;

/// Raw byte strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCoder {
    deferred: bool,
}

impl ChunkCoder for BinaryCoder {
    type Chunk = [u8];

    fn accept(
        &mut self,
        stage: &mut StagingBuffer,
        src: &[u8],
        fragment_size_hint: usize,
        channel: &dyn DataStreamChannel,
    ) -> Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }
        // Fast path: coalesce
        if stage.remaining() >= src.len() {
            return Ok(stage.put(src));
        }

        if stage.is_full() || stage.len() >= fragment_size_hint {
            stage.flush_to(channel)?;
        }
        let mut consumed = 0;
        if stage.is_empty() {
            consumed = channel.write(src)?;
        }
        if !stage.is_empty() || consumed < src.len() {
            self.deferred |= consumed == 0;
            channel.request_output();
        }
        Ok(consumed)
    }

    fn finish(&mut self, _stage: &mut StagingBuffer) -> Result<bool> {
        Ok(true)
    }

    fn take_flush_request(&mut self) -> bool {
        std::mem::take(&mut self.deferred)
    }

    fn reset(&mut self) {
        self.deferred = false;
    }
}

/// Entity producer over raw bytes.
pub type BinaryEntityProducer<S> = BufferedProducer<BinaryCoder, S>;

impl<S: ContentSource<[u8]>> BufferedProducer<BinaryCoder, S> {
    /// Create a binary producer. The content type is reported as-is.
    pub fn new(config: &ProducerConfig, content_type: Option<ContentType>, source: S) -> Result<Self> {
        Self::with_coder(config, content_type, BinaryCoder::default(), source)
    }
}
