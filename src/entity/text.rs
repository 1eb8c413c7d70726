//! Text entity producer.
//!
//! Application text is encoded straight into the staging buffer with the
//! charset of the content type (US-ASCII when none is given). Once the
//! application ends the stream the encoder is finalized before the transport
//! sees end of stream.
//!
//! A character that does not fit in the free space is left for the next turn
//! and the staged bytes are flushed at the end of this one.

use super::details::ContentType;
use super::producer::{BufferedProducer, ChunkCoder, ContentSource};
use super::staging::StagingBuffer;
use crate::channel::DataStreamChannel;
use crate::charset::{Charset, CharsetEncoder, CoderResult};
use crate::config::ProducerConfig;
use crate::error::Result;

/// Charset-encoding strategy. Consumption is reported in bytes of the `&str`
/// input, always on a character boundary.
pub struct TextCoder {
    encoder: Box<dyn CharsetEncoder>,
    overflowed: bool,
}

impl TextCoder {
    /// Create a coder around `encoder`.
    pub fn new(encoder: Box<dyn CharsetEncoder>) -> Self {
        Self {
            encoder,
            overflowed: false,
        }
    }

    /// Charset being encoded to.
    pub fn charset(&self) -> Charset {
        self.encoder.charset()
    }
}

impl ChunkCoder for TextCoder {
    type Chunk = str;

    fn accept(
        &mut self,
        stage: &mut StagingBuffer,
        src: &str,
        _fragment_size_hint: usize,
        channel: &dyn DataStreamChannel,
    ) -> Result<usize> {
        let encoder = &mut self.encoder;
        let (result, read) = stage.write_with(|window| {
            let outcome = encoder.encode(src, window, false)?;
            Ok(((outcome.result, outcome.read), outcome.written))
        })?;
        if result == CoderResult::Overflow {
            // Below the hint the stage would otherwise never drain
            self.overflowed = true;
            channel.request_output();
        }
        Ok(read)
    }

    fn finish(&mut self, stage: &mut StagingBuffer) -> Result<bool> {
        let encoder = &mut self.encoder;
        stage.write_with(|window| {
            let outcome = encoder.encode("", window, true)?;
            if outcome.result == CoderResult::Overflow {
                return Ok((false, outcome.written));
            }
            let (result, flushed) = encoder.flush(&mut window[outcome.written..])?;
            Ok((result == CoderResult::Underflow, outcome.written + flushed))
        })
    }

    fn take_flush_request(&mut self) -> bool {
        std::mem::take(&mut self.overflowed)
    }

    fn reset(&mut self) {
        self.encoder.reset();
        self.overflowed = false;
    }
}

/// Entity producer over text.
pub type TextEntityProducer<S> = BufferedProducer<TextCoder, S>;

impl<S: ContentSource<str>> BufferedProducer<TextCoder, S> {
    /// Create a text producer encoding with the content type's charset.
    pub fn new(config: &ProducerConfig, content_type: Option<ContentType>, source: S) -> Result<Self> {
        let charset = content_type
            .as_ref()
            .and_then(ContentType::charset)
            .unwrap_or(Charset::UsAscii);
        Self::with_encoder(config, content_type, charset.new_encoder(), source)
    }

    /// Create a text producer with an explicit encoder.
    pub fn with_encoder(
        config: &ProducerConfig,
        content_type: Option<ContentType>,
        encoder: Box<dyn CharsetEncoder>,
        source: S,
    ) -> Result<Self> {
        Self::with_coder(config, content_type, TextCoder::new(encoder), source)
    }
}
