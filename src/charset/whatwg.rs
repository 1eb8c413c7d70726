//! Encoder for the legacy charsets of the WHATWG Encoding Standard.

use encoding_rs::{Encoder, EncoderResult, Encoding};

use super::{Charset, CharsetEncoder, CoderResult, EncodeOutcome};
use crate::error::{BridgeError, Result};

/// [`CharsetEncoder`] over an `encoding_rs` encoder.
///
/// Unmappable characters are errors, never replaced. End-of-stream state
/// (e.g. the ISO-2022-JP shift back to ASCII) is written by the `last`
/// encode call, so [`flush`](CharsetEncoder::flush) has nothing left to do.
pub struct WhatwgEncoder {
    encoding: &'static Encoding,
    encoder: Encoder,
}

impl WhatwgEncoder {
    /// Create an encoder for `encoding`.
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            encoder: encoding.new_encoder(),
        }
    }
}

impl std::fmt::Debug for WhatwgEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatwgEncoder")
            .field("encoding", &self.encoding.name())
            .finish_non_exhaustive()
    }
}

impl CharsetEncoder for WhatwgEncoder {
    fn charset(&self) -> Charset {
        Charset::Whatwg(self.encoding)
    }

    fn encode(&mut self, src: &str, dst: &mut [u8], last: bool) -> Result<EncodeOutcome> {
        let (result, read, written) = self
            .encoder
            .encode_from_utf8_without_replacement(src, dst, last);
        let result = match result {
            EncoderResult::InputEmpty => CoderResult::Underflow,
            EncoderResult::OutputFull => CoderResult::Overflow,
            EncoderResult::Unmappable(c) => {
                return Err(BridgeError::Encoding(format!(
                    "unmappable character U+{:04X} for {}",
                    c as u32,
                    self.encoding.name()
                )));
            }
        };
        Ok(EncodeOutcome {
            result,
            read,
            written,
        })
    }

    fn flush(&mut self, _dst: &mut [u8]) -> Result<(CoderResult, usize)> {
        Ok((CoderResult::Underflow, 0))
    }

    fn reset(&mut self) {
        self.encoder = self.encoding.new_encoder();
    }
}
