//! Encoders built on the standard library's `char` encodings.

use super::{Charset, CharsetEncoder, CoderResult, EncodeOutcome};
use crate::error::{BridgeError, Result};

const UTF16_BOM: [u8; 2] = [0xFE, 0xFF];

/// Encoder for the built-in charsets. [`Charset::Whatwg`] is refused; use
/// [`WhatwgEncoder`](super::WhatwgEncoder) for those.
#[derive(Debug)]
pub struct StdEncoder {
    charset: Charset,
    /// A byte-order mark is still owed before the first character.
    bom_pending: bool,
}

impl StdEncoder {
    /// Create an encoder in its initial state.
    pub fn new(charset: Charset) -> Self {
        Self {
            charset,
            bom_pending: charset == Charset::Utf16,
        }
    }

    /// Encode one char into `out`, returning the encoded length.
    fn encode_char(&self, c: char, out: &mut [u8; 4]) -> Result<usize> {
        match self.charset {
            Charset::UsAscii | Charset::Iso8859_1 => {
                let limit = if self.charset == Charset::UsAscii { 0x80 } else { 0x100 };
                if (c as u32) < limit {
                    out[0] = c as u8;
                    Ok(1)
                } else {
                    Err(BridgeError::Encoding(format!(
                        "unmappable character U+{:04X} for {}",
                        c as u32, self.charset
                    )))
                }
            }
            Charset::Utf8 => Ok(c.encode_utf8(out).len()),
            Charset::Utf16Be | Charset::Utf16 | Charset::Utf16Le => {
                let mut units = [0u16; 2];
                let units = c.encode_utf16(&mut units);
                let little = self.charset == Charset::Utf16Le;
                for (i, unit) in units.iter().enumerate() {
                    let bytes = if little {
                        unit.to_le_bytes()
                    } else {
                        unit.to_be_bytes()
                    };
                    out[i * 2..i * 2 + 2].copy_from_slice(&bytes);
                }
                Ok(units.len() * 2)
            }
            Charset::Whatwg(_) => Err(BridgeError::Encoding(format!(
                "{} is not a built-in charset",
                self.charset
            ))),
        }
    }
}

impl CharsetEncoder for StdEncoder {
    fn charset(&self) -> Charset {
        self.charset
    }

    fn encode(&mut self, src: &str, dst: &mut [u8], _last: bool) -> Result<EncodeOutcome> {
        let mut written = 0;
        let mut scratch = [0u8; 4];

        for (offset, c) in src.char_indices() {
            let len = self.encode_char(c, &mut scratch)?;
            let bom = if self.bom_pending { UTF16_BOM.len() } else { 0 };

            if dst.len() - written < bom + len {
                return Ok(EncodeOutcome {
                    result: CoderResult::Overflow,
                    read: offset,
                    written,
                });
            }
            if bom > 0 {
                dst[written..written + bom].copy_from_slice(&UTF16_BOM);
                written += bom;
                self.bom_pending = false;
            }
            dst[written..written + len].copy_from_slice(&scratch[..len]);
            written += len;
        }

        Ok(EncodeOutcome {
            result: CoderResult::Underflow,
            read: src.len(),
            written,
        })
    }

    fn flush(&mut self, _dst: &mut [u8]) -> Result<(CoderResult, usize)> {
        // Characters are never split, so nothing is held back
        Ok((CoderResult::Underflow, 0))
    }

    fn reset(&mut self) {
        self.bom_pending = self.charset == Charset::Utf16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(charset: Charset, text: &str) -> Vec<u8> {
        let mut encoder = StdEncoder::new(charset);
        let mut out = vec![0u8; text.len() * 4 + 2];
        let outcome = encoder.encode(text, &mut out, true).unwrap();
        assert_eq!(outcome.result, CoderResult::Underflow);
        out.truncate(outcome.written);
        out
    }

    #[test]
    fn test_utf8_matches_str_bytes() {
        let text = "caf\u{e9} \u{20ac} \u{1F600}";
        assert_eq!(encode_all(Charset::Utf8, text), text.as_bytes());
    }

    #[test]
    fn test_ascii_rejects_unmappable() {
        let mut encoder = StdEncoder::new(Charset::UsAscii);
        let mut out = [0u8; 16];
        let err = encoder.encode("ok\u{e9}", &mut out, false).unwrap_err();
        assert!(matches!(err, BridgeError::Encoding(_)));
        assert!(err.to_string().contains("U+00E9"));
    }

    #[test]
    fn test_latin1_single_byte() {
        assert_eq!(encode_all(Charset::Iso8859_1, "caf\u{e9}"), b"caf\xe9");
    }

    #[test]
    fn test_utf16_variants() {
        assert_eq!(encode_all(Charset::Utf16Be, "A"), [0x00, 0x41]);
        assert_eq!(encode_all(Charset::Utf16Le, "A"), [0x41, 0x00]);
        assert_eq!(encode_all(Charset::Utf16, "A"), [0xFE, 0xFF, 0x00, 0x41]);
        // Surrogate pair
        assert_eq!(
            encode_all(Charset::Utf16Be, "\u{1F600}"),
            [0xD8, 0x3D, 0xDE, 0x00]
        );
    }

    #[test]
    fn test_overflow_stops_on_char_boundary() {
        let mut encoder = StdEncoder::new(Charset::Utf8);
        let mut out = [0u8; 4];

        // "a" (1) + "é" (2) fit, "€" (3) does not
        let outcome = encoder.encode("a\u{e9}\u{20ac}", &mut out, false).unwrap();
        assert_eq!(outcome.result, CoderResult::Overflow);
        assert_eq!(outcome.read, 3);
        assert_eq!(outcome.written, 3);
        assert_eq!(&out[..3], "a\u{e9}".as_bytes());
    }

    #[test]
    fn test_bom_emitted_once_until_reset() {
        let mut encoder = StdEncoder::new(Charset::Utf16);
        let mut out = [0u8; 8];

        let first = encoder.encode("A", &mut out, false).unwrap();
        assert_eq!(first.written, 4);
        let second = encoder.encode("B", &mut out, false).unwrap();
        assert_eq!(second.written, 2);
        assert_eq!(&out[..2], &[0x00, 0x42]);

        encoder.reset();
        let third = encoder.encode("C", &mut out, false).unwrap();
        assert_eq!(&out[..third.written], &[0xFE, 0xFF, 0x00, 0x43]);
    }

    #[test]
    fn test_bom_needs_room_with_first_char() {
        let mut encoder = StdEncoder::new(Charset::Utf16);
        let mut out = [0u8; 3];

        let outcome = encoder.encode("A", &mut out, false).unwrap();
        assert_eq!(outcome.result, CoderResult::Overflow);
        assert_eq!(outcome.read, 0);
        assert_eq!(outcome.written, 0);
    }

    #[test]
    fn test_flush_is_empty() {
        let mut encoder = StdEncoder::new(Charset::Utf8);
        let mut out = [0u8; 4];
        assert_eq!(encoder.flush(&mut out).unwrap(), (CoderResult::Underflow, 0));
    }
}
