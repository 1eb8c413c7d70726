//! Charset encoding capability used by the text entity producer.
//!
//! An encoder turns `&str` input into bytes of a target charset, writing into
//! a caller-supplied window. It never splits a character: when the window
//! cannot hold the next encoded character it reports [`CoderResult::Overflow`]
//! and stops before it, so the caller can drain the window and resume from
//! the reported offset.
//!
//! Encoders may carry state between calls (the UTF-16 byte-order mark is
//! emitted once per stream); [`CharsetEncoder::reset`] restores the initial
//! state.
//!
//! The common charsets use [`StdEncoder`]. Any other label the WHATWG
//! Encoding Standard can encode resolves to [`Charset::Whatwg`], encoded by
//! [`WhatwgEncoder`] on top of `encoding_rs`.

mod encoders;
mod whatwg;

use std::fmt;
use std::str::FromStr;

use encoding_rs::Encoding;

use crate::error::{BridgeError, Result};

pub use encoders::StdEncoder;
pub use whatwg::WhatwgEncoder;

/// Outcome of an encode or flush step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoderResult {
    /// All input was consumed; more input may follow.
    Underflow,
    /// The output window is full; drain it and call again.
    Overflow,
}

/// Result of a single [`CharsetEncoder::encode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOutcome {
    pub result: CoderResult,
    /// Bytes of the `&str` input consumed (always on a char boundary).
    pub read: usize,
    /// Bytes written into the output window.
    pub written: usize,
}

/// Stateful character-to-byte encoder.
pub trait CharsetEncoder: Send {
    fn charset(&self) -> Charset;

    /// Encode as much of `src` into `dst` as fits. `last` marks the final call
    /// of the stream.
    fn encode(&mut self, src: &str, dst: &mut [u8], last: bool) -> Result<EncodeOutcome>;

    /// Write any state held back until the end of input.
    /// Returns the coder result and the number of bytes written.
    fn flush(&mut self, dst: &mut [u8]) -> Result<(CoderResult, usize)>;

    /// Return to the initial state.
    fn reset(&mut self);
}

/// Supported charsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    UsAscii,
    Iso8859_1,
    Utf8,
    Utf16Be,
    Utf16Le,
    /// Big-endian with a leading byte-order mark.
    Utf16,
    /// Legacy charset from the WHATWG Encoding Standard (`windows-1252`,
    /// `Shift_JIS`, `KOI8-R`, ...).
    Whatwg(&'static Encoding),
}

impl Charset {
    /// Canonical name, as used in a `charset` parameter.
    pub fn name(&self) -> &'static str {
        match self {
            Charset::UsAscii => "US-ASCII",
            Charset::Iso8859_1 => "ISO-8859-1",
            Charset::Utf8 => "UTF-8",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
            Charset::Utf16 => "UTF-16",
            Charset::Whatwg(encoding) => encoding.name(),
        }
    }

    /// Look up a charset by name or common alias, case-insensitively.
    pub fn for_label(label: &str) -> Option<Charset> {
        let label = label.trim().trim_matches('"').to_ascii_lowercase();
        let charset = match label.as_str() {
            "us-ascii" | "ascii" | "iso646-us" => Charset::UsAscii,
            "iso-8859-1" | "iso8859-1" | "latin1" | "l1" => Charset::Iso8859_1,
            "utf-8" | "utf8" => Charset::Utf8,
            "utf-16be" => Charset::Utf16Be,
            "utf-16le" => Charset::Utf16Le,
            "utf-16" | "utf16" => Charset::Utf16,
            _ => {
                // Decode-only encodings (UTF-16 variants, replacement) are skipped
                let encoding = Encoding::for_label(label.as_bytes())?;
                if encoding.output_encoding() != encoding {
                    return None;
                }
                Charset::Whatwg(encoding)
            }
        };
        Some(charset)
    }

    /// Fresh encoder for this charset.
    pub fn new_encoder(&self) -> Box<dyn CharsetEncoder> {
        match self {
            Charset::Whatwg(encoding) => Box::new(WhatwgEncoder::new(encoding)),
            _ => Box::new(StdEncoder::new(*self)),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Charset::for_label(s)
            .ok_or_else(|| BridgeError::Encoding(format!("unsupported charset: {}", s)))
    }
}
