//! Entity metadata: content type and the details announced with a message body.

use std::fmt;
use std::str::FromStr;

use http::HeaderName;

use crate::channel::AsyncDataProducer;
use crate::charset::Charset;
use crate::error::{BridgeError, Result};

/// A MIME type with an optional charset parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    mime_type: String,
    charset: Option<Charset>,
}

impl ContentType {
    /// Create a content type. The MIME type is lowercased.
    pub fn new(mime_type: impl Into<String>, charset: Option<Charset>) -> Self {
        Self {
            mime_type: mime_type.into().to_ascii_lowercase(),
            charset,
        }
    }

    /// `application/octet-stream`
    pub fn octet_stream() -> Self {
        Self::new("application/octet-stream", None)
    }

    /// `text/plain; charset=UTF-8`
    pub fn text_plain_utf8() -> Self {
        Self::new("text/plain", Some(Charset::Utf8))
    }

    /// Same MIME type with a different charset.
    pub fn with_charset(&self, charset: Charset) -> Self {
        Self {
            mime_type: self.mime_type.clone(),
            charset: Some(charset),
        }
    }

    /// MIME type without parameters.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The `charset` parameter, if any.
    pub fn charset(&self) -> Option<Charset> {
        self.charset
    }

    /// Parse a `Content-Type` header value. Parameters other than `charset`
    /// are ignored.
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(';');
        let mime_type = parts.next().unwrap_or_default().trim();
        if mime_type.is_empty() || !mime_type.contains('/') {
            return Err(BridgeError::InvalidConfig(format!(
                "invalid content type: {}",
                value
            )));
        }

        let mut charset = None;
        for param in parts {
            if let Some((name, val)) = param.split_once('=') {
                if name.trim().eq_ignore_ascii_case("charset") {
                    charset = Some(val.parse::<Charset>()?);
                }
            }
        }

        Ok(Self::new(mime_type, charset))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.charset {
            Some(charset) => write!(f, "{}; charset={}", self.mime_type, charset),
            None => f.write_str(&self.mime_type),
        }
    }
}

impl FromStr for ContentType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        ContentType::parse(s)
    }
}

/// Details of a message entity announced ahead of its content.
pub trait EntityDetails {
    /// Length in bytes, `None` when unknown.
    fn content_length(&self) -> Option<u64>;

    fn content_type(&self) -> Option<&str>;

    fn content_encoding(&self) -> Option<&str>;

    fn is_chunked(&self) -> bool;

    fn trailer_names(&self) -> &[HeaderName] {
        &[]
    }
}

/// Owned [`EntityDetails`] value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub chunked: bool,
    pub trailer_names: Vec<HeaderName>,
}

impl EntityDescriptor {
    /// Body of unknown length, not chunked, no trailers.
    pub fn streamed(content_type: Option<String>, content_encoding: Option<String>) -> Self {
        Self {
            content_type,
            content_encoding,
            ..Self::default()
        }
    }
}

impl EntityDetails for EntityDescriptor {
    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    fn is_chunked(&self) -> bool {
        self.chunked
    }

    fn trailer_names(&self) -> &[HeaderName] {
        &self.trailer_names
    }
}

/// An asynchronous message body: metadata plus channel-paced production.
pub trait AsyncEntityProducer: AsyncDataProducer + EntityDetails {
    /// Whether the content can be produced more than once.
    fn is_repeatable(&self) -> bool {
        false
    }

    /// The exchange this body belongs to has failed.
    fn failed(&self, _cause: &BridgeError) {}

    /// Reset internal state after the message completes.
    fn release_resources(&self);
}
