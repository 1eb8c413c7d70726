//! Configuration for producers, shared buffers and pumps.
//!
//! Every section has sensible defaults, so an empty JSON object is a valid
//! configuration:
//!
//! ```
//! use bodybridge::config::Config;
//!
//! let config = Config::from_json_str(r#"{ "producer": { "buffer_size": 1024 } }"#).unwrap();
//! assert_eq!(config.producer.buffer_size, 1024);
//! assert_eq!(config.producer.fragment_size_hint(), 512);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Default staging buffer size for entity producers.
pub const DEFAULT_PRODUCER_BUFFER_SIZE: usize = 4096;

/// Default shared buffer size for the classic bridge.
pub const DEFAULT_SHARED_BUFFER_SIZE: usize = 8 * 1024;

/// Default number of bytes a pump accepts from a producer in one turn.
pub const DEFAULT_WINDOW_SIZE: usize = 64 * 1024;

/// Default read size for the input pump.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Entity producer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Staging buffer capacity in bytes.
    pub buffer_size: usize,
    /// Staged byte count at which data is flushed instead of coalesced.
    /// Half the buffer when unset.
    pub fragment_size_hint: Option<usize>,
}

impl ProducerConfig {
    /// Config with the given buffer size and the default fragment hint.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            fragment_size_hint: None,
        }
    }

    /// Set an explicit fragment size hint.
    pub fn fragment_size_hint_of(mut self, hint: usize) -> Self {
        self.fragment_size_hint = Some(hint);
        self
    }

    /// Effective fragment size hint.
    pub fn fragment_size_hint(&self) -> usize {
        self.fragment_size_hint.unwrap_or(self.buffer_size / 2)
    }

    /// Reject a zero buffer size.
    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "producer buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self::with_buffer_size(DEFAULT_PRODUCER_BUFFER_SIZE)
    }
}

/// Shared buffer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Capacity of each shared buffer in bytes.
    pub buffer_size: usize,
    /// Upper bound for a single blocking read or write, in milliseconds.
    /// Waits are unbounded when unset.
    pub wait_timeout_ms: Option<u64>,
}

impl BufferConfig {
    /// Create a config with the given buffer size and unbounded waits.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            wait_timeout_ms: None,
        }
    }

    /// Set the blocking wait timeout, saturating at `u64::MAX` milliseconds.
    pub fn wait_timeout_of(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Blocking wait timeout, if any.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Reject a zero buffer size.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "shared buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::with_buffer_size(DEFAULT_SHARED_BUFFER_SIZE)
    }
}

/// Pump configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    /// Bytes accepted from a producer per turn.
    pub window_size: usize,
    /// Bytes read from the transport per read call.
    pub read_chunk_size: usize,
}

impl PumpConfig {
    /// Reject a zero window or read size.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.read_chunk_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "pump window_size and read_chunk_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

/// Aggregate configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub producer: ProducerConfig,
    pub buffer: BufferConfig,
    pub pump: PumpConfig,
}

impl Config {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.producer.validate()?;
        self.buffer.validate()?;
        self.pump.validate()
    }
}
