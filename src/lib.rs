//! # bodybridge
//!
//! Asynchronous HTTP message bodies with blocking-style application code.
//!
//! This crate reconciles a non-blocking, capacity-signalled transport with
//! application code that wants to read and write plain streams.
//!
//! ## Architecture
//!
//! - **Entity producers** ([`entity`]): application writes are staged and
//!   released to the transport in bounded fragments, binary or charset-encoded
//! - **Shared buffers** ([`buffer`]): bounded regions where a worker thread
//!   blocks while the reactor side only ever moves what fits
//! - **Classic bridge** ([`bridge`]): runs a blocking handler on an executor
//!   with its streams wired to the exchange through the shared buffers
//! - **Pumps** ([`pump`]): tokio drivers that play the reactor for tests and
//!   simple servers
//!
//! ## Example
//!
//! A blocking handler behind the asynchronous exchange contract, driven by
//! hand with an in-memory transport:
//!
//! ```
//! use std::io::Write;
//! use std::sync::Arc;
//!
//! use bodybridge::bridge::{from_fn, AsyncServerExchangeHandler, ClassicExchangeHandler, HttpContext};
//! use bodybridge::channel::{AsyncDataProducer, DataChannel, MemoryChannel, ResponseChannel, ThreadExecutor};
//! use bodybridge::config::BufferConfig;
//! use bodybridge::entity::EntityDescriptor;
//!
//! struct Discard;
//!
//! impl ResponseChannel for Discard {
//!     fn send_response(
//!         &self,
//!         _response: http::Response<()>,
//!         _entity: Option<EntityDescriptor>,
//!     ) -> bodybridge::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> bodybridge::Result<()> {
//! let exchange = ClassicExchangeHandler::new(
//!     from_fn(|_request, _input, _response, output, _context| {
//!         output.write_all(b"hello")?;
//!         Ok(())
//!     }),
//!     Arc::new(ThreadExecutor::default()),
//!     BufferConfig::default(),
//! )?;
//! exchange.handle_request(http::Request::new(()), None, Arc::new(Discard), HttpContext::new())?;
//!
//! let memory = Arc::new(MemoryChannel::new());
//! let channel: DataChannel = memory.clone();
//! while !memory.is_ended() {
//!     exchange.produce(&channel)?;
//!     std::thread::sleep(std::time::Duration::from_millis(1));
//! }
//! assert_eq!(&memory.data()[..], b"hello");
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod buffer;
pub mod channel;
pub mod charset;
pub mod config;
pub mod entity;
pub mod error;
pub mod pump;

pub use bridge::{
    from_fn, AsyncServerExchangeHandler, ClassicExchangeHandler, ClassicHandler, HttpContext,
};
pub use buffer::{SharedInputBuffer, SharedOutputBuffer};
pub use channel::{AsyncDataConsumer, AsyncDataProducer, DataChannel, DataStreamChannel};
pub use config::Config;
pub use entity::{BinaryEntityProducer, ContentType, TextEntityProducer};
pub use error::{BridgeError, Result};
pub use pump::{pump_input, pump_output, spawn_output_pump};
