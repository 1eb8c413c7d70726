//! Channel module - the capabilities the I/O side offers to producers and handlers.
//!
//! Provides:
//! - [`DataStreamChannel`] - non-blocking byte sink paced by the reactor
//! - [`StreamChannel`] - application-facing sink of generic chunks
//! - [`CapacityChannel`] - inbound flow-control window updates
//! - [`ResponseChannel`] - sends the response head once
//! - [`AsyncDataProducer`] / [`AsyncDataConsumer`] - what the reactor drives
//! - [`Executor`] - runs blocking work off the reactor thread
//!
//! # Threading
//!
//! Reactor-facing channels take `&self` and are `Send + Sync`: the output
//! shared buffer keeps the channel it was last flushed into and calls
//! [`DataStreamChannel::request_output`] from a worker thread. Implementations
//! must not call back into the producer from inside `request_output`.

mod executor;
mod memory;

use std::sync::Arc;

use http::{HeaderMap, Response};

use crate::entity::EntityDescriptor;
use crate::error::Result;

pub use executor::{Executor, Task, ThreadExecutor, TokioBlockingExecutor};
pub use memory::MemoryChannel;

/// Non-blocking byte channel towards the transport.
pub trait DataStreamChannel: Send + Sync {
    /// Offer bytes to the transport. Returns how many were accepted,
    /// which may be fewer than offered (including zero).
    fn write(&self, src: &[u8]) -> Result<usize>;

    /// Ask to be driven again once the transport can take more output.
    fn request_output(&self);

    /// Terminate the stream, optionally with trailers.
    fn end_stream(&self, trailers: Option<HeaderMap>) -> Result<()>;
}

/// Shared handle to a [`DataStreamChannel`].
pub type DataChannel = Arc<dyn DataStreamChannel>;

/// Application-facing channel over chunks of `T` (`[u8]` or `str`).
pub trait StreamChannel<T: ?Sized> {
    /// Write a chunk, returning the number of units consumed from `src`.
    fn write(&mut self, src: &T) -> Result<usize>;

    /// Signal that the application has no more data.
    fn end_stream(&mut self) -> Result<()>;
}

/// Receives capacity increments for inbound data.
pub trait CapacityChannel: Send + Sync {
    /// Grant `increment` more bytes of inbound capacity.
    fn update(&self, increment: usize) -> Result<()>;
}

/// Sends the response head downstream.
pub trait ResponseChannel: Send + Sync {
    /// Send the response head, followed by an entity described by `entity`
    /// when present.
    fn send_response(&self, response: Response<()>, entity: Option<EntityDescriptor>) -> Result<()>;
}

/// Outbound side of an exchange, as seen by the reactor.
pub trait AsyncDataProducer: Send + Sync {
    /// Size hint for the reactor. Not a wake-up signal: producers call
    /// [`DataStreamChannel::request_output`] when they want another turn.
    fn available(&self) -> usize;

    /// Write as much as the channel accepts.
    fn produce(&self, channel: &DataChannel) -> Result<()>;
}

/// Inbound side of an exchange, as seen by the reactor.
pub trait AsyncDataConsumer: Send + Sync {
    /// Hand the consumer a channel for signalling capacity.
    fn update_capacity(&self, channel: &Arc<dyn CapacityChannel>) -> Result<()>;

    /// Offer inbound bytes, returning how many were accepted.
    fn consume(&self, src: &[u8]) -> Result<usize>;

    /// No more inbound bytes will arrive.
    fn stream_end(&self, trailers: Option<&HeaderMap>) -> Result<()>;
}
