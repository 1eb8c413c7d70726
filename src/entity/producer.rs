//! Buffered entity producer core shared by the binary and text variants.
//!
//! The application supplies data through a [`ContentSource`], which is called
//! once per `produce` turn with a [`StreamChannel`], or from any thread through
//! an [`EntityWriter`] obtained from [`BufferedProducer::writer`]. Writes land in a
//! [`StagingBuffer`] and reach the transport only in bounded fragments:
//!
//! - small writes coalesce in the staging buffer
//! - staged bytes are flushed once the buffer is full, the fragment size hint
//!   is reached, or the application has ended the stream
//! - the transport's end of stream is signalled exactly once, after the
//!   application ended the stream and the buffer drained
//!
//! What a write does with its input is the per-variant [`ChunkCoder`]
//! strategy: raw copy for bytes, charset encoding for text.

use std::sync::Arc;

use parking_lot::Mutex;

use super::details::{AsyncEntityProducer, ContentType, EntityDetails};
use super::staging::StagingBuffer;
use http::HeaderMap;

use crate::channel::{AsyncDataProducer, DataChannel, DataStreamChannel, StreamChannel};
use crate::config::ProducerConfig;
use crate::error::{BridgeError, Result};

/// Producer life-cycle. Transitions only move forward until reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StreamState {
    /// Accepting application writes.
    Active,
    /// Application ended the stream; coder state and staged bytes draining.
    Flushing,
    /// Coder fully flushed; only staged bytes remain.
    EndStream,
}

/// Per-variant accept-and-stage strategy.
pub trait ChunkCoder: Send {
    /// Unit of application input.
    type Chunk: ?Sized;

    /// Accept as much of `src` as possible, returning the units consumed.
    fn accept(
        &mut self,
        stage: &mut StagingBuffer,
        src: &Self::Chunk,
        fragment_size_hint: usize,
        channel: &dyn DataStreamChannel,
    ) -> Result<usize>;

    /// Stage whatever the coder still holds once input has ended.
    /// Returns `true` when nothing is left pending.
    fn finish(&mut self, stage: &mut StagingBuffer) -> Result<bool>;

    /// Whether a write this turn was refused pending a flush. Cleared on read.
    fn take_flush_request(&mut self) -> bool {
        false
    }

    fn reset(&mut self);
}

/// Application data supply, called when the transport can take more output.
pub trait ContentSource<T: ?Sized>: Send {
    /// Write data to `channel`, and call `end_stream` once there is no more.
    fn produce_data(&mut self, channel: &mut dyn StreamChannel<T>) -> Result<()>;

    /// Called after the producer resets its own state.
    fn release_resources(&mut self) {}
}

struct ProducerInner<C> {
    stage: StagingBuffer,
    coder: C,
    state: StreamState,
    end_signalled: bool,
    /// Transport channel of the most recent turn.
    channel: Option<DataChannel>,
}

impl<C: ChunkCoder> ProducerInner<C> {
    /// Post-callback step of a `produce` turn.
    fn complete_turn(&mut self, channel: &dyn DataStreamChannel, hint: usize) -> Result<()> {
        if self.end_signalled {
            return Ok(());
        }
        if self.state == StreamState::Flushing && self.coder.finish(&mut self.stage)? {
            self.state = StreamState::EndStream;
        }
        let requested = self.coder.take_flush_request();
        if self.state > StreamState::Active
            || self.stage.is_full()
            || self.stage.len() >= hint
            || requested
        {
            self.stage.flush_to(channel)?;
        }
        if self.state == StreamState::EndStream && self.stage.is_empty() {
            channel.end_stream(None)?;
            self.end_signalled = true;
        } else if self.state > StreamState::Active {
            channel.request_output();
        }
        Ok(())
    }
}

/// Stand-in transport before the first turn: accepts nothing.
struct Detached;

impl DataStreamChannel for Detached {
    fn write(&self, _src: &[u8]) -> Result<usize> {
        Ok(0)
    }

    fn request_output(&self) {}

    fn end_stream(&self, _trailers: Option<HeaderMap>) -> Result<()> {
        Ok(())
    }
}

/// Owned write handle onto a [`BufferedProducer`].
///
/// Every write takes the producer's staging lock, so application threads and
/// the reactor's flush never interleave inside the buffer. Outside a
/// `produce` turn each write asks the transport for another turn, which is
/// where staged bytes are flushed. Before the first turn writes are only
/// staged.
pub struct EntityWriter<C> {
    inner: Arc<Mutex<ProducerInner<C>>>,
    fragment_size_hint: usize,
    wake: bool,
}

impl<C> Clone for EntityWriter<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            fragment_size_hint: self.fragment_size_hint,
            wake: self.wake,
        }
    }
}

impl<C> std::fmt::Debug for EntityWriter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityWriter")
            .field("fragment_size_hint", &self.fragment_size_hint)
            .finish_non_exhaustive()
    }
}

impl<C: ChunkCoder> EntityWriter<C> {
    fn request_turn(channel: Option<DataChannel>) {
        if let Some(channel) = channel {
            channel.request_output();
        }
    }
}

impl<C: ChunkCoder> StreamChannel<C::Chunk> for EntityWriter<C> {
    fn write(&mut self, src: &C::Chunk) -> Result<usize> {
        let (consumed, channel) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            if inner.state != StreamState::Active {
                return Err(BridgeError::IllegalState("write after end of stream"));
            }
            let channel = inner.channel.clone();
            let transport: &dyn DataStreamChannel = match &channel {
                Some(channel) => channel.as_ref(),
                None => &Detached,
            };
            let consumed = inner
                .coder
                .accept(&mut inner.stage, src, self.fragment_size_hint, transport)?;
            (consumed, channel)
        };
        if self.wake && consumed > 0 {
            Self::request_turn(channel);
        }
        Ok(consumed)
    }

    fn end_stream(&mut self) -> Result<()> {
        let channel = {
            let mut inner = self.inner.lock();
            if inner.state == StreamState::Active {
                inner.state = StreamState::Flushing;
            }
            inner.channel.clone()
        };
        Self::request_turn(channel);
        Ok(())
    }
}

/// Entity producer that stages application writes and releases them to the
/// transport in fragments.
pub struct BufferedProducer<C: ChunkCoder, S> {
    source: Mutex<S>,
    inner: Arc<Mutex<ProducerInner<C>>>,
    fragment_size_hint: usize,
    content_type: Option<ContentType>,
    content_type_value: Option<String>,
}

impl<C, S> BufferedProducer<C, S>
where
    C: ChunkCoder,
    S: ContentSource<C::Chunk>,
{
    pub(crate) fn with_coder(
        config: &ProducerConfig,
        content_type: Option<ContentType>,
        coder: C,
        source: S,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source: Mutex::new(source),
            inner: Arc::new(Mutex::new(ProducerInner {
                stage: StagingBuffer::new(config.buffer_size),
                coder,
                state: StreamState::Active,
                end_signalled: false,
                channel: None,
            })),
            fragment_size_hint: config.fragment_size_hint(),
            content_type_value: content_type.as_ref().map(ToString::to_string),
            content_type,
        })
    }

    /// Staged byte count that triggers a flush.
    pub fn fragment_size_hint(&self) -> usize {
        self.fragment_size_hint
    }

    /// Content type as given at construction.
    pub fn content_type_ref(&self) -> Option<&ContentType> {
        self.content_type.as_ref()
    }

    /// Current stream state.
    pub fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    /// Bytes staged but not yet accepted by the transport.
    pub fn staged(&self) -> usize {
        self.inner.lock().stage.len()
    }

    /// Owned handle for writing from outside `produce`, e.g. another thread.
    pub fn writer(&self) -> EntityWriter<C> {
        EntityWriter {
            inner: Arc::clone(&self.inner),
            fragment_size_hint: self.fragment_size_hint,
            wake: true,
        }
    }

    /// Run `f` against the application source.
    pub fn with_source<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.source.lock())
    }

    /// Shorthand for wrapping in an `Arc` for a pump.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl<C, S> AsyncDataProducer for BufferedProducer<C, S>
where
    C: ChunkCoder,
    S: ContentSource<C::Chunk>,
{
    /// Free staging space; non-zero while the producer can take more data.
    fn available(&self) -> usize {
        self.inner.lock().stage.remaining()
    }

    fn produce(&self, channel: &DataChannel) -> Result<()> {
        let active = {
            let mut inner = self.inner.lock();
            inner.channel = Some(Arc::clone(channel));
            inner.state == StreamState::Active
        };
        if active {
            // Already inside a turn: no wake-ups
            let mut sink = EntityWriter {
                inner: Arc::clone(&self.inner),
                fragment_size_hint: self.fragment_size_hint,
                wake: false,
            };
            self.source.lock().produce_data(&mut sink)?;
        }
        self.inner
            .lock()
            .complete_turn(channel.as_ref(), self.fragment_size_hint)
    }
}

impl<C: ChunkCoder, S> EntityDetails for BufferedProducer<C, S> {
    fn content_length(&self) -> Option<u64> {
        None
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type_value.as_deref()
    }

    fn content_encoding(&self) -> Option<&str> {
        None
    }

    fn is_chunked(&self) -> bool {
        false
    }
}

impl<C, S> AsyncEntityProducer for BufferedProducer<C, S>
where
    C: ChunkCoder,
    S: ContentSource<C::Chunk>,
{
    fn release_resources(&self) {
        {
            let mut inner = self.inner.lock();
            inner.stage.clear();
            inner.coder.reset();
            inner.state = StreamState::Active;
            inner.end_signalled = false;
            inner.channel = None;
        }
        self.source.lock().release_resources();
    }
}
