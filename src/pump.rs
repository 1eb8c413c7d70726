//! Tokio drivers that play the reactor role for producers and consumers.
//!
//! [`pump_output`] repeatedly calls [`AsyncDataProducer::produce`] with a
//! bounded in-memory channel and writes what was accepted to an
//! [`AsyncWrite`]. A turn that wrote nothing and did not ask for output parks
//! the pump until the producer calls `request_output()`.
//!
//! [`pump_input`] reads an [`AsyncRead`] in chunks and offers them to an
//! [`AsyncDataConsumer`], parking whenever nothing was accepted until the
//! consumer announces more capacity.
//!
//! # Example
//!
//! ```
//! use bodybridge::channel::StreamChannel;
//! use bodybridge::config::{ProducerConfig, PumpConfig};
//! use bodybridge::entity::{BinaryEntityProducer, ContentSource};
//! use bodybridge::pump_output;
//!
//! struct Hello;
//!
//! impl ContentSource<[u8]> for Hello {
//!     fn produce_data(&mut self, channel: &mut dyn StreamChannel<[u8]>) -> bodybridge::Result<()> {
//!         channel.write(b"hello")?;
//!         channel.end_stream()
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> bodybridge::Result<()> {
//! let producer = BinaryEntityProducer::new(&ProducerConfig::default(), None, Hello)?.into_shared();
//! let mut out = Vec::new();
//! pump_output(producer, &mut out, &PumpConfig::default()).await?;
//! assert_eq!(out, b"hello");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use bytes::BytesMut;
use http::HeaderMap;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::channel::{AsyncDataConsumer, AsyncDataProducer, CapacityChannel, DataChannel, DataStreamChannel};
use crate::config::PumpConfig;
use crate::error::{BridgeError, Result};

#[derive(Debug)]
struct WindowState {
    pending: BytesMut,
    window: usize,
    requested: bool,
    ended: bool,
}

/// Bounded channel handed to the producer on each turn.
#[derive(Debug)]
struct OutputChannel {
    state: Mutex<WindowState>,
    notify: Notify,
}

impl OutputChannel {
    fn new(window: usize) -> Self {
        Self {
            state: Mutex::new(WindowState {
                pending: BytesMut::with_capacity(window),
                window,
                requested: false,
                ended: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Take the accepted bytes, the end flag and the output request flag.
    fn take(&self) -> (BytesMut, bool, bool) {
        let mut state = self.state.lock();
        let requested = std::mem::take(&mut state.requested);
        (state.pending.split(), state.ended, requested)
    }
}

impl DataStreamChannel for OutputChannel {
    fn write(&self, src: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if state.ended {
            return Err(BridgeError::IllegalState("write after end of stream"));
        }
        let n = (state.window - state.pending.len()).min(src.len());
        state.pending.extend_from_slice(&src[..n]);
        Ok(n)
    }

    fn request_output(&self) {
        self.state.lock().requested = true;
        self.notify.notify_one();
    }

    fn end_stream(&self, trailers: Option<HeaderMap>) -> Result<()> {
        if let Some(trailers) = trailers {
            tracing::debug!("dropping {} trailers on raw output", trailers.len());
        }
        self.state.lock().ended = true;
        Ok(())
    }
}

/// Drive `producer` into `writer` until it ends the stream.
///
/// Returns the number of body bytes written.
pub async fn pump_output<P, W>(producer: Arc<P>, mut writer: W, config: &PumpConfig) -> Result<u64>
where
    P: AsyncDataProducer + ?Sized,
    W: AsyncWrite + Unpin,
{
    config.validate()?;
    let output = Arc::new(OutputChannel::new(config.window_size));
    let channel: DataChannel = output.clone();
    let mut total = 0u64;

    loop {
        producer.produce(&channel)?;
        let (chunk, ended, requested) = output.take();

        if !chunk.is_empty() {
            writer.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        if ended {
            writer.flush().await?;
            tracing::debug!(bytes = total, "output stream ended");
            return Ok(total);
        }

        if chunk.is_empty() && !requested {
            // Idle until the producer asks for output
            output.notify.notified().await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

/// Spawn [`pump_output`] as a task.
pub fn spawn_output_pump<P, W>(producer: Arc<P>, writer: W, config: PumpConfig) -> JoinHandle<Result<u64>>
where
    P: AsyncDataProducer + ?Sized + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move { pump_output(producer, writer, &config).await })
}

/// Capacity updates from the consumer, as wake-ups for the input pump.
#[derive(Debug, Default)]
struct CapacityWindow {
    notify: Notify,
}

impl CapacityChannel for CapacityWindow {
    fn update(&self, increment: usize) -> Result<()> {
        if increment > 0 {
            self.notify.notify_one();
        }
        Ok(())
    }
}

/// Feed `reader` into `consumer` until EOF, then signal end of stream.
///
/// Must start after the consumer is ready to accept data (for the classic
/// bridge: after `handle_request`). Returns the number of bytes consumed.
pub async fn pump_input<C, R>(consumer: Arc<C>, mut reader: R, config: &PumpConfig) -> Result<u64>
where
    C: AsyncDataConsumer + ?Sized,
    R: AsyncRead + Unpin,
{
    config.validate()?;
    let window = Arc::new(CapacityWindow::default());
    let capacity: Arc<dyn CapacityChannel> = window.clone();
    consumer.update_capacity(&capacity)?;

    let mut buf = vec![0u8; config.read_chunk_size];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            consumer.stream_end(None)?;
            tracing::debug!(bytes = total, "input stream ended");
            return Ok(total);
        }

        let mut chunk = &buf[..n];
        while !chunk.is_empty() {
            let accepted = consumer.consume(chunk)?;
            chunk = &chunk[accepted..];
            total += accepted as u64;
            if accepted == 0 {
                window.notify.notified().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::buffer::SharedInputBuffer;
    use crate::channel::StreamChannel;
    use crate::config::{BufferConfig, ProducerConfig};
    use crate::entity::{BinaryEntityProducer, ContentSource, ContentType, TextEntityProducer};

    struct Chunks {
        chunks: Vec<Vec<u8>>,
        next: usize,
    }

    impl ContentSource<[u8]> for Chunks {
        fn produce_data(&mut self, channel: &mut dyn StreamChannel<[u8]>) -> Result<()> {
            while self.next < self.chunks.len() {
                let chunk = &mut self.chunks[self.next];
                let n = channel.write(chunk)?;
                chunk.drain(..n);
                if !chunk.is_empty() {
                    return Ok(());
                }
                self.next += 1;
            }
            channel.end_stream()
        }
    }

    struct Lines(Vec<String>);

    impl ContentSource<str> for Lines {
        fn produce_data(&mut self, channel: &mut dyn StreamChannel<str>) -> Result<()> {
            while let Some(line) = self.0.first_mut() {
                let n = channel.write(line)?;
                line.drain(..n);
                if !line.is_empty() {
                    return Ok(());
                }
                self.0.remove(0);
            }
            channel.end_stream()
        }
    }

    /// Consumer over a shared input buffer, drained by a reader thread.
    struct BufferConsumer(Arc<SharedInputBuffer>);

    impl AsyncDataConsumer for BufferConsumer {
        fn update_capacity(&self, channel: &Arc<dyn CapacityChannel>) -> Result<()> {
            self.0.update_capacity(channel)
        }

        fn consume(&self, src: &[u8]) -> Result<usize> {
            self.0.fill(src)
        }

        fn stream_end(&self, _trailers: Option<&HeaderMap>) -> Result<()> {
            self.0.mark_end_stream();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pump_binary_producer() {
        let chunks: Vec<Vec<u8>> = (0..50u8).map(|i| vec![i; 37]).collect();
        let expected = chunks.concat();
        let producer = BinaryEntityProducer::new(
            &ProducerConfig::with_buffer_size(64),
            Some(ContentType::octet_stream()),
            Chunks { chunks, next: 0 },
        )
        .unwrap()
        .into_shared();

        let config = PumpConfig {
            window_size: 100,
            ..PumpConfig::default()
        };
        let mut out = Vec::new();
        let written = pump_output(producer, &mut out, &config).await.unwrap();

        assert_eq!(written, expected.len() as u64);
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_pump_text_producer_over_duplex() {
        let producer = TextEntityProducer::new(
            &ProducerConfig::with_buffer_size(8),
            Some(ContentType::text_plain_utf8()),
            Lines(vec!["gr\u{fc}\u{df} ".to_string(), "\u{1F30D}!".to_string()]),
        )
        .unwrap()
        .into_shared();

        let (client, mut server) = tokio::io::duplex(16);
        let pump = spawn_output_pump(producer, client, PumpConfig::default());

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        pump.await.unwrap().unwrap();

        assert_eq!(received, "gr\u{fc}\u{df} \u{1F30D}!");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pump_input_waits_for_capacity() {
        let buffer = Arc::new(SharedInputBuffer::new(&BufferConfig::with_buffer_size(4)).unwrap());
        let consumer = Arc::new(BufferConsumer(buffer.clone()));

        let reader = thread::spawn(move || {
            let mut body = Vec::new();
            let mut chunk = [0u8; 3];
            loop {
                let n = buffer.read(&mut chunk).unwrap();
                if n == 0 {
                    return body;
                }
                body.extend_from_slice(&chunk[..n]);
            }
        });

        let payload: Vec<u8> = (0..200u8).collect();
        let config = PumpConfig {
            read_chunk_size: 16,
            ..PumpConfig::default()
        };
        let consumed = pump_input(consumer, &payload[..], &config).await.unwrap();

        assert_eq!(consumed, 200);
        assert_eq!(reader.join().unwrap(), payload);
    }

    /// Source that only counts turns; data arrives through an `EntityWriter`.
    struct CountingSource(Arc<std::sync::atomic::AtomicUsize>);

    impl ContentSource<[u8]> for CountingSource {
        fn produce_data(&mut self, _channel: &mut dyn StreamChannel<[u8]>) -> Result<()> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_idle_producer_parks_pump() {
        let turns = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let producer = BinaryEntityProducer::new(
            &ProducerConfig::with_buffer_size(64),
            None,
            CountingSource(turns.clone()),
        )
        .unwrap()
        .into_shared();

        let (client, mut server) = tokio::io::duplex(64);
        let pump = spawn_output_pump(producer.clone(), client, PumpConfig::default());

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(turns.load(std::sync::atomic::Ordering::SeqCst), 1);

        // Writes from outside the turn wake the pump
        let mut writer = producer.writer();
        assert_eq!(writer.write(&b"late data"[..]).unwrap(), 9);
        writer.end_stream().unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(pump.await.unwrap().unwrap(), 9);
        assert_eq!(received, b"late data");
        assert!(turns.load(std::sync::atomic::Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let producer = BinaryEntityProducer::new(
            &ProducerConfig::default(),
            None,
            Chunks {
                chunks: Vec::new(),
                next: 0,
            },
        )
        .unwrap()
        .into_shared();
        let config = PumpConfig {
            window_size: 0,
            ..PumpConfig::default()
        };

        let result = pump_output(producer, tokio::io::sink(), &config).await;
        assert!(matches!(result, Err(BridgeError::InvalidConfig(_))));
    }
}
