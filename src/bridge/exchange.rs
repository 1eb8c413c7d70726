//! Asynchronous server exchange backed by a blocking handler.
//!
//! The reactor drives [`ClassicExchangeHandler`] through the
//! [`AsyncServerExchangeHandler`] contract. On `handle_request` the handler
//! body is submitted to an [`Executor`] exactly once; its streams are backed
//! by a [`SharedInputBuffer`] (only when the request carries a body) and a
//! [`SharedOutputBuffer`]. Inbound and outbound byte delivery is forwarded to
//! the non-blocking side of those buffers.
//!
//! Failures on either side abort both buffers, so a worker parked on a
//! blocking read or write wakes with an error instead of hanging.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use http::{HeaderMap, Request};

use super::context::HttpContext;
use super::handler::ClassicHandler;
use super::response::UncommittedResponse;
use super::stream::{ContentInputStream, ContentOutputStream};
use crate::buffer::{SharedInputBuffer, SharedOutputBuffer};
use crate::channel::{
    AsyncDataConsumer, AsyncDataProducer, CapacityChannel, DataChannel, Executor, ResponseChannel, Task,
};
use crate::config::BufferConfig;
use crate::entity::EntityDescriptor;
use crate::error::{BridgeError, Result};

/// Server side of one request/response exchange, as driven by the reactor.
pub trait AsyncServerExchangeHandler: AsyncDataConsumer + AsyncDataProducer {
    /// The request head arrived. `entity` is `None` when there is no body.
    fn handle_request(
        &self,
        request: Request<()>,
        entity: Option<EntityDescriptor>,
        response_channel: Arc<dyn ResponseChannel>,
        context: HttpContext,
    ) -> Result<()>;

    /// The exchange failed outside the handler (I/O error, cancellation).
    fn failed(&self, cause: BridgeError);

    fn release_resources(&self);
}

const IDLE: u8 = 0;
const ACTIVE: u8 = 1;
const COMPLETED: u8 = 2;

/// Life-cycle of the handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    Active,
    Completed,
}

impl HandlerState {
    fn from_u8(value: u8) -> Self {
        match value {
            IDLE => HandlerState::Idle,
            ACTIVE => HandlerState::Active,
            _ => HandlerState::Completed,
        }
    }
}

/// State shared between the reactor-facing handler and the worker task.
#[derive(Debug, Default)]
struct ExchangeShared {
    state: AtomicU8,
    failure: OnceLock<BridgeError>,
    input: OnceLock<Arc<SharedInputBuffer>>,
    output: OnceLock<Arc<SharedOutputBuffer>>,
}

impl ExchangeShared {
    /// Record `cause` if it is the first failure, then abort both buffers.
    fn fail(&self, cause: BridgeError) {
        let _ = self.failure.set(cause);
        self.abort_buffers();
    }

    fn abort_buffers(&self) {
        if let Some(input) = self.input.get() {
            input.abort();
        }
        if let Some(output) = self.output.get() {
            output.abort();
        }
    }

    fn complete(&self) {
        self.state.store(COMPLETED, Ordering::Release);
    }

    fn input(&self) -> Result<&Arc<SharedInputBuffer>> {
        self.input
            .get()
            .ok_or(BridgeError::IllegalState("no input buffer"))
    }

    fn output(&self) -> Result<&Arc<SharedOutputBuffer>> {
        self.output
            .get()
            .ok_or(BridgeError::IllegalState("no output buffer"))
    }
}

/// Forces the exchange to COMPLETED when the worker task ends, including by
/// panic. A panicking handler is recorded as a handler failure.
struct CompletionGuard {
    shared: Arc<ExchangeShared>,
    exchange_id: u64,
    finished: bool,
}

impl CompletionGuard {
    fn new(shared: Arc<ExchangeShared>, exchange_id: u64) -> Self {
        Self {
            shared,
            exchange_id,
            finished: false,
        }
    }

    fn finish(mut self, result: Result<()>) {
        self.finished = true;
        match result {
            Ok(()) => tracing::debug!(exchange_id = self.exchange_id, "handler finished"),
            Err(e) => {
                tracing::error!(exchange_id = self.exchange_id, "handler failed: {}", e);
                self.shared.fail(e);
            }
        }
        self.shared.complete();
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!(exchange_id = self.exchange_id, "handler panicked");
            self.shared.fail(BridgeError::handler("handler panicked"));
            self.shared.complete();
        }
    }
}

/// Runs a [`ClassicHandler`] on an executor and bridges its blocking streams
/// to the asynchronous exchange.
pub struct ClassicExchangeHandler<H> {
    handler: Arc<H>,
    executor: Arc<dyn Executor>,
    config: BufferConfig,
    shared: Arc<ExchangeShared>,
}

impl<H: ClassicHandler> ClassicExchangeHandler<H> {
    /// Create an exchange handler whose shared buffers are sized by `config`.
    pub fn new(handler: H, executor: Arc<dyn Executor>, config: BufferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            handler: Arc::new(handler),
            executor,
            config,
            shared: Arc::new(ExchangeShared::default()),
        })
    }

    /// The wrapped application handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Current life-cycle state.
    pub fn handler_state(&self) -> HandlerState {
        HandlerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// The first failure recorded for this exchange, if any.
    pub fn failure(&self) -> Option<&BridgeError> {
        self.shared.failure.get()
    }

    /// Request body buffer, once a request with a body has started.
    pub fn input_buffer(&self) -> Option<&Arc<SharedInputBuffer>> {
        self.shared.input.get()
    }

    /// Response body buffer, once a request has started.
    pub fn output_buffer(&self) -> Option<&Arc<SharedOutputBuffer>> {
        self.shared.output.get()
    }

    fn allocate(&self, has_body: bool) -> Result<(Option<Arc<SharedInputBuffer>>, Arc<SharedOutputBuffer>)> {
        let input = if has_body {
            Some(Arc::new(SharedInputBuffer::new(&self.config)?))
        } else {
            None
        };
        let output = Arc::new(SharedOutputBuffer::new(&self.config)?);
        Ok((input, output))
    }
}

fn run_handler<H: ClassicHandler>(
    handler: &H,
    request: &Request<()>,
    mut input: Option<ContentInputStream>,
    mut response: UncommittedResponse,
    mut output: ContentOutputStream,
    mut context: HttpContext,
) -> Result<()> {
    handler.handle(request, input.as_mut(), &mut response, &mut output, &mut context)?;
    if let Some(input) = input.as_mut() {
        input.close()?;
    }
    output.close()
}

impl<H: ClassicHandler> AsyncServerExchangeHandler for ClassicExchangeHandler<H> {
    fn handle_request(
        &self,
        request: Request<()>,
        entity: Option<EntityDescriptor>,
        response_channel: Arc<dyn ResponseChannel>,
        context: HttpContext,
    ) -> Result<()> {
        let exchange_id = context.exchange_id();
        if self
            .shared
            .state
            .compare_exchange(IDLE, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(exchange_id, "handle_request on an exchange already started, ignoring");
            return Ok(());
        }

        let (input, output) = match self.allocate(entity.is_some()) {
            Ok(buffers) => buffers,
            Err(e) => {
                self.shared.complete();
                return Err(e);
            }
        };
        // First and only assignment: guarded by the IDLE -> ACTIVE transition
        if let Some(input) = &input {
            let _ = self.shared.input.set(Arc::clone(input));
        }
        let _ = self.shared.output.set(Arc::clone(&output));

        let (response, trigger) = UncommittedResponse::with_trigger(response_channel);
        let input_stream = input.map(ContentInputStream::new);
        let output_stream = ContentOutputStream::new(output, trigger);

        let handler = Arc::clone(&self.handler);
        let shared = Arc::clone(&self.shared);
        let task: Task = Box::new(move || {
            let guard = CompletionGuard::new(shared, exchange_id);
            let result = run_handler(
                handler.as_ref(),
                &request,
                input_stream,
                response,
                output_stream,
                context,
            );
            guard.finish(result);
        });

        if let Err(e) = self.executor.execute(task) {
            tracing::error!(exchange_id, "executor rejected handler: {}", e);
            self.shared.abort_buffers();
            self.shared.complete();
            return Err(e);
        }
        tracing::debug!(exchange_id, "handler submitted");
        Ok(())
    }

    fn failed(&self, cause: BridgeError) {
        tracing::debug!("exchange failed: {}", cause);
        self.shared.fail(cause);
        AsyncServerExchangeHandler::release_resources(self);
    }

    fn release_resources(&self) {
        self.handler.release_resources();
    }
}

impl<H: ClassicHandler> AsyncDataConsumer for ClassicExchangeHandler<H> {
    fn update_capacity(&self, channel: &Arc<dyn CapacityChannel>) -> Result<()> {
        match self.shared.input.get() {
            Some(input) => input.update_capacity(channel),
            None => Ok(()),
        }
    }

    fn consume(&self, src: &[u8]) -> Result<usize> {
        self.shared.input()?.fill(src)
    }

    fn stream_end(&self, _trailers: Option<&HeaderMap>) -> Result<()> {
        self.shared.input()?.mark_end_stream();
        Ok(())
    }
}

impl<H: ClassicHandler> AsyncDataProducer for ClassicExchangeHandler<H> {
    fn available(&self) -> usize {
        self.shared.output.get().map_or(0, |output| output.length())
    }

    fn produce(&self, channel: &DataChannel) -> Result<()> {
        self.shared.output()?.flush(channel)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::{Duration, Instant};

    use http::header::CONTENT_TYPE;
    use http::{HeaderValue, Response, StatusCode};
    use parking_lot::Mutex;

    use super::*;
    use crate::bridge::from_fn;
    use crate::channel::{DataStreamChannel, MemoryChannel, ThreadExecutor};

    #[derive(Default)]
    struct RecordingResponses {
        sent: Mutex<Vec<(Response<()>, Option<EntityDescriptor>)>>,
    }

    impl RecordingResponses {
        fn count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    impl ResponseChannel for RecordingResponses {
        fn send_response(&self, response: Response<()>, entity: Option<EntityDescriptor>) -> Result<()> {
            self.sent.lock().push((response, entity));
            Ok(())
        }
    }

    /// Runs tasks inline on the calling thread.
    struct InlineExecutor;

    impl Executor for InlineExecutor {
        fn execute(&self, task: Task) -> Result<()> {
            task();
            Ok(())
        }
    }

    struct RejectingExecutor;

    impl Executor for RejectingExecutor {
        fn execute(&self, _task: Task) -> Result<()> {
            Err(BridgeError::IllegalState("executor shut down"))
        }
    }

    fn request() -> Request<()> {
        Request::builder().uri("/echo").body(()).unwrap()
    }

    fn wait_for_completion<H: ClassicHandler>(exchange: &ClassicExchangeHandler<H>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while exchange.handler_state() != HandlerState::Completed {
            assert!(Instant::now() < deadline, "handler did not complete");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_empty_body_sends_one_response() {
        let exchange = ClassicExchangeHandler::new(
            from_fn(|_req, _input, _resp, _out, _ctx| Ok(())),
            Arc::new(InlineExecutor),
            BufferConfig::default(),
        )
        .unwrap();
        let responses = Arc::new(RecordingResponses::default());

        exchange
            .handle_request(request(), None, responses.clone(), HttpContext::new())
            .unwrap();

        assert_eq!(exchange.handler_state(), HandlerState::Completed);
        assert_eq!(responses.count(), 1);
        assert!(exchange.failure().is_none());

        let memory = Arc::new(MemoryChannel::new());
        let channel: DataChannel = memory.clone();
        exchange.produce(&channel).unwrap();
        assert!(memory.writes().is_empty());
        assert_eq!(memory.end_stream_calls(), 1);
    }

    #[test]
    fn test_concurrent_handle_request_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let exchange = {
            let calls = calls.clone();
            Arc::new(
                ClassicExchangeHandler::new(
                    from_fn(move |_req, _input, _resp, _out, _ctx| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                    Arc::new(ThreadExecutor::new("race")),
                    BufferConfig::default(),
                )
                .unwrap(),
            )
        };
        let responses = Arc::new(RecordingResponses::default());
        let barrier = Arc::new(Barrier::new(2));

        let attempts: Vec<_> = (0..2)
            .map(|_| {
                let exchange = exchange.clone();
                let responses = responses.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    exchange.handle_request(request(), None, responses, HttpContext::new())
                })
            })
            .collect();
        for attempt in attempts {
            attempt.join().unwrap().unwrap();
        }

        wait_for_completion(&exchange);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(responses.count(), 1);
    }

    #[test]
    fn test_echo_through_buffers() {
        let exchange = ClassicExchangeHandler::new(
            from_fn(|_req, input, resp, out, _ctx| {
                resp.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))?;
                let mut body = Vec::new();
                if let Some(input) = input {
                    input.read_to_end(&mut body)?;
                }
                out.write_all(&body.to_ascii_uppercase())?;
                Ok(())
            }),
            Arc::new(ThreadExecutor::default()),
            BufferConfig::with_buffer_size(4),
        )
        .unwrap();
        let responses = Arc::new(RecordingResponses::default());

        exchange
            .handle_request(
                request(),
                Some(EntityDescriptor::default()),
                responses.clone(),
                HttpContext::new(),
            )
            .unwrap();

        let memory = Arc::new(MemoryChannel::with_limit(3));
        let channel: DataChannel = memory.clone();
        let mut pending: &[u8] = b"hello bridge";
        let deadline = Instant::now() + Duration::from_secs(5);

        while !memory.is_ended() {
            assert!(Instant::now() < deadline, "exchange did not finish");
            if !pending.is_empty() {
                let n = exchange.consume(pending).unwrap();
                pending = &pending[n..];
                if pending.is_empty() {
                    exchange.stream_end(None).unwrap();
                }
            }
            exchange.produce(&channel).unwrap();
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(&memory.data()[..], b"HELLO BRIDGE");
        assert_eq!(memory.end_stream_calls(), 1);

        let sent = responses.sent.lock();
        assert_eq!(sent.len(), 1);
        let entity = sent[0].1.as_ref().unwrap();
        assert_eq!(entity.content_type.as_deref(), Some("text/plain"));
        assert_eq!(entity.content_length, None);
    }

    #[test]
    fn test_handler_error_recorded_and_buffers_aborted() {
        let exchange = ClassicExchangeHandler::new(
            from_fn(|_req, _input, _resp, _out, _ctx| Err(BridgeError::handler("boom"))),
            Arc::new(InlineExecutor),
            BufferConfig::default(),
        )
        .unwrap();
        let responses = Arc::new(RecordingResponses::default());

        exchange
            .handle_request(
                request(),
                Some(EntityDescriptor::default()),
                responses.clone(),
                HttpContext::new(),
            )
            .unwrap();

        assert_eq!(exchange.handler_state(), HandlerState::Completed);
        assert!(matches!(exchange.failure(), Some(BridgeError::Handler(_))));
        assert_eq!(responses.count(), 0);
        assert!(exchange.input_buffer().unwrap().is_aborted());
        assert!(exchange.output_buffer().unwrap().is_aborted());

        let channel: DataChannel = Arc::new(MemoryChannel::new());
        assert!(matches!(exchange.produce(&channel), Err(BridgeError::Aborted)));
        assert!(matches!(exchange.consume(b"late"), Err(BridgeError::Aborted)));
    }

    #[test]
    fn test_panicking_handler_completes() {
        let exchange = ClassicExchangeHandler::new(
            from_fn(|_req, _input, _resp, _out, _ctx| panic!("handler bug")),
            Arc::new(ThreadExecutor::new("panicky")),
            BufferConfig::default(),
        )
        .unwrap();
        let responses = Arc::new(RecordingResponses::default());

        exchange
            .handle_request(request(), None, responses, HttpContext::new())
            .unwrap();

        wait_for_completion(&exchange);
        assert!(matches!(exchange.failure(), Some(BridgeError::Handler(_))));
        assert!(exchange.output_buffer().unwrap().is_aborted());
    }

    #[test]
    fn test_failed_wakes_blocked_reader() {
        let exchange = ClassicExchangeHandler::new(
            from_fn(|_req, input, _resp, _out, _ctx| {
                let mut body = Vec::new();
                if let Some(input) = input {
                    input.read_to_end(&mut body)?;
                }
                Ok(())
            }),
            Arc::new(ThreadExecutor::default()),
            BufferConfig::default(),
        )
        .unwrap();
        let responses = Arc::new(RecordingResponses::default());

        exchange
            .handle_request(
                request(),
                Some(EntityDescriptor::default()),
                responses,
                HttpContext::new(),
            )
            .unwrap();
        thread::sleep(Duration::from_millis(20));

        exchange.failed(BridgeError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "peer reset",
        )));

        wait_for_completion(&exchange);
        // The transport's cause was recorded first and wins over the
        // handler's aborted read
        match exchange.failure() {
            Some(BridgeError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
            other => panic!("unexpected failure: {:?}", other),
        }
        assert!(exchange.input_buffer().unwrap().is_aborted());
    }

    #[test]
    fn test_mutation_after_commit_fails_handler() {
        let exchange = ClassicExchangeHandler::new(
            from_fn(|_req, _input, resp, out, _ctx| {
                out.write_all(b"body")?;
                resp.set_status(StatusCode::INTERNAL_SERVER_ERROR)
            }),
            Arc::new(InlineExecutor),
            BufferConfig::default(),
        )
        .unwrap();
        let responses = Arc::new(RecordingResponses::default());

        exchange
            .handle_request(request(), None, responses.clone(), HttpContext::new())
            .unwrap();

        assert!(matches!(exchange.failure(), Some(BridgeError::ResponseCommitted)));
        assert_eq!(responses.sent.lock()[0].0.status(), StatusCode::OK);
    }

    #[test]
    fn test_forwarding_without_buffers() {
        let exchange = ClassicExchangeHandler::new(
            from_fn(|_req, _input, _resp, _out, _ctx| Ok(())),
            Arc::new(InlineExecutor),
            BufferConfig::default(),
        )
        .unwrap();

        assert_eq!(exchange.available(), 0);
        assert!(matches!(exchange.consume(b"x"), Err(BridgeError::IllegalState(_))));
        assert!(matches!(exchange.stream_end(None), Err(BridgeError::IllegalState(_))));
        let channel: DataChannel = Arc::new(MemoryChannel::new());
        assert!(matches!(exchange.produce(&channel), Err(BridgeError::IllegalState(_))));
    }

    #[test]
    fn test_rejected_submission() {
        let exchange = ClassicExchangeHandler::new(
            from_fn(|_req, _input, _resp, _out, _ctx| Ok(())),
            Arc::new(RejectingExecutor),
            BufferConfig::default(),
        )
        .unwrap();
        let responses = Arc::new(RecordingResponses::default());

        let result = exchange.handle_request(request(), None, responses, HttpContext::new());

        assert!(matches!(result, Err(BridgeError::IllegalState(_))));
        assert_eq!(exchange.handler_state(), HandlerState::Completed);
        assert!(exchange.output_buffer().unwrap().is_aborted());
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Head(StatusCode),
        Body(usize),
        End,
    }

    /// Response and body channels writing to one log.
    #[derive(Default)]
    struct EventLog(Mutex<Vec<Event>>);

    impl ResponseChannel for EventLog {
        fn send_response(&self, response: Response<()>, _entity: Option<EntityDescriptor>) -> Result<()> {
            self.0.lock().push(Event::Head(response.status()));
            Ok(())
        }
    }

    impl DataStreamChannel for EventLog {
        fn write(&self, src: &[u8]) -> Result<usize> {
            let n = src.len().min(3);
            if n > 0 {
                self.0.lock().push(Event::Body(n));
            }
            Ok(n)
        }

        fn request_output(&self) {}

        fn end_stream(&self, _trailers: Option<HeaderMap>) -> Result<()> {
            self.0.lock().push(Event::End);
            Ok(())
        }
    }

    #[test]
    fn test_head_sent_before_first_body_byte() {
        let exchange = ClassicExchangeHandler::new(
            from_fn(|_req, _input, resp, out, _ctx| {
                resp.set_status(StatusCode::CREATED)?;
                for chunk in [&b"first"[..], &b"second"[..], &b"third"[..]] {
                    out.write_all(chunk)?;
                    thread::sleep(Duration::from_millis(2));
                }
                Ok(())
            }),
            Arc::new(ThreadExecutor::new("ordering")),
            BufferConfig::with_buffer_size(4),
        )
        .unwrap();
        let log = Arc::new(EventLog::default());
        let channel: DataChannel = log.clone();

        exchange
            .handle_request(request(), None, log.clone(), HttpContext::new())
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !log.0.lock().contains(&Event::End) {
            assert!(Instant::now() < deadline, "body never ended");
            exchange.produce(&channel).unwrap();
            thread::yield_now();
        }

        let events = log.0.lock().clone();
        assert_eq!(events[0], Event::Head(StatusCode::CREATED));
        assert_eq!(events.iter().filter(|e| matches!(e, Event::Head(_))).count(), 1);
        let body: usize = events
            .iter()
            .map(|e| if let Event::Body(n) = e { *n } else { 0 })
            .sum();
        assert_eq!(body, 16);
        assert_eq!(events.last(), Some(&Event::End));
    }
}
