//! Blocking request handler API.

use http::Request;

use super::context::HttpContext;
use super::response::UncommittedResponse;
use super::stream::{ContentInputStream, ContentOutputStream};
use crate::error::Result;

/// Application logic written against blocking streams.
///
/// Runs on a worker thread. `input` is `None` when the request has no body.
/// The bridge closes both streams after a normal return, so a handler that
/// writes nothing still produces a response head with an empty body.
pub trait ClassicHandler: Send + Sync + 'static {
    fn handle(
        &self,
        request: &Request<()>,
        input: Option<&mut ContentInputStream>,
        response: &mut UncommittedResponse,
        output: &mut ContentOutputStream,
        context: &mut HttpContext,
    ) -> Result<()>;

    /// Called when the exchange fails or is released.
    fn release_resources(&self) {}
}

/// Adapts a closure into a [`ClassicHandler`].
pub struct FnHandler<F> {
    handler: F,
}

impl<F> ClassicHandler for FnHandler<F>
where
    F: Fn(
            &Request<()>,
            Option<&mut ContentInputStream>,
            &mut UncommittedResponse,
            &mut ContentOutputStream,
            &mut HttpContext,
        ) -> Result<()>
        + Send
        + Sync
        + 'static,
{
    fn handle(
        &self,
        request: &Request<()>,
        input: Option<&mut ContentInputStream>,
        response: &mut UncommittedResponse,
        output: &mut ContentOutputStream,
        context: &mut HttpContext,
    ) -> Result<()> {
        (self.handler)(request, input, response, output, context)
    }
}

/// Build a [`ClassicHandler`] from a closure.
///
/// ```
/// use std::io::Write;
/// use bodybridge::bridge::{from_fn, ClassicHandler};
///
/// let handler = from_fn(|_request, _input, _response, output, _context| {
///     output.write_all(b"hello")?;
///     Ok(())
/// });
/// # fn assert_handler<H: ClassicHandler>(_: &H) {}
/// # assert_handler(&handler);
/// ```
pub fn from_fn<F>(handler: F) -> FnHandler<F>
where
    F: Fn(
            &Request<()>,
            Option<&mut ContentInputStream>,
            &mut UncommittedResponse,
            &mut ContentOutputStream,
            &mut HttpContext,
        ) -> Result<()>
        + Send
        + Sync
        + 'static,
{
    FnHandler { handler }
}
