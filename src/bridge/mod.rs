//! Classic bridge: blocking request handlers on top of the asynchronous
//! exchange contract.
//!
//! - [`ClassicExchangeHandler`] - the [`AsyncServerExchangeHandler`] the reactor drives
//! - [`ClassicHandler`] / [`from_fn`] - application logic over blocking streams
//! - [`UncommittedResponse`] - response head that fails mutation after commit
//! - [`ContentInputStream`] / [`ContentOutputStream`] - `io::Read` / `io::Write`
//!   over the shared buffers
//! - [`HttpContext`] - exchange id and typed attributes

mod context;
mod exchange;
mod handler;
mod response;
mod stream;

pub use context::HttpContext;
pub use exchange::{AsyncServerExchangeHandler, ClassicExchangeHandler, HandlerState};
pub use handler::{from_fn, ClassicHandler, FnHandler};
pub use response::UncommittedResponse;
pub use stream::{ContentInputStream, ContentOutputStream};
