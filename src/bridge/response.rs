//! Response head that refuses mutation once it has been sent.
//!
//! The handler mutates an [`UncommittedResponse`]; the output stream holds the
//! matching [`ResponseTrigger`], which sends the head downstream exactly once,
//! on the first body write or on close. After that every mutator fails with
//! [`BridgeError::ResponseCommitted`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::header::{AsHeaderName, IntoHeaderName, CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Response, StatusCode, Version};
use parking_lot::Mutex;

use crate::channel::ResponseChannel;
use crate::entity::EntityDescriptor;
use crate::error::{BridgeError, Result};

/// Response head handed to a classic handler.
#[derive(Debug)]
pub struct UncommittedResponse {
    head: Arc<Mutex<Response<()>>>,
    committed: Arc<AtomicBool>,
}

impl UncommittedResponse {
    /// A `200 OK` response plus the trigger that commits it to `channel`.
    pub(crate) fn with_trigger(channel: Arc<dyn ResponseChannel>) -> (Self, ResponseTrigger) {
        let head = Arc::new(Mutex::new(Response::new(())));
        let committed = Arc::new(AtomicBool::new(false));
        let trigger = ResponseTrigger {
            head: Arc::clone(&head),
            committed: Arc::clone(&committed),
            channel,
        };
        (Self { head, committed }, trigger)
    }

    /// Whether the head has been sent.
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Status code, `200 OK` unless set.
    pub fn status(&self) -> StatusCode {
        self.head.lock().status()
    }

    /// Protocol version of the response.
    pub fn version(&self) -> Version {
        self.head.lock().version()
    }

    /// Snapshot of the current headers.
    pub fn headers(&self) -> HeaderMap {
        self.head.lock().headers().clone()
    }

    /// First value of header `name`.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<HeaderValue> {
        self.head.lock().headers().get(name).cloned()
    }

    /// Set the status code. Fails once committed.
    pub fn set_status(&mut self, status: StatusCode) -> Result<()> {
        self.mutate(|head| *head.status_mut() = status)
    }

    /// Set the protocol version. Fails once committed.
    pub fn set_version(&mut self, version: Version) -> Result<()> {
        self.mutate(|head| *head.version_mut() = version)
    }

    /// Append a header value, keeping existing values of the same name.
    pub fn add_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) -> Result<()> {
        self.mutate(|head| {
            head.headers_mut().append(name, value);
        })
    }

    /// Replace all values of a header.
    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) -> Result<()> {
        self.mutate(|head| {
            head.headers_mut().insert(name, value);
        })
    }

    /// Remove every value of a header. Fails once committed.
    pub fn remove_header<K: AsHeaderName>(&mut self, name: K) -> Result<()> {
        self.mutate(|head| {
            head.headers_mut().remove(name);
        })
    }

    fn mutate(&mut self, f: impl FnOnce(&mut Response<()>)) -> Result<()> {
        // Checked under the head lock so a concurrent commit sees either all
        // or none of the change
        let mut head = self.head.lock();
        if self.committed.load(Ordering::Acquire) {
            return Err(BridgeError::ResponseCommitted);
        }
        f(&mut head);
        Ok(())
    }
}

/// Sends the response head once.
pub(crate) struct ResponseTrigger {
    head: Arc<Mutex<Response<()>>>,
    committed: Arc<AtomicBool>,
    channel: Arc<dyn ResponseChannel>,
}

impl ResponseTrigger {
    /// Send the head if nobody has yet. Later calls are no-ops.
    pub(crate) fn commit(&self) -> Result<()> {
        let (response, entity) = {
            let head = self.head.lock();
            if self
                .committed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Ok(());
            }
            let mut response = Response::new(());
            *response.status_mut() = head.status();
            *response.version_mut() = head.version();
            *response.headers_mut() = head.headers().clone();

            let entity = EntityDescriptor::streamed(
                header_string(head.headers(), CONTENT_TYPE),
                header_string(head.headers(), CONTENT_ENCODING),
            );
            (response, entity)
        };
        self.channel.send_response(response, Some(entity))
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }
}

fn header_string(headers: &HeaderMap, name: http::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
