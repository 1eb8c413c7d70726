//! Per-exchange context handed to classic handlers.

use std::sync::atomic::{AtomicU64, Ordering};

use http::Extensions;

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);

/// Context of one request/response exchange.
///
/// Carries a process-unique exchange id, used to correlate log events, and
/// typed attributes shared between the exchange layer and the handler.
#[derive(Debug)]
pub struct HttpContext {
    exchange_id: u64,
    attributes: Extensions,
}

impl HttpContext {
    /// Create a context with a fresh exchange id.
    pub fn new() -> Self {
        Self {
            exchange_id: NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed),
            attributes: Extensions::new(),
        }
    }

    #[inline]
    /// Process-unique id of this exchange.
    pub fn exchange_id(&self) -> u64 {
        self.exchange_id
    }

    /// Store an attribute, returning the previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.attributes.insert(value)
    }

    /// Attribute of type `T`, if set.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.attributes.get::<T>()
    }

    /// Mutable attribute of type `T`, if set.
    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.attributes.get_mut::<T>()
    }

    /// Remove and return the attribute of type `T`.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.attributes.remove::<T>()
    }

    /// All attributes.
    pub fn attributes(&self) -> &Extensions {
        &self.attributes
    }
}

impl Default for HttpContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Principal(String);

    #[test]
    fn test_exchange_ids_unique() {
        let a = HttpContext::new();
        let b = HttpContext::new();
        assert_ne!(a.exchange_id(), b.exchange_id());
    }

    #[test]
    fn test_attributes() {
        let mut ctx = HttpContext::new();
        assert!(ctx.insert(Principal("alice".into())).is_none());
        assert_eq!(ctx.get::<Principal>(), Some(&Principal("alice".into())));

        if let Some(p) = ctx.get_mut::<Principal>() {
            p.0.push_str("@example");
        }
        assert_eq!(ctx.remove::<Principal>(), Some(Principal("alice@example".into())));
        assert!(ctx.get::<Principal>().is_none());
    }
}
