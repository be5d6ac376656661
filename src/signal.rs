//! Minimal observer/pub-sub capability mixed into [`Chunk`](crate::chunk::Chunk),
//! [`File`](crate::file::File), and the top-level [`Session`](crate::Session).
//!
//! Each emitter owns its own bus; there is no global bus. Chunk signals are
//! bubbled up to File and Session scope by [`SignalBus::proxy_to`], which
//! composes transitively.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

/// The three lifecycle events a `Session` can be observed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    FileAdded,
    ChunkCompleted,
    FileCompleted,
}

type Handler = Arc<dyn Fn(Signal) + Send + Sync + 'static>;

#[derive(Clone)]
pub struct SignalBus {
    inner: Arc<Inner>,
}

struct Inner {
    handlers: Mutex<HashMap<Signal, Vec<Handler>>>,
    proxies: Mutex<Vec<SignalBus>>,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: Mutex::new(HashMap::new()),
                proxies: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Append `handler` for `kind`. Handlers run in registration order.
    pub fn register<F>(&self, kind: Signal, handler: F)
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Invoke every handler registered for `kind` on this bus, then re-emit
    /// `kind` on every proxy parent. A handler that panics is caught and
    /// logged so one broken observer can't take down the emitting worker or
    /// skip the handlers registered after it.
    pub fn emit(&self, kind: Signal) {
        let handlers = self.inner.handlers.lock().unwrap().get(&kind).cloned();
        if let Some(handlers) = handlers {
            for handler in handlers {
                if std::panic::catch_unwind(AssertUnwindSafe(|| handler(kind))).is_err() {
                    tracing::warn!(?kind, "signal handler panicked");
                }
            }
        }

        let proxies = self.inner.proxies.lock().unwrap().clone();
        for proxy in proxies {
            proxy.emit(kind);
        }
    }

    /// Arrange for every future emission on `self` to be re-emitted verbatim
    /// on `other`. Composes transitively: proxying A to B, then B to C,
    /// delivers A's signals to C.
    pub fn proxy_to(&self, other: &SignalBus) {
        self.inner.proxies.lock().unwrap().push(other.clone());
    }
}
