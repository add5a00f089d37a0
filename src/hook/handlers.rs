use crate::domain::{HookError, LogEntry};
use parking_lot::RwLock;
use std::sync::Arc;

/// Callback invoked with the originating entry when a delivery fails.
pub type ErrorHandler = Arc<dyn Fn(&LogEntry, &HookError) + Send + Sync>;

/// Ordered list of failure callbacks.
///
/// Clones share the same list, so an asynchronous delivery sees handlers
/// registered before it completes. A panicking handler is not caught and
/// propagates to the thread running the dispatch.
#[derive(Clone, Default)]
pub struct ErrorHandlerRegistry {
    handlers: Arc<RwLock<Vec<ErrorHandler>>>,
}

impl ErrorHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, handler: F)
    where
        F: Fn(&LogEntry, &HookError) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Invokes every handler once, in registration order.
    pub fn dispatch(&self, entry: &LogEntry, err: &HookError) {
        // Handlers run without the lock held.
        let handlers: Vec<ErrorHandler> = self.handlers.read().clone();
        for handler in &handlers {
            handler(entry, err);
        }
    }
}

impl std::fmt::Debug for ErrorHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandlerRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}
