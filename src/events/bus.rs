use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use super::{Event, EventName};

/// Subscriber callback. Receives the bus so it can publish follow-up events.
pub type Handler = Arc<dyn Fn(&EventBus, &Event) + Send + Sync>;

struct Listener {
    filter: Option<EventName>,
    handler: Handler,
}

/// Synchronous in-process event dispatcher.
///
/// `emit` invokes every matching subscriber in registration order before
/// returning. The listener list is snapshotted per emit, so handlers may
/// publish further events or register new listeners without deadlocking;
/// a listener registered during an emit only sees later events. A handler
/// that panics is logged and skipped; the remaining handlers still run.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event name.
    pub fn on<F>(&self, name: EventName, handler: F)
    where
        F: Fn(&EventBus, &Event) + Send + Sync + 'static,
    {
        self.push(Some(name), Arc::new(handler));
    }

    /// Subscribe to every event.
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&EventBus, &Event) + Send + Sync + 'static,
    {
        self.push(None, Arc::new(handler));
    }

    pub fn emit(&self, event: Event) {
        let handlers: Vec<Handler> = self
            .lock()
            .iter()
            .filter(|listener| listener.filter.as_ref().is_none_or(|name| *name == event.name))
            .map(|listener| Arc::clone(&listener.handler))
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(self, &event))).is_err() {
                warn!(event = %event.name, "event handler panicked; skipping it");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn push(&self, filter: Option<EventName>, handler: Handler) {
        self.lock().push(Listener { filter, handler });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
