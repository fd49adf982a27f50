//! Engine callback table and its translation into bus events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use super::error::{EngineError, SerializedError, normalize};
use super::{Cursor, Event, EventBus, EventName, Payload, ScriptEvent};
use crate::collections::ItemRef;
use crate::error::Error;
use crate::testing::summary::{RunSummary, SummaryAggregator};

/// Caller-supplied completion callback, invoked once with the run outcome.
pub type CompletionCallback = Box<dyn FnOnce(Option<Error>, Option<RunSummary>) + Send>;

/// Positional callbacks the execution engine invokes while running.
///
/// Every callback except `console` and `exception` receives
/// `(error, cursor, ...)`. `exception` receives `(cursor, error)`.
/// `done` is the final callback of a run.
pub trait RunCallbacks: Send + Sync {
    fn start(&self, err: Option<EngineError>, cursor: Cursor);
    fn before_iteration(&self, err: Option<EngineError>, cursor: Cursor);
    fn before_item(&self, err: Option<EngineError>, cursor: Cursor, item: Option<ItemRef>);
    fn before_prerequest(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        events: Value,
        item: Option<ItemRef>,
    );
    fn prerequest(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        executions: Value,
        item: Option<ItemRef>,
    );
    fn before_request(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        request: Value,
        item: Option<ItemRef>,
    );
    fn request(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        response: Value,
        request: Value,
        item: Option<ItemRef>,
    );
    fn before_test(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        events: Value,
        item: Option<ItemRef>,
    );
    fn test(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        executions: Value,
        item: Option<ItemRef>,
    );
    fn item(&self, err: Option<EngineError>, cursor: Cursor, item: Option<ItemRef>);
    fn iteration(&self, err: Option<EngineError>, cursor: Cursor);
    fn before_script(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        script: Value,
        event: Option<ScriptEvent>,
        item: Option<ItemRef>,
    );
    fn script(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        execution: Value,
        script: Value,
        event: Option<ScriptEvent>,
        item: Option<ItemRef>,
    );
    fn console(&self, args: Vec<Value>);
    fn exception(&self, cursor: Cursor, err: EngineError);
    fn done(&self, err: Option<EngineError>);
}

/// Publishes engine callbacks on the bus as named events.
///
/// Engine errors are normalized here, once. `done` finalizes the summary,
/// publishes it and fires the completion callback; later `done` signals are
/// ignored.
pub struct EventRemapper {
    bus: Arc<EventBus>,
    summary: SummaryAggregator,
    completion: Mutex<Option<CompletionCallback>>,
    done: AtomicBool,
}

impl EventRemapper {
    pub fn new(
        bus: Arc<EventBus>,
        summary: SummaryAggregator,
        completion: Option<CompletionCallback>,
    ) -> Self {
        Self {
            bus,
            summary,
            completion: Mutex::new(completion),
            done: AtomicBool::new(false),
        }
    }

    /// Whether `done` has already been signalled.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn emit(&self, name: EventName, err: Option<EngineError>, payload: Payload) {
        self.bus.emit(Event::new(name, err.map(normalize), payload));
    }

    fn finish(&self, error: Option<SerializedError>) {
        let summary = self.summary.finish(error.clone());
        debug!(
            failures = summary.failures.len(),
            errored = error.is_some(),
            "run completed"
        );

        self.bus.emit(Event::new(
            EventName::Done,
            error.clone(),
            Payload::Summary(Box::new(summary.clone())),
        ));

        let completion = self
            .completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(completion) = completion {
            completion(error.map(Error::Run), Some(summary));
        }
    }
}

impl RunCallbacks for EventRemapper {
    fn start(&self, err: Option<EngineError>, cursor: Cursor) {
        self.emit(EventName::Start, err, Payload::Cursor { cursor });
    }

    fn before_iteration(&self, err: Option<EngineError>, cursor: Cursor) {
        self.emit(EventName::BeforeIteration, err, Payload::Cursor { cursor });
    }

    fn before_item(&self, err: Option<EngineError>, cursor: Cursor, item: Option<ItemRef>) {
        self.emit(EventName::BeforeItem, err, Payload::Item { cursor, item });
    }

    fn before_prerequest(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        events: Value,
        item: Option<ItemRef>,
    ) {
        self.emit(
            EventName::BeforePrerequest,
            err,
            Payload::Events { cursor, events, item },
        );
    }

    fn prerequest(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        executions: Value,
        item: Option<ItemRef>,
    ) {
        self.emit(
            EventName::Prerequest,
            err,
            Payload::Executions {
                cursor,
                executions,
                item,
            },
        );
    }

    fn before_request(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        request: Value,
        item: Option<ItemRef>,
    ) {
        self.emit(
            EventName::BeforeRequest,
            err,
            Payload::BeforeRequest {
                cursor,
                request,
                item,
            },
        );
    }

    fn request(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        response: Value,
        request: Value,
        item: Option<ItemRef>,
    ) {
        self.emit(
            EventName::Request,
            err,
            Payload::Request {
                cursor,
                response,
                request,
                item,
            },
        );
    }

    fn before_test(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        events: Value,
        item: Option<ItemRef>,
    ) {
        self.emit(EventName::BeforeTest, err, Payload::Events { cursor, events, item });
    }

    fn test(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        executions: Value,
        item: Option<ItemRef>,
    ) {
        self.emit(
            EventName::Test,
            err,
            Payload::Executions {
                cursor,
                executions,
                item,
            },
        );
    }

    fn item(&self, err: Option<EngineError>, cursor: Cursor, item: Option<ItemRef>) {
        self.emit(EventName::Item, err, Payload::Item { cursor, item });
    }

    fn iteration(&self, err: Option<EngineError>, cursor: Cursor) {
        self.emit(EventName::Iteration, err, Payload::Cursor { cursor });
    }

    fn before_script(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        script: Value,
        event: Option<ScriptEvent>,
        item: Option<ItemRef>,
    ) {
        self.emit(
            EventName::BeforeScript,
            err,
            Payload::BeforeScript {
                cursor,
                script,
                event,
                item,
            },
        );
    }

    fn script(
        &self,
        err: Option<EngineError>,
        cursor: Cursor,
        execution: Value,
        script: Value,
        event: Option<ScriptEvent>,
        item: Option<ItemRef>,
    ) {
        self.emit(
            EventName::Script,
            err,
            Payload::Script {
                cursor,
                execution,
                script,
                event,
                item,
            },
        );
    }

    fn console(&self, args: Vec<Value>) {
        self.bus
            .emit(Event::new(EventName::Console, None, Payload::Console(args)));
    }

    fn exception(&self, cursor: Cursor, err: EngineError) {
        self.emit(EventName::Exception, Some(err), Payload::Cursor { cursor });
    }

    fn done(&self, err: Option<EngineError>) {
        if self.done.swap(true, Ordering::SeqCst) {
            warn!("engine signalled done more than once; ignoring");
            return;
        }
        self.finish(err.map(normalize));
    }
}
