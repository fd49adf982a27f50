//! # Run Events
//!
//! The named-event contract subscribers (summary, assertion synthesis,
//! reporters) rely on. The engine reports progress through positional
//! callbacks; [`remap::EventRemapper`] repackages them into [`Event`]s whose
//! payload keys are fixed per event name by [`EventName::fields`].

pub mod bus;
pub mod error;
pub mod remap;

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collections::ItemRef;
use crate::testing::summary::RunSummary;
use error::SerializedError;

pub use bus::EventBus;
pub use remap::{CompletionCallback, EventRemapper, RunCallbacks};

/// Position of an event within the run, supplied by the engine and passed
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// Index of the current item within the iteration.
    #[serde(default)]
    pub position: usize,
    /// Index of the current iteration.
    #[serde(default)]
    pub iteration: usize,
    /// Number of items per iteration.
    #[serde(default)]
    pub length: usize,
    /// Number of iterations.
    #[serde(default)]
    pub cycles: usize,
    /// Opaque run reference.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Cursor {
    pub fn at(iteration: usize, position: usize) -> Self {
        Self {
            position,
            iteration,
            ..Default::default()
        }
    }
}

/// The script event (listener) an engine script belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptEvent {
    /// Listener type, e.g. `"prerequest"` or `"test"`.
    pub listen: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub script: Value,
}

impl ScriptEvent {
    pub fn listen(listen: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            script: Value::Null,
        }
    }
}

/// Every event name published on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    Start,
    BeforeIteration,
    Iteration,
    BeforeItem,
    Item,
    BeforePrerequest,
    Prerequest,
    BeforeRequest,
    Request,
    BeforeTest,
    Test,
    BeforeScript,
    Script,
    Assertion,
    Console,
    Exception,
    Done,
    /// `<listen>Script`, bubbled from `script`.
    ListenerScript(String),
    /// `before<Listen>Script`, bubbled from `beforeScript`.
    BeforeListenerScript(String),
}

impl EventName {
    /// Schema-driven events, in the order the engine documents them.
    pub const REMAPPED: [EventName; 13] = [
        EventName::Start,
        EventName::BeforeIteration,
        EventName::BeforeItem,
        EventName::BeforePrerequest,
        EventName::Prerequest,
        EventName::BeforeRequest,
        EventName::Request,
        EventName::BeforeTest,
        EventName::Test,
        EventName::Item,
        EventName::Iteration,
        EventName::BeforeScript,
        EventName::Script,
    ];

    /// Payload keys following `cursor`, in engine callback argument order.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            EventName::Start | EventName::BeforeIteration | EventName::Iteration => &[],
            EventName::BeforeItem | EventName::Item => &["item"],
            EventName::BeforePrerequest | EventName::BeforeTest => &["events", "item"],
            EventName::Prerequest | EventName::Test => &["executions", "item"],
            EventName::BeforeRequest => &["request", "item"],
            EventName::Request => &["response", "request", "item"],
            EventName::BeforeScript | EventName::BeforeListenerScript(_) => {
                &["script", "event", "item"]
            }
            EventName::Script | EventName::ListenerScript(_) => {
                &["execution", "script", "event", "item"]
            }
            EventName::Assertion => &["assertion", "event", "item"],
            EventName::Exception => &[],
            EventName::Console | EventName::Done => &[],
        }
    }
}

impl Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventName::Start => "start",
            EventName::BeforeIteration => "beforeIteration",
            EventName::Iteration => "iteration",
            EventName::BeforeItem => "beforeItem",
            EventName::Item => "item",
            EventName::BeforePrerequest => "beforePrerequest",
            EventName::Prerequest => "prerequest",
            EventName::BeforeRequest => "beforeRequest",
            EventName::Request => "request",
            EventName::BeforeTest => "beforeTest",
            EventName::Test => "test",
            EventName::BeforeScript => "beforeScript",
            EventName::Script => "script",
            EventName::Assertion => "assertion",
            EventName::Console => "console",
            EventName::Exception => "exception",
            EventName::Done => "done",
            EventName::ListenerScript(listen) => return write!(f, "{listen}Script"),
            EventName::BeforeListenerScript(listen) => {
                return write!(f, "before{}Script", capitalize(listen));
            }
        };
        write!(f, "{label}")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Payload of a published event. Serializes to an object whose keys are
/// `cursor` followed by [`EventName::fields`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Cursor {
        cursor: Cursor,
    },
    Item {
        cursor: Cursor,
        item: Option<ItemRef>,
    },
    Events {
        cursor: Cursor,
        events: Value,
        item: Option<ItemRef>,
    },
    Executions {
        cursor: Cursor,
        executions: Value,
        item: Option<ItemRef>,
    },
    BeforeRequest {
        cursor: Cursor,
        request: Value,
        item: Option<ItemRef>,
    },
    Request {
        cursor: Cursor,
        response: Value,
        request: Value,
        item: Option<ItemRef>,
    },
    BeforeScript {
        cursor: Cursor,
        script: Value,
        event: Option<ScriptEvent>,
        item: Option<ItemRef>,
    },
    Script {
        cursor: Cursor,
        execution: Value,
        script: Value,
        event: Option<ScriptEvent>,
        item: Option<ItemRef>,
    },
    Assertion {
        cursor: Cursor,
        assertion: String,
        event: Option<ScriptEvent>,
        item: Option<ItemRef>,
    },
    /// Raw console arguments, forwarded without a cursor object.
    Console(Vec<Value>),
    /// Final run summary, carried by `done`.
    Summary(Box<RunSummary>),
}

impl Payload {
    pub fn cursor(&self) -> Option<&Cursor> {
        match self {
            Payload::Cursor { cursor }
            | Payload::Item { cursor, .. }
            | Payload::Events { cursor, .. }
            | Payload::Executions { cursor, .. }
            | Payload::BeforeRequest { cursor, .. }
            | Payload::Request { cursor, .. }
            | Payload::BeforeScript { cursor, .. }
            | Payload::Script { cursor, .. }
            | Payload::Assertion { cursor, .. } => Some(cursor),
            Payload::Console(_) | Payload::Summary(_) => None,
        }
    }

    pub fn item(&self) -> Option<&ItemRef> {
        match self {
            Payload::Item { item, .. }
            | Payload::Events { item, .. }
            | Payload::Executions { item, .. }
            | Payload::BeforeRequest { item, .. }
            | Payload::Request { item, .. }
            | Payload::BeforeScript { item, .. }
            | Payload::Script { item, .. }
            | Payload::Assertion { item, .. } => item.as_ref(),
            _ => None,
        }
    }

    pub fn script_event(&self) -> Option<&ScriptEvent> {
        match self {
            Payload::BeforeScript { event, .. }
            | Payload::Script { event, .. }
            | Payload::Assertion { event, .. } => event.as_ref(),
            _ => None,
        }
    }
}

/// One published event: `(name, error, payload)`.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: EventName,
    pub error: Option<SerializedError>,
    pub payload: Payload,
}

impl Event {
    pub fn new(name: EventName, error: Option<SerializedError>, payload: Payload) -> Self {
        Self {
            name,
            error,
            payload,
        }
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match &self.payload {
            Payload::Summary(summary) => Some(summary.as_ref()),
            _ => None,
        }
    }
}
