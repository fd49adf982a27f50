//! Discrete assertion events derived from script executions.
//!
//! The engine only reports a script's test results as one map of
//! `name -> passed` inside the `script` event. [`AssertionSynthesizer`]
//! expands that map into one `assertion` event per entry and fabricates a
//! failure error so reporters do not have to dig through executions.

use serde_json::Value;

use crate::environment::is_truthy;
use crate::events::error::SerializedError;
use crate::events::{Cursor, Event, EventBus, EventName, Payload};

/// One entry of a script's test results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionEntry {
    pub name: String,
    pub passed: bool,
    pub index: usize,
}

impl AssertionEntry {
    /// The failure error for this entry, `None` when it passed.
    pub fn failure(&self, cursor: &Cursor) -> Option<SerializedError> {
        if self.passed {
            return None;
        }
        let stack = format!(
            "AssertionFailure: Expected tests[\"{}\"] to be truthy\n   \
             at Object.eval test.js:{}:{})",
            self.name,
            self.index + 1,
            cursor.position + 1
        );
        Some(
            SerializedError::new("AssertionFailure", self.name.clone())
                .with_stack(stack)
                .with_index(self.index),
        )
    }
}

/// Test results of a script execution, in reported order.
pub fn assertion_entries(execution: &Value) -> Vec<AssertionEntry> {
    let Some(Value::Object(tests)) = execution.pointer("/globals/tests") else {
        return Vec::new();
    };

    tests
        .iter()
        .enumerate()
        .map(|(index, (name, passed))| AssertionEntry {
            name: name.clone(),
            passed: is_truthy(Some(passed)),
            index,
        })
        .collect()
}

/// Subscribes to script events and publishes assertion and bubble events.
pub struct AssertionSynthesizer;

impl AssertionSynthesizer {
    pub fn attach(bus: &EventBus) {
        bus.on(EventName::Script, Self::on_script);
        bus.on(EventName::BeforeScript, |bus, event| {
            if let Some(script_event) = event.payload.script_event() {
                bus.emit(Event::new(
                    EventName::BeforeListenerScript(script_event.listen.clone()),
                    event.error.clone(),
                    event.payload.clone(),
                ));
            }
        });
    }

    fn on_script(bus: &EventBus, event: &Event) {
        let Payload::Script {
            cursor,
            execution,
            event: script_event,
            item,
            ..
        } = &event.payload
        else {
            return;
        };

        for entry in assertion_entries(execution) {
            bus.emit(Event::new(
                EventName::Assertion,
                entry.failure(cursor),
                Payload::Assertion {
                    cursor: cursor.clone(),
                    assertion: entry.name,
                    event: script_event.clone(),
                    item: item.clone(),
                },
            ));
        }

        if let Some(script_event) = script_event.as_ref().filter(|e| !e.listen.is_empty()) {
            bus.emit(Event::new(
                EventName::ListenerScript(script_event.listen.clone()),
                event.error.clone(),
                event.payload.clone(),
            ));
        }
    }
}
