//! Run summary: per-category counters and the ordered failure ledger.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::warn;

use crate::collections::{GroupRef, ItemRef};
use crate::events::error::SerializedError;
use crate::events::{Cursor, Event, EventBus, EventName};

/// Lines the engine prepends to user scripts before executing them.
const SCRIPT_WRAPPER_LINES: i64 = 2;

/// Event groups whose executions are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Iteration,
    Item,
    Script,
    Prerequest,
    Request,
    Test,
    Assertion,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Iteration,
        Category::Item,
        Category::Script,
        Category::Prerequest,
        Category::Request,
        Category::Test,
        Category::Assertion,
    ];

    /// The event marking completion of one execution.
    pub fn event(self) -> EventName {
        match self {
            Category::Iteration => EventName::Iteration,
            Category::Item => EventName::Item,
            Category::Script => EventName::Script,
            Category::Prerequest => EventName::Prerequest,
            Category::Request => EventName::Request,
            Category::Test => EventName::Test,
            Category::Assertion => EventName::Assertion,
        }
    }

    /// The event marking the start of one execution. Assertions have none.
    pub fn before_event(self) -> Option<EventName> {
        match self {
            Category::Iteration => Some(EventName::BeforeIteration),
            Category::Item => Some(EventName::BeforeItem),
            Category::Script => Some(EventName::BeforeScript),
            Category::Prerequest => Some(EventName::BeforePrerequest),
            Category::Request => Some(EventName::BeforeRequest),
            Category::Test => Some(EventName::BeforeTest),
            Category::Assertion => None,
        }
    }

    /// Key of this category in the summary.
    pub fn plural(self) -> &'static str {
        match self {
            Category::Iteration => "iterations",
            Category::Item => "items",
            Category::Script => "scripts",
            Category::Prerequest => "prerequests",
            Category::Request => "requests",
            Category::Test => "tests",
            Category::Assertion => "assertions",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub total: u64,
    pub pending: u64,
    pub failed: u64,
}

/// Where a failure happened: the item when known, otherwise a label.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FailureSource {
    Item(ItemRef),
    Label(String),
}

impl FailureSource {
    pub fn label(&self) -> &str {
        match self {
            FailureSource::Item(item) => item.label(),
            FailureSource::Label(label) => label,
        }
    }
}

/// One recorded category failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub source: FailureSource,
    pub at: String,
    pub error: SerializedError,
    pub cursor: Option<Cursor>,
    pub parent: Option<GroupRef>,
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub iterations: Counter,
    pub items: Counter,
    pub scripts: Counter,
    pub prerequests: Counter,
    pub requests: Counter,
    pub tests: Counter,
    pub assertions: Counter,
    /// In the order the failures were published.
    pub failures: Vec<FailureRecord>,
    /// Milliseconds since the Unix epoch.
    pub started: Option<u64>,
    pub completed: Option<u64>,
    pub error: Option<SerializedError>,
}

impl RunSummary {
    pub fn counter(&self, category: Category) -> &Counter {
        match category {
            Category::Iteration => &self.iterations,
            Category::Item => &self.items,
            Category::Script => &self.scripts,
            Category::Prerequest => &self.prerequests,
            Category::Request => &self.requests,
            Category::Test => &self.tests,
            Category::Assertion => &self.assertions,
        }
    }

    fn counter_mut(&mut self, category: Category) -> &mut Counter {
        match category {
            Category::Iteration => &mut self.iterations,
            Category::Item => &mut self.items,
            Category::Script => &mut self.scripts,
            Category::Prerequest => &mut self.prerequests,
            Category::Request => &mut self.requests,
            Category::Test => &mut self.tests,
            Category::Assertion => &mut self.assertions,
        }
    }

    /// True when nothing failed and the run finished without a run-level error.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failures.is_empty()
    }
}

#[derive(Default)]
struct SummaryState {
    summary: RunSummary,
    frozen: bool,
}

/// Maintains the [`RunSummary`] from bus events.
///
/// Cloning shares the same summary. The counters and the failure ledger can
/// only change through the handlers registered by [`SummaryAggregator::attach`]
/// and through [`SummaryAggregator::finish`]; once finished the summary is
/// frozen and late events are dropped.
#[derive(Clone, Default)]
pub struct SummaryAggregator {
    state: Arc<Mutex<SummaryState>>,
}

impl SummaryAggregator {
    /// Create a summary and subscribe it to `bus`.
    pub fn attach(bus: &EventBus) -> Self {
        let aggregator = Self::default();

        {
            let aggregator = aggregator.clone();
            bus.on(EventName::Start, move |_, _| {
                aggregator.update(&EventName::Start, |summary| summary.started = Some(now_ms()));
            });
        }

        for category in Category::ALL {
            if let Some(before) = category.before_event() {
                let aggregator = aggregator.clone();
                bus.on(before, move |_, event| aggregator.on_before(category, event));
            }

            let aggregator = aggregator.clone();
            bus.on(category.event(), move |_, event| aggregator.on_complete(category, event));
        }

        aggregator
    }

    /// Current state of the summary.
    pub fn snapshot(&self) -> RunSummary {
        self.lock().summary.clone()
    }

    /// Stamp completion, record the run-level error and freeze the summary.
    pub fn finish(&self, error: Option<SerializedError>) -> RunSummary {
        let mut state = self.lock();
        if !state.frozen {
            state.summary.completed = Some(now_ms());
            state.summary.error = error;
            state.frozen = true;
        }
        state.summary.clone()
    }

    fn on_before(&self, category: Category, event: &Event) {
        self.update(&event.name, |summary| {
            summary.counter_mut(category).pending += 1;

            if let Some(error) = &event.error {
                let item = event.payload.item();
                let source = item.map_or("<unknown>", |item| item.label());
                summary.failures.push(FailureRecord {
                    source: FailureSource::Label(source.to_string()),
                    at: event.name.to_string(),
                    error: error.clone(),
                    cursor: event.payload.cursor().cloned(),
                    parent: item.and_then(|item| item.grandparent()),
                });
            }
        });
    }

    fn on_complete(&self, category: Category, event: &Event) {
        self.update(&event.name, |summary| {
            let counter = summary.counter_mut(category);
            // categories without a before event never go below zero
            counter.pending = counter.pending.saturating_sub(1);
            counter.total += 1;

            let Some(error) = &event.error else {
                return;
            };
            counter.failed += 1;

            let at = failure_location(category, event, error);
            let item = event.payload.item();
            summary.failures.push(FailureRecord {
                source: item.map_or_else(
                    || FailureSource::Label(at.clone()),
                    |item| FailureSource::Item(item.clone()),
                ),
                at,
                error: error.clone(),
                cursor: event.payload.cursor().cloned(),
                parent: item.and_then(|item| item.grandparent()),
            });
        });
    }

    fn update(&self, name: &EventName, apply: impl FnOnce(&mut RunSummary)) {
        let mut state = self.lock();
        if state.frozen {
            warn!(event = %name, "event received after the run completed; ignoring");
            return;
        }
        apply(&mut state.summary);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SummaryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `at` label of a completion failure.
fn failure_location(category: Category, event: &Event, error: &SerializedError) -> String {
    match category {
        Category::Script => {
            let mut at = match event.payload.script_event() {
                Some(script_event) => format!("{}-script", script_event.listen),
                None => event.name.to_string(),
            };
            if let Some(frame) = error.top_frame() {
                if let Some(line) = frame.line_number.filter(|line| *line > 0) {
                    at.push_str(&format!(":{}", i64::from(line) - SCRIPT_WRAPPER_LINES));
                    if let Some(column) = frame.column_number.filter(|column| *column > 0) {
                        at.push_str(&format!(":{column}"));
                    }
                }
            }
            at
        }
        Category::Assertion => {
            let mut at = event.name.to_string();
            if let Some(index) = error.index {
                at.push_str(&format!(":{}", index + 1));
            }
            at.push_str(" in test-script");
            at
        }
        _ => event.name.to_string(),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or_default()
}
