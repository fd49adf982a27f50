//! Scripted engine replaying a fixed callback sequence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use super::{Engine, EngineOptions, EngineRun, RunFuture};
use crate::collections::ItemRef;
use crate::events::error::EngineError;
use crate::events::{Cursor, RunCallbacks, ScriptEvent};

pub(crate) type Step = Arc<dyn Fn(&dyn RunCallbacks) + Send + Sync>;

pub(crate) fn step(f: impl Fn(&dyn RunCallbacks) + Send + Sync + 'static) -> Step {
    Arc::new(f)
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    steps: Vec<Step>,
    refuse: Option<EngineError>,
    pub prepared: AtomicUsize,
    pub started: Arc<AtomicUsize>,
    pub options: Mutex<Option<EngineOptions>>,
}

impl FakeEngine {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    pub fn refusing(error: EngineError) -> Self {
        Self {
            refuse: Some(error),
            ..Default::default()
        }
    }
}

struct FakeRun {
    steps: Vec<Step>,
    started: Arc<AtomicUsize>,
}

impl EngineRun for FakeRun {
    fn start(self: Box<Self>, callbacks: Arc<dyn RunCallbacks>) -> RunFuture {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            for step in &self.steps {
                step(callbacks.as_ref());
            }
        })
    }
}

impl Engine for FakeEngine {
    fn prepare(
        &self,
        _collection: &Value,
        options: EngineOptions,
    ) -> Result<Box<dyn EngineRun>, EngineError> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.refuse {
            return Err(error.clone());
        }
        *self.options.lock().unwrap() = Some(options);
        Ok(Box::new(FakeRun {
            steps: self.steps.clone(),
            started: Arc::clone(&self.started),
        }))
    }
}

/// Callbacks for one item with a request and a test script reporting
/// `tests` (an object of `name -> passed`).
pub(crate) fn item_with_tests(cursor: Cursor, item: ItemRef, tests: Value) -> Vec<Step> {
    let test_event = ScriptEvent::listen("test");
    let execution = json!({ "globals": { "tests": tests } });

    let c = cursor.clone();
    let i = item.clone();
    let mut steps = vec![
        step(move |cb| cb.before_item(None, c.clone(), Some(i.clone()))),
    ];

    let (c, i) = (cursor.clone(), item.clone());
    steps.push(step(move |cb| cb.before_prerequest(None, c.clone(), json!([]), Some(i.clone()))));
    let (c, i) = (cursor.clone(), item.clone());
    steps.push(step(move |cb| cb.prerequest(None, c.clone(), json!([]), Some(i.clone()))));
    let (c, i) = (cursor.clone(), item.clone());
    steps.push(step(move |cb| {
        cb.before_request(None, c.clone(), json!({ "method": "GET" }), Some(i.clone()))
    }));
    let (c, i) = (cursor.clone(), item.clone());
    steps.push(step(move |cb| {
        cb.request(
            None,
            c.clone(),
            json!({ "code": 200 }),
            json!({ "method": "GET" }),
            Some(i.clone()),
        )
    }));
    let (c, i) = (cursor.clone(), item.clone());
    steps.push(step(move |cb| cb.before_test(None, c.clone(), json!([]), Some(i.clone()))));
    let (c, i, e) = (cursor.clone(), item.clone(), test_event.clone());
    steps.push(step(move |cb| {
        cb.before_script(None, c.clone(), Value::Null, Some(e.clone()), Some(i.clone()))
    }));
    let (c, i, e) = (cursor.clone(), item.clone(), test_event);
    steps.push(step(move |cb| {
        cb.script(
            None,
            c.clone(),
            execution.clone(),
            Value::Null,
            Some(e.clone()),
            Some(i.clone()),
        )
    }));
    let (c, i) = (cursor.clone(), item.clone());
    steps.push(step(move |cb| cb.test(None, c.clone(), json!([]), Some(i.clone()))));
    steps.push(step(move |cb| cb.item(None, cursor.clone(), Some(item.clone()))));
    steps
}

/// `start` and `beforeIteration`, then `items`, then `iteration`; `done`
/// is left to the caller.
pub(crate) fn single_iteration(items: Vec<Vec<Step>>) -> Vec<Step> {
    let mut steps = vec![
        step(|cb| cb.start(None, Cursor::default())),
        step(|cb| cb.before_iteration(None, Cursor::default())),
    ];
    steps.extend(items.into_iter().flatten());
    steps.push(step(|cb| cb.iteration(None, Cursor::default())));
    steps
}
