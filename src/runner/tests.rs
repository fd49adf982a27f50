use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use serde_json::json;

use super::*;
use crate::collections::{Item, ItemGroup};
use crate::engine::fake::{FakeEngine, Step, item_with_tests, single_iteration, step};
use crate::events::{Cursor, Event, EventName};
use crate::testing::summary::Category;

type Outcome = Arc<Mutex<Vec<(Option<Error>, Option<RunSummary>)>>>;

fn runner(engine: &Arc<FakeEngine>) -> Runner {
    let engine: Arc<dyn Engine> = engine.clone();
    Runner::new(engine).with_reporters(ReporterRegistry::new())
}

fn collection() -> RunOptions {
    RunOptions::with_collection(json!({
        "info": { "name": "Users API", "schema": "v2.1.0" },
        "item": []
    }))
}

fn outcome() -> Outcome {
    Arc::new(Mutex::new(Vec::new()))
}

fn recording(outcome: &Outcome) -> impl FnOnce(Option<Error>, Option<RunSummary>) + Send + 'static {
    let outcome = Arc::clone(outcome);
    move |err, summary| outcome.lock().unwrap().push((err, summary))
}

fn record_names(bus: &EventBus) -> Arc<Mutex<Vec<EventName>>> {
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    bus.on_any(move |_, event: &Event| sink.lock().unwrap().push(event.name.clone()));
    names
}

fn done() -> Step {
    step(|cb| cb.done(None))
}

/// Two items under one folder; the second item's test script passes one
/// assertion and fails another.
fn two_items() -> Vec<Step> {
    let root = ItemGroup::root("c1", "Users API");
    let folder = ItemGroup::folder("f1", "Users", &root);
    let list = Item::new("i1", "List users", Some(&folder));
    let create = Item::new("i2", "Create user", Some(&folder));

    let mut steps = single_iteration(vec![
        item_with_tests(Cursor::at(0, 0), list, json!({})),
        item_with_tests(
            Cursor::at(0, 1),
            create,
            json!({ "status is 201": true, "body has id": false }),
        ),
    ]);
    steps.push(done());
    steps
}

#[tokio::test]
async fn run_aggregates_items_and_assertions() {
    let engine = Arc::new(FakeEngine::new(two_items()));
    let calls = outcome();

    let summary = runner(&engine)
        .run_with_callback(collection(), recording(&calls))
        .await
        .unwrap();

    assert_eq!(summary.items.total, 2);
    assert_eq!(summary.items.failed, 0);
    assert_eq!(summary.requests.total, 2);
    assert_eq!(summary.scripts.total, 2);
    assert_eq!(summary.assertions.total, 2);
    assert_eq!(summary.assertions.failed, 1);
    assert_eq!(summary.failures.len(), 1);

    let failure = &summary.failures[0];
    assert_eq!(failure.at, "assertion:2 in test-script");
    assert_eq!(failure.error.message, "body has id");
    assert_eq!(failure.source.label(), "Create user");
    assert!(!summary.is_success());

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.is_none());
    assert_eq!(
        calls[0].1.as_ref().map(|s| s.failures.len()),
        Some(summary.failures.len())
    );
}

#[tokio::test]
async fn nothing_is_pending_once_done() {
    let engine = Arc::new(FakeEngine::new(two_items()));
    let summary = runner(&engine).run(collection()).await.unwrap();

    for category in Category::ALL {
        assert_eq!(summary.counter(category).pending, 0, "{}", category.plural());
    }
    assert!(summary.started.is_some());
    assert!(summary.completed.is_some());
}

#[tokio::test]
async fn events_follow_engine_order_with_synthesized_assertions() {
    let engine = Arc::new(FakeEngine::new(two_items()));
    let run = runner(&engine).run(collection());
    let names = record_names(run.bus());

    run.await.unwrap();

    let names = names.lock().unwrap();
    assert_eq!(names.first(), Some(&EventName::Start));
    assert_eq!(names.last(), Some(&EventName::Done));
    assert_eq!(names.iter().filter(|n| **n == EventName::Assertion).count(), 2);

    let script = names.iter().rposition(|n| *n == EventName::Script).unwrap();
    assert_eq!(
        &names[script + 1..script + 4],
        &[
            EventName::Assertion,
            EventName::Assertion,
            EventName::ListenerScript("test".into()),
        ]
    );
    assert_eq!(names.iter().filter(|n| **n == EventName::Done).count(), 1);
}

#[tokio::test]
async fn listeners_added_before_awaiting_see_start() {
    let engine = Arc::new(FakeEngine::new(two_items()));
    let run = runner(&engine).run(collection());

    assert_eq!(engine.prepared.load(Ordering::SeqCst), 0);
    let names = record_names(run.bus());
    run.await.unwrap();

    assert_eq!(names.lock().unwrap()[0], EventName::Start);
}

#[tokio::test]
async fn missing_collection_fails_before_the_engine() {
    let engine = Arc::new(FakeEngine::new(two_items()));
    let calls = outcome();
    let run = runner(&engine).run_with_callback(RunOptions::default(), recording(&calls));
    let names = record_names(run.bus());

    let err = run.await.unwrap_err();

    assert_eq!(err, Error::MissingCollection);
    assert!(err.is_configuration());
    assert_eq!(engine.prepared.load(Ordering::SeqCst), 0);
    assert!(names.lock().unwrap().is_empty());
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, Some(Error::MissingCollection));
    assert!(calls[0].1.is_none());
}

#[tokio::test]
async fn non_object_collection_is_rejected() {
    let engine = Arc::new(FakeEngine::new(two_items()));
    let options = RunOptions::with_collection(json!([1, 2, 3]));

    let err = runner(&engine).run(options).await.unwrap_err();

    assert_eq!(err, Error::MissingCollection);
    assert_eq!(engine.prepared.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_reporter_is_a_configuration_error() {
    let engine = Arc::new(FakeEngine::new(two_items()));
    let options = RunOptions {
        reporters: vec!["html".into()],
        ..collection()
    };

    let err = runner(&engine).run(options).await.unwrap_err();

    assert_eq!(err, Error::UnknownReporter("html".into()));
    assert_eq!(engine.prepared.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn engine_refusal_is_reported_once() {
    let engine = Arc::new(FakeEngine::refusing(EngineError::new(
        "TypeError",
        "collection has no items",
    )));
    let calls = outcome();

    let err = runner(&engine)
        .run_with_callback(collection(), recording(&calls))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Engine(ref e) if e.name == "TypeError"));
    assert_eq!(engine.started.load(Ordering::SeqCst), 0);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failing_reporters_do_not_stop_the_run() {
    let engine = Arc::new(FakeEngine::new(two_items()));
    let mut reporters = ReporterRegistry::new();
    reporters
        .register("broken", |_, _| Err(Error::reporter("broken", "cannot open output")))
        .register("panicky", |_, _| panic!("reporter exploded"));
    let options = RunOptions {
        reporters: vec!["broken".into(), "panicky".into()],
        ..collection()
    };
    let calls = outcome();

    let engine_dyn: Arc<dyn Engine> = engine.clone();
    let summary = Runner::new(engine_dyn)
        .with_reporters(reporters)
        .run_with_callback(options, recording(&calls))
        .await
        .unwrap();

    assert_eq!(summary.items.total, 2);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reporters_receive_done_with_summary() {
    let engine = Arc::new(FakeEngine::new(two_items()));
    let seen = Arc::new(Mutex::new(None));
    let mut reporters = ReporterRegistry::new();
    {
        let seen = Arc::clone(&seen);
        reporters.register("spy", move |bus, _| {
            let seen = Arc::clone(&seen);
            bus.on(EventName::Done, move |_, event| {
                *seen.lock().unwrap() = event.summary().map(|s| s.assertions.failed);
            });
            Ok(())
        });
    }
    let options = RunOptions {
        reporters: vec!["spy".into()],
        ..collection()
    };

    let engine_dyn: Arc<dyn Engine> = engine.clone();
    Runner::new(engine_dyn)
        .with_reporters(reporters)
        .run(options)
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), Some(1));
}

#[tokio::test]
async fn reporter_panicking_on_done_does_not_block_completion() {
    let engine = Arc::new(FakeEngine::new(two_items()));
    let after = Arc::new(Mutex::new(0));
    let mut reporters = ReporterRegistry::new();
    reporters.register("crashing", |bus, _| {
        bus.on(EventName::Done, |_, _| panic!("cannot render report"));
        Ok(())
    });
    {
        let after = Arc::clone(&after);
        reporters.register("steady", move |bus, _| {
            let after = Arc::clone(&after);
            bus.on(EventName::Done, move |_, _| *after.lock().unwrap() += 1);
            Ok(())
        });
    }
    let options = RunOptions {
        reporters: vec!["crashing".into(), "steady".into()],
        ..collection()
    };
    let calls = outcome();

    let engine_dyn: Arc<dyn Engine> = engine.clone();
    let summary = Runner::new(engine_dyn)
        .with_reporters(reporters)
        .run_with_callback(options, recording(&calls))
        .await
        .unwrap();

    assert_eq!(summary.assertions.failed, 1);
    assert_eq!(*after.lock().unwrap(), 1);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.is_none());
}

#[tokio::test]
async fn repeated_done_signals_complete_once() {
    let mut steps = two_items();
    steps.push(done());
    steps.push(step(|cb| cb.done(Some(EngineError::new("Error", "late")))));
    let engine = Arc::new(FakeEngine::new(steps));
    let calls = outcome();
    let run = runner(&engine).run_with_callback(collection(), recording(&calls));
    let names = record_names(run.bus());

    let summary = run.await.unwrap();

    assert!(summary.error.is_none());
    assert_eq!(calls.lock().unwrap().len(), 1);
    let names = names.lock().unwrap();
    assert_eq!(names.iter().filter(|n| **n == EventName::Done).count(), 1);
}

#[tokio::test]
async fn run_level_error_is_carried_by_the_summary() {
    let steps = vec![
        step(|cb| cb.start(None, Cursor::default())),
        step(|cb| cb.done(Some(EngineError::new("Error", "run aborted")))),
    ];
    let engine = Arc::new(FakeEngine::new(steps));
    let calls = outcome();

    let summary = runner(&engine)
        .run_with_callback(collection(), recording(&calls))
        .await
        .unwrap();

    assert_eq!(summary.error.as_ref().map(|e| e.message.as_str()), Some("run aborted"));
    let calls = calls.lock().unwrap();
    assert!(matches!(calls[0].0, Some(Error::Run(ref e)) if e.message == "run aborted"));
    assert!(!calls[0].0.as_ref().unwrap().is_configuration());
}

#[tokio::test]
async fn silent_engine_still_completes_the_run() {
    let engine = Arc::new(FakeEngine::new(single_iteration(Vec::new())));
    let calls = outcome();

    let summary = runner(&engine)
        .run_with_callback(collection(), recording(&calls))
        .await
        .unwrap();

    assert_eq!(engine.started.load(Ordering::SeqCst), 1);
    assert!(summary.error.is_some());
    assert!(summary.completed.is_some());
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0].0, Some(Error::Run(_))));
}

#[tokio::test]
async fn options_are_translated_for_the_engine() {
    let engine = Arc::new(FakeEngine::new(vec![done()]));
    let options = RunOptions {
        abort_on_error: true,
        iteration_count: Some(3),
        folder: Some("Users".into()),
        timeout_request: Some(2500),
        avoid_redirects: Some(true),
        insecure: Some(true),
        environment: Some(
            json!({ "name": "dev", "values": [{ "key": "host", "value": "dev.local" }] }).into(),
        ),
        ..collection()
    };

    runner(&engine).run(options).await.unwrap();

    let translated = engine.options.lock().unwrap().clone().unwrap();
    assert!(translated.abort_on_failure);
    assert_eq!(translated.iteration_count, Some(3));
    assert_eq!(translated.entrypoint.as_deref(), Some("Users"));
    assert_eq!(translated.timeout.map(|t| t.request), Some(2500));
    assert_eq!(translated.requester.follow_redirects, Some(false));
    assert_eq!(translated.requester.strict_ssl, Some(false));
    assert_eq!(
        translated.environment.unwrap().get("host"),
        Some(&json!("dev.local"))
    );
}

#[tokio::test]
async fn item_errors_are_recorded_against_the_item() {
    let list = Item::new("i1", "List users", None);
    let mut steps = vec![step(|cb| cb.start(None, Cursor::default()))];
    {
        let list = list.clone();
        steps.push(step(move |cb| {
            cb.before_request(None, Cursor::at(0, 0), json!({}), Some(list.clone()))
        }));
    }
    steps.push(step(move |cb| {
        cb.request(
            Some(EngineError::new("Error", "ECONNREFUSED")),
            Cursor::at(0, 0),
            json!(null),
            json!({}),
            Some(list.clone()),
        )
    }));
    steps.push(done());
    let engine = Arc::new(FakeEngine::new(steps));

    let summary = runner(&engine).run(collection()).await.unwrap();

    assert_eq!(summary.requests.failed, 1);
    assert_eq!(summary.requests.pending, 0);
    assert_eq!(summary.failures[0].at, "request");
    assert_eq!(summary.failures[0].source.label(), "List users");
}
