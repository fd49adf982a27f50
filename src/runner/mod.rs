//! # Collection Runner
//!
//! Sequences one run: resolve options, validate them, prepare the engine
//! run, wire summary, assertion synthesis and reporters onto the bus, start
//! the engine, and report the outcome exactly once.
//!
//! ```text
//! RunOptions ──resolve──> ResolvedOptions ──prepare──> EngineRun
//!                                                         │ callbacks
//!                                                         v
//!             reporters <── EventBus <── EventRemapper <──┘
//!             summary   <──┘    │
//!             assertions <─────┘
//! ```
//!
//! [`Runner::run`] returns a [`Run`] immediately. Nothing happens until the
//! run is awaited, so subscribers added through [`Run::bus`] first never
//! miss an event.

#[cfg(test)]
mod tests;

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ConfigResolver, ResolvedOptions, RunOptions, SourceResolver};
use crate::engine::{Engine, EngineOptions};
use crate::error::{Error, Result};
use crate::events::error::{EngineError, normalize};
use crate::events::{CompletionCallback, EventBus, EventRemapper, RunCallbacks};
use crate::reporters::ReporterRegistry;
use crate::testing::{AssertionSynthesizer, RunSummary, SummaryAggregator};

/// Phases of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuring,
    Validating,
    EngineInvoking,
    Running,
    Completing,
}

/// Starts collection runs against an engine.
#[derive(Clone)]
pub struct Runner {
    engine: Arc<dyn Engine>,
    resolver: Arc<dyn ConfigResolver>,
    reporters: ReporterRegistry,
}

impl Runner {
    /// Runner with the default source resolver and the built-in reporters.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            resolver: Arc::new(SourceResolver::new()),
            reporters: ReporterRegistry::builtin(),
        }
    }

    pub fn with_resolver(mut self, resolver: impl ConfigResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_reporters(mut self, reporters: ReporterRegistry) -> Self {
        self.reporters = reporters;
        self
    }

    pub fn run(&self, options: RunOptions) -> Run {
        self.build(options, None)
    }

    /// Like [`Runner::run`], additionally invoking `callback` once with the
    /// outcome: `(error, summary)`. Configuration failures carry no summary.
    pub fn run_with_callback<F>(&self, options: RunOptions, callback: F) -> Run
    where
        F: FnOnce(Option<Error>, Option<RunSummary>) + Send + 'static,
    {
        self.build(options, Some(Box::new(callback)))
    }

    fn build(&self, options: RunOptions, completion: Option<CompletionCallback>) -> Run {
        Run {
            bus: Arc::new(EventBus::new()),
            options,
            engine: Arc::clone(&self.engine),
            resolver: Arc::clone(&self.resolver),
            reporters: self.reporters.clone(),
            completion,
        }
    }
}

/// A run that has not been started yet. Await it to execute.
///
/// Resolves to the final summary, or to the configuration error that
/// prevented the run. A run-level engine error still yields `Ok`, with
/// [`RunSummary::error`] set.
pub struct Run {
    bus: Arc<EventBus>,
    options: RunOptions,
    engine: Arc<dyn Engine>,
    resolver: Arc<dyn ConfigResolver>,
    reporters: ReporterRegistry,
    completion: Option<CompletionCallback>,
}

impl Run {
    /// The bus every run event is published on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    async fn execute(self) -> Result<RunSummary> {
        let Run {
            bus,
            options,
            engine,
            resolver,
            reporters,
            mut completion,
        } = self;

        debug!(stage = ?Stage::Configuring, "resolving run options");
        let resolved = match resolver.resolve(options).await {
            Ok(resolved) => resolved,
            Err(err) => return abort(completion, err),
        };

        debug!(stage = ?Stage::Validating, "validating run options");
        let collection = match validate(&resolved, &reporters) {
            Ok(collection) => collection,
            Err(err) => return abort(completion, err),
        };

        let summary = SummaryAggregator::attach(&bus);

        debug!(stage = ?Stage::EngineInvoking, "preparing engine run");
        let engine_run = match engine.prepare(collection, EngineOptions::from_resolved(&resolved)) {
            Ok(engine_run) => engine_run,
            Err(err) => return abort(completion, Error::Engine(normalize(err))),
        };

        debug!(stage = ?Stage::Running, "attaching subscribers");
        AssertionSynthesizer::attach(&bus);
        let attached = reporters.attach_all(&resolved.reporters, &bus, &resolved);
        let remapper = Arc::new(EventRemapper::new(
            Arc::clone(&bus),
            summary.clone(),
            completion.take(),
        ));

        // start on a later scheduler turn, never inside the resolving call stack
        tokio::task::yield_now().await;
        info!(reporters = ?attached, "starting run");
        let callbacks: Arc<dyn RunCallbacks> = remapper.clone();
        engine_run.start(callbacks).await;

        debug!(stage = ?Stage::Completing, "engine run finished");
        if !remapper.is_done() {
            warn!("engine finished without signalling done");
            remapper.done(Some(EngineError::new(
                "Error",
                "engine finished without signalling completion",
            )));
        }

        Ok(summary.snapshot())
    }
}

impl IntoFuture for Run {
    type Output = Result<RunSummary>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}

/// The collection to run, once options and reporter names check out.
fn validate<'a>(resolved: &'a ResolvedOptions, reporters: &ReporterRegistry) -> Result<&'a Value> {
    let collection = resolved
        .collection
        .as_ref()
        .filter(|collection| collection.is_object())
        .ok_or(Error::MissingCollection)?;
    reporters.validate(&resolved.reporters)?;
    Ok(collection)
}

fn abort(completion: Option<CompletionCallback>, err: Error) -> Result<RunSummary> {
    warn!(error = %err, "run aborted before starting");
    if let Some(completion) = completion {
        completion(Some(err.clone()), None);
    }
    Err(err)
}
