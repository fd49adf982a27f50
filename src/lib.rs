//! Collection runs for Getman.
//!
//! A run hands a collection to an execution engine, republishes the
//! engine's progress as named events on an [`EventBus`], synthesizes one
//! `assertion` event per test result, keeps a [`RunSummary`], and drives
//! the configured reporters.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use getman_run::engine::Engine;
//! # async fn demo(engine: Arc<dyn Engine>) -> getman_run::Result<()> {
//! use getman_run::{EventName, RunOptions, Runner};
//!
//! let run = Runner::new(engine).run(RunOptions::with_collection("collection.json"));
//! run.bus().on(EventName::Assertion, |_, event| {
//!     if let Some(error) = &event.error {
//!         eprintln!("failed: {}", error.message);
//!     }
//! });
//! let summary = run.await?;
//! println!("{} assertions failed", summary.assertions.failed);
//! # Ok(())
//! # }
//! ```

pub mod collections;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod events;
pub mod reporters;
pub mod runner;
pub mod storage;
pub mod testing;

pub use config::{ConfigResolver, ResolvedOptions, RunOptions, Source, SourceResolver};
pub use engine::{Engine, EngineOptions, EngineRun};
pub use error::{Error, Result};
pub use events::error::{EngineError, SerializedError};
pub use events::{Event, EventBus, EventName, Payload, RunCallbacks};
pub use reporters::ReporterRegistry;
pub use runner::{Run, Runner, Stage};
pub use testing::{FailureRecord, RunSummary};
