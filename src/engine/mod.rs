//! # Execution Engine Interface
//!
//! The engine that actually sends requests and runs scripts is external.
//! A run talks to it through two seams: [`Engine::prepare`] turns a
//! collection plus [`EngineOptions`] into an [`EngineRun`], and
//! [`EngineRun::start`] drives that run, reporting progress through the
//! [`RunCallbacks`] table.

#[cfg(test)]
pub(crate) mod fake;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::ResolvedOptions;
use crate::environment::VariableMap;
use crate::events::RunCallbacks;
use crate::events::error::EngineError;

/// Per-phase timeouts, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timeout {
    pub request: u64,
}

/// HTTP behavior knobs. `None` leaves the engine default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterOptions {
    pub follow_redirects: Option<bool>,
    #[serde(rename = "strictSSL")]
    pub strict_ssl: Option<bool>,
}

/// Options in the shape the engine expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub abort_on_failure: bool,
    pub iteration_count: Option<u32>,
    pub environment: Option<VariableMap>,
    pub globals: Option<VariableMap>,
    pub entrypoint: Option<String>,
    pub data: Option<Vec<Value>>,
    pub timeout: Option<Timeout>,
    pub requester: RequesterOptions,
}

impl EngineOptions {
    pub fn from_resolved(options: &ResolvedOptions) -> Self {
        Self {
            abort_on_failure: options.abort_on_error,
            iteration_count: options.iteration_count,
            environment: options.environment.clone(),
            globals: options.globals.clone(),
            entrypoint: options.folder.clone(),
            data: options.iteration_data.clone(),
            timeout: options
                .timeout_request
                .filter(|ms| *ms > 0)
                .map(|request| Timeout { request }),
            requester: RequesterOptions {
                follow_redirects: options.avoid_redirects.map(|avoid| !avoid),
                strict_ssl: options.insecure.map(|insecure| !insecure),
            },
        }
    }
}

/// Future driving a started run to completion.
pub type RunFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A prepared, not yet started run.
pub trait EngineRun: Send {
    /// Start the run. The engine invokes `callbacks` as it progresses and
    /// calls `done` last.
    fn start(self: Box<Self>, callbacks: Arc<dyn RunCallbacks>) -> RunFuture;
}

/// The collection execution engine.
pub trait Engine: Send + Sync {
    fn prepare(
        &self,
        collection: &Value,
        options: EngineOptions,
    ) -> Result<Box<dyn EngineRun>, EngineError>;
}
