//! # Reporters
//!
//! Reporters are bus subscribers created by name. A [`ReporterRegistry`]
//! maps each name to a factory receiving the bus and the resolved options;
//! the factory subscribes to whatever events it needs.
//!
//! Unknown names are rejected up front by [`ReporterRegistry::validate`].
//! A factory that fails (or panics) is logged and skipped without affecting
//! the other reporters or the run.

pub mod json;

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ResolvedOptions;
use crate::error::{Error, Result};
use crate::events::EventBus;

/// Creates a reporter by subscribing it to the bus.
pub type ReporterFactory = Arc<dyn Fn(&EventBus, &ResolvedOptions) -> Result<()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ReporterRegistry {
    factories: BTreeMap<String, ReporterFactory>,
}

impl ReporterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the reporters shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(json::NAME, json::attach);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&EventBus, &ResolvedOptions) -> Result<()> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Fail on the first name without a registered factory.
    pub fn validate(&self, names: &[String]) -> Result<()> {
        match names.iter().find(|name| !self.contains(name)) {
            Some(unknown) => Err(Error::UnknownReporter(unknown.clone())),
            None => Ok(()),
        }
    }

    /// Create every named reporter; returns the names that attached.
    pub fn attach_all(
        &self,
        names: &[String],
        bus: &EventBus,
        options: &ResolvedOptions,
    ) -> Vec<String> {
        let mut attached = Vec::new();
        for name in names {
            let Some(factory) = self.factories.get(name) else {
                warn!(reporter = %name, "unknown reporter; skipping");
                continue;
            };

            match catch_unwind(AssertUnwindSafe(|| factory(bus, options))) {
                Ok(Ok(())) => {
                    debug!(reporter = %name, "reporter attached");
                    attached.push(name.clone());
                }
                Ok(Err(err)) => warn!(reporter = %name, error = %err, "reporter failed to start"),
                Err(_) => warn!(reporter = %name, "reporter panicked during construction"),
            }
        }
        attached
    }
}

impl std::fmt::Debug for ReporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
