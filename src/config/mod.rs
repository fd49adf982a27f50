//! # Run Configuration
//!
//! [`RunOptions`] is what a caller hands to the runner: every data source may
//! be given inline or as a location (file path or URL). A [`ConfigResolver`]
//! turns it into [`ResolvedOptions`], with all sources fetched and variable
//! sets flattened.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::environment::{VariableMap, extract_model};
use crate::error::{Error, Result};
use crate::storage::{DefaultLoader, SourceLoader};

/// A data source: a location to fetch, or the data itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Location(String),
    Inline(Value),
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        match value {
            Value::String(location) => Source::Location(location),
            other => Source::Inline(other),
        }
    }
}

impl From<&str> for Source {
    fn from(location: &str) -> Self {
        Source::Location(location.to_string())
    }
}

/// Options accepted by a run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(default)]
    pub collection: Option<Source>,
    #[serde(default)]
    pub environment: Option<Source>,
    #[serde(default)]
    pub globals: Option<Source>,
    #[serde(default)]
    pub iteration_data: Option<Source>,
    /// Reporter names; a single string is accepted.
    #[serde(default, deserialize_with = "one_or_many")]
    pub reporters: Vec<String>,
    /// Per-reporter options, keyed by reporter name.
    #[serde(default)]
    pub reporter: Map<String, Value>,
    #[serde(default)]
    pub abort_on_error: bool,
    #[serde(default)]
    pub iteration_count: Option<u32>,
    #[serde(default)]
    pub folder: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default)]
    pub timeout_request: Option<u64>,
    #[serde(default)]
    pub avoid_redirects: Option<bool>,
    #[serde(default)]
    pub insecure: Option<bool>,
}

impl RunOptions {
    pub fn with_collection(collection: impl Into<Source>) -> Self {
        Self {
            collection: Some(collection.into()),
            ..Default::default()
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(name)) => vec![name],
        Some(OneOrMany::Many(names)) => names,
    })
}

/// Options after every source has been fetched and normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedOptions {
    pub collection: Option<Value>,
    pub environment: Option<VariableMap>,
    pub globals: Option<VariableMap>,
    pub iteration_data: Option<Vec<Value>>,
    pub reporters: Vec<String>,
    pub reporter: Map<String, Value>,
    pub abort_on_error: bool,
    pub iteration_count: Option<u32>,
    pub folder: Option<String>,
    pub timeout_request: Option<u64>,
    pub avoid_redirects: Option<bool>,
    pub insecure: Option<bool>,
}

impl ResolvedOptions {
    pub fn with_collection(collection: Value) -> Self {
        Self {
            collection: Some(collection),
            ..Default::default()
        }
    }

    /// Options given for one reporter under `reporter.<name>`.
    pub fn reporter_options(&self, name: &str) -> Option<&Value> {
        self.reporter.get(name)
    }
}

/// Resolves [`RunOptions`] from all their declared sources.
pub trait ConfigResolver: Send + Sync {
    fn resolve(
        &self,
        options: RunOptions,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedOptions>> + Send + '_>>;
}

/// Resolver fetching locations through a [`SourceLoader`].
pub struct SourceResolver<L = DefaultLoader> {
    loader: L,
}

impl SourceResolver<DefaultLoader> {
    pub fn new() -> Self {
        Self {
            loader: DefaultLoader::new(),
        }
    }
}

impl Default for SourceResolver<DefaultLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: SourceLoader> SourceResolver<L> {
    pub fn with_loader(loader: L) -> Self {
        Self { loader }
    }

    async fn collection(&self, source: Option<Source>) -> Result<Option<Value>> {
        let collection = match source {
            None => return Ok(None),
            Some(Source::Inline(collection)) => Some(collection),
            Some(Source::Location(location)) => {
                let data = self.loader.fetch(&location).await?;
                extract_model(&data, "collection").map(Value::Object)
            }
        };

        if let Some(collection) = &collection {
            if collection.pointer("/info/schema").is_none() {
                debug!("collection has no info.schema; passing it to the engine unconverted");
            }
        }
        Ok(collection)
    }

    async fn variables(&self, source: Option<Source>, kind: &str) -> Result<Option<VariableMap>> {
        let data = match source {
            None => return Ok(None),
            Some(Source::Inline(data)) => data,
            Some(Source::Location(location)) => self.loader.fetch(&location).await?,
        };

        let model = extract_model(&data, kind);
        if model.is_none() {
            warn!(kind, "no usable variables in source; ignoring it");
        }
        Ok(model)
    }

    async fn iteration_data(&self, source: Option<Source>) -> Result<Option<Vec<Value>>> {
        let (data, origin) = match source {
            None => return Ok(None),
            Some(Source::Inline(data)) => (data, "<inline>".to_string()),
            Some(Source::Location(location)) => (self.loader.fetch(&location).await?, location),
        };

        match data {
            Value::Array(rows) => Ok(Some(rows)),
            row @ Value::Object(_) => Ok(Some(vec![row])),
            _ => Err(Error::load(origin, "iteration data must be a JSON array")),
        }
    }
}

impl<L: SourceLoader> ConfigResolver for SourceResolver<L> {
    fn resolve(
        &self,
        options: RunOptions,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedOptions>> + Send + '_>> {
        Box::pin(async move {
            Ok(ResolvedOptions {
                collection: self.collection(options.collection).await?,
                environment: self.variables(options.environment, "environment").await?,
                globals: self.variables(options.globals, "globals").await?,
                iteration_data: self.iteration_data(options.iteration_data).await?,
                reporters: options.reporters,
                reporter: options.reporter,
                abort_on_error: options.abort_on_error,
                iteration_count: options.iteration_count,
                folder: options.folder,
                timeout_request: options.timeout_request,
                avoid_redirects: options.avoid_redirects,
                insecure: options.insecure,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SourceLoader;
    use serde_json::json;
    use std::collections::HashMap;

    struct MapLoader(HashMap<&'static str, Value>);

    impl SourceLoader for MapLoader {
        fn fetch<'a>(
            &'a self,
            location: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
            Box::pin(async move {
                self.0
                    .get(location)
                    .cloned()
                    .ok_or_else(|| Error::load(location, "not found"))
            })
        }
    }

    fn resolver(entries: &[(&'static str, Value)]) -> SourceResolver<MapLoader> {
        SourceResolver::with_loader(MapLoader(entries.iter().cloned().collect()))
    }

    #[test]
    fn options_deserialize_from_camel_case() {
        let options: RunOptions = serde_json::from_value(json!({
            "collection": "collection.json",
            "environment": { "values": [] , "name": "dev" },
            "reporters": "json",
            "abortOnError": true,
            "iterationCount": 2,
            "timeoutRequest": 500,
            "avoidRedirects": true,
            "insecure": false
        }))
        .unwrap();

        assert_eq!(options.collection, Some(Source::Location("collection.json".into())));
        assert!(matches!(options.environment, Some(Source::Inline(_))));
        assert_eq!(options.reporters, vec!["json"]);
        assert!(options.abort_on_error);
        assert_eq!(options.iteration_count, Some(2));
        assert_eq!(options.timeout_request, Some(500));
        assert_eq!(options.avoid_redirects, Some(true));
        assert_eq!(options.insecure, Some(false));
    }

    #[test]
    fn reporter_list_accepts_many_or_none() {
        let many: RunOptions =
            serde_json::from_value(json!({ "reporters": ["json", "cli"] })).unwrap();
        assert_eq!(many.reporters, vec!["json", "cli"]);
        let none: RunOptions = serde_json::from_value(json!({ "reporters": null })).unwrap();
        assert!(none.reporters.is_empty());
    }

    #[tokio::test]
    async fn locations_are_fetched_and_extracted() {
        let resolver = resolver(&[
            ("col.json", json!({ "collection": { "info": { "schema": "v2" }, "item": [] } })),
            (
                "env.json",
                json!({ "name": "dev", "values": [{ "key": "host", "value": "dev.local" }] }),
            ),
            ("data.json", json!([{ "id": 1 }, { "id": 2 }])),
        ]);
        let options = RunOptions {
            collection: Some(Source::Location("col.json".into())),
            environment: Some(Source::Location("env.json".into())),
            iteration_data: Some(Source::Location("data.json".into())),
            ..Default::default()
        };

        let resolved = resolver.resolve(options).await.unwrap();
        assert_eq!(resolved.collection.unwrap()["info"]["schema"], "v2");
        assert_eq!(
            resolved.environment.unwrap().get("host"),
            Some(&json!("dev.local"))
        );
        assert_eq!(resolved.iteration_data.map(|rows| rows.len()), Some(2));
        assert!(resolved.globals.is_none());
    }

    #[tokio::test]
    async fn inline_variables_are_flattened() {
        let options = RunOptions {
            globals: Some(Source::Inline(json!([
                { "key": "token", "value": "a" },
                { "key": "token", "value": "b" }
            ]))),
            ..RunOptions::with_collection(json!({ "item": [] }))
        };

        let resolved = resolver(&[]).resolve(options).await.unwrap();
        assert_eq!(resolved.globals.unwrap().get("token"), Some(&json!("b")));
        assert_eq!(resolved.collection, Some(json!({ "item": [] })));
    }

    #[tokio::test]
    async fn unreachable_source_fails_resolution() {
        let options = RunOptions {
            environment: Some(Source::Location("missing.json".into())),
            ..RunOptions::with_collection(json!({}))
        };

        let err = resolver(&[]).resolve(options).await.unwrap_err();
        assert!(matches!(err, Error::Load { ref location, .. } if location == "missing.json"));
    }

    #[tokio::test]
    async fn scalar_iteration_data_is_rejected() {
        let options = RunOptions {
            iteration_data: Some(Source::Inline(json!(5))),
            ..RunOptions::with_collection(json!({}))
        };

        let err = resolver(&[]).resolve(options).await.unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }
}
