//! Fetching run sources (collections, variable sets, iteration data) from
//! the file system or over HTTP.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Fetches and parses the JSON document at a location.
pub trait SourceLoader: Send + Sync {
    fn fetch<'a>(
        &'a self,
        location: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;
}

/// Loads `http://` and `https://` locations with `reqwest`, anything else
/// from the local file system.
#[derive(Debug, Clone, Default)]
pub struct DefaultLoader {
    client: reqwest::Client,
}

impl DefaultLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn read_remote(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::load(url, format!("Request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::load(url, format!("Unexpected status: {e}")))?;
        response
            .text()
            .await
            .map_err(|e| Error::load(url, format!("Failed to read response: {e}")))
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::load(path, format!("Failed to read file: {e}")))
    }
}

impl SourceLoader for DefaultLoader {
    fn fetch<'a>(
        &'a self,
        location: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        Box::pin(async move {
            let raw = if is_remote(location) {
                self.read_remote(location).await?
            } else {
                self.read_file(location).await?
            };
            debug!(location, bytes = raw.len(), "loaded source");
            parse_json(location, &raw)
        })
    }
}

fn is_remote(location: &str) -> bool {
    let lower = location.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn parse_json(location: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| Error::load(location, format!("Failed to parse JSON: {e}")))
}
