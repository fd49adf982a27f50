//! Writes the final run summary as a JSON document.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedOptions;
use crate::error::{Error, Result};
use crate::events::{EventBus, EventName};
use crate::testing::summary::RunSummary;

pub const NAME: &str = "json";

const DATA_DIR: &str = ".getman";
const REPORT_FILE: &str = "run-report.json";

#[derive(Serialize)]
struct Report<'a> {
    collection: Option<&'a str>,
    run: &'a RunSummary,
}

/// Subscribe to `done` and write the report to `reporter.json.export`
/// (default `.getman/run-report.json`).
pub fn attach(bus: &EventBus, options: &ResolvedOptions) -> Result<()> {
    let export = export_path(options)?;
    let collection = options
        .collection
        .as_ref()
        .and_then(|collection| collection.pointer("/info/name"))
        .and_then(|name| name.as_str())
        .map(str::to_string);

    bus.on(EventName::Done, move |_, event| {
        let Some(summary) = event.summary() else {
            return;
        };
        let report = Report {
            collection: collection.as_deref(),
            run: summary,
        };
        match write_report(&export, &report) {
            Ok(()) => info!(path = %export.display(), "run report written"),
            Err(err) => warn!(error = %err, "failed to write run report"),
        }
    });
    Ok(())
}

fn export_path(options: &ResolvedOptions) -> Result<PathBuf> {
    let Some(export) = options
        .reporter_options(NAME)
        .and_then(|reporter| reporter.get("export"))
    else {
        return Ok(Path::new(DATA_DIR).join(REPORT_FILE));
    };

    export
        .as_str()
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| Error::reporter(NAME, "`export` must be a non-empty path"))
}

fn write_report(path: &Path, report: &Report<'_>) -> std::result::Result<(), String> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create report directory `{}`: {e}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(report)
        .map_err(|e| format!("Failed to serialize run report: {e}"))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write run report `{}`: {e}", path.display()))
}
