//! Canonical error representation for everything flowing out of the engine.
//!
//! Engine errors arrive as [`EngineError`] and are turned into a
//! [`SerializedError`] exactly once, by [`normalize`], when the remapper
//! receives them. Everything downstream (bus subscribers, the summary,
//! reporters) only ever sees `SerializedError`, which is plain data and safe
//! to persist as JSON.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// One parsed frame of a stack trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
}

/// Error value as reported by the execution engine.
///
/// `stacktrace` is present when the engine already serialized the error;
/// otherwise only the raw `stack` text is available.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineError {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub stacktrace: Option<Vec<StackFrame>>,
    #[serde(default)]
    pub index: Option<usize>,
}

impl EngineError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Serializable error stored in failure records and delivered to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default)]
    pub stacktrace: Vec<StackFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl SerializedError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Attach a stack text and parse its frames.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        let stack = stack.into();
        self.stacktrace = parse_stack(&stack);
        self.stack = Some(stack);
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// First frame of the parsed trace, if any.
    pub fn top_frame(&self) -> Option<&StackFrame> {
        self.stacktrace.first()
    }
}

impl Display for SerializedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

/// Convert an engine error into the canonical form.
///
/// A prior serialization (`stacktrace` present) is kept as is. A native
/// stack without one is parsed into frames.
pub fn normalize(error: EngineError) -> SerializedError {
    let stacktrace = match (error.stacktrace, error.stack.as_deref()) {
        (Some(frames), _) => frames,
        (None, Some(stack)) => parse_stack(stack),
        (None, None) => Vec::new(),
    };

    SerializedError {
        name: error.name,
        message: error.message,
        stack: error.stack,
        stacktrace,
        index: error.index,
    }
}

/// Parse V8-style `at ...` lines of a stack text into frames.
pub fn parse_stack(stack: &str) -> Vec<StackFrame> {
    stack
        .lines()
        .filter_map(|line| line.trim().strip_prefix("at "))
        .map(parse_frame)
        .collect()
}

fn parse_frame(raw: &str) -> StackFrame {
    let raw = raw.trim();
    let raw = raw.strip_suffix(')').unwrap_or(raw);

    let (function_name, location) = if let Some((name, location)) = raw.rsplit_once(" (") {
        (Some(name.trim()), location)
    } else if let Some((name, location)) = raw.rsplit_once(' ') {
        (Some(name.trim()), location)
    } else {
        (None, raw)
    };

    let (file_name, line_number, column_number) = split_location(location.trim());

    StackFrame {
        function_name: function_name.filter(|name| !name.is_empty()).map(str::to_string),
        file_name: file_name.filter(|file| !file.is_empty()).map(str::to_string),
        line_number,
        column_number,
    }
}

fn split_location(location: &str) -> (Option<&str>, Option<u32>, Option<u32>) {
    if let Some((rest, column)) = location.rsplit_once(':') {
        if let Ok(column) = column.parse::<u32>() {
            if let Some((file, line)) = rest.rsplit_once(':') {
                if let Ok(line) = line.parse::<u32>() {
                    return (Some(file), Some(line), Some(column));
                }
            }
            // only one numeric suffix: it is the line
            return (Some(rest), Some(column), None);
        }
    }
    (Some(location), None, None)
}
