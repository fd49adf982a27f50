//! Error types for collection runs.

use thiserror::Error;

use crate::events::error::SerializedError;

/// Result type alias using the runner error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can stop a run or mark it as unsuccessful.
///
/// Configuration-class variants are reported before the engine is touched.
/// `Run` carries a run-level error reported by the engine through `done`,
/// in which case a summary still exists.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid or unusable run options
    #[error("Configuration error: {0}")]
    Config(String),

    /// No collection object after resolution
    #[error("expecting a collection to run")]
    MissingCollection,

    /// A reporter name with no registered factory
    #[error("Unknown reporter: {0}")]
    UnknownReporter(String),

    /// An external source could not be fetched or parsed
    #[error("Failed to load `{location}`: {message}")]
    Load { location: String, message: String },

    /// A reporter factory failed during construction
    #[error("Reporter error: {name}: {message}")]
    Reporter { name: String, message: String },

    /// The engine refused to prepare a run
    #[error("Engine error: {0}")]
    Engine(SerializedError),

    /// The engine finished the run with a fatal error
    #[error("Run error: {0}")]
    Run(SerializedError),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a load error for the given location.
    pub fn load(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a reporter construction error.
    pub fn reporter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reporter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// True for errors raised before the engine was ever started.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Run(_))
    }
}
