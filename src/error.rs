//! Typed errors for configuration and source queries.
//!
//! Source errors never escape the aggregator: they are folded into a zero
//! count plus a warning. Configuration errors are fatal before scanning.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while querying a single source instance.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backend could not be reached, or the local repository could not be read.
    #[error("source unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with something we could not interpret.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The adapter was handed a source kind it does not serve.
    #[error("no adapter registered for {0} sources")]
    Unsupported(&'static str),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Unreachable(err.to_string())
        }
    }
}

impl From<git2::Error> for SourceError {
    fn from(err: git2::Error) -> Self {
        SourceError::Unreachable(err.message().to_string())
    }
}

/// Configuration problems. Any of these stops the run before a scan starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
