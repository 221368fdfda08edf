//! Error types for dictsearch.
//!
//! Validation problems (`EmptyQuery`, `NoSourcesSelected`) and per-source load
//! failures (`SourceUnreadable`) are ordinary values here: the coordinator turns
//! the former into a skipped search and the latter into a degraded result, so
//! none of them abort a search in progress.
//!
//! ```rust,ignore
//! match loader.load("en") {
//!     Ok(source) => // scan it,
//!     Err(SearchError::SourceNotFound(id)) => // tell the user,
//!     Err(e) => // report a degraded result,
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search query is empty")]
    EmptyQuery,
    #[error("No sources selected")]
    NoSourcesSelected,
    #[error("Source {source_id} is unreadable: {reason}")]
    SourceUnreadable { source_id: String, reason: String },
    #[error("Source not found: {0}")]
    SourceNotFound(String),
    #[error("Invalid source id: {0}")]
    InvalidSourceId(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Search cancelled")]
    Cancelled,
    #[error("Search timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Search task failed: {0}")]
    TaskFailed(String),
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid UTF-8 in file {path}: {source}")]
    EncodingError {
        path: PathBuf,
        source: std::str::Utf8Error,
    },
}

impl SearchError {
    pub fn source_unreadable(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnreadable {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn source_not_found(source_id: impl Into<String>) -> Self {
        Self::SourceNotFound(source_id.into())
    }

    pub fn invalid_source_id(source_id: impl Into<String>) -> Self {
        Self::InvalidSourceId(source_id.into())
    }

    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern(pattern.into())
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    pub fn thread_pool(msg: impl ToString) -> Self {
        Self::ThreadPool(msg.to_string())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn encoding_error(path: impl AsRef<Path>, source: std::str::Utf8Error) -> Self {
        Self::EncodingError {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<config::ConfigError> for SearchError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}
