use serde::Serialize;
use std::time::Duration;

use crate::errors::{SearchError, SearchResult};
use crate::metrics::SearchStats;

/// One matching dictionary entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    /// Identifier of the dictionary the line came from
    pub source_id: String,
    /// The full matching line
    pub line: String,
}

impl MatchRecord {
    pub fn new(source_id: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            line: line.into(),
        }
    }
}

/// Why a search ran no scanners at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyQuery,
    NoSourcesSelected,
}

/// How a search session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    /// Every scanner finished and every record was collected
    Completed,
    /// Validation turned the search into a no-op
    Skipped(SkipReason),
    /// The session's cancellation token fired first
    Cancelled,
    /// `max_search_duration` elapsed first
    TimedOut(#[serde(with = "duration_secs")] Duration),
}

/// A source that contributed nothing because it could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub reason: String,
}

/// The aggregate of one search session.
///
/// `records` is in collector arrival order: lines from one source keep their
/// file order, but sources interleave arbitrarily.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutput {
    pub records: Vec<MatchRecord>,
    pub status: SearchStatus,
    pub failures: Vec<SourceFailure>,
    pub stats: SearchStats,
}

impl SearchOutput {
    /// An output for a search that never started
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            records: Vec::new(),
            status: SearchStatus::Skipped(reason),
            failures: Vec::new(),
            stats: SearchStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_complete(&self) -> bool {
        self.status == SearchStatus::Completed
    }

    /// Records contributed by one source, in that source's line order
    pub fn records_for<'a>(&'a self, source_id: &'a str) -> impl Iterator<Item = &'a MatchRecord> {
        self.records
            .iter()
            .filter(move |record| record.source_id == source_id)
    }

    /// Converts every status other than `Completed` into the matching error.
    pub fn into_completed(self) -> SearchResult<Self> {
        match self.status {
            SearchStatus::Completed => Ok(self),
            SearchStatus::Skipped(SkipReason::EmptyQuery) => Err(SearchError::EmptyQuery),
            SearchStatus::Skipped(SkipReason::NoSourcesSelected) => {
                Err(SearchError::NoSourcesSelected)
            }
            SearchStatus::Cancelled => Err(SearchError::Cancelled),
            SearchStatus::TimedOut(limit) => Err(SearchError::TimedOut(limit)),
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
