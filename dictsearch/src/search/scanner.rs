use tracing::trace;

use super::cancel::CancellationToken;
use super::sink::ResultSink;
use crate::errors::{SearchError, SearchResult};
use crate::results::MatchRecord;
use crate::source::EntrySource;

/// A normalized search query.
///
/// Surrounding whitespace is stripped on construction; the lowercase form used
/// for matching is computed once here rather than per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    folded: String,
}

impl Query {
    /// Normalizes `raw`, failing with [`SearchError::EmptyQuery`] if nothing is left
    pub fn parse(raw: &str) -> SearchResult<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        Ok(Self {
            text: text.to_string(),
            folded: fold(text).collect(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True when the line's leading token equals the query, ignoring case.
    ///
    /// This is whole-token equality: `"cat"` matches `"Cat feline"` but not
    /// `"category ..."`. Only a plain space ends the token, so a tab or a
    /// non-breaking space stays part of it. A line without a space is its
    /// own token.
    pub fn matches_line(&self, line: &str) -> bool {
        fold(leading_token(line)).eq(self.folded.chars())
    }
}

fn fold(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars().flat_map(char::to_lowercase)
}

/// The text before the first space
fn leading_token(line: &str) -> &str {
    line.split(' ').next().unwrap_or(line)
}

/// What one scanner did, for metrics and instrumentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub source_id: String,
    pub lines_scanned: u64,
    pub matches_sent: u64,
    /// Stopped early by cancellation or a closed sink
    pub interrupted: bool,
}

/// Scans one source for lines whose leading token matches a query
#[derive(Debug, Clone, Copy)]
pub struct Scanner<'a> {
    query: &'a Query,
    sink: &'a ResultSink,
    token: &'a CancellationToken,
}

impl<'a> Scanner<'a> {
    pub fn new(query: &'a Query, sink: &'a ResultSink, token: &'a CancellationToken) -> Self {
        Self { query, sink, token }
    }

    /// Sends every matching line of `source` to the sink, in line order.
    ///
    /// Never fails. Returns early once the token is cancelled or the collector
    /// has stopped listening.
    pub fn scan(&self, source: &EntrySource) -> ScanReport {
        let mut report = ScanReport {
            source_id: source.id().to_string(),
            lines_scanned: 0,
            matches_sent: 0,
            interrupted: false,
        };

        for line in source.lines() {
            if self.token.is_cancelled() {
                report.interrupted = true;
                break;
            }
            report.lines_scanned += 1;

            if !self.query.matches_line(line) {
                continue;
            }
            trace!("Match in {}: {}", source.id(), line);
            if !self.sink.send(MatchRecord::new(source.id(), line.as_str())) {
                report.interrupted = true;
                break;
            }
            report.matches_sent += 1;
        }

        report
    }
}
