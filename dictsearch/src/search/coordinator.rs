use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

use super::cancel::CancellationToken;
use super::scanner::Query;
use super::session::{SearchSession, SourceTask};
use crate::config::SearchConfig;
use crate::errors::{SearchError, SearchResult};
use crate::results::{SearchOutput, SkipReason};
use crate::source::{EntrySource, SourceLoader, SourceSelection};

/// Runs searches: one fresh session per call, scanners on a shared pool.
///
/// The coordinator holds only configuration and its thread pool, so it is
/// cheap to clone and safe to call from several threads at once; concurrent
/// calls never share a sink or collector.
///
/// The `run*` methods never fail: every outcome is a [`SearchOutput`] and its
/// [`status`](SearchOutput::status) says how the search ended. An empty query
/// or empty source set returns an empty output whose status is `Skipped` with
/// the reason, and no task is started. Use
/// [`SearchOutput::into_completed`] to turn anything but a completed search
/// into a [`SearchError`].
#[derive(Debug, Clone)]
pub struct SearchCoordinator {
    config: Arc<SearchConfig>,
    pool: Arc<ThreadPool>,
}

impl SearchCoordinator {
    pub fn new(config: SearchConfig) -> SearchResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.thread_count.get())
            .thread_name(|i| format!("dictsearch-scan-{}", i))
            .build()
            .map_err(SearchError::thread_pool)?;
        debug!("Scanner pool ready with {} threads", config.thread_count);
        Ok(Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Searches in-memory sources
    pub fn run(&self, query: &str, sources: &[EntrySource]) -> SearchOutput {
        self.run_with_token(query, sources, &CancellationToken::new())
    }

    /// Like [`run`](Self::run), stopping early once `token` is cancelled.
    ///
    /// If `max_search_duration` elapses, `token` itself is cancelled and the
    /// call returns at the deadline with what was collected so far.
    pub fn run_with_token(
        &self,
        query: &str,
        sources: &[EntrySource],
        token: &CancellationToken,
    ) -> SearchOutput {
        let tasks: Vec<SourceTask> = sources.iter().cloned().map(SourceTask::Ready).collect();
        self.execute(query, tasks, token)
    }

    /// Searches the selected ids, loading each one inside its own scanner task.
    ///
    /// A source that fails to load shows up in [`SearchOutput::failures`] and
    /// contributes no records; the others are searched as usual.
    pub fn run_selection(
        &self,
        query: &str,
        selection: &SourceSelection,
        loader: Arc<dyn SourceLoader>,
    ) -> SearchOutput {
        self.run_selection_with_token(query, selection, loader, &CancellationToken::new())
    }

    pub fn run_selection_with_token(
        &self,
        query: &str,
        selection: &SourceSelection,
        loader: Arc<dyn SourceLoader>,
        token: &CancellationToken,
    ) -> SearchOutput {
        let tasks: Vec<SourceTask> = selection
            .iter()
            .map(|id| SourceTask::Deferred {
                id: id.to_string(),
                loader: Arc::clone(&loader),
            })
            .collect();
        self.execute(query, tasks, token)
    }

    /// Runs the search on a background thread and returns a cancellable handle
    pub fn spawn(
        &self,
        query: impl Into<String>,
        sources: Vec<EntrySource>,
    ) -> SearchResult<SearchHandle> {
        let query = query.into();
        let token = CancellationToken::new();
        let coordinator = self.clone();
        let session_token = token.clone();

        let thread = thread::Builder::new()
            .name("dictsearch-session".to_string())
            .spawn(move || coordinator.run_with_token(&query, &sources, &session_token))?;

        Ok(SearchHandle {
            token,
            thread: Some(thread),
        })
    }

    fn execute(
        &self,
        raw_query: &str,
        tasks: Vec<SourceTask>,
        token: &CancellationToken,
    ) -> SearchOutput {
        let query = match Query::parse(raw_query) {
            Ok(query) => query,
            Err(_) => {
                debug!("Empty query, skipping search");
                return SearchOutput::skipped(SkipReason::EmptyQuery);
            }
        };
        if tasks.is_empty() {
            debug!("No sources selected, skipping search");
            return SearchOutput::skipped(SkipReason::NoSourcesSelected);
        }

        info!(
            "Searching for {:?} across {} sources",
            query.as_str(),
            tasks.len()
        );

        let session = SearchSession::new(
            self.config.sink_capacity,
            self.config.max_search_duration,
            token.clone(),
        );
        let text = query.as_str().to_string();
        let output = session.execute(query, tasks, &self.pool);

        info!(
            "Search for {:?} finished ({:?}): {} matches, {} failed sources",
            text,
            output.status,
            output.records.len(),
            output.failures.len()
        );
        output
    }
}

/// A search running in the background.
///
/// Dropping an unfinished handle cancels the search, so abandoning a stale
/// query never leaves its scanners running.
#[derive(Debug)]
pub struct SearchHandle {
    token: CancellationToken,
    thread: Option<JoinHandle<SearchOutput>>,
}

impl SearchHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Blocks until the search ends and returns its output
    pub fn wait(mut self) -> SearchResult<SearchOutput> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| SearchError::task_failed("search already collected"))?;
        thread
            .join()
            .map_err(|_| SearchError::task_failed("search thread panicked"))
    }
}

impl Drop for SearchHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.token.cancel();
        }
    }
}

/// Searches `sources` with the default configuration
pub fn search(query: &str, sources: &[EntrySource]) -> SearchResult<SearchOutput> {
    let coordinator = SearchCoordinator::new(SearchConfig::default())?;
    Ok(coordinator.run(query, sources))
}
