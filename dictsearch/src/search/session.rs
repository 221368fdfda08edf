use crossbeam_channel::bounded;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::cancel::CancellationToken;
use super::scanner::{Query, ScanReport, Scanner};
use super::sink::{completion_signal, result_sink, Collector, CompletionSignal, ResultSink};
use crate::errors::{SearchError, SearchResult};
use crate::metrics::SearchMetrics;
use crate::results::{SearchOutput, SearchStatus, SourceFailure};
use crate::source::{EntrySource, SourceLoader};

/// Work for one scanner: a source already in memory, or one to load first
#[derive(Clone)]
pub(crate) enum SourceTask {
    Ready(EntrySource),
    Deferred {
        id: String,
        loader: Arc<dyn SourceLoader>,
    },
}

impl SourceTask {
    fn id(&self) -> &str {
        match self {
            SourceTask::Ready(source) => source.id(),
            SourceTask::Deferred { id, .. } => id,
        }
    }

    fn resolve(&self) -> SearchResult<Cow<'_, EntrySource>> {
        match self {
            SourceTask::Ready(source) => Ok(Cow::Borrowed(source)),
            SourceTask::Deferred { id, loader } => loader.load(id).map(Cow::Owned),
        }
    }
}

type ScanOutcome = Result<ScanReport, SourceFailure>;

/// Everything one query execution owns.
///
/// A session is consumed by [`execute`](Self::execute), so its sink, signal
/// and collector can never see a second query.
pub(crate) struct SearchSession {
    sink: ResultSink,
    signal: CompletionSignal,
    collector: Collector,
    token: CancellationToken,
    metrics: SearchMetrics,
}

impl SearchSession {
    pub(crate) fn new(
        sink_capacity: Option<usize>,
        max_duration: Option<Duration>,
        token: CancellationToken,
    ) -> Self {
        let metrics = SearchMetrics::new();
        let (sink, receiver) = result_sink(sink_capacity);
        let (signal, listener) = completion_signal();
        let collector = Collector::new(
            receiver,
            listener,
            token.clone(),
            max_duration,
            metrics.clone(),
        );
        Self {
            sink,
            signal,
            collector,
            token,
            metrics,
        }
    }

    /// Fans one scanner per task out onto `pool` and collects on the calling
    /// thread.
    ///
    /// The fan-out is a single pool job that joins every scanner and only then
    /// closes the sink and raises completion. The collector does not wait for
    /// that job once it has been cancelled or has timed out, so a loader that
    /// never returns cannot hold the caller past the deadline. Scanners left
    /// behind see the cancelled token, or a dead sink, and stop on their own.
    pub(crate) fn execute(
        self,
        query: Query,
        tasks: Vec<SourceTask>,
        pool: &ThreadPool,
    ) -> SearchOutput {
        let SearchSession {
            sink,
            signal,
            collector,
            token,
            metrics,
        } = self;

        let (report_tx, report_rx) = bounded::<Vec<ScanOutcome>>(1);
        let scan_metrics = metrics.clone();
        pool.spawn(move || {
            let reports: Vec<ScanOutcome> = tasks
                .par_iter()
                .map(|task| run_scanner(task, &query, &sink, &token, &scan_metrics))
                .collect();
            let _ = report_tx.send(reports);

            // Every scanner has returned; nothing can be sent any more
            sink.close();
            signal.raise();
        });

        let collected = collector.collect();

        let reports = match collected.status {
            // Completion is raised after the reports are sent
            SearchStatus::Completed => report_rx.recv().unwrap_or_else(|_| {
                warn!("Scanner reports were lost");
                Vec::new()
            }),
            _ => report_rx.try_recv().unwrap_or_else(|_| {
                debug!("Returning before every scanner finished");
                Vec::new()
            }),
        };
        let failures: Vec<SourceFailure> = reports.into_iter().filter_map(Result::err).collect();
        metrics.log_stats();

        SearchOutput {
            records: collected.records,
            status: collected.status,
            failures,
            stats: metrics.get_stats(),
        }
    }
}

fn run_scanner(
    task: &SourceTask,
    query: &Query,
    sink: &ResultSink,
    token: &CancellationToken,
    metrics: &SearchMetrics,
) -> ScanOutcome {
    metrics.record_scanner_launched();
    let source_id = task.id();
    debug!("Scanner started: {}", source_id);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> SearchResult<ScanReport> {
        if token.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let source = task.resolve()?;
        Ok(Scanner::new(query, sink, token).scan(&source))
    }));

    let result = match outcome {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(SearchError::Cancelled)) => Ok(ScanReport {
            source_id: source_id.to_string(),
            lines_scanned: 0,
            matches_sent: 0,
            interrupted: true,
        }),
        Ok(Err(e)) => {
            warn!("Skipping source {}: {}", source_id, e);
            Err(SourceFailure {
                source_id: source_id.to_string(),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            warn!("Scanner for {} panicked", source_id);
            Err(SourceFailure {
                source_id: source_id.to_string(),
                reason: "scanner panicked".to_string(),
            })
        }
    };

    match &result {
        Ok(report) => {
            debug!(
                "Scanner finished: {} ({} lines, {} matches{})",
                source_id,
                report.lines_scanned,
                report.matches_sent,
                if report.interrupted { ", interrupted" } else { "" }
            );
            metrics.record_scanner_finished(report.lines_scanned, report.matches_sent);
        }
        Err(_) => {
            metrics.record_source_failure();
            metrics.record_scanner_finished(0, 0);
        }
    }
    result
}
