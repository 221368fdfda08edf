use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Per-session counters shared by the coordinator, scanners and collector
#[derive(Debug, Clone)]
pub struct SearchMetrics {
    scanners_launched: Arc<AtomicU64>,
    scanners_finished: Arc<AtomicU64>,
    lines_scanned: Arc<AtomicU64>,
    records_sent: Arc<AtomicU64>,
    records_collected: Arc<AtomicU64>,
    sources_failed: Arc<AtomicU64>,
    // u64::MAX until the collector observes the completion signal
    finished_at_completion: Arc<AtomicU64>,
    // u64::MAX unless the collector stopped on cancellation or timeout
    collected_at_interrupt: Arc<AtomicU64>,
}

impl SearchMetrics {
    pub fn new() -> Self {
        Self {
            scanners_launched: Arc::new(AtomicU64::new(0)),
            scanners_finished: Arc::new(AtomicU64::new(0)),
            lines_scanned: Arc::new(AtomicU64::new(0)),
            records_sent: Arc::new(AtomicU64::new(0)),
            records_collected: Arc::new(AtomicU64::new(0)),
            sources_failed: Arc::new(AtomicU64::new(0)),
            finished_at_completion: Arc::new(AtomicU64::new(u64::MAX)),
            collected_at_interrupt: Arc::new(AtomicU64::new(u64::MAX)),
        }
    }

    pub fn record_scanner_launched(&self) {
        self.scanners_launched.fetch_add(1, Ordering::SeqCst);
    }

    /// Called by a scanner task as its very last action
    pub fn record_scanner_finished(&self, lines: u64, sent: u64) {
        self.lines_scanned.fetch_add(lines, Ordering::Relaxed);
        self.records_sent.fetch_add(sent, Ordering::Relaxed);
        self.scanners_finished.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_collected(&self, count: u64) {
        self.records_collected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_source_failure(&self) {
        self.sources_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshots the finished-scanner count at the moment completion is observed
    pub fn record_completion_observed(&self) {
        let finished = self.scanners_finished.load(Ordering::SeqCst);
        self.finished_at_completion.store(finished, Ordering::SeqCst);
    }

    /// Snapshots the aggregate size at the moment cancellation or the
    /// deadline is observed
    pub fn record_interrupted(&self, collected: u64) {
        self.collected_at_interrupt.store(collected, Ordering::SeqCst);
    }

    pub fn get_stats(&self) -> SearchStats {
        let at_completion = self.finished_at_completion.load(Ordering::SeqCst);
        let at_interrupt = self.collected_at_interrupt.load(Ordering::SeqCst);
        SearchStats {
            scanners_launched: self.scanners_launched.load(Ordering::SeqCst),
            scanners_finished: self.scanners_finished.load(Ordering::SeqCst),
            lines_scanned: self.lines_scanned.load(Ordering::Relaxed),
            records_sent: self.records_sent.load(Ordering::Relaxed),
            records_collected: self.records_collected.load(Ordering::Relaxed),
            sources_failed: self.sources_failed.load(Ordering::Relaxed),
            finished_at_completion: (at_completion != u64::MAX).then_some(at_completion),
            collected_at_interrupt: (at_interrupt != u64::MAX).then_some(at_interrupt),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Search session stats:\n\
             Scanners launched/finished: {}/{}\n\
             Lines scanned: {}\n\
             Records sent/collected: {}/{}\n\
             Sources failed: {}",
            stats.scanners_launched,
            stats.scanners_finished,
            stats.lines_scanned,
            stats.records_sent,
            stats.records_collected,
            stats.sources_failed
        );
    }
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of a session's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub scanners_launched: u64,
    pub scanners_finished: u64,
    pub lines_scanned: u64,
    pub records_sent: u64,
    pub records_collected: u64,
    pub sources_failed: u64,
    /// Scanners finished when the collector saw the completion signal;
    /// `None` if the session ended another way
    pub finished_at_completion: Option<u64>,
    /// Records held when the collector stopped early
    pub collected_at_interrupt: Option<u64>,
}
