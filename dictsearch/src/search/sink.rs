use crossbeam_channel::{after, bounded, never, select, unbounded, Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::cancel::CancellationToken;
use crate::metrics::SearchMetrics;
use crate::results::{MatchRecord, SearchStatus};

/// Producer side of a session's result conduit.
///
/// Shared by reference between all scanners of a session. Closing it (by
/// [`close`](Self::close) or drop) is the coordinator's job, after every
/// scanner has returned.
#[derive(Debug)]
pub struct ResultSink {
    sender: Sender<MatchRecord>,
}

/// Consumer side of a session's result conduit, owned by the collector
#[derive(Debug)]
pub struct SinkReceiver {
    receiver: Receiver<MatchRecord>,
}

/// Creates a conduit; `None` is unbounded, `Some(n)` applies backpressure at `n`
pub fn result_sink(capacity: Option<usize>) -> (ResultSink, SinkReceiver) {
    let (sender, receiver) = match capacity {
        Some(cap) => bounded(cap),
        None => unbounded(),
    };
    (ResultSink { sender }, SinkReceiver { receiver })
}

impl ResultSink {
    /// Enqueues a record. Returns false only if the collector is gone.
    pub fn send(&self, record: MatchRecord) -> bool {
        self.sender.send(record).is_ok()
    }

    pub fn close(self) {}
}

impl SinkReceiver {
    /// Next record, or `None` once the sink is closed and drained
    pub fn recv(&self) -> Option<MatchRecord> {
        self.receiver.recv().ok()
    }
}

/// One-shot "all scanners finished" signal. `raise` consumes it, so it can
/// only fire once.
#[derive(Debug)]
pub struct CompletionSignal {
    sender: Sender<()>,
}

#[derive(Debug)]
pub struct CompletionListener {
    receiver: Receiver<()>,
}

pub fn completion_signal() -> (CompletionSignal, CompletionListener) {
    let (sender, receiver) = bounded(1);
    (CompletionSignal { sender }, CompletionListener { receiver })
}

impl CompletionSignal {
    pub fn raise(self) {
        // Nobody listening means the collector already ended the session
        let _ = self.sender.send(());
    }
}

/// What the collector hands back when it stops
#[derive(Debug)]
pub struct Collected {
    pub records: Vec<MatchRecord>,
    pub status: SearchStatus,
}

/// Drains a session's sink into one ordered aggregate
#[derive(Debug)]
pub struct Collector {
    sink: SinkReceiver,
    completion: CompletionListener,
    token: CancellationToken,
    deadline: Option<(Instant, Duration)>,
    metrics: SearchMetrics,
}

enum Stop {
    Completed,
    Cancelled,
    TimedOut(Duration),
}

enum Event {
    Record(MatchRecord),
    SinkClosed,
    Stop(Stop),
}

impl Collector {
    pub fn new(
        sink: SinkReceiver,
        completion: CompletionListener,
        token: CancellationToken,
        max_duration: Option<Duration>,
        metrics: SearchMetrics,
    ) -> Self {
        Self {
            sink,
            completion,
            token,
            deadline: max_duration.map(|limit| (Instant::now() + limit, limit)),
            metrics,
        }
    }

    /// Collects until the completion signal, cancellation or the deadline.
    ///
    /// On completion everything still queued is drained first: the signal is
    /// only raised after every producer returned, so the queue is final.
    pub fn collect(self) -> Collected {
        let timeout = match self.deadline {
            Some((at, _)) => after(at.saturating_duration_since(Instant::now())),
            None => never(),
        };
        let listener = self.token.listener();
        let mut records = Vec::new();
        let mut sink_open = true;

        let stop = loop {
            if self.token.is_cancelled() {
                break Stop::Cancelled;
            }
            let event = if sink_open {
                select! {
                    recv(self.sink.receiver) -> msg => msg.map_or(Event::SinkClosed, Event::Record),
                    recv(self.completion.receiver) -> _ => Event::Stop(Stop::Completed),
                    recv(listener) -> _ => Event::Stop(Stop::Cancelled),
                    recv(timeout) -> _ => Event::Stop(self.timed_out()),
                }
            } else {
                select! {
                    recv(self.completion.receiver) -> _ => Event::Stop(Stop::Completed),
                    recv(listener) -> _ => Event::Stop(Stop::Cancelled),
                    recv(timeout) -> _ => Event::Stop(self.timed_out()),
                }
            };
            match event {
                Event::Record(record) => records.push(record),
                Event::SinkClosed => sink_open = false,
                Event::Stop(stop) => break stop,
            }
        };

        let status = match stop {
            Stop::Completed => {
                self.metrics.record_completion_observed();
                records.extend(self.sink.receiver.try_iter());
                debug!("Completion observed, {} records collected", records.len());
                SearchStatus::Completed
            }
            Stop::Cancelled => {
                self.metrics.record_interrupted(records.len() as u64);
                warn!("Search cancelled with {} records collected", records.len());
                SearchStatus::Cancelled
            }
            Stop::TimedOut(limit) => {
                self.metrics.record_interrupted(records.len() as u64);
                warn!(
                    "Search timed out after {} with {} records collected",
                    humantime::format_duration(limit),
                    records.len()
                );
                SearchStatus::TimedOut(limit)
            }
        };

        self.metrics.record_collected(records.len() as u64);
        Collected { records, status }
    }

    fn timed_out(&self) -> Stop {
        // Scanners watch the token, so this stops them too
        self.token.cancel();
        let limit = self.deadline.map(|(_, limit)| limit).unwrap_or_default();
        Stop::TimedOut(limit)
    }
}
