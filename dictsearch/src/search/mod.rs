//! Concurrent fan-out/fan-in search over word-list sources.
//!
//! One call to [`SearchCoordinator::run`] is one session:
//!
//! 1. the query is normalized; an empty query or empty source set ends the
//!    call right here with a `Skipped` output
//! 2. one [`Scanner`] per source runs on the coordinator's rayon pool, all
//!    sending into a fresh [`ResultSink`]
//! 3. a single pool job joins those scanners
//! 4. only then does it close the sink and raise the [`CompletionSignal`]
//! 5. meanwhile a [`Collector`] on the calling thread appends records until it
//!    sees completion, drains what is left and hands back the aggregate
//!
//! Step 4 is what keeps results whole: the collector never finalizes while a
//! scanner could still send.
//!
//! ```rust,ignore
//! let coordinator = SearchCoordinator::new(SearchConfig::default())?;
//! let output = coordinator.run("apple", &sources);
//! for record in &output.records {
//!     println!("{}: {}", record.source_id, record.line);
//! }
//! ```
//!
//! Every task in a session watches one [`CancellationToken`]. Cancelling it,
//! or exceeding `max_search_duration`, makes the collector return what it has
//! so far without waiting for the scanners, which stop at their next line.

pub mod cancel;
pub mod coordinator;
pub mod scanner;
mod session;
pub mod sink;

pub use cancel::CancellationToken;
pub use coordinator::{search, SearchCoordinator, SearchHandle};
pub use scanner::{Query, ScanReport, Scanner};
pub use sink::{
    completion_signal, result_sink, Collected, Collector, CompletionListener, CompletionSignal,
    ResultSink, SinkReceiver,
};
