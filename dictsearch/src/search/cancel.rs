use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Cooperative cancellation shared by every task of a search session.
///
/// Scanners poll [`is_cancelled`](Self::is_cancelled) between lines. The
/// collector blocks in `select!` and is woken through [`listener`](Self::listener),
/// a channel that disconnects the moment the token is cancelled.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    // Dropping this sender disconnects `listener`
    trigger: Mutex<Option<Sender<()>>>,
    listener: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (trigger, listener) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                listener,
            }),
        }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut trigger = self
            .inner
            .trigger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        trigger.take();
        debug!("Cancellation requested");
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// A receiver that never yields a value and becomes ready (disconnected)
    /// once the token is cancelled
    pub fn listener(&self) -> &Receiver<()> {
        &self.inner.listener
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
