//! Progress reporting and cancellation for a sync run

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Completed/total counter over a run's addresses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub completed: u64,
    pub total: u64,
}

/// Increment-only progress counter.
///
/// Workers finish in any order; the counter only ever goes up within a run.
#[derive(Debug, Clone)]
pub struct Progress {
    completed: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
    sender: Arc<watch::Sender<ProgressUpdate>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ProgressUpdate::default());
        Self {
            completed: Arc::new(AtomicU64::new(0)),
            total: Arc::new(AtomicU64::new(0)),
            sender: Arc::new(sender),
        }
    }

    /// Observe updates as they happen
    pub fn subscribe(&self) -> watch::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }

    /// Start a run over `total` addresses
    pub(crate) fn start(&self, total: u64) {
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.sender.send_replace(self.current());
    }

    /// Mark one address done, returning the new completed count
    pub(crate) fn increment(&self) -> u64 {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish();
        completed
    }

    pub fn current(&self) -> ProgressUpdate {
        ProgressUpdate {
            completed: self.completed.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
        }
    }

    fn publish(&self) {
        let update = self.current();
        // Concurrent publishers may race; never let the observed count regress
        self.sender.send_if_modified(|current| {
            if update.total != current.total || update.completed > current.completed {
                *current = update;
                true
            } else {
                false
            }
        });
    }
}

/// Cooperative cancellation, checked between address-level steps
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
