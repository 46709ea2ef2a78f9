//! Counted completion tracking for job groups.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

use crate::error::GrabError;

#[derive(Default)]
struct Inner {
    count: AtomicUsize,
    notify: Notify,
}

/// A counted handle over a group of jobs: acquire on enqueue, release on
/// completion, await until the count drains. One group per logical set of
/// jobs (subtitles, audio, video); the pipeline's ordering guarantees
/// depend on the groups staying distinct.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        self.inner.count.fetch_add(n, Ordering::AcqRel);
    }

    pub fn done(&self) {
        let prev = self.inner.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "WaitGroup::done without matching add");
        if prev == 1 {
            self.inner.notify.notify_waiters();
        }
    }

    /// Waits until the count reaches zero. Returns immediately if nothing
    /// was added.
    pub async fn wait(&self) {
        loop {
            if self.inner.count.load(Ordering::Acquire) == 0 {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.inner.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// First-error-wins slot shared between a job group and the master worker.
#[derive(Clone, Default)]
pub struct ErrorSlot {
    inner: Arc<Mutex<Option<GrabError>>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `err` unless an earlier error is already held.
    pub fn record(&self, err: GrabError) {
        let mut slot = self.inner.lock().expect("error slot poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn take(&self) -> Option<GrabError> {
        self.inner.lock().expect("error slot poisoned").take()
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().expect("error slot poisoned").is_some()
    }
}
