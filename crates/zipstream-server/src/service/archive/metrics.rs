//! Archive session counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// How an archive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The archiver finished successfully and all bytes were delivered.
    Completed,
    /// The client went away or the server is shutting down.
    Interrupted,
    /// The archiver exited abnormally or the stream failed.
    Failed,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
    interrupted: AtomicU64,
    failed: AtomicU64,
    active: AtomicUsize,
}

/// Process-wide archive session statistics.
///
/// `active` counts archiver processes that have been spawned and not yet
/// reaped.
#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    inner: Arc<Counters>,
}

impl SessionMetrics {
    /// Creates zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archiver processes spawned so far.
    pub fn started(&self) -> u64 {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Number of sessions that delivered a complete archive.
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Number of sessions cut short by the client or by shutdown.
    pub fn interrupted(&self) -> u64 {
        self.inner.interrupted.load(Ordering::Acquire)
    }

    /// Number of sessions that ended with an archiver or stream failure.
    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Acquire)
    }

    /// Number of archiver processes currently alive or awaiting reaping.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Registers a freshly spawned archiver.
    pub(crate) fn begin(&self) -> SessionGuard {
        self.inner.started.fetch_add(1, Ordering::AcqRel);
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        SessionGuard {
            metrics: self.clone(),
            outcome: SessionOutcome::Failed,
        }
    }
}

/// Keeps a session counted as active until dropped.
///
/// Sessions that never record an outcome, e.g. because their task panicked,
/// are counted as failed.
#[derive(Debug)]
pub(crate) struct SessionGuard {
    metrics: SessionMetrics,
    outcome: SessionOutcome,
}

impl SessionGuard {
    pub(crate) fn record(&mut self, outcome: SessionOutcome) {
        self.outcome = outcome;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let counters = &self.metrics.inner;
        let counter = match self.outcome {
            SessionOutcome::Completed => &counters.completed,
            SessionOutcome::Interrupted => &counters.interrupted,
            SessionOutcome::Failed => &counters.failed,
        };

        counter.fetch_add(1, Ordering::AcqRel);
        counters.active.fetch_sub(1, Ordering::AcqRel);
    }
}
