//! RAII guards for call accounting.
//!
//! # Responsibilities
//! - Track calls waiting for a permit (queued) and holding one (running)
//! - Bound the number of pending async submissions
//! - Let shutdown wait until outstanding work has finished
//!
//! Counts are decremented in `Drop`, so a cancelled or panicking call never
//! leaks a slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::OwnedSemaphorePermit;

use crate::observability::metrics::record_dispatcher_counts;

/// Live counts of dispatched HTTP attempts.
#[derive(Debug, Default)]
pub struct CallCounts {
    running: AtomicUsize,
    queued: AtomicUsize,
}

impl CallCounts {
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    fn publish(&self) {
        record_dispatcher_counts(self.running(), self.queued());
    }

    /// Count a call as waiting for a permit.
    pub fn enqueue(self: &Arc<Self>) -> QueuedCall {
        self.queued.fetch_add(1, Ordering::AcqRel);
        self.publish();
        QueuedCall { counts: self.clone() }
    }
}

/// A call waiting for dispatcher permits.
#[derive(Debug)]
pub struct QueuedCall {
    counts: Arc<CallCounts>,
}

impl QueuedCall {
    /// Move the call from queued to running; the permits are held until the
    /// returned guard drops.
    pub fn start(self, permits: Vec<OwnedSemaphorePermit>) -> RunningCall {
        self.counts.running.fetch_add(1, Ordering::AcqRel);
        RunningCall { counts: self.counts.clone(), _permits: permits }
    }
}

impl Drop for QueuedCall {
    fn drop(&mut self) {
        self.counts.queued.fetch_sub(1, Ordering::AcqRel);
        self.counts.publish();
    }
}

/// A call holding its dispatcher permits.
#[derive(Debug)]
pub struct RunningCall {
    counts: Arc<CallCounts>,
    _permits: Vec<OwnedSemaphorePermit>,
}

impl Drop for RunningCall {
    fn drop(&mut self) {
        self.counts.running.fetch_sub(1, Ordering::AcqRel);
        self.counts.publish();
    }
}

/// Outstanding work of a worker pool.
#[derive(Debug, Default)]
pub struct WorkTracker {
    pending: AtomicUsize,
    outstanding: AtomicUsize,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl WorkTracker {
    /// Async submissions admitted and not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// All calls in progress, sync and async.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Track one call until the returned guard drops.
    pub fn track(self: &Arc<Self>) -> Tracked {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Tracked { tracker: self.clone() }
    }

    /// Admit an async submission if fewer than `capacity` are pending.
    pub fn try_admit(self: &Arc<Self>, capacity: usize) -> Option<Admission> {
        let mut prev = self.pending.load(Ordering::Relaxed);
        loop {
            if prev >= capacity {
                return None;
            }
            match self.pending.compare_exchange_weak(prev, prev + 1, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(Admission { tracked: self.track() })
    }

    /// Block until no call is outstanding or `timeout` elapses.
    ///
    /// Returns true if the tracker went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.idle_lock.lock().unwrap_or_else(PoisonError::into_inner);
        while self.outstanding() > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .idle
                .wait_timeout(guard, deadline - now)
                .map(|(g, _)| g)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        true
    }

    fn finish(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.idle_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.idle.notify_all();
        }
    }
}

/// An outstanding call.
#[derive(Debug)]
pub struct Tracked {
    tracker: Arc<WorkTracker>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.tracker.finish();
    }
}

/// An admitted async submission; holds a queue slot until dropped.
#[derive(Debug)]
pub struct Admission {
    tracked: Tracked,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.tracked.tracker.pending.fetch_sub(1, Ordering::AcqRel);
    }
}
