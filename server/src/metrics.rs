//! Counters reported by the discovery components
//!
//! Every component holds an `Arc<dyn DiscoveryMetrics>`. Tests use
//! `NoopMetrics`, the binary uses `MetricsRecorder` and logs its snapshot.

use shared::Goal;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    Retry,
    Failure,
    Error,
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeOutcome::Success => "success",
            ProbeOutcome::Retry => "retry",
            ProbeOutcome::Failure => "failure",
            ProbeOutcome::Error => "error",
        };
        write!(f, "{}", name)
    }
}

pub trait DiscoveryMetrics: Send + Sync {
    fn target_enqueued(&self, _goal: Goal) {}
    fn targets_expired(&self, _count: usize) {}
    fn probe_finished(&self, _goal: Goal, _outcome: ProbeOutcome, _elapsed: Duration) {}
    fn workers_busy(&self, _busy: usize) {}
}

#[derive(Debug, Default)]
pub struct NoopMetrics;

impl DiscoveryMetrics for NoopMetrics {}

/// Point in time copy of `MetricsRecorder`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub details_enqueued: u64,
    pub port_enqueued: u64,
    pub expired: u64,
    pub successes: u64,
    pub retries: u64,
    pub failures: u64,
    pub errors: u64,
    pub busy_workers: usize,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "enqueued details={} port={}, expired={}, probes ok={} retry={} failed={} error={}, busy={}",
            self.details_enqueued,
            self.port_enqueued,
            self.expired,
            self.successes,
            self.retries,
            self.failures,
            self.errors,
            self.busy_workers
        )
    }
}

#[derive(Debug, Default)]
pub struct MetricsRecorder {
    details_enqueued: AtomicU64,
    port_enqueued: AtomicU64,
    expired: AtomicU64,
    successes: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
    errors: AtomicU64,
    busy_workers: AtomicUsize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            details_enqueued: self.details_enqueued.load(Ordering::Relaxed),
            port_enqueued: self.port_enqueued.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            busy_workers: self.busy_workers.load(Ordering::Relaxed),
        }
    }
}

impl DiscoveryMetrics for MetricsRecorder {
    fn target_enqueued(&self, goal: Goal) {
        let counter = match goal {
            Goal::Details => &self.details_enqueued,
            Goal::Port => &self.port_enqueued,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn targets_expired(&self, count: usize) {
        self.expired.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn probe_finished(&self, _goal: Goal, outcome: ProbeOutcome, _elapsed: Duration) {
        let counter = match outcome {
            ProbeOutcome::Success => &self.successes,
            ProbeOutcome::Retry => &self.retries,
            ProbeOutcome::Failure => &self.failures,
            ProbeOutcome::Error => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn workers_busy(&self, busy: usize) {
        self.busy_workers.store(busy, Ordering::Relaxed);
    }
}
