//! Fixed size pool of probe workers fed from the target queue

use crate::metrics::{DiscoveryMetrics, ProbeOutcome};
use crate::queue::ProbeQueue;
use crate::service::{ProbeError, ProbingService};
use log::{debug, error, info, warn};
use shared::ProbeTarget;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

type SharedReceiver = Arc<Mutex<mpsc::Receiver<ProbeTarget>>>;

/// Runs up to `workers` probes at a time
///
/// A feeder task wakes every `poll_interval`, pops as many ready targets as
/// there are idle workers and hands them over a bounded channel. Targets that
/// have been dispatched but not yet picked up count against availability, so
/// the queue is never drained faster than the workers can keep up.
pub struct ProberPool {
    service: Arc<ProbingService>,
    queue: ProbeQueue,
    metrics: Arc<dyn DiscoveryMetrics>,
    workers: usize,
    poll_interval: Duration,
    busy: AtomicUsize,
    in_flight: AtomicUsize,
}

/// Marks a worker busy for the lifetime of one probe
struct BusyGuard<'a> {
    pool: &'a ProberPool,
}

impl<'a> BusyGuard<'a> {
    fn new(pool: &'a ProberPool) -> Self {
        let busy = pool.busy.fetch_add(1, Ordering::SeqCst) + 1;
        pool.metrics.workers_busy(busy);
        Self { pool }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let busy = self.pool.busy.fetch_sub(1, Ordering::SeqCst) - 1;
        self.pool.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.pool.metrics.workers_busy(busy);
    }
}

impl ProberPool {
    pub fn new(
        service: Arc<ProbingService>,
        queue: ProbeQueue,
        metrics: Arc<dyn DiscoveryMetrics>,
        workers: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            service,
            queue,
            metrics,
            workers,
            poll_interval,
            busy: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Number of workers currently running a probe
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Number of targets the feeder may dispatch right now
    pub fn available(&self) -> usize {
        self.workers
            .saturating_sub(self.in_flight.load(Ordering::SeqCst))
    }

    /// Runs the feeder and the workers until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(self.workers.max(1));
        let dispatch_rx: SharedReceiver = Arc::new(Mutex::new(dispatch_rx));

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let pool = Arc::clone(&self);
            let dispatch_rx = Arc::clone(&dispatch_rx);
            let cancel = cancel.clone();
            workers.spawn(async move { pool.work(id, dispatch_rx, cancel).await });
        }
        info!("Started {} probe workers", self.workers);

        self.feed(dispatch_tx, &cancel).await;

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("Probe worker panicked: {}", e);
            }
        }
        info!("Probe workers stopped");
    }

    async fn feed(&self, dispatch_tx: mpsc::Sender<ProbeTarget>, cancel: &CancellationToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let available = self.available();
            if available == 0 {
                continue;
            }

            let (targets, expired) = self.queue.pop_many(available).await;
            if expired > 0 {
                debug!("Dropped {} expired targets", expired);
            }

            for target in targets {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = dispatch_tx.send(target).await {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    warn!("Dispatch channel closed, dropping {}", e.0);
                    return;
                }
            }
        }
    }

    async fn work(&self, id: usize, dispatch_rx: SharedReceiver, cancel: CancellationToken) {
        loop {
            let target = {
                let mut dispatch_rx = dispatch_rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    target = dispatch_rx.recv() => target,
                }
            };
            let Some(target) = target else {
                break;
            };

            let _busy = BusyGuard::new(self);
            let label = target.to_string();
            let goal = target.goal;
            let started = Instant::now();

            // A panic only takes down this task, not the worker
            let probe = {
                let service = Arc::clone(&self.service);
                let cancel = cancel.clone();
                tokio::spawn(async move { service.probe(target, &cancel).await })
            };

            match probe.await {
                Ok(Ok(())) => debug!("Worker {} probed {}", id, label),
                Ok(Err(e @ ProbeError::Retried { .. })) => debug!("{}: {}", label, e),
                Ok(Err(e @ ProbeError::OutOfRetries { .. })) => info!("{}: {}", label, e),
                Ok(Err(ProbeError::Cancelled)) => debug!("Probe of {} cancelled", label),
                Ok(Err(e)) if e.is_fatal() => warn!("Dropping {}: {}", label, e),
                Ok(Err(e)) => error!("Probe of {} failed: {}", label, e),
                Err(e) => {
                    error!("Probe of {} panicked: {}", label, e);
                    self.metrics
                        .probe_finished(goal, ProbeOutcome::Error, started.elapsed());
                }
            }
        }
        debug!("Worker {} exiting", id);
    }
}
