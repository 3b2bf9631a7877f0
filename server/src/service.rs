//! One probe attempt from target to persisted outcome
//!
//! The service resolves the target's server, runs the prober registered for
//! the target's goal and stores the result. Failed attempts are re-queued with
//! exponential backoff until `max_retries` is reached, after which the server
//! is marked with the goal's terminal failure status.

use crate::config::DiscoveryConfig;
use crate::metrics::{DiscoveryMetrics, ProbeOutcome};
use crate::probers::{DetailsProber, GoalProbeError, GoalProber, PortProber};
use crate::queue::{ProbeQueue, QueueError};
use crate::repository::{RepositoryError, ServerRepository};
use log::debug;
use shared::{Goal, ProbeTarget, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no prober registered for goal {0}")]
    UnknownGoal(Goal),
    #[error("server {0} is not known")]
    ServerNotFound(SocketAddr),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("failed to queue retry: {0}")]
    Queue(#[from] QueueError),
    #[error("probe cancelled")]
    Cancelled,
    #[error("attempt {retries} failed, retrying in {delay:?}: {source}")]
    Retried {
        retries: u32,
        delay: Duration,
        source: GoalProbeError,
    },
    #[error("giving up after {retries} retries: {source}")]
    OutOfRetries { retries: u32, source: GoalProbeError },
}

impl ProbeError {
    /// Whether the target was abandoned without touching the server.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::UnknownGoal(_) | ProbeError::ServerNotFound(_))
    }
}

/// Delay before retry number `retries`: 2^retries seconds
pub fn backoff(retries: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(retries))
}

pub struct ProbingService {
    repo: Arc<dyn ServerRepository>,
    queue: ProbeQueue,
    probers: Vec<GoalProber>,
    probe_timeout: Duration,
    max_retries: u32,
    metrics: Arc<dyn DiscoveryMetrics>,
}

impl ProbingService {
    /// Creates a service with the details and port probers registered.
    pub fn new(
        repo: Arc<dyn ServerRepository>,
        queue: ProbeQueue,
        metrics: Arc<dyn DiscoveryMetrics>,
        config: &DiscoveryConfig,
    ) -> Self {
        let probers = vec![
            GoalProber::Details(DetailsProber::new()),
            GoalProber::Port(PortProber::new(config.port_offsets.clone())),
        ];
        Self::with_probers(
            repo,
            queue,
            metrics,
            probers,
            config.probe_timeout,
            config.max_retries,
        )
    }

    pub fn with_probers(
        repo: Arc<dyn ServerRepository>,
        queue: ProbeQueue,
        metrics: Arc<dyn DiscoveryMetrics>,
        probers: Vec<GoalProber>,
        probe_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            repo,
            queue,
            probers,
            probe_timeout,
            max_retries,
            metrics,
        }
    }

    fn prober_for(&self, goal: Goal) -> Option<&GoalProber> {
        self.probers.iter().find(|prober| prober.goal() == goal)
    }

    /// Runs one attempt for `target` and stores its outcome.
    ///
    /// `Ok` means the server was probed successfully. `Retried` and
    /// `OutOfRetries` are expected outcomes of an unreachable server rather
    /// than malfunctions.
    pub async fn probe(
        &self,
        target: ProbeTarget,
        cancel: &CancellationToken,
    ) -> Result<(), ProbeError> {
        let started = Instant::now();
        let goal = target.goal;
        let result = self.attempt(target, cancel).await;

        let outcome = match &result {
            Ok(()) => ProbeOutcome::Success,
            Err(ProbeError::Retried { .. }) => ProbeOutcome::Retry,
            Err(ProbeError::OutOfRetries { .. }) => ProbeOutcome::Failure,
            Err(_) => ProbeOutcome::Error,
        };
        self.metrics
            .probe_finished(goal, outcome, started.elapsed());

        result
    }

    async fn attempt(
        &self,
        mut target: ProbeTarget,
        cancel: &CancellationToken,
    ) -> Result<(), ProbeError> {
        let prober = self
            .prober_for(target.goal)
            .ok_or(ProbeError::UnknownGoal(target.goal))?;

        let server = match self.repo.get(target.addr).await {
            Ok(server) => server,
            Err(RepositoryError::NotFound(addr)) => return Err(ProbeError::ServerNotFound(addr)),
            Err(e) => return Err(e.into()),
        };

        let error = match prober
            .probe(server.clone(), target.query_addr(), self.probe_timeout, cancel)
            .await
        {
            Ok(probed) => {
                let resolve = |current: &mut Server| {
                    prober.merge_success(current, &probed);
                    true
                };
                self.repo.add_or_update(probed.clone(), &resolve).await?;
                debug!("Probed {}", target);
                return Ok(());
            }
            Err(e) => e,
        };

        if cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }

        let (retries, can_retry) = target.inc_retries(self.max_retries);
        let delay = backoff(retries);
        // A delay past the end of the clock ends retrying
        let retry_at = Instant::now().checked_add(delay).filter(|_| can_retry);

        if let Some(retry_at) = retry_at {
            let resolve = |current: &mut Server| {
                *current = prober.handle_retry(current.clone());
                true
            };
            self.repo
                .add_or_update(prober.handle_retry(server), &resolve)
                .await?;

            self.queue
                .add_between(target, Some(retry_at), None)
                .await?;

            return Err(ProbeError::Retried {
                retries,
                delay,
                source: error,
            });
        }

        let resolve = |current: &mut Server| {
            *current = prober.handle_failure(current.clone());
            true
        };
        self.repo
            .add_or_update(prober.handle_failure(server), &resolve)
            .await?;

        Err(ProbeError::OutOfRetries {
            retries,
            source: error,
        })
    }
}
