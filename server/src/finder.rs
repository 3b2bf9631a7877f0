//! Periodic discovery of servers that need probing
//!
//! The finder never probes anything itself. It looks at the repository on two
//! timers and feeds the queue:
//!
//! - refresh: servers with a known query port get a details probe
//! - revival: servers that lost their query port but were alive within
//!   `revival_scope` get a port probe after a random countdown, so that a
//!   large batch does not hit the network all at once

use crate::config::DiscoveryConfig;
use crate::queue::ProbeQueue;
use crate::repository::{RepositoryError, ServerFilter, ServerRepository};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{DiscoveryStatus, Goal, ProbeTarget, Server};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct Finder {
    repo: Arc<dyn ServerRepository>,
    queue: ProbeQueue,
    refresh_interval: Duration,
    revival_interval: Duration,
    revival_scope: Duration,
    revival_countdown: Duration,
}

impl Finder {
    pub fn new(repo: Arc<dyn ServerRepository>, queue: ProbeQueue, config: &DiscoveryConfig) -> Self {
        Self {
            repo,
            queue,
            refresh_interval: config.refresh_interval,
            revival_interval: config.revival_interval,
            revival_scope: config.revival_scope,
            revival_countdown: config.revival_countdown,
        }
    }

    /// Runs both timers until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Finder started (refresh every {:?}, revival every {:?})",
            self.refresh_interval, self.revival_interval
        );
        tokio::join!(
            self.every(self.refresh_interval, &cancel, || self.refresh()),
            self.every(self.revival_interval, &cancel, || self.revive()),
        );
        info!("Finder stopped");
    }

    async fn every<F, Fut>(&self, period: Duration, cancel: &CancellationToken, mut cycle: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<usize, RepositoryError>>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = cycle().await {
                error!("Finder cycle failed: {}", e);
            }
        }
    }

    /// Enqueues a details probe for every server with a working query port.
    pub async fn refresh(&self) -> Result<usize, RepositoryError> {
        let filter = ServerFilter::default()
            .with_status(DiscoveryStatus::PORT)
            .no_status(DiscoveryStatus::DETAILS_RETRY);
        let servers = self.repo.filter(&filter).await?;
        let not_after = Instant::now() + self.refresh_interval;

        let mut added = 0;
        for server in servers {
            let target = ProbeTarget::new(server.addr, server.query_port, Goal::Details);
            if self.enqueue(target, None, Some(not_after)).await {
                added += 1;
            }
        }
        debug!("Refresh enqueued {} details targets", added);
        Ok(added)
    }

    /// Enqueues a delayed port probe for recently alive servers without a query port.
    pub async fn revive(&self) -> Result<usize, RepositoryError> {
        let now = SystemTime::now();
        let filter = ServerFilter::default()
            .no_status(DiscoveryStatus::PORT | DiscoveryStatus::PORT_RETRY)
            .updated_between(
                now.checked_sub(self.revival_scope),
                now.checked_sub(self.revival_interval),
            );
        let servers = self.repo.filter(&filter).await?;
        let started = Instant::now();
        let not_after = started + self.revival_interval;

        let mut added = 0;
        for server in servers {
            let not_before = started + self.countdown();
            if self.enqueue(revival_target(&server), Some(not_before), Some(not_after)).await {
                added += 1;
            }
        }
        debug!("Revival enqueued {} port targets", added);
        Ok(added)
    }

    fn countdown(&self) -> Duration {
        let max = self.revival_countdown.as_secs().max(1);
        Duration::from_secs(rand::thread_rng().gen_range(1..=max))
    }

    async fn enqueue(
        &self,
        target: ProbeTarget,
        not_before: Option<Instant>,
        not_after: Option<Instant>,
    ) -> bool {
        let label = target.to_string();
        match self.queue.add_between(target, not_before, not_after).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to enqueue {}: {}", label, e);
                false
            }
        }
    }
}

fn revival_target(server: &Server) -> ProbeTarget {
    ProbeTarget::new(server.addr, server.query_port, Goal::Port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsRecorder, NoopMetrics};
    use crate::queue::QueueError;
    use crate::repository::InMemoryServerRepository;
    use std::net::SocketAddr;

    fn mins(value: u64) -> Duration {
        Duration::from_secs(value * 60)
    }

    async fn store(
        repo: &InMemoryServerRepository,
        addr: &str,
        status: DiscoveryStatus,
        age: Duration,
    ) -> SocketAddr {
        let addr: SocketAddr = addr.parse().unwrap();
        let mut server = Server::with_default_query_port(addr);
        server.status = status;
        server.refreshed_at = SystemTime::now() - age;
        repo.add_or_update(server, &|_| true).await.unwrap();
        addr
    }

    fn finder(repo: Arc<InMemoryServerRepository>, queue: ProbeQueue) -> Finder {
        let config = DiscoveryConfig {
            revival_interval: mins(10),
            revival_scope: mins(60),
            revival_countdown: Duration::from_secs(5),
            ..Default::default()
        };
        Finder::new(repo, queue, &config)
    }

    #[tokio::test]
    async fn test_refresh_selects_servers_with_port() {
        let repo = Arc::new(InMemoryServerRepository::new());
        let queue = ProbeQueue::new(None, Arc::new(NoopMetrics));
        let live = store(&repo, "10.0.0.1:10480", DiscoveryStatus::PORT | DiscoveryStatus::DETAILS, Duration::ZERO).await;
        store(&repo, "10.0.0.2:10480", DiscoveryStatus::PORT | DiscoveryStatus::DETAILS_RETRY, Duration::ZERO).await;
        store(&repo, "10.0.0.3:10480", DiscoveryStatus::NO_PORT, Duration::ZERO).await;

        let added = finder(repo, queue.clone()).refresh().await.unwrap();

        assert_eq!(added, 1);
        let target = queue.pop().await.unwrap();
        assert_eq!(target.addr, live);
        assert_eq!(target.goal, Goal::Details);
        assert_eq!(target.query_port, 10481);
        assert_eq!(target.retries, 0);
    }

    #[tokio::test]
    async fn test_revive_selects_servers_in_window() {
        let repo = Arc::new(InMemoryServerRepository::new());
        let queue = ProbeQueue::new(None, Arc::new(NoopMetrics));
        let lost = store(&repo, "10.0.0.1:10480", DiscoveryStatus::NO_PORT, mins(20)).await;
        // Too recent, too old, still has a port, already retrying
        store(&repo, "10.0.0.2:10480", DiscoveryStatus::NO_PORT, mins(1)).await;
        store(&repo, "10.0.0.3:10480", DiscoveryStatus::NO_PORT, mins(120)).await;
        store(&repo, "10.0.0.4:10480", DiscoveryStatus::PORT, mins(20)).await;
        store(&repo, "10.0.0.5:10480", DiscoveryStatus::PORT_RETRY, mins(20)).await;

        let added = finder(repo, queue.clone()).revive().await.unwrap();

        assert_eq!(added, 1);
        // Every revival waits at least a second
        assert_eq!(queue.pop().await, Err(QueueError::NotReady));
        let target = queue.pop_any().await.unwrap();
        assert_eq!(target.addr, lost);
        assert_eq!(target.goal, Goal::Port);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_targets_expire_after_refresh_interval() {
        let repo = Arc::new(InMemoryServerRepository::new());
        let metrics = Arc::new(MetricsRecorder::new());
        let queue = ProbeQueue::new(None, metrics.clone());
        store(&repo, "10.0.0.1:10480", DiscoveryStatus::PORT, Duration::ZERO).await;
        store(&repo, "10.0.0.2:10480", DiscoveryStatus::PORT, Duration::ZERO).await;
        let config = DiscoveryConfig {
            refresh_interval: Duration::from_secs(30),
            ..Default::default()
        };
        let finder = Finder::new(repo, queue.clone(), &config);

        assert_eq!(finder.refresh().await.unwrap(), 2);

        // Still valid at the very end of the window
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(queue.pop().await.is_ok());
        assert_eq!(metrics.snapshot().expired, 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(queue.pop().await, Err(QueueError::Empty));
        assert_eq!(metrics.snapshot().expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revival_targets_wait_for_countdown_and_expire() {
        let repo = Arc::new(InMemoryServerRepository::new());
        let metrics = Arc::new(MetricsRecorder::new());
        let queue = ProbeQueue::new(None, metrics.clone());
        for i in 1..=3 {
            store(&repo, &format!("10.0.0.{}:10480", i), DiscoveryStatus::NO_PORT, mins(20)).await;
        }
        let finder = finder(repo, queue.clone());

        assert_eq!(finder.revive().await.unwrap(), 3);
        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(queue.pop().await, Err(QueueError::NotReady));

        // Every countdown is over once the longest one has passed
        tokio::time::advance(Duration::from_secs(5) - Duration::from_millis(999)).await;
        let (ready, expired) = queue.pop_many(10).await;
        assert_eq!(ready.len(), 3);
        assert_eq!(expired, 0);

        // A revival target left alone for a whole revival interval is dropped
        assert_eq!(finder.revive().await.unwrap(), 3);
        tokio::time::advance(mins(10) + Duration::from_millis(1)).await;
        assert_eq!(queue.pop().await, Err(QueueError::Empty));
        assert_eq!(metrics.snapshot().expired, 3);
    }

    #[tokio::test]
    async fn test_enqueue_failures_are_skipped() {
        let repo = Arc::new(InMemoryServerRepository::new());
        let queue = ProbeQueue::new(Some(2), Arc::new(NoopMetrics));
        for i in 1..=4 {
            store(&repo, &format!("10.0.0.{}:10480", i), DiscoveryStatus::PORT, Duration::ZERO).await;
        }

        let added = finder(repo, queue.clone()).refresh().await.unwrap();

        assert_eq!(added, 2);
        assert_eq!(queue.count().await, 2);
    }

    #[test]
    fn test_countdown_bounds() {
        let repo = Arc::new(InMemoryServerRepository::new());
        let queue = ProbeQueue::new(None, Arc::new(NoopMetrics));
        let mut finder = finder(repo, queue);

        for _ in 0..100 {
            let countdown = finder.countdown();
            assert!(countdown >= Duration::from_secs(1));
            assert!(countdown <= Duration::from_secs(5));
        }

        finder.revival_countdown = Duration::ZERO;
        assert_eq!(finder.countdown(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_run_refreshes_on_timer() {
        let repo = Arc::new(InMemoryServerRepository::new());
        let queue = ProbeQueue::new(None, Arc::new(NoopMetrics));
        store(&repo, "10.0.0.1:10480", DiscoveryStatus::PORT, Duration::ZERO).await;
        let config = DiscoveryConfig {
            refresh_interval: Duration::from_millis(100),
            ..Default::default()
        };
        let finder = Arc::new(Finder::new(repo, queue.clone(), &config));
        let cancel = CancellationToken::new();

        let handle = {
            let finder = Arc::clone(&finder);
            let cancel = cancel.clone();
            tokio::spawn(async move { finder.run(cancel).await })
        };

        // Nothing happens on the immediate first tick
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(queue.count().await, 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(queue.count().await >= 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
