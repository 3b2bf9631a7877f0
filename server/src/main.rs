use clap::Parser;
use log::{error, info, warn};
use server::config::DiscoveryConfig;
use server::finder::Finder;
use server::metrics::MetricsRecorder;
use server::pool::ProberPool;
use server::queue::ProbeQueue;
use server::repository::{InMemoryServerRepository, ServerRepository};
use server::service::ProbingService;
use shared::{Goal, ProbeTarget, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "Game server discovery engine", long_about = None)]
struct Args {
    /// Game server to discover on startup (ip:gameport), repeatable
    #[arg(short = 's', long = "seed")]
    seeds: Vec<SocketAddr>,

    /// Seconds between details refreshes
    #[arg(long, default_value = "5")]
    refresh_secs: u64,

    /// Seconds between revival passes
    #[arg(long, default_value = "600")]
    revival_secs: u64,

    /// How far back in seconds a server must have been alive to be revived
    #[arg(long, default_value = "3600")]
    revival_scope_secs: u64,

    /// Upper bound of the revival countdown in seconds, half the revival interval by default
    #[arg(long)]
    revival_countdown_secs: Option<u64>,

    /// Candidate query port offsets from the game port
    #[arg(long, value_delimiter = ',', default_value = "1,2,3,4")]
    port_offsets: Vec<u16>,

    /// Query timeout in milliseconds
    #[arg(short = 't', long, default_value = "1000")]
    timeout_ms: u64,

    /// Attempts per target before giving up
    #[arg(short = 'r', long, default_value = "4")]
    max_retries: u32,

    /// Number of concurrent probe workers
    #[arg(short = 'c', long, default_value = "25")]
    concurrency: usize,

    /// Milliseconds between queue polls
    #[arg(long, default_value = "100")]
    poll_ms: u64,

    /// Maximum number of queued targets
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Seconds between stats log lines, 0 disables them
    #[arg(long, default_value = "30")]
    stats_secs: u64,
}

impl Args {
    fn config(&self) -> DiscoveryConfig {
        let revival_interval = Duration::from_secs(self.revival_secs);
        DiscoveryConfig {
            refresh_interval: Duration::from_secs(self.refresh_secs),
            revival_interval,
            revival_scope: Duration::from_secs(self.revival_scope_secs),
            revival_countdown: self
                .revival_countdown_secs
                .map(Duration::from_secs)
                .unwrap_or(revival_interval / 2),
            port_offsets: self.port_offsets.clone(),
            probe_timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            concurrency: self.concurrency,
            poll_interval: Duration::from_millis(self.poll_ms),
            queue_capacity: self.queue_capacity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.config();
    config.validate()?;

    let metrics = Arc::new(MetricsRecorder::new());
    let repo = Arc::new(InMemoryServerRepository::new());
    let queue = ProbeQueue::new(config.queue_capacity, metrics.clone());

    // Seeds start out with an unknown query port
    for seed in &args.seeds {
        let server = Server::with_default_query_port(*seed);
        let query_port = server.query_port;
        repo.add_or_update(server, &|_| true).await?;
        if let Err(e) = queue.add(ProbeTarget::new(*seed, query_port, Goal::Port)).await {
            warn!("Failed to enqueue seed {}: {}", seed, e);
        }
    }
    info!("Registered {} seed servers", args.seeds.len());

    let service = Arc::new(ProbingService::new(
        repo.clone(),
        queue.clone(),
        metrics.clone(),
        &config,
    ));
    let pool = Arc::new(ProberPool::new(
        service,
        queue.clone(),
        metrics.clone(),
        config.concurrency,
        config.poll_interval,
    ));
    let finder = Arc::new(Finder::new(repo.clone(), queue.clone(), &config));

    let cancel = CancellationToken::new();

    let pool_handle = tokio::spawn(Arc::clone(&pool).run(cancel.clone()));
    let finder_handle = {
        let finder = Arc::clone(&finder);
        let cancel = cancel.clone();
        tokio::spawn(async move { finder.run(cancel).await })
    };
    let stats_handle = (args.stats_secs > 0).then(|| {
        let period = Duration::from_secs(args.stats_secs);
        let repo = repo.clone();
        let queue = queue.clone();
        let metrics = metrics.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first tick since it fires immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let servers = repo.count().await.unwrap_or_default();
                info!(
                    "servers={} queued={} {}",
                    servers,
                    queue.count().await,
                    metrics.snapshot()
                );
            }
        })
    });

    info!("Discovery engine running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down gracefully...");
    cancel.cancel();

    if let Err(e) = pool_handle.await {
        error!("Worker pool task panicked: {}", e);
    }
    if let Err(e) = finder_handle.await {
        error!("Finder task panicked: {}", e);
    }
    if let Some(handle) = stats_handle {
        if let Err(e) = handle.await {
            error!("Stats task panicked: {}", e);
        }
    }

    info!("Final stats: {}", metrics.snapshot());
    Ok(())
}
