//! # Discovery Engine
//!
//! This library keeps the master server's view of game servers honest. Servers
//! announce themselves, but only a server that answers a GS1 status query on
//! its query port is listed with details. The engine decides which servers
//! need (re-)verification, throttles that work and records the outcome.
//!
//! ## Pipeline
//!
//! ```text
//! Finder -> ProbeQueue -> ProberPool -> ProbingService -> GoalProber -> gs1::query
//!              ^                              |
//!              +------ retry with backoff ----+
//! ```
//!
//! ### Finder (`finder`)
//! Two timers inspect the repository. The refresh timer schedules a details
//! probe for every server with a known query port, the revival timer schedules
//! a delayed port probe for servers that lost theirs.
//!
//! ### Queue (`queue`)
//! Time-windowed work queue. A target may carry a "not before" and a "not
//! after" bound; targets past their window are dropped on the next scan.
//!
//! ### Worker Pool (`pool`)
//! A fixed number of workers fed by a polling feeder. The feeder only pops as
//! many targets as there are idle workers, which keeps backpressure in the
//! queue rather than in an unbounded channel.
//!
//! ### Probing Service (`service`)
//! Runs one attempt: resolves the server, invokes the prober for the target's
//! goal and persists the result. Failures are re-queued with exponential
//! backoff until the retry budget is spent.
//!
//! ### Goal Probers (`probers`)
//! - **Details**: one query on the known query port
//! - **Port**: races every candidate port and keeps the richest answer
//!
//! ### Repository (`repository`)
//! Storage contract with optimistic versioning plus an in-memory
//! implementation used by the binary and the tests.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::DiscoveryConfig;
//! use server::finder::Finder;
//! use server::metrics::NoopMetrics;
//! use server::pool::ProberPool;
//! use server::queue::ProbeQueue;
//! use server::repository::InMemoryServerRepository;
//! use server::service::ProbingService;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DiscoveryConfig::default();
//!     let metrics = Arc::new(NoopMetrics);
//!     let repo = Arc::new(InMemoryServerRepository::new());
//!     let queue = ProbeQueue::new(config.queue_capacity, metrics.clone());
//!
//!     let service = Arc::new(ProbingService::new(repo.clone(), queue.clone(), metrics.clone(), &config));
//!     let pool = Arc::new(ProberPool::new(service, queue.clone(), metrics, config.concurrency, config.poll_interval));
//!     let finder = Finder::new(repo, queue, &config);
//!
//!     let cancel = CancellationToken::new();
//!     tokio::join!(pool.run(cancel.clone()), finder.run(cancel));
//! }
//! ```

pub mod config;
pub mod finder;
pub mod metrics;
pub mod pool;
pub mod probers;
pub mod queue;
pub mod repository;
pub mod service;
