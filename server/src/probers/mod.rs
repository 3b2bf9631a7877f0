//! Goal specific probing of a single server
//!
//! A prober performs the network part of a probe and owns the discovery status
//! transitions of its goal: what a success sets, what a pending retry sets and
//! what a final failure sets. Attempt counting and backoff belong to the
//! probing service.

mod details;
mod port;

pub use details::DetailsProber;
pub use port::PortProber;

use shared::{DetailsError, Goal, QueryError, Server};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum GoalProbeError {
    #[error("query failed: {0}")]
    Query(#[from] QueryError),
    #[error("invalid server details: {0}")]
    InvalidDetails(#[from] DetailsError),
    #[error("none of the candidate ports answered")]
    NoResponse,
}

/// The prober registered for one goal
#[derive(Debug, Clone)]
pub enum GoalProber {
    Details(DetailsProber),
    Port(PortProber),
}

impl GoalProber {
    pub fn goal(&self) -> Goal {
        match self {
            GoalProber::Details(_) => Goal::Details,
            GoalProber::Port(_) => Goal::Port,
        }
    }

    /// Probes `server` and returns the updated record on success.
    ///
    /// `query_addr` is where the details prober asks; the port prober derives
    /// its own candidates from the game port.
    pub async fn probe(
        &self,
        server: Server,
        query_addr: SocketAddr,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Server, GoalProbeError> {
        match self {
            GoalProber::Details(prober) => prober.probe(server, query_addr, timeout, cancel).await,
            GoalProber::Port(prober) => prober.probe(server, timeout, cancel).await,
        }
    }

    /// Copies the outcome of a successful probe onto a newer copy of the record.
    pub fn merge_success(&self, current: &mut Server, probed: &Server) {
        current.details = probed.details.clone();
        current.query_port = probed.query_port;
        current.refreshed_at = probed.refreshed_at;
        match self {
            GoalProber::Details(_) => DetailsProber::mark_success(current),
            GoalProber::Port(_) => PortProber::mark_success(current),
        }
    }

    pub fn handle_retry(&self, mut server: Server) -> Server {
        match self {
            GoalProber::Details(_) => DetailsProber::mark_retry(&mut server),
            GoalProber::Port(_) => PortProber::mark_retry(&mut server),
        }
        server
    }

    pub fn handle_failure(&self, mut server: Server) -> Server {
        match self {
            GoalProber::Details(_) => DetailsProber::mark_failure(&mut server),
            GoalProber::Port(_) => PortProber::mark_failure(&mut server),
        }
        server
    }
}
