use super::GoalProbeError;
use log::{debug, warn};
use shared::{gs1, Dialect, DiscoveryStatus, QueryError, Server, ServerDetails};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, SystemTime};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Finds the query port by racing queries against several candidate ports
///
/// Candidates are the game port plus each configured offset. All candidates
/// share one timeout; among the answers the richest dialect wins.
#[derive(Debug, Clone)]
pub struct PortProber {
    offsets: Vec<u16>,
}

/// A candidate port that answered with valid details
#[derive(Debug)]
struct Candidate {
    port: u16,
    dialect: Dialect,
    details: ServerDetails,
}

impl PortProber {
    pub fn new(offsets: Vec<u16>) -> Self {
        Self { offsets }
    }

    pub async fn probe(
        &self,
        mut server: Server,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Server, GoalProbeError> {
        let ip = server.addr.ip();
        let mut racers = JoinSet::new();

        for offset in &self.offsets {
            let Some(port) = server.addr.port().checked_add(*offset) else {
                continue;
            };
            let cancel = cancel.clone();
            racers.spawn(async move { race(ip, port, timeout, cancel).await });
        }

        // Safety net in case a racer hangs past its own timeout
        let emergency_deadline = Instant::now() + timeout * 2;
        let best = collect(server.addr, &mut racers, emergency_deadline).await;
        racers.abort_all();

        let Some(winner) = best else {
            if cancel.is_cancelled() {
                return Err(GoalProbeError::Query(QueryError::Cancelled));
            }
            return Err(GoalProbeError::NoResponse);
        };

        debug!(
            "Query port of {} is {} ({})",
            server.addr, winner.port, winner.dialect
        );

        server.query_port = winner.port;
        server.details = Some(winner.details);
        server.refreshed_at = SystemTime::now();
        Self::mark_success(&mut server);
        Ok(server)
    }

    pub(super) fn mark_success(server: &mut Server) {
        server.update_status(
            DiscoveryStatus::INFO | DiscoveryStatus::DETAILS | DiscoveryStatus::PORT,
            DiscoveryStatus::NEW
                | DiscoveryStatus::NO_DETAILS
                | DiscoveryStatus::DETAILS_RETRY
                | DiscoveryStatus::PORT_RETRY
                | DiscoveryStatus::NO_PORT,
        );
    }

    pub(super) fn mark_retry(server: &mut Server) {
        server.update_status(DiscoveryStatus::PORT_RETRY, DiscoveryStatus::empty());
    }

    pub(super) fn mark_failure(server: &mut Server) {
        server.update_status(
            DiscoveryStatus::NO_PORT,
            DiscoveryStatus::PORT | DiscoveryStatus::PORT_RETRY,
        );
    }
}

/// Joins racers until all have finished or `deadline` passes.
///
/// A later answer replaces the current best unless its dialect ranks lower.
async fn collect(
    addr: SocketAddr,
    racers: &mut JoinSet<Option<Candidate>>,
    deadline: Instant,
) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;

    loop {
        let joined = match timeout_at(deadline, racers.join_next()).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    "Port probe of {} hit the emergency timeout with {} racers left",
                    addr,
                    racers.len()
                );
                break;
            }
        };
        match joined {
            None => break,
            Some(Ok(Some(candidate))) => {
                let better = best
                    .as_ref()
                    .map_or(true, |best| candidate.dialect >= best.dialect);
                if better {
                    best = Some(candidate);
                }
            }
            Some(Ok(None)) => {}
            Some(Err(e)) => warn!("Port racer for {} failed: {}", addr, e),
        }
    }

    best
}

async fn race(ip: IpAddr, port: u16, timeout: Duration, cancel: CancellationToken) -> Option<Candidate> {
    let addr = SocketAddr::new(ip, port);
    let response = match gs1::query(addr, timeout, &cancel).await {
        Ok(response) => response,
        Err(e) => {
            debug!("No answer on candidate {}: {}", addr, e);
            return None;
        }
    };
    match ServerDetails::from_valid_response(&response) {
        Ok(details) => Some(Candidate {
            port,
            dialect: response.dialect,
            details,
        }),
        Err(e) => {
            debug!("Discarding answer from candidate {}: {}", addr, e);
            None
        }
    }
}
