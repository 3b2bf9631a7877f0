use super::GoalProbeError;
use log::debug;
use shared::{gs1, DiscoveryStatus, Server, ServerDetails};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// Queries extended details on the server's known query port
#[derive(Debug, Clone, Default)]
pub struct DetailsProber;

impl DetailsProber {
    pub fn new() -> Self {
        Self
    }

    pub async fn probe(
        &self,
        mut server: Server,
        addr: SocketAddr,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Server, GoalProbeError> {
        let response = gs1::query(addr, timeout, cancel).await?;
        let details = ServerDetails::from_valid_response(&response)?;

        debug!(
            "Details of {} from {} ({}): '{}' {}/{} players",
            server.addr,
            addr,
            response.dialect,
            details.hostname,
            details.numplayers,
            details.maxplayers
        );

        server.details = Some(details);
        server.refreshed_at = SystemTime::now();
        Self::mark_success(&mut server);
        Ok(server)
    }

    pub(super) fn mark_success(server: &mut Server) {
        server.update_status(
            DiscoveryStatus::INFO | DiscoveryStatus::DETAILS,
            DiscoveryStatus::NEW | DiscoveryStatus::NO_DETAILS | DiscoveryStatus::DETAILS_RETRY,
        );
    }

    pub(super) fn mark_retry(server: &mut Server) {
        server.update_status(DiscoveryStatus::DETAILS_RETRY, DiscoveryStatus::empty());
    }

    pub(super) fn mark_failure(server: &mut Server) {
        server.update_status(
            DiscoveryStatus::NO_DETAILS,
            DiscoveryStatus::DETAILS | DiscoveryStatus::DETAILS_RETRY,
        );
    }
}
