//! The game server record kept by the master server

use crate::details::ServerDetails;
use crate::status::DiscoveryStatus;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::SystemTime;

/// Default distance between the game port and the query port
pub const DEFAULT_QUERY_PORT_OFFSET: u16 = 1;

/// A game server as known to the master server
///
/// Records are snapshots: readers get a copy, change it and hand it back to
/// the repository, which uses `version` to detect concurrent writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    /// Public game address
    pub addr: SocketAddr,
    pub query_port: u16,
    pub status: DiscoveryStatus,
    pub details: Option<ServerDetails>,
    pub version: u64,
    pub refreshed_at: SystemTime,
}

impl Server {
    pub fn new(addr: SocketAddr, query_port: u16) -> Self {
        Self {
            addr,
            query_port,
            status: DiscoveryStatus::NEW,
            details: None,
            version: 0,
            refreshed_at: SystemTime::now(),
        }
    }

    /// Creates a record assuming the conventional query port right above the game port.
    pub fn with_default_query_port(addr: SocketAddr) -> Self {
        let query_port = addr.port().saturating_add(DEFAULT_QUERY_PORT_OFFSET);
        Self::new(addr, query_port)
    }

    pub fn has_status(&self, status: DiscoveryStatus) -> bool {
        self.status.contains(status)
    }

    pub fn update_status(&mut self, add: DiscoveryStatus, remove: DiscoveryStatus) {
        self.status = self.status.apply(add, remove);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_server() {
        let server = Server::with_default_query_port("10.0.0.1:10480".parse().unwrap());

        assert_eq!(server.query_port, 10481);
        assert!(server.has_status(DiscoveryStatus::NEW));
        assert_eq!(server.version, 0);
        assert!(server.details.is_none());
    }

    #[test]
    fn test_update_status() {
        let mut server = Server::new("10.0.0.1:10480".parse().unwrap(), 10481);
        server.update_status(
            DiscoveryStatus::PORT | DiscoveryStatus::INFO,
            DiscoveryStatus::NEW,
        );

        assert_eq!(server.status, DiscoveryStatus::PORT | DiscoveryStatus::INFO);
    }
}
