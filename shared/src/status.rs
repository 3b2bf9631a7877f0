//! Discovery status flags tracked on every known game server

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// What is currently known, being retried or has failed for a server.
    ///
    /// The details family is `Details | DetailsRetry | NoDetails` and the port
    /// family is `Port | PortRetry | NoPort`. At most one of the live or terminal
    /// bits of a family is set at a time; the retry bit only while a retry is pending.
    #[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DiscoveryStatus: u32 {
        /// Reported by a heartbeat but never probed
        const NEW           = 1 << 0;
        /// Listed by the master server
        const MASTER        = 1 << 1;
        /// Basic info is available
        const INFO          = 1 << 2;
        /// Extended details were queried successfully
        const DETAILS       = 1 << 3;
        const DETAILS_RETRY = 1 << 4;
        const NO_DETAILS    = 1 << 5;
        /// The query port is known to answer
        const PORT          = 1 << 6;
        const PORT_RETRY    = 1 << 7;
        const NO_PORT       = 1 << 8;
    }
}

impl DiscoveryStatus {
    const NAMES: [(DiscoveryStatus, &'static str); 9] = [
        (Self::NEW, "new"),
        (Self::MASTER, "master"),
        (Self::INFO, "info"),
        (Self::DETAILS, "details"),
        (Self::DETAILS_RETRY, "details_retry"),
        (Self::NO_DETAILS, "no_details"),
        (Self::PORT, "port"),
        (Self::PORT_RETRY, "port_retry"),
        (Self::NO_PORT, "no_port"),
    ];

    /// Sets `add` and clears `remove` in one step.
    pub fn apply(self, add: DiscoveryStatus, remove: DiscoveryStatus) -> DiscoveryStatus {
        self.difference(remove).union(add)
    }
}

impl fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

impl fmt::Debug for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiscoveryStatus({})", self)
    }
}
