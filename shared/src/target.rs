//! Probe targets: one unit of discovery work

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// The kind of discovery a target performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Goal {
    /// Query extended server details on the known query port
    Details,
    /// Find the port the server answers queries on
    Port,
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Details => write!(f, "details"),
            Goal::Port => write!(f, "port"),
        }
    }
}

/// A single discovery attempt against one game server
///
/// `addr` is the server's public game address, `query_port` the port the
/// attempt should query (the port prober ignores it and derives candidates
/// from the game port instead).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub addr: SocketAddr,
    pub query_port: u16,
    pub goal: Goal,
    pub retries: u32,
}

impl ProbeTarget {
    pub fn new(addr: SocketAddr, query_port: u16, goal: Goal) -> Self {
        Self {
            addr,
            query_port,
            goal,
            retries: 0,
        }
    }

    /// Address the query datagrams are sent to
    pub fn query_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr.ip(), self.query_port)
    }

    /// Counts one more failed attempt, never going past `max_retries`.
    ///
    /// Returns the new retry count and whether another attempt is allowed.
    pub fn inc_retries(&mut self, max_retries: u32) -> (u32, bool) {
        if self.retries < max_retries {
            self.retries += 1;
        }
        (self.retries, self.retries < max_retries)
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} target {} (query port {}, retries {})",
            self.goal, self.addr, self.query_port, self.retries
        )
    }
}
