//! Server storage as seen by the discovery engine
//!
//! The engine reads a server once, computes the new state and writes it back.
//! Writers are serialized through the record `version`: a write carrying a
//! stale version is handed to the caller's resolver together with the current
//! record, which may re-apply its change or give up.

use async_trait::async_trait;
use shared::{DiscoveryStatus, Server};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("server {0} not found")]
    NotFound(SocketAddr),
    #[error("server {addr} was modified concurrently (version {expected}, found {found})")]
    VersionConflict {
        addr: SocketAddr,
        expected: u64,
        found: u64,
    },
}

/// Re-applies a change onto the current record; `false` abandons the write.
pub type ConflictResolver<'a> = &'a (dyn Fn(&mut Server) -> bool + Send + Sync);

/// Selects servers by status flags and last refresh time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerFilter {
    /// Flags that must all be present
    pub with_status: DiscoveryStatus,
    /// Flags that must all be absent
    pub no_status: DiscoveryStatus,
    pub updated_after: Option<SystemTime>,
    pub updated_before: Option<SystemTime>,
}

impl ServerFilter {
    pub fn with_status(mut self, status: DiscoveryStatus) -> Self {
        self.with_status = status;
        self
    }

    pub fn no_status(mut self, status: DiscoveryStatus) -> Self {
        self.no_status = status;
        self
    }

    pub fn updated_between(mut self, after: Option<SystemTime>, before: Option<SystemTime>) -> Self {
        self.updated_after = after;
        self.updated_before = before;
        self
    }

    pub fn matches(&self, server: &Server) -> bool {
        if !server.status.contains(self.with_status) || server.status.intersects(self.no_status) {
            return false;
        }
        if let Some(after) = self.updated_after {
            if server.refreshed_at < after {
                return false;
            }
        }
        if let Some(before) = self.updated_before {
            if server.refreshed_at > before {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait ServerRepository: Send + Sync {
    async fn get(&self, addr: SocketAddr) -> Result<Server, RepositoryError>;

    /// Stores `server`, bumping its version.
    ///
    /// If the stored record has moved on since `server` was read, `resolve` is
    /// called with a copy of the stored record and decides what gets written.
    async fn add_or_update(
        &self,
        server: Server,
        resolve: ConflictResolver<'_>,
    ) -> Result<Server, RepositoryError>;

    async fn filter(&self, filter: &ServerFilter) -> Result<Vec<Server>, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;
}

/// Process local repository
#[derive(Debug, Default)]
pub struct InMemoryServerRepository {
    servers: RwLock<HashMap<SocketAddr, Server>>,
}

impl InMemoryServerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServerRepository for InMemoryServerRepository {
    async fn get(&self, addr: SocketAddr) -> Result<Server, RepositoryError> {
        self.servers
            .read()
            .await
            .get(&addr)
            .cloned()
            .ok_or(RepositoryError::NotFound(addr))
    }

    async fn add_or_update(
        &self,
        server: Server,
        resolve: ConflictResolver<'_>,
    ) -> Result<Server, RepositoryError> {
        let mut servers = self.servers.write().await;

        let mut server = match servers.get(&server.addr) {
            Some(current) if current.version != server.version => {
                let mut resolved = current.clone();
                if !resolve(&mut resolved) {
                    return Err(RepositoryError::VersionConflict {
                        addr: server.addr,
                        expected: server.version,
                        found: current.version,
                    });
                }
                resolved
            }
            _ => server,
        };

        server.version += 1;
        servers.insert(server.addr, server.clone());
        Ok(server)
    }

    async fn filter(&self, filter: &ServerFilter) -> Result<Vec<Server>, RepositoryError> {
        let servers = self.servers.read().await;
        Ok(servers
            .values()
            .filter(|server| filter.matches(server))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.servers.read().await.len())
    }
}
