//! Types and protocol code shared by the master server and the query client.
//!
//! - `target`: discovery work items and their goals
//! - `status`: discovery status flags stored on each server
//! - `server`: the server record owned by the repository
//! - `details`: structured details projected from a query response
//! - `gs1`: the UDP status query protocol and its response decoder

pub mod details;
pub mod gs1;
pub mod server;
pub mod status;
pub mod target;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use details::{DetailsError, ServerDetails};
pub use gs1::{Dialect, QueryError, QueryResponse};
pub use server::Server;
pub use status::DiscoveryStatus;
pub use target::{Goal, ProbeTarget};
