//! GameSpy v1 style status query over UDP
//!
//! A query is a single `\status\` datagram. The server answers with one or
//! more datagrams which may arrive in any order; the response is complete once
//! the final fragment has been seen and every fragment up to its order has
//! arrived. Lost datagrams are not re-requested, the caller retries instead.

mod fragment;
mod response;

pub use response::{Dialect, QueryResponse, Record};

use fragment::{parse_fragment, Fragment};
use log::debug;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// The status request datagram
pub const QUERY_PAYLOAD: &[u8] = b"\\status\\";

const RECV_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no complete response within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("query cancelled")]
    Cancelled,
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

/// Collects fragments until a full response can be put together
#[derive(Debug, Default)]
struct Reassembly {
    parts: HashMap<usize, Vec<u8>>,
    expected: Option<usize>,
    dialect: Option<Dialect>,
}

impl Reassembly {
    fn add(&mut self, fragment: Fragment) {
        if fragment.is_final {
            self.expected = Some(fragment.order);
            self.dialect = Some(fragment.dialect);
        } else if self.dialect.is_none() {
            self.dialect = Some(fragment.dialect);
        }
        self.parts.insert(fragment.order, fragment.payload);
    }

    fn is_complete(&self) -> bool {
        match self.expected {
            Some(count) => {
                self.parts.len() == count && (1..=count).all(|order| self.parts.contains_key(&order))
            }
            None => false,
        }
    }

    /// Concatenates the fragments in order once the response is complete.
    fn assemble(&self) -> Option<(Vec<u8>, Dialect)> {
        if !self.is_complete() {
            return None;
        }
        let count = self.expected?;
        let mut payload = Vec::new();
        for order in 1..=count {
            payload.extend_from_slice(self.parts.get(&order)?);
        }
        Some((payload, self.dialect.unwrap_or(Dialect::Vanilla)))
    }
}

/// Queries `addr` and waits at most `timeout` for the complete response.
pub async fn query(
    addr: SocketAddr,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<QueryResponse, QueryError> {
    let deadline = Instant::now() + timeout;

    let bind_addr: SocketAddr = if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(addr).await?;
    socket.send(QUERY_PAYLOAD).await?;

    let mut reassembly = Reassembly::default();
    let mut buffer = [0u8; RECV_BUFFER_SIZE];

    loop {
        let len = tokio::select! {
            _ = cancel.cancelled() => return Err(QueryError::Cancelled),
            received = timeout_at(deadline, socket.recv(&mut buffer)) => match received {
                Ok(result) => result?,
                Err(_) => return Err(QueryError::Timeout(timeout)),
            },
        };

        let fragment = parse_fragment(&buffer[..len])?;
        debug!(
            "Fragment {} from {} ({}, final: {})",
            fragment.order, addr, fragment.dialect, fragment.is_final
        );
        reassembly.add(fragment);

        if let Some((payload, dialect)) = reassembly.assemble() {
            return QueryResponse::parse(&payload, dialect);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use tokio_test::{assert_err, assert_ok};

    fn fragment(order: usize, is_final: bool, payload: &[u8]) -> Fragment {
        Fragment {
            is_final,
            order,
            dialect: Dialect::Gs1,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_reassembly_in_order() {
        let mut reassembly = Reassembly::default();
        reassembly.add(fragment(1, false, b"\\a\\1"));
        assert!(reassembly.assemble().is_none());
        reassembly.add(fragment(2, true, b"\\b\\2"));

        let (payload, dialect) = reassembly.assemble().unwrap();
        assert_eq!(payload, b"\\a\\1\\b\\2".to_vec());
        assert_eq!(dialect, Dialect::Gs1);
    }

    #[test]
    fn test_reassembly_final_first() {
        let mut reassembly = Reassembly::default();
        reassembly.add(fragment(3, true, b"\\c\\3"));
        assert!(!reassembly.is_complete());
        reassembly.add(fragment(1, false, b"\\a\\1"));
        assert!(!reassembly.is_complete());
        reassembly.add(fragment(2, false, b"\\b\\2"));

        let (payload, _) = reassembly.assemble().unwrap();
        assert_eq!(payload, b"\\a\\1\\b\\2\\c\\3".to_vec());
    }

    #[test]
    fn test_reassembly_duplicate_fragment() {
        let mut reassembly = Reassembly::default();
        reassembly.add(fragment(1, false, b"\\a\\1"));
        reassembly.add(fragment(1, false, b"\\a\\1"));
        assert!(!reassembly.is_complete());
        reassembly.add(fragment(2, true, b"\\b\\2"));
        assert!(reassembly.is_complete());
    }

    const FIELDS: &[(&str, &str)] = &[
        ("hostname", "Swat4 Server"),
        ("hostport", "10480"),
        ("gametype", "VIP Escort"),
        ("numplayers", "2"),
        ("maxplayers", "16"),
        ("player_0", "Alpha"),
        ("score_0", "5"),
        ("player_1", "Bravo"),
        ("score_1", "-1"),
        ("obj_Rescue_All_Hostages", "0"),
    ];

    async fn query_peer(datagrams: Vec<Vec<u8>>) -> QueryResponse {
        let addr = testing::spawn_peer(datagrams).await.unwrap();
        assert_ok!(query(addr, Duration::from_secs(1), &CancellationToken::new()).await)
    }

    #[tokio::test]
    async fn test_query_dialects_decode_to_same_fields() {
        let vanilla = query_peer(testing::vanilla_response(FIELDS)).await;
        let adminmod = query_peer(testing::adminmod_response(FIELDS, 2)).await;

        let mut gs1_datagrams = testing::gs1_response(FIELDS, 3);
        gs1_datagrams.swap(0, 2);
        let gs1 = query_peer(gs1_datagrams).await;

        assert_eq!(vanilla.dialect, Dialect::Vanilla);
        assert_eq!(adminmod.dialect, Dialect::AdminMod);
        assert_eq!(gs1.dialect, Dialect::Gs1);

        for response in [&adminmod, &gs1] {
            assert_eq!(response.fields, vanilla.fields);
            assert_eq!(response.players, vanilla.players);
            assert_eq!(response.objectives, vanilla.objectives);
        }
        assert_eq!(vanilla.field("hostname"), Some("Swat4 Server"));
        assert_eq!(vanilla.players.len(), 2);
        assert_eq!(vanilla.objectives.len(), 1);
    }

    #[tokio::test]
    async fn test_query_incomplete_response_times_out() {
        let mut datagrams = testing::gs1_response(FIELDS, 3);
        datagrams.remove(1);
        let addr = testing::spawn_peer(datagrams).await.unwrap();

        let result = query(addr, Duration::from_millis(100), &CancellationToken::new()).await;
        assert_err!(&result);
        assert!(matches!(result, Err(QueryError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_query_malformed_response() {
        let addr = testing::spawn_peer(vec![b"\\hostname\\Swat\\queryid\\0\\final\\".to_vec()])
            .await
            .unwrap();

        let result = query(addr, Duration::from_secs(1), &CancellationToken::new()).await;
        assert!(matches!(result, Err(QueryError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_query_times_out_without_answer() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let result = query(addr, Duration::from_millis(50), &CancellationToken::new()).await;
        assert!(matches!(result, Err(QueryError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_query_cancelled() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = query(addr, Duration::from_secs(5), &cancel).await;
        assert!(matches!(result, Err(QueryError::Cancelled)));
    }
}
