//! Simulated game servers answering status queries on loopback sockets

use crate::gs1::QUERY_PAYLOAD;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Builds a `\key\value` payload.
pub fn encode_fields(fields: &[(&str, &str)]) -> Vec<u8> {
    let mut payload = Vec::new();
    for (key, value) in fields {
        payload.push(b'\\');
        payload.extend_from_slice(key.as_bytes());
        payload.push(b'\\');
        payload.extend_from_slice(value.as_bytes());
    }
    payload
}

/// A single datagram response as sent by the stock game.
pub fn vanilla_response(fields: &[(&str, &str)]) -> Vec<Vec<u8>> {
    let mut datagram = encode_fields(fields);
    datagram.extend_from_slice(b"\\queryid\\1\\final\\\\eof\\");
    vec![datagram]
}

/// Splits `fields` into `count` AdminMod fragments.
pub fn adminmod_response(fields: &[(&str, &str)], count: usize) -> Vec<Vec<u8>> {
    split(fields, count)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let mut datagram = format!("\\statusresponse\\{}", index).into_bytes();
            datagram.extend_from_slice(&encode_fields(chunk));
            if index + 1 == count {
                datagram.extend_from_slice(b"\\queryid\\AMv1\\final\\");
            }
            datagram.extend_from_slice(b"\\eof\\");
            datagram
        })
        .collect()
}

/// Splits `fields` into `count` GS1 fragments.
pub fn gs1_response(fields: &[(&str, &str)], count: usize) -> Vec<Vec<u8>> {
    split(fields, count)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let mut datagram = encode_fields(chunk);
            datagram.extend_from_slice(format!("\\queryid\\{}", index + 1).as_bytes());
            if index + 1 == count {
                datagram.extend_from_slice(b"\\final\\");
            }
            datagram
        })
        .collect()
}

fn split<'a, 'b>(fields: &'a [(&'b str, &'b str)], count: usize) -> Vec<&'a [(&'b str, &'b str)]> {
    let count = count.max(1);
    let size = fields.len().div_ceil(count).max(1);
    let mut chunks: Vec<_> = fields.chunks(size).collect();
    while chunks.len() < count {
        chunks.push(&[]);
    }
    chunks
}

/// Answers every status query on `socket` with `datagrams`, in the given order.
pub fn serve(socket: UdpSocket, datagrams: Vec<Vec<u8>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = [0u8; 64];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buffer).await else {
                break;
            };
            if &buffer[..len] != QUERY_PAYLOAD {
                continue;
            }
            for datagram in &datagrams {
                if socket.send_to(datagram, from).await.is_err() {
                    break;
                }
            }
        }
    })
}

/// Starts a peer on an ephemeral loopback port.
pub async fn spawn_peer(datagrams: Vec<Vec<u8>>) -> io::Result<SocketAddr> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let addr = socket.local_addr()?;
    serve(socket, datagrams);
    Ok(addr)
}

/// Binds `count` sockets on consecutive loopback ports.
pub async fn bind_consecutive(count: usize) -> io::Result<Vec<UdpSocket>> {
    'attempt: for _ in 0..100 {
        let first = UdpSocket::bind("127.0.0.1:0").await?;
        let base = first.local_addr()?.port();
        let mut sockets = vec![first];
        for offset in 1..count {
            let Some(port) = base.checked_add(offset as u16) else {
                continue 'attempt;
            };
            match UdpSocket::bind(("127.0.0.1", port)).await {
                Ok(socket) => sockets.push(socket),
                Err(_) => continue 'attempt,
            }
        }
        return Ok(sockets);
    }
    Err(io::Error::new(
        io::ErrorKind::AddrInUse,
        "no consecutive ports available",
    ))
}
