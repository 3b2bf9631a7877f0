//! # GS1 Query Client
//!
//! Command line companion of the discovery engine. It sends one status query
//! to a game server's query port, waits for the complete (possibly
//! fragmented) response and prints what the master server would learn from
//! it: the raw fields, players and objectives, and whether the response
//! passes details validation.
//!
//! The same decoder is used by the engine's probers, so this tool answers the
//! question "why is my server not listed?" without running the engine.

use log::debug;
use serde::Serialize;
use shared::{gs1, QueryError, QueryResponse, ServerDetails};
use std::fmt::Write;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Outcome of one query, as printed by the client
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub address: SocketAddr,
    pub elapsed_ms: u64,
    pub response: QueryResponse,
    /// Validated details, absent when validation failed
    pub details: Option<ServerDetails>,
    pub details_error: Option<String>,
}

impl QueryReport {
    pub fn new(address: SocketAddr, elapsed: Duration, response: QueryResponse) -> Self {
        let (details, details_error) = match ServerDetails::from_valid_response(&response) {
            Ok(details) => (Some(details), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            address,
            elapsed_ms: elapsed.as_millis() as u64,
            response,
            details,
            details_error,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Queries `addr` once and wraps the answer in a report.
pub async fn run_query(
    addr: SocketAddr,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<QueryReport, QueryError> {
    let started = Instant::now();
    let response = gs1::query(addr, timeout, cancel).await?;
    debug!("Received {} response from {}", response.dialect, addr);
    Ok(QueryReport::new(addr, started.elapsed(), response))
}

/// Formats a report for the terminal.
pub fn render(report: &QueryReport) -> String {
    let mut out = String::new();
    let response = &report.response;

    let _ = writeln!(
        out,
        "{} answered in {}ms ({})",
        report.address, report.elapsed_ms, response.dialect
    );

    match (&report.details, &report.details_error) {
        (Some(details), _) => {
            let _ = writeln!(
                out,
                "valid: {} | {} | {} | {}/{} players",
                details.hostname,
                details.gametype,
                details.mapname,
                details.numplayers,
                details.maxplayers
            );
        }
        (None, Some(error)) => {
            let _ = writeln!(out, "invalid: {}", error);
        }
        (None, None) => {}
    }

    let _ = writeln!(out, "\nfields:");
    for (key, value) in &response.fields {
        let _ = writeln!(out, "  {:<16} {}", key, value);
    }

    if !response.players.is_empty() {
        let _ = writeln!(out, "\nplayers:");
        for (id, player) in response.players.iter().enumerate() {
            let attributes: Vec<String> = player
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            let _ = writeln!(out, "  {:>2}  {}", id, attributes.join(" "));
        }
    }

    if !response.objectives.is_empty() {
        let _ = writeln!(out, "\nobjectives:");
        for objective in &response.objectives {
            let name = objective.get("name").map(String::as_str).unwrap_or("?");
            let status = objective.get("status").map(String::as_str).unwrap_or("?");
            let _ = writeln!(out, "  {:<24} {}", name, status);
        }
    }

    out
}
