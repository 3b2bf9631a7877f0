//! Classification of a single response datagram
//!
//! Three response dialects are in the wild and none of them carries a version
//! field, so a datagram is classified by its structural markers:
//!
//! - AdminMod: starts with `\statusresponse\N` where `N + 1` is the 1-based
//!   fragment order. Every fragment ends with `\eof\`, the last one also has
//!   `\final\` right before it.
//! - Vanilla: ends with `\eof\` and is always a single, complete datagram.
//! - GS1: ends with `\queryid\N` (order `N`), optionally followed by `\final\`
//!   on the last fragment. A point-notation query id such as `1.1` is what the
//!   stock game sends and is treated as a single vanilla datagram.

use super::{Dialect, QueryError};

pub(crate) const EOF_MARKER: &[u8] = b"\\eof\\";
pub(crate) const FINAL_MARKER: &[u8] = b"\\final\\";
pub(crate) const STATUS_RESPONSE_KEY: &[u8] = b"\\statusresponse\\";
pub(crate) const QUERY_ID_KEY: &[u8] = b"\\queryid\\";

/// One decoded datagram of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fragment {
    pub is_final: bool,
    /// 1-based position of the fragment in the full response
    pub order: usize,
    pub dialect: Dialect,
    /// Key/value body with all framing markers removed
    pub payload: Vec<u8>,
}

pub(crate) fn parse_fragment(data: &[u8]) -> Result<Fragment, QueryError> {
    if data.starts_with(STATUS_RESPONSE_KEY) {
        return parse_adminmod(&data[STATUS_RESPONSE_KEY.len()..]);
    }

    if let Some(body) = data.strip_suffix(EOF_MARKER) {
        let body = body.strip_suffix(FINAL_MARKER).unwrap_or(body);
        let (body, _) = split_query_id(body);
        return Ok(Fragment {
            is_final: true,
            order: 1,
            dialect: Dialect::Vanilla,
            payload: body.to_vec(),
        });
    }

    parse_gs1(data)
}

fn parse_adminmod(data: &[u8]) -> Result<Fragment, QueryError> {
    let value_end = data.iter().position(|b| *b == b'\\').unwrap_or(data.len());
    let (value, body) = data.split_at(value_end);

    let order = std::str::from_utf8(value)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .and_then(|value| value.checked_add(1))
        .ok_or_else(|| {
            QueryError::Malformed(format!(
                "invalid statusresponse value '{}'",
                String::from_utf8_lossy(value)
            ))
        })?;

    let body = body.strip_suffix(EOF_MARKER).unwrap_or(body);
    let (body, is_final) = match body.strip_suffix(FINAL_MARKER) {
        Some(body) => (body, true),
        None => (body, false),
    };
    let (body, _) = split_query_id(body);

    Ok(Fragment {
        is_final,
        order,
        dialect: Dialect::AdminMod,
        payload: body.to_vec(),
    })
}

fn parse_gs1(data: &[u8]) -> Result<Fragment, QueryError> {
    let (body, is_final) = match data.strip_suffix(FINAL_MARKER) {
        Some(body) => (body, true),
        None => (data, false),
    };

    let (body, query_id) = split_query_id(body);
    let query_id = query_id
        .ok_or_else(|| QueryError::Malformed("response carries no queryid".to_string()))?;
    let query_id = String::from_utf8_lossy(query_id);

    match query_id.parse::<i64>() {
        Ok(order) if order > 0 => Ok(Fragment {
            is_final,
            order: order as usize,
            dialect: Dialect::Gs1,
            payload: body.to_vec(),
        }),
        Ok(order) => Err(QueryError::Malformed(format!(
            "non-positive queryid {}",
            order
        ))),
        // Point notation (1.1) comes from the stock game server in one piece
        Err(_) => Ok(Fragment {
            is_final: true,
            order: 1,
            dialect: Dialect::Vanilla,
            payload: body.to_vec(),
        }),
    }
}

/// Splits off a trailing `\queryid\VALUE` parameter.
///
/// Only a parameter that is the last one in `body` counts.
fn split_query_id(body: &[u8]) -> (&[u8], Option<&[u8]>) {
    let Some(start) = rfind(body, QUERY_ID_KEY) else {
        return (body, None);
    };
    let value = &body[start + QUERY_ID_KEY.len()..];
    if value.contains(&b'\\') {
        return (body, None);
    }
    (&body[..start], Some(value))
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|window| window == needle)
}
