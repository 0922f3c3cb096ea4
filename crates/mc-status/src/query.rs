//! GameSpy4-style Query protocol over UDP.
//!
//! A handshake yields a challenge token, which is then echoed in a full-stat
//! request. The full-stat response carries a key/value section and the complete
//! player list, unlike the status sample which is capped and often hidden.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{UdpSocket, lookup_host};
use tracing::trace;

use crate::codec::with_timeout;
use crate::error::{ProbeError, Result};

const MAGIC: [u8; 2] = [0xFE, 0xFD];
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;

/// Constant padding between the response header and the key/value section.
const KV_PADDING: &[u8] = b"splitnum\x00\x80\x00";
const PLAYER_MARKER: &[u8] = b"\x01player_\x00\x00";

const RECV_BUFFER: usize = 64 * 1024;

/// Result of a full-stat query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResponse {
    pub values: HashMap<String, String>,
    pub players: Vec<String>,
}

impl QueryResponse {
    pub fn num_players(&self) -> Option<u32> {
        self.values.get("numplayers")?.parse().ok()
    }

    pub fn max_players(&self) -> Option<u32> {
        self.values.get("maxplayers")?.parse().ok()
    }
}

/// Run a handshake and full-stat request against `host:port`.
pub async fn full_stat(host: &str, port: u16, timeout: Duration) -> Result<QueryResponse> {
    let addr = resolve(host, port).await?;
    let bind = if addr.is_ipv4() {
        SocketAddr::from(([0u8; 4], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(addr).await?;

    let session_id = rand::random::<u32>() & 0x0F0F_0F0F;
    let mut buf = vec![0u8; RECV_BUFFER];

    socket.send(&handshake_request(session_id)).await?;
    let len = with_timeout("query handshake", timeout, async {
        socket.recv(&mut buf).await.map_err(ProbeError::from)
    })
    .await?;
    let token = parse_challenge(&buf[..len], session_id)?;
    trace!(%addr, token, "Query challenge received");

    socket.send(&full_stat_request(session_id, token)).await?;
    let len = with_timeout("query stat", timeout, async {
        socket.recv(&mut buf).await.map_err(ProbeError::from)
    })
    .await?;

    parse_full_stat(&buf[..len], session_id)
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| ProbeError::Unresolved(format!("{host}:{port}")))
}

pub fn handshake_request(session_id: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(7);
    packet.extend_from_slice(&MAGIC);
    packet.push(TYPE_HANDSHAKE);
    packet.extend_from_slice(&session_id.to_be_bytes());
    packet
}

pub fn full_stat_request(session_id: u32, token: i32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(15);
    packet.extend_from_slice(&MAGIC);
    packet.push(TYPE_STAT);
    packet.extend_from_slice(&session_id.to_be_bytes());
    packet.extend_from_slice(&token.to_be_bytes());
    // Four padding bytes select the full stat instead of the basic one.
    packet.extend_from_slice(&[0, 0, 0, 0]);
    packet
}

fn check_header(data: &[u8], expected_type: u8, session_id: u32) -> Result<()> {
    if data.len() < 5 {
        return Err(ProbeError::malformed("query response shorter than header"));
    }
    if data[0] != expected_type {
        return Err(ProbeError::malformed(format!(
            "expected query type {expected_type:#04x}, got {:#04x}",
            data[0]
        )));
    }
    let echoed = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    if echoed != session_id {
        return Err(ProbeError::malformed("query session id mismatch"));
    }
    Ok(())
}

/// Extract the challenge token, sent as a NUL-terminated decimal string.
pub fn parse_challenge(data: &[u8], session_id: u32) -> Result<i32> {
    check_header(data, TYPE_HANDSHAKE, session_id)?;
    let text = null_terminated(&data[5..]);
    let text = std::str::from_utf8(text)
        .map_err(|_| ProbeError::malformed("challenge token is not ASCII"))?;
    // Tokens above i32::MAX are sent as their unsigned form.
    text.trim()
        .parse::<i64>()
        .map(|v| v as i32)
        .map_err(|_| ProbeError::malformed(format!("bad challenge token {text:?}")))
}

pub fn parse_full_stat(data: &[u8], session_id: u32) -> Result<QueryResponse> {
    check_header(data, TYPE_STAT, session_id)?;
    let body = data[5..]
        .strip_prefix(KV_PADDING)
        .ok_or_else(|| ProbeError::malformed("missing full-stat padding"))?;

    let marker = find(body, PLAYER_MARKER)
        .ok_or_else(|| ProbeError::malformed("missing player section"))?;
    let (kv_section, player_section) = (&body[..marker], &body[marker + PLAYER_MARKER.len()..]);

    let mut values = HashMap::new();
    let mut fields = kv_section.split(|b| *b == 0);
    while let Some(key) = fields.next() {
        if key.is_empty() {
            break;
        }
        let value = fields.next().unwrap_or_default();
        values.insert(
            String::from_utf8_lossy(key).into_owned(),
            String::from_utf8_lossy(value).into_owned(),
        );
    }

    let players = player_section
        .split(|b| *b == 0)
        .take_while(|name| !name.is_empty())
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect();

    Ok(QueryResponse { values, players })
}

fn null_terminated(data: &[u8]) -> &[u8] {
    match data.iter().position(|b| *b == 0) {
        Some(end) => &data[..end],
        None => data,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
