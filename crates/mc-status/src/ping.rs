//! Server List Ping over TCP.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::codec::{frame_packet, read_packet, read_string_slice, with_timeout, write_string, write_varint};
use crate::error::{ProbeError, Result};
use crate::response::StatusResponse;

/// Protocol version sent in the handshake. Servers answer status requests for any value.
const HANDSHAKE_PROTOCOL_VERSION: i32 = 47;
const NEXT_STATE_STATUS: i32 = 1;

const PACKET_STATUS: i32 = 0x00;
const PACKET_PING: i32 = 0x01;

/// Parsed status plus the measured round trip.
#[derive(Debug, Clone)]
pub struct PingOutcome {
    pub status: StatusResponse,
    pub latency: Duration,
}

/// Connect to `host:port` and run a status exchange.
pub async fn ping(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<PingOutcome> {
    let mut stream = with_timeout("connect", connect_timeout, async {
        TcpStream::connect((host, port))
            .await
            .map_err(ProbeError::from)
    })
    .await?;
    stream.set_nodelay(true)?;

    status_exchange(&mut stream, host, port, read_timeout).await
}

/// Handshake, status request and ping/pong over an already connected stream.
///
/// The pong is optional: some proxies close right after the status response,
/// in which case the status round trip is reported as latency.
pub async fn status_exchange<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    read_timeout: Duration,
) -> Result<PingOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = Vec::with_capacity(host.len() + 16);
    write_varint(&mut handshake, HANDSHAKE_PROTOCOL_VERSION);
    write_string(&mut handshake, host);
    handshake.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut handshake, NEXT_STATE_STATUS);

    stream.write_all(&frame_packet(0x00, &handshake)).await?;

    let requested_at = Instant::now();
    stream.write_all(&frame_packet(PACKET_STATUS, &[])).await?;
    stream.flush().await?;

    let (packet_id, body) = with_timeout("status", read_timeout, read_packet(stream)).await?;
    let status_rtt = requested_at.elapsed();
    if packet_id != PACKET_STATUS {
        return Err(ProbeError::malformed(format!(
            "expected status response, got packet {packet_id:#04x}"
        )));
    }
    let (json, _) = read_string_slice(&body)?;
    trace!(len = json.len(), "Status response received");
    let status = StatusResponse::parse(&json)?;

    let latency = match ping_pong(stream, read_timeout).await {
        Ok(rtt) => rtt,
        Err(e) => {
            debug!(host = %host, port, error = %e, "Ping after status failed; using status round trip");
            status_rtt
        }
    };

    Ok(PingOutcome { status, latency })
}

async fn ping_pong<S>(stream: &mut S, read_timeout: Duration) -> Result<Duration>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let token: i64 = rand::random();
    let sent_at = Instant::now();
    stream
        .write_all(&frame_packet(PACKET_PING, &token.to_be_bytes()))
        .await?;
    stream.flush().await?;

    let (packet_id, body) = with_timeout("pong", read_timeout, read_packet(stream)).await?;
    let rtt = sent_at.elapsed();
    if packet_id != PACKET_PING || body.len() != 8 {
        return Err(ProbeError::malformed("unexpected pong packet"));
    }
    let mut echoed = [0u8; 8];
    echoed.copy_from_slice(&body);
    if i64::from_be_bytes(echoed) != token {
        return Err(ProbeError::malformed("pong payload mismatch"));
    }
    Ok(rtt)
}
