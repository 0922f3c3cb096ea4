//! The prober: one call, one server, never an error.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::ping;
use crate::query;

/// How the roster is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerMode {
    /// Use the (possibly capped or hidden) sample from the status response.
    #[default]
    Sample,
    /// Ask the Query sub-protocol for the full list. `None` reuses the game port.
    Query { port: Option<u16> },
}

/// Timeouts applied to each protocol step.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub query: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(3),
            read: Duration::from_secs(3),
            query: Duration::from_secs(3),
        }
    }
}

/// What one probe learned about a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub online: bool,
    pub players_online: u32,
    pub players_max: u32,
    /// Whole milliseconds, `None` when unknown.
    pub latency_ms: Option<u64>,
    pub players: Vec<String>,
    /// False when the server did not disclose its roster.
    pub players_known: bool,
    pub version: Option<String>,
    pub motd: Option<String>,
}

impl ProbeResult {
    /// The result reported for any unreachable or misbehaving server.
    pub fn offline() -> Self {
        Self::default()
    }
}

/// Anything that can report a server's status.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, host: &str, port: u16, mode: PlayerMode) -> ProbeResult;
}

/// Probes Java edition servers over Server List Ping, optionally enriched by Query.
#[derive(Debug, Clone, Default)]
pub struct StatusProber {
    timeouts: ProbeTimeouts,
}

impl StatusProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeouts(timeouts: ProbeTimeouts) -> Self {
        Self { timeouts }
    }

    /// Probe and surface the primary-protocol error, if any.
    ///
    /// A failing Query never fails the probe; the sample roster is kept instead.
    pub async fn try_probe(&self, host: &str, port: u16, mode: PlayerMode) -> Result<ProbeResult> {
        let outcome = ping::ping(host, port, self.timeouts.connect, self.timeouts.read).await?;
        let status = outcome.status;

        let sample = status.sample_names();
        let mut result = ProbeResult {
            online: true,
            players_online: status.players_online(),
            players_max: status.players_max(),
            latency_ms: Some(outcome.latency.as_millis() as u64),
            players_known: sample.is_some(),
            players: sample.unwrap_or_default(),
            version: status.version_name().map(str::to_string),
            motd: status.motd(),
        };

        if let PlayerMode::Query { port: query_port } = mode {
            let query_port = query_port.filter(|p| *p != 0).unwrap_or(port);
            match query::full_stat(host, query_port, self.timeouts.query).await {
                Ok(response) => {
                    result.players = response.players;
                    result.players_known = true;
                }
                Err(e) => {
                    debug!(host = %host, port = query_port, error = %e, "Query failed; keeping status sample");
                }
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl Probe for StatusProber {
    async fn probe(&self, host: &str, port: u16, mode: PlayerMode) -> ProbeResult {
        match self.try_probe(host, port, mode).await {
            Ok(result) => result,
            Err(e) => {
                debug!(host = %host, port, error = %e, "Server unreachable");
                ProbeResult::offline()
            }
        }
    }
}
