//! Probe error types.

use std::time::Duration;

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors raised while talking to a game server.
///
/// These never escape [`crate::StatusProber::probe`]; they only surface through
/// [`crate::StatusProber::try_probe`] and the lower-level protocol functions.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{stage} timed out after {timeout:?}")]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Invalid status JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Address {0} did not resolve")]
    Unresolved(String),
}

impl ProbeError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn timeout(stage: &'static str, timeout: Duration) -> Self {
        Self::Timeout { stage, timeout }
    }
}
