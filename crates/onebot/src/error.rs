//! OneBot client error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up a connection.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid WebSocket URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to build handshake request: {0}")]
    Handshake(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }
}

/// Failure of a single action sent through the gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// A required addressing field is empty.
    #[error("missing {0}")]
    MissingField(&'static str),

    /// The target id is not numeric.
    #[error("invalid target id {0:?}")]
    InvalidTarget(String),

    /// The outbound queue did not accept the frame.
    #[error("outbound queue not ready")]
    QueueNotReady,

    #[error("timed out waiting for response")]
    Timeout,

    #[error("disconnected")]
    Disconnected,

    /// The gateway answered but refused the action.
    #[error("rejected by gateway: status={status} retcode={retcode} {message}")]
    Rejected {
        status: String,
        retcode: i64,
        message: String,
    },
}
