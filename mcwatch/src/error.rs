//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Map lookup failed: {0}")]
    Map(#[from] MapError),

    #[error("Renderer error: {0}")]
    Render(#[from] RenderError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Errors from the BlueMap HTTP surface.
#[derive(Error, Debug)]
pub enum MapError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("map server lists no worlds")]
    NoWorlds,

    #[error("player {0} not found on any world")]
    PlayerNotFound(String),
}

/// Errors from a headless rendering backend.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("no renderer configured")]
    Unavailable,

    #[error("renderer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error {error}: {message}")]
    WebDriver { error: String, message: String },

    #[error("unexpected renderer response: {0}")]
    Protocol(String),

    #[error("screenshot is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl RenderError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
