//! OneBot v11 gateway client.
//!
//! [`OneBotConnection`] keeps one WebSocket open to a gateway, reconnecting
//! after a fixed delay, and offers best-effort sends as well as sends that wait
//! for the gateway's correlated answer.

pub mod connection;
pub mod duration;
pub mod error;
pub mod frame;
pub mod message;
pub mod target;

pub use connection::{
    ConnectionOptions, ConnectionState, DEFAULT_ACTION_TIMEOUT, OneBotConnection,
};
pub use duration::format_duration;
pub use error::{ActionError, Error, Result};
pub use frame::{MessageBody, MessageSegment, RequestFrame, ResponseFrame};
pub use message::PlayerChange;
pub use target::{ConnectionSettings, TargetKind, build_ws_url};
