//! Configuration snapshot consumed by the monitor.

mod server;
mod source;

pub use server::{DEFAULT_GAME_PORT, NotificationBinding, ServerConfig, ServerId, TargetOverrides};
pub use source::{JsonServerSource, ServerSource, StaticServerSource};
