//! Server polling and change detection.

mod events;
mod service;
mod state;

pub use events::{EventKind, MonitorEvent};
pub use service::{MonitorConfig, ServerMonitor};
pub use state::{ANONYMOUS_PLAYER, BackoffPolicy, MonitorState, Observation};
