//! Minecraft Java edition status probing.
//!
//! [`StatusProber`] speaks Server List Ping over TCP and, optionally, the
//! UDP Query protocol for a complete roster. [`Probe::probe`] never fails:
//! any network or protocol problem is reported as [`ProbeResult::offline`].

pub mod codec;
pub mod error;
pub mod ping;
pub mod query;
pub mod response;

mod prober;

pub use error::{ProbeError, Result};
pub use prober::{PlayerMode, Probe, ProbeResult, ProbeTimeouts, StatusProber};
pub use response::StatusResponse;
