//! mcwatch library crate.
//!
//! Polls Minecraft servers and relays status and player changes to OneBot
//! chat targets, with optional BlueMap location screenshots.

pub mod bluemap;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod status;
pub mod utils;

pub use error::{Error, Result};
