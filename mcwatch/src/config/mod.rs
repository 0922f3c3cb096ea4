//! Process configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use mc_status::PlayerMode;

use crate::notification::GatewayDefaults;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// JSON file listing servers and bindings, re-read every cycle.
    pub servers_file: PathBuf,
    pub poll_interval: Duration,
    pub use_query_for_players: bool,
    /// Query port; 0 means the game port.
    pub query_port: u16,
    pub gateway: GatewayDefaults,
    /// WebDriver endpoint. Screenshots are disabled when unset.
    pub webdriver_url: Option<String>,
    pub map_debug: bool,
    pub log_dir: String,
    /// Filter directive applied once logging is up, e.g. `mcwatch=debug`.
    pub log_filter: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            servers_file: PathBuf::from("servers.json"),
            poll_interval: Duration::from_secs(10),
            use_query_for_players: false,
            query_port: 0,
            gateway: GatewayDefaults::default(),
            webdriver_url: None,
            map_debug: false,
            log_dir: "logs".to_string(),
            log_filter: None,
        }
    }
}

impl AppConfig {
    /// Load from the process environment, after `.env` has been applied.
    ///
    /// Supported env vars:
    /// - `MCWATCH_SERVERS_FILE`, `POLL_INTERVAL` (seconds)
    /// - `USE_QUERY_FOR_PLAYERS`, `QUERY_PORT`
    /// - `ONEBOT_WS_URL`, `ONEBOT_ACCESS_TOKEN`, `ONEBOT_TARGET_TYPE`, `ONEBOT_TARGET_ID`
    /// - `WEBDRIVER_URL`, `MAP_DEBUG`, `LOG_DIR`, `LOG_FILTER`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = var("MCWATCH_SERVERS_FILE") {
            config.servers_file = PathBuf::from(path);
        }

        if let Some(interval) = var("POLL_INTERVAL") {
            let secs = interval
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| {
                    Error::config(format!(
                        "POLL_INTERVAL must be a positive number of seconds, got '{interval}'"
                    ))
                })?;
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Some(flag) = var("USE_QUERY_FOR_PLAYERS") {
            config.use_query_for_players = parse_bool(&flag);
        }

        if let Some(port) = var("QUERY_PORT") {
            config.query_port = port
                .parse::<u16>()
                .map_err(|e| Error::config(format!("Invalid QUERY_PORT '{port}': {e}")))?;
        }

        if let Some(url) = var("ONEBOT_WS_URL") {
            config.gateway.ws_url = url;
        }
        if let Some(token) = var("ONEBOT_ACCESS_TOKEN") {
            config.gateway.access_token = token;
        }
        if let Some(kind) = var("ONEBOT_TARGET_TYPE") {
            config.gateway.target_type = kind;
        }
        if let Some(id) = var("ONEBOT_TARGET_ID") {
            config.gateway.target_id = id;
        }

        config.webdriver_url = var("WEBDRIVER_URL");

        if let Some(flag) = var("MAP_DEBUG") {
            config.map_debug = parse_bool(&flag);
        }

        if let Some(dir) = var("LOG_DIR") {
            config.log_dir = dir;
        }
        config.log_filter = var("LOG_FILTER");

        Ok(config)
    }

    pub fn player_mode(&self) -> PlayerMode {
        if self.use_query_for_players {
            PlayerMode::Query {
                port: (self.query_port != 0).then_some(self.query_port),
            }
        } else {
            PlayerMode::Sample
        }
    }
}

/// `1`, `true`, `yes` and `on` are true, case-insensitively. Anything else is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
