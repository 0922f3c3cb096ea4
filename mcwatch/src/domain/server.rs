//! Monitored servers and their notification bindings.

use serde::{Deserialize, Serialize};

/// Server identifier as assigned by the configuration store.
pub type ServerId = i64;

pub const DEFAULT_GAME_PORT: u16 = 25565;

fn default_port() -> u16 {
    DEFAULT_GAME_PORT
}

fn default_true() -> bool {
    true
}

/// A monitored game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: ServerId,
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub bindings: Vec<NotificationBinding>,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-binding gateway settings. Unset or empty fields fall back to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

/// Where and what to notify for one server. A server may have many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBinding {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub target: TargetOverrides,
    /// Master switch for every notice from this binding.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub notify_server_status: bool,
    #[serde(default = "default_true")]
    pub notify_player_changes: bool,
    /// Base URL of a BlueMap web map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_url: Option<String>,
    /// Defaults to on whenever `map_url` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_map: Option<bool>,
    #[serde(default = "default_true")]
    pub send_screenshot: bool,
}

impl NotificationBinding {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            target: TargetOverrides::default(),
            enabled: true,
            notify_server_status: true,
            notify_player_changes: true,
            map_url: None,
            enable_map: None,
            send_screenshot: true,
        }
    }

    pub fn wants_status_notices(&self) -> bool {
        self.enabled && self.notify_server_status
    }

    pub fn wants_player_changes(&self) -> bool {
        self.enabled && self.notify_player_changes
    }

    /// The map base URL without a trailing slash, when screenshots are wanted.
    pub fn map_base_url(&self) -> Option<&str> {
        let url = self
            .map_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|u| !u.is_empty())?;
        let map_enabled = self.enable_map.unwrap_or(true);
        (self.enabled && map_enabled && self.send_screenshot).then_some(url)
    }
}
