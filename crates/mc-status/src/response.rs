//! Status response JSON model.

use serde::Deserialize;
use serde_json::Value;

/// The JSON document returned by a status request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub version: Option<VersionInfo>,
    #[serde(default)]
    pub players: Option<PlayersInfo>,
    /// Either a plain string or a chat component tree.
    #[serde(default)]
    pub description: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayersInfo {
    #[serde(default)]
    pub online: i64,
    #[serde(default)]
    pub max: i64,
    /// Absent when the server hides its player sample.
    #[serde(default)]
    pub sample: Option<Vec<SamplePlayer>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SamplePlayer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
}

impl StatusResponse {
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn players_online(&self) -> u32 {
        self.players
            .as_ref()
            .map(|p| clamp_count(p.online))
            .unwrap_or(0)
    }

    pub fn players_max(&self) -> u32 {
        self.players
            .as_ref()
            .map(|p| clamp_count(p.max))
            .unwrap_or(0)
    }

    /// Names from the player sample, or `None` when no sample was sent.
    pub fn sample_names(&self) -> Option<Vec<String>> {
        let sample = self.players.as_ref()?.sample.as_ref()?;
        Some(
            sample
                .iter()
                .filter(|p| !p.name.is_empty())
                .map(|p| p.name.clone())
                .collect(),
        )
    }

    pub fn version_name(&self) -> Option<&str> {
        self.version
            .as_ref()
            .map(|v| v.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// The MOTD flattened to plain text with formatting codes removed.
    pub fn motd(&self) -> Option<String> {
        let description = self.description.as_ref()?;
        let mut raw = String::new();
        flatten_component(description, &mut raw);
        let text = strip_formatting(&raw);
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

fn clamp_count(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

fn flatten_component(value: &Value, out: &mut String) {
    match value {
        Value::String(text) => out.push_str(text),
        Value::Array(parts) => parts.iter().for_each(|part| flatten_component(part, out)),
        Value::Object(map) => {
            if let Some(text) = map.get("text") {
                flatten_component(text, out);
            }
            if let Some(extra) = map.get("extra") {
                flatten_component(extra, out);
            }
        }
        _ => {}
    }
}

/// Drop legacy `§x` formatting codes.
fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\u{00a7}' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}
