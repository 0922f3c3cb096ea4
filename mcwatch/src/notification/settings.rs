//! Resolution of binding overrides against gateway defaults.

use onebot_client::{ConnectionSettings, TargetKind};
use serde::{Deserialize, Serialize};

use crate::domain::TargetOverrides;

/// Fully resolved addressing for one binding. Equal values share a connection.
pub type ResolvedTarget = ConnectionSettings;

/// Process-wide gateway defaults, used wherever a binding leaves a field empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayDefaults {
    pub ws_url: String,
    pub access_token: String,
    pub target_type: String,
    pub target_id: String,
}

impl Default for GatewayDefaults {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            access_token: String::new(),
            target_type: TargetKind::Group.as_str().to_string(),
            target_id: String::new(),
        }
    }
}

/// The binding's value wins when present and non-empty.
pub fn resolve(overrides: &TargetOverrides, defaults: &GatewayDefaults) -> ResolvedTarget {
    fn pick(value: &Option<String>, default: &str) -> String {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default.trim())
            .to_string()
    }

    let target_type = pick(&overrides.target_type, &defaults.target_type);
    ConnectionSettings {
        ws_url: pick(&overrides.ws_url, &defaults.ws_url),
        access_token: pick(&overrides.access_token, &defaults.access_token),
        target_kind: TargetKind::parse(&target_type),
        target_id: pick(&overrides.target_id, &defaults.target_id),
    }
}
