//! Connection addressing: endpoint, credentials and message target.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ActionError, Result};

/// Where messages are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Group,
    Private,
}

impl TargetKind {
    /// Parse a target type. Anything other than `private` is a group.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("private") {
            Self::Private
        } else {
            Self::Group
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Private => "private",
        }
    }

    pub(crate) fn send_action(&self) -> &'static str {
        match self {
            Self::Group => "send_group_msg",
            Self::Private => "send_private_msg",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved settings for one connection. Equal settings share a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConnectionSettings {
    pub ws_url: String,
    pub access_token: String,
    pub target_kind: TargetKind,
    pub target_id: String,
}

impl ConnectionSettings {
    /// Whether this connection can address anything at all.
    pub fn is_addressable(&self) -> bool {
        !self.ws_url.trim().is_empty() && !self.target_id.trim().is_empty()
    }

    /// Validate the target id, naming the offending field on failure.
    pub fn numeric_target(&self) -> std::result::Result<i64, ActionError> {
        let id = self.target_id.trim();
        if id.is_empty() {
            return Err(ActionError::MissingField("target_id"));
        }
        id.parse::<i64>()
            .map_err(|_| ActionError::InvalidTarget(id.to_string()))
    }
}

/// Append `access_token` to the URL unless it is empty or already present.
pub fn build_ws_url(ws_url: &str, access_token: &str) -> Result<Url> {
    let mut url = Url::parse(ws_url.trim())?;
    let token = access_token.trim();
    if !token.is_empty() && !url.query_pairs().any(|(k, _)| k == "access_token") {
        url.query_pairs_mut().append_pair("access_token", token);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_appended_when_absent() {
        let url = build_ws_url("ws://127.0.0.1:3001", "secret").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:3001/?access_token=secret");

        let url = build_ws_url("ws://host/ws?x=1", "secret").unwrap();
        assert_eq!(url.as_str(), "ws://host/ws?x=1&access_token=secret");
    }

    #[test]
    fn test_token_not_duplicated() {
        let url = build_ws_url("ws://host/?access_token=mine", "other").unwrap();
        assert_eq!(url.as_str(), "ws://host/?access_token=mine");
    }

    #[test]
    fn test_empty_token_leaves_url() {
        let url = build_ws_url("wss://host/ws", "").unwrap();
        assert_eq!(url.as_str(), "wss://host/ws");
    }

    #[test]
    fn test_invalid_url() {
        assert!(build_ws_url("not a url", "").is_err());
    }

    #[test]
    fn test_target_kind_parse() {
        assert_eq!(TargetKind::parse("private"), TargetKind::Private);
        assert_eq!(TargetKind::parse(" PRIVATE "), TargetKind::Private);
        assert_eq!(TargetKind::parse("group"), TargetKind::Group);
        assert_eq!(TargetKind::parse(""), TargetKind::Group);
    }

    #[test]
    fn test_numeric_target() {
        let mut settings = ConnectionSettings {
            ws_url: "ws://h".into(),
            target_id: "123".into(),
            ..Default::default()
        };
        assert_eq!(settings.numeric_target(), Ok(123));

        settings.target_id = "abc".into();
        assert_eq!(
            settings.numeric_target(),
            Err(ActionError::InvalidTarget("abc".into()))
        );

        settings.target_id = String::new();
        assert_eq!(
            settings.numeric_target(),
            Err(ActionError::MissingField("target_id"))
        );
        assert!(!settings.is_addressable());
    }
}
