//! OneBot v11 request and response frames.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ActionError;
use crate::target::TargetKind;

/// One element of a segmented message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MessageSegment {
    Text { text: String },
    Image { file: String },
}

impl MessageSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// An image carried inline as `base64://<data>`.
    pub fn base64_image(data: impl AsRef<str>) -> Self {
        Self::Image {
            file: format!("base64://{}", data.as_ref()),
        }
    }
}

/// Message body: either plain text or an ordered list of segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text(String),
    Segments(Vec<MessageSegment>),
}

/// An outbound action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestFrame {
    pub action: String,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

impl RequestFrame {
    /// Build a `send_group_msg` or `send_private_msg` action.
    pub fn send_message(kind: TargetKind, target_id: i64, message: MessageBody) -> Self {
        let params = match kind {
            TargetKind::Group => json!({ "group_id": target_id, "message": message }),
            TargetKind::Private => json!({ "user_id": target_id, "message": message }),
        };
        Self {
            action: kind.send_action().to_string(),
            params,
            echo: None,
        }
    }

    pub fn with_echo(mut self, echo: impl Into<String>) -> Self {
        self.echo = Some(echo.into());
        self
    }
}

/// An inbound action response. Unsolicited events parse too, with no `echo`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseFrame {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub retcode: Option<i64>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub wording: Option<String>,
    #[serde(default)]
    pub echo: Option<Value>,
}

impl ResponseFrame {
    /// The correlation id, if any. Gateways may echo numbers back as numbers.
    pub fn echo_id(&self) -> Option<String> {
        match self.echo.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some("ok") && self.retcode.unwrap_or(0) == 0
    }

    /// Convert an application-level failure into [`ActionError::Rejected`].
    pub fn into_result(self) -> Result<Self, ActionError> {
        if self.is_ok() {
            return Ok(self);
        }
        Err(ActionError::Rejected {
            status: self.status.clone().unwrap_or_default(),
            retcode: self.retcode.unwrap_or(0),
            message: self
                .message
                .clone()
                .filter(|m| !m.is_empty())
                .or_else(|| self.wording.clone())
                .unwrap_or_default(),
        })
    }
}
