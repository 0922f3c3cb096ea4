//! Human-readable messages built from monitor events.

use std::collections::HashMap;

use crate::duration::format_duration;

/// A roster diff for one server, as delivered to the chat target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerChange {
    pub server_name: String,
    pub joined: Vec<String>,
    pub left: Vec<String>,
    pub online: u32,
    /// Zero when the server did not report a cap.
    pub max: u32,
    /// Seconds online, keyed by the names in `left`.
    pub durations: HashMap<String, i64>,
}

impl PlayerChange {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }

    /// Render the composite message, or `None` when nothing changed.
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let count = format_count(self.online, self.max);
        let joined = self
            .joined
            .iter()
            .map(|name| format!("{name} joined ({count})"));
        let left = self.left.iter().map(|name| {
            let secs = self.durations.get(name).copied().unwrap_or(0);
            format!("{name} left ({count})[online: {}]", format_duration(secs))
        });
        let lines: Vec<String> = joined.chain(left).collect();
        Some(format!("[{}] {}", self.server_name, lines.join(", ")))
    }
}

fn format_count(online: u32, max: u32) -> String {
    if max > 0 {
        format!("{online}/{max}")
    } else {
        format!("{online}/?")
    }
}
