//! Last known status per server.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::ServerId;

/// What the display layer sees for one server. Overwritten every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub online: bool,
    pub players_online: u32,
    pub players_max: u32,
    pub latency_ms: Option<u64>,
    pub players: Vec<String>,
    pub players_known: bool,
    pub checked_at: DateTime<Utc>,
    /// `name:duration` entries.
    pub players_display: Vec<String>,
    pub version: Option<String>,
    pub motd: Option<String>,
}

/// Shared store of the latest [`StatusSnapshot`] per server. Last write wins.
#[derive(Debug, Default)]
pub struct StatusCache {
    entries: Mutex<HashMap<ServerId, StatusSnapshot>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, server_id: ServerId, snapshot: StatusSnapshot) {
        self.entries.lock().insert(server_id, snapshot);
    }

    pub fn get(&self, server_id: ServerId) -> Option<StatusSnapshot> {
        self.entries.lock().get(&server_id).cloned()
    }

    pub fn all(&self) -> HashMap<ServerId, StatusSnapshot> {
        self.entries.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let cache = StatusCache::new();
        assert!(cache.get(1).is_none());

        cache.update(
            1,
            StatusSnapshot {
                online: true,
                players_online: 3,
                ..Default::default()
            },
        );
        cache.update(
            1,
            StatusSnapshot {
                online: false,
                ..Default::default()
            },
        );
        cache.update(2, StatusSnapshot::default());

        assert!(!cache.get(1).unwrap().online);
        assert_eq!(cache.all().len(), 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = StatusSnapshot {
            online: true,
            latency_ms: Some(12),
            players_display: vec!["Alex:1m5s".into()],
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["latency_ms"], 12);
        assert_eq!(json["players_display"][0], "Alex:1m5s");
    }
}
