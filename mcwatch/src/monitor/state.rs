//! Per-server tracking state and the pure cycle transition.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use mc_status::ProbeResult;
use onebot_client::{PlayerChange, format_duration};

use super::events::MonitorEvent;
use crate::domain::ServerId;
use crate::status::StatusSnapshot;

/// Sample entry servers report when the real list is hidden.
pub const ANONYMOUS_PLAYER: &str = "Anonymous Player";

/// Throttle for servers that have been down for a long time.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Offline for at least this long before throttling starts.
    pub offline_threshold: Duration,
    /// Minimum gap between probes once throttled.
    pub min_interval: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            offline_threshold: Duration::minutes(30),
            min_interval: Duration::seconds(60),
        }
    }
}

/// Result of applying one probe to a server's state.
#[derive(Debug, Clone)]
pub struct Observation {
    pub events: Vec<MonitorEvent>,
    pub snapshot: StatusSnapshot,
}

/// Everything remembered about one server between cycles.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    last_players: BTreeSet<String>,
    /// `None` until the first online cycle, and again after going offline.
    last_count: Option<u32>,
    first_seen: HashMap<String, DateTime<Utc>>,
    last_online: Option<bool>,
    offline_since: Option<DateTime<Utc>>,
    last_polled: Option<DateTime<Utc>>,
}

impl MonitorState {
    pub fn last_players(&self) -> &BTreeSet<String> {
        &self.last_players
    }

    pub fn last_count(&self) -> Option<u32> {
        self.last_count
    }

    pub fn last_online(&self) -> Option<bool> {
        self.last_online
    }

    pub fn offline_since(&self) -> Option<DateTime<Utc>> {
        self.offline_since
    }

    pub fn first_seen(&self, name: &str) -> Option<DateTime<Utc>> {
        self.first_seen.get(name).copied()
    }

    /// Whether this cycle should probe, or skip a long-offline server.
    pub fn should_probe(&self, now: DateTime<Utc>, policy: &BackoffPolicy) -> bool {
        match (self.offline_since, self.last_polled) {
            (Some(since), Some(polled)) => {
                now - since < policy.offline_threshold || now - polled >= policy.min_interval
            }
            _ => true,
        }
    }

    /// Forget the roster so the next cycle re-announces everyone online.
    ///
    /// Online/offline bookkeeping is untouched.
    pub fn reset_roster(&mut self) {
        self.last_players.clear();
        self.first_seen.clear();
        if self.last_count.is_none() {
            self.last_count = Some(0);
        }
    }

    /// Apply a probe result taken at `now`.
    pub fn observe(
        &mut self,
        server_id: ServerId,
        server_name: &str,
        probe: &ProbeResult,
        now: DateTime<Utc>,
    ) -> Observation {
        self.last_polled = Some(now);
        let mut events = Vec::new();

        if !probe.online {
            if self.last_online == Some(true) {
                events.push(MonitorEvent::ServerOffline {
                    server_id,
                    server_name: server_name.to_string(),
                });
            }
            if self.last_online == Some(false) {
                self.offline_since.get_or_insert(now);
            } else {
                self.offline_since = Some(now);
            }
            self.last_online = Some(false);
            self.last_count = None;
            self.last_players.clear();
            self.first_seen.clear();

            return Observation {
                events,
                snapshot: snapshot(probe, now, Vec::new(), Vec::new()),
            };
        }

        if self.last_online == Some(false) {
            events.push(MonitorEvent::ServerOnline {
                server_id,
                server_name: server_name.to_string(),
            });
        }
        self.offline_since = None;
        self.last_online = Some(true);

        let roster: Vec<String> = probe
            .players
            .iter()
            .filter(|name| !name.is_empty() && name.as_str() != ANONYMOUS_PLAYER)
            .cloned()
            .collect();
        let current: BTreeSet<String> = roster.iter().cloned().collect();
        let count = probe.players_online;
        let previous_count = self.last_count;

        if count == 0 && !self.last_players.is_empty() {
            let left: Vec<String> = self.last_players.iter().cloned().collect();
            let durations = self.durations(&left, now);
            events.push(MonitorEvent::PlayersChanged {
                server_id,
                change: PlayerChange {
                    server_name: server_name.to_string(),
                    joined: Vec::new(),
                    left,
                    online: count,
                    max: probe.players_max,
                    durations,
                },
            });
            self.last_players.clear();
            self.first_seen.clear();
        }

        if !current.is_empty() {
            for name in &current {
                self.first_seen.entry(name.clone()).or_insert(now);
            }

            if previous_count.is_some() && current != self.last_players {
                let joined: Vec<String> =
                    current.difference(&self.last_players).cloned().collect();
                let left: Vec<String> = self.last_players.difference(&current).cloned().collect();

                if !joined.is_empty() || !left.is_empty() {
                    let durations = self.durations(&left, now);
                    events.push(MonitorEvent::PlayersChanged {
                        server_id,
                        change: PlayerChange {
                            server_name: server_name.to_string(),
                            joined,
                            left: left.clone(),
                            online: count,
                            max: probe.players_max,
                            durations,
                        },
                    });
                }
                for name in &left {
                    self.first_seen.remove(name);
                }
            }
            self.last_players = current;
        }

        let display_names: Vec<String> = if roster.is_empty() {
            self.last_players.iter().cloned().collect()
        } else {
            roster.clone()
        };
        let display = display_names
            .iter()
            .map(|name| format!("{name}:{}", format_duration(self.seconds_since_seen(name, now))))
            .collect();

        if previous_count.is_some_and(|previous| previous > 0) && count == 0 {
            events.push(MonitorEvent::NoPlayersOnline {
                server_id,
                server_name: server_name.to_string(),
            });
        }

        self.last_count = Some(count);

        Observation {
            events,
            snapshot: snapshot(probe, now, roster, display),
        }
    }

    fn seconds_since_seen(&self, name: &str, now: DateTime<Utc>) -> i64 {
        self.first_seen
            .get(name)
            .map(|seen| (now - *seen).num_seconds())
            .unwrap_or(0)
    }

    fn durations(&self, names: &[String], now: DateTime<Utc>) -> HashMap<String, i64> {
        names
            .iter()
            .map(|name| (name.clone(), self.seconds_since_seen(name, now)))
            .collect()
    }
}

fn snapshot(
    probe: &ProbeResult,
    now: DateTime<Utc>,
    players: Vec<String>,
    players_display: Vec<String>,
) -> StatusSnapshot {
    StatusSnapshot {
        online: probe.online,
        players_online: probe.players_online,
        players_max: probe.players_max,
        latency_ms: probe.latency_ms,
        players,
        players_known: probe.players_known,
        checked_at: now,
        players_display,
        version: probe.version.clone(),
        motd: probe.motd.clone(),
    }
}
