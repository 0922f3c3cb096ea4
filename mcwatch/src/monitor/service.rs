//! The polling loop: probe, track, notify.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use mc_status::{PlayerMode, Probe};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::events::{EventKind, MonitorEvent};
use super::state::{BackoffPolicy, MonitorState};
use crate::bluemap::MapSnapshotWorker;
use crate::domain::{NotificationBinding, ServerConfig, ServerId, ServerSource};
use crate::notification::Notifier;
use crate::status::StatusCache;

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub player_mode: PlayerMode,
    pub backoff: BackoffPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            player_mode: PlayerMode::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Periodically probes every enabled server and notifies its bindings.
pub struct ServerMonitor {
    source: Arc<dyn ServerSource>,
    prober: Arc<dyn Probe>,
    notifier: Arc<dyn Notifier>,
    status: Arc<StatusCache>,
    map_worker: Option<Arc<MapSnapshotWorker>>,
    /// Tracking per server id. Guarded as a whole so resets never interleave
    /// with a cycle's update.
    states: Mutex<HashMap<ServerId, MonitorState>>,
    config: MonitorConfig,
    cancellation_token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ServerMonitor {
    pub fn new(
        source: Arc<dyn ServerSource>,
        prober: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            prober,
            notifier,
            status: Arc::new(StatusCache::new()),
            map_worker: None,
            states: Mutex::new(HashMap::new()),
            config,
            cancellation_token: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn with_map_worker(mut self, worker: Arc<MapSnapshotWorker>) -> Self {
        self.map_worker = Some(worker);
        self
    }

    pub fn with_status_cache(mut self, status: Arc<StatusCache>) -> Self {
        self.status = status;
        self
    }

    /// Latest snapshot per server.
    pub fn status(&self) -> Arc<StatusCache> {
        self.status.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Spawn the polling task. Calling it again while running does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Monitor already running");
            return;
        }

        let monitor = Arc::clone(self);
        let cancellation_token = self.cancellation_token.clone();
        info!(
            interval_secs = self.config.poll_interval.as_secs_f64(),
            "Starting server monitor"
        );
        *task = Some(tokio::spawn(async move {
            loop {
                monitor.poll_once().await;
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        debug!("Server monitor shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(monitor.config.poll_interval) => {}
                }
            }
        }));
    }

    /// Ask the loop to stop after the current cycle.
    pub fn stop(&self) {
        info!("Stopping server monitor");
        self.cancellation_token.cancel();
    }

    /// Wait for the polling task to exit.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Monitor task ended abnormally");
        }
    }

    /// Forget rosters so the next cycle announces everyone as joined.
    pub fn reset(&self, server_id: Option<ServerId>) {
        let mut states = self.states.lock();
        match server_id {
            // An untracked server is seeded so its first online cycle still announces.
            Some(id) => states.entry(id).or_default().reset_roster(),
            None => states.values_mut().for_each(MonitorState::reset_roster),
        }
        info!(server_id = ?server_id, "Player tracking reset");
    }

    /// Tracking state for one server, for inspection.
    pub fn state(&self, server_id: ServerId) -> Option<MonitorState> {
        self.states.lock().get(&server_id).cloned()
    }

    /// Run one full cycle over every enabled server.
    pub async fn poll_once(&self) {
        let servers = match self.source.load_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                warn!(error = %e, "Failed to load servers, skipping cycle");
                return;
            }
        };

        let now = Utc::now();
        let due: Vec<ServerConfig> = {
            let states = self.states.lock();
            servers
                .into_iter()
                .filter(|server| server.enabled)
                .filter(|server| {
                    let probe = states
                        .get(&server.id)
                        .is_none_or(|state| state.should_probe(now, &self.config.backoff));
                    if !probe {
                        trace!(server_id = server.id, "Server offline for a while, probe throttled");
                    }
                    probe
                })
                .collect()
        };

        let results = join_all(due.iter().map(|server| {
            self.prober
                .probe(&server.host, server.port, self.config.player_mode)
        }))
        .await;

        for (server, result) in due.iter().zip(results) {
            trace!(
                server_id = server.id,
                online = result.online,
                players = result.players_online,
                "Probed server"
            );
            let observation = {
                let mut states = self.states.lock();
                states
                    .entry(server.id)
                    .or_default()
                    .observe(server.id, &server.name, &result, Utc::now())
            };
            self.status.update(server.id, observation.snapshot);
            self.dispatch(server, &observation.events).await;
        }
    }

    async fn dispatch(&self, server: &ServerConfig, events: &[MonitorEvent]) {
        for event in events {
            debug!(server_id = server.id, event = ?event.kind(), "Monitor event");
            let kind = event.kind();
            for binding in server.bindings.iter().filter(|b| wants(b, kind)) {
                match event {
                    MonitorEvent::PlayersChanged { change, .. } => {
                        self.notifier.send_player_change(&binding.target, change).await;
                    }
                    other => {
                        if let Some(text) = other.description() {
                            self.notifier.send_text(&binding.target, &text).await;
                        }
                    }
                }
            }

            if let MonitorEvent::PlayersChanged { change, .. } = event
                && let Some(worker) = &self.map_worker
            {
                for binding in &server.bindings {
                    for player in &change.joined {
                        if worker.spawn(&server.name, binding, player).is_none() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl Drop for ServerMonitor {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

fn wants(binding: &NotificationBinding, kind: EventKind) -> bool {
    match kind {
        EventKind::ServerStatus => binding.wants_status_notices(),
        EventKind::PlayerChanges => binding.wants_player_changes(),
    }
}
