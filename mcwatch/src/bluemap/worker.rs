//! One-shot tasks that screenshot a newly joined player on the web map.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::client::{MapClient, MapSettings, Position};
use super::link::deep_link;
use super::renderer::{MapRenderer, RenderPage, Viewport};
use crate::domain::{NotificationBinding, TargetOverrides};
use crate::error::{RenderError, Result};
use crate::notification::Notifier;

macro_rules! map_log {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Installs listeners on the viewer that raise two flags: map loaded, and
/// camera unmoved for 1.5s. Safe to run more than once.
const READINESS_HOOK: &str = r#"(() => {
  if (window.__mcwatchHooked) return "hooked";
  const viewer = window.mapViewer
    || (window.BlueMapApp && window.BlueMapApp.mapViewer)
    || (window.app && window.app.mapViewer)
    || window.bluemapMapViewer;
  if (!viewer || !viewer.events) return "missing";
  const loaded = () => !!(viewer.data && viewer.data.mapState === "loaded");
  window.__mcwatchHooked = true;
  window.__mcwatchMapLoaded = loaded();
  window.__mcwatchCameraStable = false;
  let settle;
  const restartSettle = () => {
    window.__mcwatchCameraStable = false;
    clearTimeout(settle);
    settle = setTimeout(() => { window.__mcwatchCameraStable = true; }, 1500);
  };
  viewer.events.addEventListener("bluemapMapChanged", () => {
    if (loaded()) window.__mcwatchMapLoaded = true;
    restartSettle();
  });
  viewer.events.addEventListener("bluemapCameraMoved", restartSettle);
  restartSettle();
  return "hooked";
})()"#;

const READINESS_CHECK: &str = "!!(window.__mcwatchMapLoaded && window.__mcwatchCameraStable)";

#[derive(Debug, Clone, Copy)]
pub struct SnapshotOptions {
    pub viewport: Viewport,
    pub load_timeout: Duration,
    /// Upper bound on waiting for the viewer to settle before capturing anyway.
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    /// Log progress at info instead of debug.
    pub verbose: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            load_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
            verbose: false,
        }
    }
}

pub struct MapSnapshotWorker {
    client: Arc<MapClient>,
    renderer: Option<Arc<dyn MapRenderer>>,
    notifier: Arc<dyn Notifier>,
    options: SnapshotOptions,
}

impl MapSnapshotWorker {
    pub fn new(
        client: Arc<MapClient>,
        renderer: Option<Arc<dyn MapRenderer>>,
        notifier: Arc<dyn Notifier>,
        options: SnapshotOptions,
    ) -> Self {
        Self {
            client,
            renderer,
            notifier,
            options,
        }
    }

    pub fn options(&self) -> &SnapshotOptions {
        &self.options
    }

    /// Start a snapshot task for `player`, or `None` if the binding has no map.
    pub fn spawn(
        self: &Arc<Self>,
        server_name: &str,
        binding: &NotificationBinding,
        player: &str,
    ) -> Option<JoinHandle<bool>> {
        let base_url = binding.map_base_url()?.to_string();
        let worker = self.clone();
        let server_name = server_name.to_string();
        let target = binding.target.clone();
        let player = player.to_string();
        let binding_id = binding.id;
        Some(tokio::spawn(async move {
            map_log!(
                worker.options.verbose,
                binding_id,
                player = %player,
                base_url = %base_url,
                "Starting map snapshot"
            );
            worker.run(&server_name, &base_url, &target, &player).await
        }))
    }

    /// Capture and send one snapshot. Returns whether an image was sent.
    pub async fn run(
        &self,
        server_name: &str,
        base_url: &str,
        target: &TargetOverrides,
        player: &str,
    ) -> bool {
        match self.capture(base_url, player).await {
            Ok(image) => {
                let caption = format!("[{server_name}] {player} location");
                self.notifier.send_image(target, &image, Some(&caption)).await;
                map_log!(self.options.verbose, player = %player, bytes = image.len(), "Map snapshot sent");
                true
            }
            Err(e) => {
                map_log!(self.options.verbose, player = %player, error = %e, "Map snapshot aborted");
                false
            }
        }
    }

    async fn capture(&self, base_url: &str, player: &str) -> Result<Vec<u8>> {
        let renderer = self.renderer.as_ref().ok_or(RenderError::Unavailable)?;
        let settings = self.client.settings(base_url).await?;
        let (world, position) = self
            .client
            .find_player_world(base_url, &settings, player)
            .await?;

        let link = deep_link(base_url, &world, position);
        map_log!(self.options.verbose, url = %link, "Opening map");
        let mut page = renderer
            .open(&link, self.options.viewport, self.options.load_timeout)
            .await?;

        let result = self
            .settle_and_capture(page.as_mut(), base_url, &settings, &world, player, position)
            .await;
        page.close().await;
        result
    }

    async fn settle_and_capture(
        &self,
        page: &mut dyn RenderPage,
        base_url: &str,
        settings: &MapSettings,
        world: &str,
        player: &str,
        mut position: Position,
    ) -> Result<Vec<u8>> {
        let hook = match page.evaluate(READINESS_HOOK).await {
            Ok(status) => status.as_str().unwrap_or("unknown").to_string(),
            Err(e) => format!("error: {e}"),
        };
        map_log!(self.options.verbose, hook = %hook, "Readiness hook installed");

        let deadline = Instant::now() + self.options.ready_timeout;
        loop {
            match self
                .client
                .find_player_position(base_url, settings.live_root(), world, player)
                .await
            {
                Ok(Some(latest)) if latest != position => {
                    position = latest;
                    let link = deep_link(base_url, world, position);
                    map_log!(self.options.verbose, url = %link, "Following player");
                    page.navigate(&link).await?;
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "Position refresh failed"),
            }

            if is_ready(page).await {
                break;
            }
            if Instant::now() >= deadline {
                map_log!(self.options.verbose, player = %player, "Map not ready in time, capturing anyway");
                break;
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }

        Ok(page.screenshot().await?)
    }
}

async fn is_ready(page: &mut dyn RenderPage) -> bool {
    page.evaluate(READINESS_CHECK)
        .await
        .ok()
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}
