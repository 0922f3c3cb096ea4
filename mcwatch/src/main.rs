use std::sync::Arc;
use std::time::Duration;

use mc_status::StatusProber;
use mcwatch::bluemap::{MapClient, MapRenderer, MapSnapshotWorker, SnapshotOptions, WebDriverRenderer};
use mcwatch::config::AppConfig;
use mcwatch::domain::JsonServerSource;
use mcwatch::logging::init_logging;
use mcwatch::monitor::{MonitorConfig, ServerMonitor};
use mcwatch::notification::{NotificationRouter, Notifier};
use mcwatch::utils::build_http_client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let (logging, _log_guard) = init_logging(&config.log_dir)?;
    let shutdown = CancellationToken::new();
    logging.start_retention_cleanup(shutdown.clone());
    if let Some(directive) = &config.log_filter
        && let Err(e) = logging.set_filter(directive)
    {
        warn!(error = %e, "Ignoring LOG_FILTER");
    }

    info!(
        servers_file = %config.servers_file.display(),
        interval_secs = config.poll_interval.as_secs(),
        "mcwatch starting"
    );
    if config.gateway.ws_url.is_empty() {
        warn!("ONEBOT_WS_URL is not set; only bindings with their own endpoint will notify");
    }

    let http = build_http_client(Duration::ZERO)?;
    let router = Arc::new(NotificationRouter::new(config.gateway.clone()));
    let notifier: Arc<dyn Notifier> = router.clone();

    let renderer: Option<Arc<dyn MapRenderer>> = match &config.webdriver_url {
        Some(url) => {
            info!(url = %url, "Map screenshots enabled");
            Some(Arc::new(WebDriverRenderer::new(http.clone(), url)?))
        }
        None => {
            info!("WEBDRIVER_URL is not set; map screenshots disabled");
            None
        }
    };
    let map_client = Arc::new(MapClient::new(http).verbose(config.map_debug));
    let map_worker = Arc::new(MapSnapshotWorker::new(
        map_client,
        renderer,
        notifier.clone(),
        SnapshotOptions {
            verbose: config.map_debug,
            ..Default::default()
        },
    ));

    let monitor = Arc::new(
        ServerMonitor::new(
            Arc::new(JsonServerSource::new(config.servers_file.clone())),
            Arc::new(StatusProber::new()),
            notifier,
            MonitorConfig {
                poll_interval: config.poll_interval,
                player_mode: config.player_mode(),
                ..Default::default()
            },
        )
        .with_map_worker(map_worker),
    );
    monitor.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    monitor.stop();
    monitor.join().await;
    router.shutdown();
    shutdown.cancel();

    info!("mcwatch stopped");
    Ok(())
}
