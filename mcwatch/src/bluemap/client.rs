//! BlueMap HTTP client with a settings cache and world hit counter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::MapError;

/// How long a map server's `settings.json` is reused.
const SETTINGS_TTL: Duration = Duration::from_secs(300);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_LIVE_ROOT: &str = "maps";

/// The parts of `settings.json` the worker needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MapSettings {
    #[serde(rename = "liveDataRoot", default)]
    pub live_data_root: Option<String>,
    #[serde(default)]
    pub maps: Vec<String>,
}

impl MapSettings {
    pub fn live_root(&self) -> &str {
        self.live_data_root
            .as_deref()
            .map(|root| root.trim_matches('/'))
            .filter(|root| !root.is_empty())
            .unwrap_or(DEFAULT_LIVE_ROOT)
    }
}

/// A player's position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Default, Deserialize)]
struct LivePlayers {
    #[serde(default)]
    players: Vec<LivePlayer>,
}

#[derive(Debug, Deserialize)]
struct LivePlayer {
    #[serde(default)]
    name: String,
    #[serde(default)]
    foreign: bool,
    #[serde(default)]
    position: Option<LivePosition>,
}

#[derive(Debug, Deserialize)]
struct LivePosition {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

impl LivePlayer {
    fn position(&self) -> Option<Position> {
        let p = self.position.as_ref()?;
        Some(Position {
            x: p.x?,
            y: p.y?,
            z: p.z?,
        })
    }
}

#[derive(Clone)]
struct CacheEntry {
    settings: Arc<MapSettings>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Shared client for every map server the bindings point at.
pub struct MapClient {
    http: reqwest::Client,
    settings: DashMap<String, CacheEntry>,
    /// Per base URL, how often each world located a player.
    hits: Mutex<HashMap<String, HashMap<String, u64>>>,
    ttl: Duration,
    fetch_timeout: Duration,
    verbose: bool,
}

impl MapClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            settings: DashMap::new(),
            hits: Mutex::new(HashMap::new()),
            ttl: SETTINGS_TTL,
            fetch_timeout: FETCH_TIMEOUT,
            verbose: false,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Log lookups at info instead of debug.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// `settings.json` for `base_url`, served from cache within the TTL.
    pub async fn settings(&self, base_url: &str) -> Result<Arc<MapSettings>, MapError> {
        let key = normalize(base_url);
        if let Some(entry) = self.settings.get(key) {
            if !entry.is_expired() {
                trace!(base_url = %key, "Map settings cache hit");
                return Ok(entry.settings.clone());
            }
            drop(entry);
            self.settings.remove(key);
        }

        let settings: MapSettings = self.fetch_json(&format!("{key}/settings.json")).await?;
        let settings = Arc::new(settings);
        self.settings.insert(
            key.to_string(),
            CacheEntry {
                settings: settings.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(settings)
    }

    /// Worlds sorted by hit count, most successful first. Ties keep their order.
    pub fn order_worlds(&self, base_url: &str, worlds: &[String]) -> Vec<String> {
        let hits = self.hits.lock();
        let mut ordered = worlds.to_vec();
        if let Some(counts) = hits.get(normalize(base_url)) {
            ordered.sort_by_key(|world| std::cmp::Reverse(counts.get(world).copied().unwrap_or(0)));
        }
        ordered
    }

    pub fn note_hit(&self, base_url: &str, world: &str) {
        let mut hits = self.hits.lock();
        *hits
            .entry(normalize(base_url).to_string())
            .or_default()
            .entry(world.to_string())
            .or_default() += 1;
    }

    /// Search every world for `player`, preferring worlds that found players before.
    pub async fn find_player_world(
        &self,
        base_url: &str,
        settings: &MapSettings,
        player: &str,
    ) -> Result<(String, Position), MapError> {
        if settings.maps.is_empty() {
            return Err(MapError::NoWorlds);
        }

        for world in self.order_worlds(base_url, &settings.maps) {
            let live = match self.live_players(base_url, settings.live_root(), &world).await {
                Ok(live) => live,
                Err(e) => {
                    debug!(world = %world, error = %e, "Skipping world");
                    continue;
                }
            };
            let found = live
                .players
                .iter()
                .filter(|p| p.name == player && !p.foreign)
                .find_map(LivePlayer::position);
            if let Some(position) = found {
                self.note_hit(base_url, &world);
                return Ok((world, position));
            }
        }
        Err(MapError::PlayerNotFound(player.to_string()))
    }

    /// The player's current position in `world`, if still there and local.
    pub async fn find_player_position(
        &self,
        base_url: &str,
        live_root: &str,
        world: &str,
        player: &str,
    ) -> Result<Option<Position>, MapError> {
        let live = self.live_players(base_url, live_root, world).await?;
        let Some(entry) = live.players.iter().find(|p| p.name == player) else {
            return Ok(None);
        };
        if entry.foreign {
            return Ok(None);
        }
        let position = entry.position();
        if position.is_some() {
            self.note_hit(base_url, world);
        }
        Ok(position)
    }

    async fn live_players(
        &self,
        base_url: &str,
        live_root: &str,
        world: &str,
    ) -> Result<LivePlayers, MapError> {
        let url = format!("{}/{live_root}/{world}/live/players.json", normalize(base_url));
        self.fetch_json(&url).await
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, MapError> {
        if self.verbose {
            tracing::info!(url = %url, "Map GET");
        } else {
            debug!(url = %url, "Map GET");
        }

        let request_error = |source| MapError::Request {
            url: url.to_string(),
            source,
        };
        let response = self
            .http
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MapError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.json::<T>().await.map_err(request_error)
    }
}

fn normalize(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests build bare clients, so install the rustls provider first.
    fn test_http_client() -> reqwest::Client {
        crate::utils::install_rustls_provider();
        reqwest::Client::new()
    }
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve fixed JSON bodies by path; unknown paths get a 404.
    async fn serve(routes: Vec<(&'static str, String)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let head = String::from_utf8_lossy(&buf[..n]);
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let response = match routes.iter().find(|(p, _)| *p == path) {
                        Some((_, body)) => format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        ),
                        None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        (base, requests)
    }

    #[tokio::test]
    async fn test_settings_cached_within_ttl() {
        let (base, requests) = serve(vec![(
            "/settings.json",
            r#"{"liveDataRoot":"maps","maps":["world","nether"]}"#.to_string(),
        )])
        .await;
        let client = MapClient::new(test_http_client());

        let first = client.settings(&format!("{base}/")).await.unwrap();
        let second = client.settings(&base).await.unwrap();
        assert_eq!(first.maps, vec!["world", "nether"]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_settings_refetched() {
        let (base, requests) = serve(vec![("/settings.json", r#"{"maps":["w"]}"#.to_string())]).await;
        let client = MapClient::new(test_http_client()).with_ttl(Duration::ZERO);
        let settings = client.settings(&base).await.unwrap();
        assert_eq!(settings.live_root(), "maps");
        client.settings(&base).await.unwrap();
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_find_player_world_skips_foreign_and_partial() {
        let (base, _) = serve(vec![
            (
                "/live/world/live/players.json",
                r#"{"players":[{"name":"Alex","foreign":true,"position":{"x":1,"y":2,"z":3}}]}"#
                    .to_string(),
            ),
            (
                "/live/nether/live/players.json",
                r#"{"players":[{"name":"Steve","position":{"x":1,"y":2}},{"name":"Alex","foreign":false,"position":{"x":10.5,"y":64,"z":-3}}]}"#
                    .to_string(),
            ),
        ])
        .await;
        let client = MapClient::new(test_http_client());
        let settings = MapSettings {
            live_data_root: Some("live".into()),
            maps: vec!["world".into(), "nether".into(), "end".into()],
        };

        let (world, position) = client
            .find_player_world(&base, &settings, "Alex")
            .await
            .unwrap();
        assert_eq!(world, "nether");
        assert_eq!(position, Position { x: 10.5, y: 64.0, z: -3.0 });

        // The hit moves nether to the front.
        assert_eq!(
            client.order_worlds(&base, &settings.maps),
            vec!["nether", "world", "end"]
        );

        assert!(matches!(
            client.find_player_world(&base, &settings, "Steve").await,
            Err(MapError::PlayerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_player_position() {
        let (base, _) = serve(vec![(
            "/maps/world/live/players.json",
            r#"{"players":[{"name":"Alex","position":{"x":1,"y":2,"z":3}},{"name":"Far","foreign":true,"position":{"x":1,"y":2,"z":3}}]}"#
                .to_string(),
        )])
        .await;
        let client = MapClient::new(test_http_client());

        let found = client
            .find_player_position(&base, "maps", "world", "Alex")
            .await
            .unwrap();
        assert_eq!(found, Some(Position { x: 1.0, y: 2.0, z: 3.0 }));
        assert_eq!(
            client
                .find_player_position(&base, "maps", "world", "Far")
                .await
                .unwrap(),
            None
        );
        assert!(matches!(
            client.find_player_position(&base, "maps", "nope", "Alex").await,
            Err(MapError::Status { status: 404, .. })
        ));
    }

    #[test]
    fn test_world_order_is_stable() {
        let client = MapClient::new(test_http_client());
        let worlds: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(client.order_worlds("http://m", &worlds), worlds);

        client.note_hit("http://m/", "c");
        client.note_hit("http://m", "d");
        client.note_hit("http://m", "d");
        assert_eq!(
            client.order_worlds("http://m", &worlds),
            vec!["d", "c", "a", "b"]
        );
        // Other servers are unaffected.
        assert_eq!(client.order_worlds("http://other", &worlds), worlds);
    }
}
