//! [`MapRenderer`] over the W3C WebDriver HTTP protocol.
//!
//! Works against chromedriver or geckodriver. Each [`open`](MapRenderer::open)
//! creates a fresh headless session that is deleted on close.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use super::renderer::{MapRenderer, RenderPage, Viewport};
use crate::error::{Error, RenderError, Result};

/// Slack on top of the page-load timeout for the HTTP round trip itself.
const COMMAND_SLACK: Duration = Duration::from_secs(5);
const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WebDriverRenderer {
    http: reqwest::Client,
    endpoint: String,
}

impl WebDriverRenderer {
    pub fn new(http: reqwest::Client, endpoint: &str) -> Result<Self> {
        let parsed = Url::parse(endpoint.trim())
            .map_err(|e| Error::config(format!("invalid WebDriver URL '{endpoint}': {e}")))?;
        Ok(Self {
            http,
            endpoint: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn capabilities(viewport: Viewport) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "goog:chromeOptions": {
                        "args": [
                            "--headless=new",
                            "--disable-gpu",
                            "--no-sandbox",
                            "--hide-scrollbars",
                            format!("--window-size={},{}", viewport.width, viewport.height),
                        ]
                    },
                    "moz:firefoxOptions": { "args": ["-headless"] }
                }
            }
        })
    }
}

#[async_trait]
impl MapRenderer for WebDriverRenderer {
    async fn open(
        &self,
        url: &str,
        viewport: Viewport,
        load_timeout: Duration,
    ) -> std::result::Result<Box<dyn RenderPage>, RenderError> {
        let created = command(
            &self.http,
            Method::POST,
            &format!("{}/session", self.endpoint),
            Some(Self::capabilities(viewport)),
            SESSION_TIMEOUT,
        )
        .await?;
        let session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| RenderError::protocol("new session response has no sessionId"))?;
        debug!(session_id, "WebDriver session created");

        let mut page = WebDriverPage {
            http: self.http.clone(),
            session_url: format!("{}/session/{session_id}", self.endpoint),
            load_timeout,
            closed: false,
        };

        page.post(
            "timeouts",
            json!({ "pageLoad": load_timeout.as_millis() as u64 }),
        )
        .await?;
        // Not every driver honours window sizing; the page is still usable.
        if let Err(e) = page
            .post(
                "window/rect",
                json!({ "width": viewport.width, "height": viewport.height }),
            )
            .await
        {
            debug!(error = %e, "Failed to size browser window");
        }
        page.navigate(url).await?;
        Ok(Box::new(page))
    }
}

/// An open WebDriver session.
pub struct WebDriverPage {
    http: reqwest::Client,
    session_url: String,
    load_timeout: Duration,
    closed: bool,
}

impl WebDriverPage {
    async fn post(&self, path: &str, body: Value) -> std::result::Result<Value, RenderError> {
        command(
            &self.http,
            Method::POST,
            &format!("{}/{path}", self.session_url),
            Some(body),
            self.load_timeout + COMMAND_SLACK,
        )
        .await
    }
}

#[async_trait]
impl RenderPage for WebDriverPage {
    async fn navigate(&mut self, url: &str) -> std::result::Result<(), RenderError> {
        self.post("url", json!({ "url": url })).await.map(|_| ())
    }

    async fn evaluate(&mut self, expression: &str) -> std::result::Result<Value, RenderError> {
        self.post(
            "execute/sync",
            json!({ "script": format!("return ({expression});"), "args": [] }),
        )
        .await
    }

    async fn screenshot(&mut self) -> std::result::Result<Vec<u8>, RenderError> {
        let value = command(
            &self.http,
            Method::GET,
            &format!("{}/screenshot", self.session_url),
            None,
            self.load_timeout + COMMAND_SLACK,
        )
        .await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| RenderError::protocol("screenshot value is not a string"))?;
        Ok(STANDARD.decode(encoded)?)
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = command(
            &self.http,
            Method::DELETE,
            &self.session_url,
            None,
            SESSION_TIMEOUT,
        )
        .await
        {
            warn!(error = %e, "Failed to delete WebDriver session");
        }
    }
}

impl Drop for WebDriverPage {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Aborted before close: delete the session in the background.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let http = self.http.clone();
            let url = std::mem::take(&mut self.session_url);
            handle.spawn(async move {
                let _ = http.delete(url).timeout(SESSION_TIMEOUT).send().await;
            });
        }
    }
}

/// Issue one WebDriver command and unwrap its `value`.
async fn command(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
    timeout: Duration,
) -> std::result::Result<Value, RenderError> {
    let mut request = http.request(method, url).timeout(timeout);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let mut payload: Value = response.json().await?;
    let value = payload
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    match value.get("error").and_then(Value::as_str) {
        Some(error) => Err(RenderError::WebDriver {
            error: error.to_string(),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        None => Err(RenderError::protocol(format!("{url} returned HTTP {status}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests build bare clients, so install the rustls provider first.
    fn test_http_client() -> reqwest::Client {
        crate::utils::install_rustls_provider();
        reqwest::Client::new()
    }
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    type Log = Arc<Mutex<Vec<(String, String, Value)>>>;

    async fn read_request(socket: &mut TcpStream) -> (String, String, Value) {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            data.extend_from_slice(&buf[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            assert!(n > 0, "connection closed before headers");
        };
        let head = String::from_utf8_lossy(&data[..header_end]).to_string();
        let length = head
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.eq_ignore_ascii_case("content-length")
                    .then(|| v.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        while data.len() < header_end + length {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }
        let mut parts = head.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();
        let body = serde_json::from_slice(&data[header_end..]).unwrap_or(Value::Null);
        (method, path, body)
    }

    /// A driver that accepts everything and fails scripts containing "boom".
    async fn fake_driver() -> (String, Log) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let seen = seen.clone();
                tokio::spawn(async move {
                    let (method, path, body) = read_request(&mut socket).await;
                    let (status, reply) = match (method.as_str(), path.as_str()) {
                        ("POST", "/session") => {
                            (200, json!({"value": {"sessionId": "s1", "capabilities": {}}}))
                        }
                        ("POST", "/session/s1/execute/sync")
                            if body["script"].as_str().unwrap_or("").contains("boom") =>
                        {
                            (
                                500,
                                json!({"value": {"error": "javascript error", "message": "boom"}}),
                            )
                        }
                        ("POST", "/session/s1/execute/sync") => (200, json!({"value": true})),
                        ("GET", "/session/s1/screenshot") => (200, json!({"value": "iVBORw=="})),
                        ("POST", _) | ("DELETE", _) => (200, json!({"value": null})),
                        _ => (404, json!({"value": {"error": "unknown command", "message": ""}})),
                    };
                    seen.lock().push((method, path, body));
                    let text = reply.to_string();
                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{text}",
                        text.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        (base, log)
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        assert!(WebDriverRenderer::new(test_http_client(), "not a url").is_err());
        let renderer =
            WebDriverRenderer::new(test_http_client(), "http://127.0.0.1:9515/").unwrap();
        assert_eq!(renderer.endpoint(), "http://127.0.0.1:9515");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (base, log) = fake_driver().await;
        let renderer = WebDriverRenderer::new(test_http_client(), &base).unwrap();

        let mut page = renderer
            .open("http://map/#world:1:2:3", Viewport::default(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(page.evaluate("1 + 1 === 2").await.unwrap(), Value::Bool(true));
        assert_eq!(page.screenshot().await.unwrap(), vec![0x89, b'P', b'N', b'G']);
        page.close().await;

        let log = log.lock();
        let calls: Vec<_> = log.iter().map(|(m, p, _)| format!("{m} {p}")).collect();
        assert_eq!(
            calls,
            vec![
                "POST /session",
                "POST /session/s1/timeouts",
                "POST /session/s1/window/rect",
                "POST /session/s1/url",
                "POST /session/s1/execute/sync",
                "GET /session/s1/screenshot",
                "DELETE /session/s1",
            ]
        );
        assert_eq!(log[1].2["pageLoad"], 5000);
        assert_eq!(log[2].2["width"], 1280);
        assert_eq!(log[3].2["url"], "http://map/#world:1:2:3");
        assert_eq!(log[4].2["script"], "return (1 + 1 === 2);");
    }

    #[tokio::test]
    async fn test_driver_error_is_surfaced() {
        let (base, _) = fake_driver().await;
        let renderer = WebDriverRenderer::new(test_http_client(), &base).unwrap();
        let mut page = renderer
            .open("http://map/", Viewport::default(), Duration::from_secs(5))
            .await
            .unwrap();

        match page.evaluate("boom()").await {
            Err(RenderError::WebDriver { error, message }) => {
                assert_eq!(error, "javascript error");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        page.close().await;
    }
}
