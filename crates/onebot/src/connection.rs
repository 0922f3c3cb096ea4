//! A persistent, self-healing gateway connection.
//!
//! Each [`OneBotConnection`] owns one background task that connects, drives a
//! `select!` over the outbound queue, inbound frames, keepalive and shutdown,
//! and reconnects after a fixed delay when the socket is lost.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{ActionError, Error, Result};
use crate::frame::{MessageBody, MessageSegment, RequestFrame, ResponseFrame};
use crate::message::PlayerChange;
use crate::target::{ConnectionSettings, build_ws_url};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<ActionResult>>>>;
type ActionResult = std::result::Result<ResponseFrame, ActionError>;

/// Connection lifecycle as observed through [`OneBotConnection::subscribe_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Tunables for a connection. The defaults suit production use.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    /// Fixed wait before every reconnect attempt.
    pub reconnect_delay: Duration,
    /// WebSocket ping interval while connected.
    pub keepalive_interval: Duration,
    /// The connection counts as lost when nothing arrives this long after a ping.
    pub pong_timeout: Duration,
    pub queue_capacity: usize,
    /// How long a send may wait for room in the outbound queue.
    pub enqueue_grace: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(20),
            queue_capacity: 256,
            enqueue_grace: Duration::from_secs(1),
        }
    }
}

/// Default wait for [`OneBotConnection::send_text_with_result`].
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to one gateway connection. Dropping it stops the background task.
pub struct OneBotConnection {
    settings: ConnectionSettings,
    options: ConnectionOptions,
    outbound: mpsc::Sender<RequestFrame>,
    pending: PendingMap,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl OneBotConnection {
    /// Start a connection with default options. Must be called inside a tokio runtime.
    pub fn spawn(settings: ConnectionSettings) -> Self {
        Self::spawn_with(settings, ConnectionOptions::default())
    }

    pub fn spawn_with(settings: ConnectionSettings, options: ConnectionOptions) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(options.queue_capacity.max(1));
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let worker = Worker {
            settings: settings.clone(),
            options,
            outbound: outbound_rx,
            pending: pending.clone(),
            state: state_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run());

        Self {
            settings,
            options,
            outbound,
            pending,
            state,
            cancel,
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Number of await-result calls still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Best-effort plain text send.
    pub async fn send_text(&self, text: impl Into<String>) {
        self.fire(MessageBody::Text(text.into())).await;
    }

    /// Best-effort image send, optionally preceded by a caption segment.
    pub async fn send_image(&self, image: &[u8], caption: Option<&str>) {
        let mut segments = Vec::with_capacity(2);
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            segments.push(MessageSegment::text(caption));
        }
        segments.push(MessageSegment::base64_image(STANDARD.encode(image)));
        self.fire(MessageBody::Segments(segments)).await;
    }

    /// Best-effort composite join/leave message. Does nothing for an empty diff.
    pub async fn send_player_change(&self, change: &PlayerChange) {
        if let Some(text) = change.render() {
            self.send_text(text).await;
        }
    }

    /// Send text and wait for the gateway's answer.
    pub async fn send_text_with_result(
        &self,
        text: impl Into<String>,
        timeout: Duration,
    ) -> std::result::Result<ResponseFrame, ActionError> {
        if self.settings.ws_url.trim().is_empty() {
            return Err(ActionError::MissingField("ws_url"));
        }
        let target = self.settings.numeric_target()?;

        let echo = uuid::Uuid::new_v4().simple().to_string();
        let frame = RequestFrame::send_message(
            self.settings.target_kind,
            target,
            MessageBody::Text(text.into()),
        )
        .with_echo(echo.clone());

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(echo.clone(), tx);
        let _entry = PendingEntry {
            pending: &self.pending,
            echo: &echo,
        };

        info!(
            action = %frame.action,
            target_id = %self.settings.target_id,
            "Sending OneBot action"
        );
        if self
            .outbound
            .send_timeout(frame, self.options.enqueue_grace)
            .await
            .is_err()
        {
            return Err(ActionError::QueueNotReady);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result?.into_result(),
            Ok(Err(_)) => Err(ActionError::Disconnected),
            Err(_) => {
                warn!(target_id = %self.settings.target_id, "OneBot action timed out");
                Err(ActionError::Timeout)
            }
        }
    }

    /// Close the transport and stop reconnecting. Pending calls fail with `Disconnected`.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn fire(&self, body: MessageBody) {
        if !self.settings.is_addressable() {
            return;
        }
        let Ok(target) = self.settings.numeric_target() else {
            debug!(target_id = %self.settings.target_id, "Dropping message for non-numeric target");
            return;
        };
        let frame = RequestFrame::send_message(self.settings.target_kind, target, body);
        if let Err(e) = self
            .outbound
            .send_timeout(frame, self.options.enqueue_grace)
            .await
        {
            debug!(error = %e, "Outbound queue not ready, message dropped");
        }
    }
}

impl Drop for OneBotConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Removes a correlation id from the pending map when the waiting call
/// finishes or is dropped. Removing an already resolved id is a no-op.
struct PendingEntry<'a> {
    pending: &'a PendingMap,
    echo: &'a str,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.echo);
    }
}

enum Exit {
    Lost,
    Stopped,
}

struct Worker {
    settings: ConnectionSettings,
    options: ConnectionOptions,
    outbound: mpsc::Receiver<RequestFrame>,
    pending: PendingMap,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        let url = self.settings.ws_url.clone();
        if let Err(e) = build_request(&self.settings) {
            error!(url = %url, error = %e, "Invalid OneBot endpoint, connection disabled");
            return;
        }

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.state.send_replace(ConnectionState::Connecting);
            info!(url = %url, "Connecting to OneBot gateway");

            let connected = match build_request(&self.settings) {
                Ok(request) => tokio::select! {
                    result = connect_async(request) => result,
                    _ = self.cancel.cancelled() => break,
                },
                Err(e) => {
                    error!(url = %url, error = %e, "Failed to build OneBot handshake");
                    break;
                }
            };

            match connected {
                Ok((ws, _)) => {
                    info!(url = %url, "OneBot gateway connected");
                    self.state.send_replace(ConnectionState::Connected);
                    let exit = self.drive(ws).await;
                    self.state.send_replace(ConnectionState::Disconnected);
                    fail_pending(&self.pending);
                    if matches!(exit, Exit::Stopped) {
                        break;
                    }
                    warn!(url = %url, "OneBot gateway connection lost");
                }
                Err(e) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    warn!(url = %url, error = %e, "OneBot connection failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.options.reconnect_delay) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        fail_pending(&self.pending);
        debug!(url = %url, "OneBot connection task stopped");
    }

    async fn drive(&mut self, ws: WsStream) -> Exit {
        let (mut sink, mut stream) = ws.split();
        let period = self.options.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Set when a ping goes out unanswered; any inbound frame clears it.
        let mut pong_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Exit::Stopped;
                }

                frame = self.outbound.recv() => {
                    let Some(frame) = frame else {
                        let _ = sink.send(Message::Close(None)).await;
                        return Exit::Stopped;
                    };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode OneBot frame");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::text(text)).await {
                        warn!(error = %e, "OneBot send failed");
                        return Exit::Lost;
                    }
                    debug!(action = %frame.action, "OneBot frame sent");
                }

                message = stream.next() => {
                    if matches!(message, Some(Ok(_))) {
                        pong_deadline = None;
                    }
                    match message {
                        Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => self.dispatch(text),
                            Err(_) => debug!(len = data.len(), "Ignoring non-UTF-8 binary frame"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "OneBot gateway closed the socket");
                            return Exit::Lost;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "OneBot receive failed");
                            return Exit::Lost;
                        }
                        None => return Exit::Lost,
                    }
                }

                _ = keepalive.tick() => {
                    if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                        warn!(error = %e, "OneBot keepalive failed");
                        return Exit::Lost;
                    }
                    pong_deadline.get_or_insert(Instant::now() + self.options.pong_timeout);
                    trace!("OneBot keepalive sent");
                }

                _ = tokio::time::sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                    warn!(
                        timeout_ms = self.options.pong_timeout.as_millis() as u64,
                        "OneBot gateway stopped answering keepalives"
                    );
                    return Exit::Lost;
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let frame: ResponseFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(_) => {
                debug!(len = text.len(), "Ignoring non-JSON OneBot frame");
                return;
            }
        };
        let waiter = frame
            .echo_id()
            .and_then(|echo| self.pending.lock().remove(&echo));
        match waiter {
            Some(tx) => {
                let _ = tx.send(Ok(frame));
            }
            None => debug!("Unsolicited OneBot event discarded"),
        }
    }
}

fn fail_pending(pending: &PendingMap) {
    let drained: Vec<_> = pending.lock().drain().collect();
    if drained.is_empty() {
        return;
    }
    warn!(count = drained.len(), "Failing pending OneBot requests: disconnected");
    for (_, tx) in drained {
        let _ = tx.send(Err(ActionError::Disconnected));
    }
}

fn build_request(settings: &ConnectionSettings) -> Result<Request<()>> {
    let url = build_ws_url(&settings.ws_url, &settings.access_token)?;
    let mut request = url.as_str().into_client_request()?;
    let token = settings.access_token.trim();
    if !token.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::handshake(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}
