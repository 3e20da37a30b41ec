//! Socket.IO push channel with auto-reconnect.
//!
//! Speaks just enough Engine.IO v4 / Socket.IO v5 over a WebSocket to follow
//! the backend's event stream, and fans parsed events out through a
//! [`tokio::sync::broadcast`] channel. Long-polling is never negotiated; the
//! client goes straight to `transport=websocket`.
//!
//! # Example
//!
//! ```rust,ignore
//! use meterdeck_api::push::{PushChannel, PushEvent, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let base = Url::parse("http://192.168.1.50:5000")?;
//! let channel = PushChannel::spawn(&base, ReconnectConfig::default(), CancellationToken::new())?;
//! let mut rx = channel.subscribe();
//!
//! while let Ok(event) = rx.recv().await {
//!     if let PushEvent::MqttMessage { topic, .. } = event.as_ref() {
//!         println!("{topic}");
//!     }
//! }
//!
//! channel.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::{LooseNumber, RawMeter};

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long to wait for the Engine.IO open packet before giving up.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

// ── PushEvent ────────────────────────────────────────────────────────

/// An event delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    /// The Socket.IO namespace handshake completed.
    Connected,
    /// A previously connected session ended.
    Disconnected,
    /// A raw MQTT message relayed by the backend. `payload` is the decoded
    /// JSON when the device sent JSON, otherwise a JSON string.
    MqttMessage { topic: String, payload: Value },
    /// A meter reported its relay state (`"Tændt"` / `"Slukket"`).
    PowerStatus {
        mac: String,
        status: String,
        timestamp: Option<String>,
    },
    /// A meter was named or renumbered.
    MeterUpdated {
        mac: String,
        name: Option<String>,
        number: Option<LooseNumber>,
    },
    /// The backend noticed meters that report data but have no name.
    UnnamedMeters { count: usize, meters: Vec<RawMeter> },
    /// Any event name this client does not model.
    Other { name: String, data: Value },
}

#[derive(Debug, Deserialize)]
struct MqttMessagePayload {
    topic: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct PowerStatusPayload {
    mac: String,
    status: String,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeterUpdatedPayload {
    mac: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    number: Option<LooseNumber>,
}

#[derive(Debug, Deserialize)]
struct UnnamedMetersPayload {
    #[serde(default)]
    count: usize,
    #[serde(default)]
    meters: Vec<RawMeter>,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Fixed-delay reconnection policy for the push channel.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Pause between attempts. Default: 1s.
    pub delay: Duration,

    /// Consecutive failed attempts before giving up.
    /// `None` means retry forever. Default: 10.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: Some(10),
        }
    }
}

// ── PushChannel ──────────────────────────────────────────────────────

/// Handle to a running push channel.
///
/// Call [`shutdown`](Self::shutdown) (or cancel the token passed to
/// [`spawn`](Self::spawn)) to tear down the background task.
pub struct PushChannel {
    event_tx: broadcast::Sender<Arc<PushEvent>>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl PushChannel {
    /// Spawn the connection loop against the backend at `base_url`.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. Subscribe before awaiting anything to see `Connected`.
    pub fn spawn(
        base_url: &Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let url = socket_url(base_url)?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let task_tx = event_tx.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            push_loop(url, task_tx, reconnect, task_cancel).await;
        });

        Ok(Self {
            event_tx,
            cancel,
            task,
        })
    }

    /// Get a new receiver for the event stream.
    ///
    /// A consumer that falls behind receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PushEvent>> {
        self.event_tx.subscribe()
    }

    /// Signal the background task to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether the background loop has exited (cancelled or out of retries).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the background loop to exit.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Derive the Socket.IO WebSocket endpoint from the backend base URL.
///
/// `http://host:5000/prefix` becomes
/// `ws://host:5000/prefix/socket.io/?EIO=4&transport=websocket`.
pub fn socket_url(base_url: &Url) -> Result<Url, Error> {
    let mut url = base_url.clone();
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::InvalidBaseUrl(format!(
                "unsupported scheme for push channel: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::InvalidBaseUrl(base_url.to_string()))?;
    url.set_fragment(None);
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| Error::InvalidBaseUrl(base_url.to_string()))?;
        path.pop_if_empty();
        path.push("socket.io");
        path.push("");
    }
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on end, wait the fixed delay → reconnect.
async fn push_loop(
    url: Url,
    event_tx: broadcast::Sender<Arc<PushEvent>>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let mut established = false;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = run_session(&url, &event_tx, &cancel, &mut established) => Some(result),
        };

        if established {
            let _ = event_tx.send(Arc::new(PushEvent::Disconnected));
            attempt = 0;
        }

        match result {
            None => break,
            Some(Ok(())) => tracing::info!("push session ended"),
            Some(Err(e)) => tracing::warn!(error = %e, attempt, "push channel error"),
        }

        if cancel.is_cancelled() {
            break;
        }

        if let Some(max) = reconnect.max_attempts {
            if attempt >= max {
                tracing::error!(max_attempts = max, "push reconnection limit reached, giving up");
                break;
            }
        }
        attempt += 1;

        tracing::info!(
            delay_ms = u64::try_from(reconnect.delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(reconnect.delay) => {}
        }
    }

    tracing::debug!("push loop exiting");
}

// ── Single session lifecycle ─────────────────────────────────────────

/// Run one WebSocket session until it drops. `established` flips to `true`
/// once the namespace handshake completes.
async fn run_session(
    url: &Url,
    event_tx: &broadcast::Sender<Arc<PushEvent>>,
    cancel: &CancellationToken,
    established: &mut bool,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting push channel");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::PushConnect(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
        .await
        .map_err(|e| Error::PushConnect(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();
    let mut deadline = Instant::now() + HANDSHAKE_TIMEOUT;
    let mut liveness = HANDSHAKE_TIMEOUT;

    loop {
        let text = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Text("41".into())).await;
                return Ok(());
            }
            () = tokio::time::sleep_until(deadline) => {
                return Err(Error::PushProtocol(format!(
                    "no traffic for {}s",
                    liveness.as_secs()
                )));
            }
            frame = read.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => text,
                Some(Ok(tungstenite::Message::Close(_))) | None => {
                    tracing::info!("push websocket closed");
                    return Ok(());
                }
                Some(Err(e)) => return Err(Error::PushConnect(e.to_string())),
                // Binary attachments, transport-level ping/pong
                Some(Ok(_)) => continue,
            },
        };

        deadline = Instant::now() + liveness;

        match parse_frame(text.as_str()) {
            Frame::Open(handshake) => {
                tracing::debug!(
                    sid = %handshake.sid,
                    ping_interval_ms = handshake.ping_interval,
                    ping_timeout_ms = handshake.ping_timeout,
                    "engine.io open"
                );
                liveness = handshake.liveness();
                deadline = Instant::now() + liveness;
                write
                    .send(tungstenite::Message::Text("40".into()))
                    .await
                    .map_err(|e| Error::PushConnect(e.to_string()))?;
            }
            Frame::Ping => {
                write
                    .send(tungstenite::Message::Text("3".into()))
                    .await
                    .map_err(|e| Error::PushConnect(e.to_string()))?;
            }
            Frame::Connected => {
                tracing::info!("push channel connected");
                *established = true;
                let _ = event_tx.send(Arc::new(PushEvent::Connected));
            }
            Frame::Event(event) => {
                // No active subscribers is fine
                let _ = event_tx.send(Arc::new(event));
            }
            Frame::ConnectError(message) => {
                return Err(Error::PushProtocol(format!("namespace refused: {message}")));
            }
            Frame::Close | Frame::NamespaceDisconnect => {
                tracing::info!("backend closed the push session");
                return Ok(());
            }
            Frame::Ignored => {}
            Frame::Malformed(reason) => {
                tracing::debug!(reason, frame = text.as_str(), "skipping undecodable push frame");
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Engine.IO open packet payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Handshake {
    #[serde(default)]
    sid: String,
    #[serde(default = "default_ping_interval")]
    ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl Handshake {
    /// Silence longer than this means the session is dead.
    fn liveness(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

#[derive(Debug, PartialEq)]
enum Frame {
    Open(Handshake),
    Close,
    Ping,
    Connected,
    NamespaceDisconnect,
    ConnectError(String),
    Event(PushEvent),
    Ignored,
    Malformed(&'static str),
}

/// Classify one Engine.IO text frame.
fn parse_frame(text: &str) -> Frame {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Frame::Malformed("empty frame");
    };
    let rest = chars.as_str();

    match kind {
        '0' => match serde_json::from_str::<Handshake>(rest) {
            Ok(handshake) => Frame::Open(handshake),
            Err(_) => Frame::Malformed("bad open packet"),
        },
        '1' => Frame::Close,
        '2' => Frame::Ping,
        '3' | '5' | '6' => Frame::Ignored,
        '4' => parse_socket_packet(rest),
        _ => Frame::Malformed("unknown engine.io packet type"),
    }
}

/// Classify the Socket.IO packet carried inside an Engine.IO message.
fn parse_socket_packet(packet: &str) -> Frame {
    let mut chars = packet.chars();
    let Some(kind) = chars.next() else {
        return Frame::Malformed("empty socket.io packet");
    };
    let body = strip_namespace_and_ack(chars.as_str());

    match kind {
        '0' => Frame::Connected,
        '1' => Frame::NamespaceDisconnect,
        '2' => match serde_json::from_str::<Vec<Value>>(body) {
            Ok(args) => decode_event(args).map_or(Frame::Malformed("event without a name"), Frame::Event),
            Err(_) => Frame::Malformed("event payload is not a JSON array"),
        },
        '4' => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
                .unwrap_or_else(|| body.to_owned());
            Frame::ConnectError(message)
        }
        // Acks and binary events are never requested by this client
        _ => Frame::Ignored,
    }
}

/// Drop an optional `/namespace,` prefix and a numeric ack id.
fn strip_namespace_and_ack(body: &str) -> &str {
    let body = match body.strip_prefix('/') {
        Some(nsp) => nsp.split_once(',').map_or("", |(_, rest)| rest),
        None => body,
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// Turn `["name", data]` into a typed event.
fn decode_event(mut args: Vec<Value>) -> Option<PushEvent> {
    if args.is_empty() {
        return None;
    }
    let data = if args.len() > 1 { args.swap_remove(1) } else { Value::Null };
    let Value::String(name) = args.swap_remove(0) else {
        return None;
    };

    let event = match name.as_str() {
        "mqtt_message" => serde_json::from_value::<MqttMessagePayload>(data.clone())
            .ok()
            .map(|p| PushEvent::MqttMessage {
                topic: p.topic,
                payload: p.payload,
            }),
        "power_status_update" => serde_json::from_value::<PowerStatusPayload>(data.clone())
            .ok()
            .map(|p| PushEvent::PowerStatus {
                mac: p.mac,
                status: p.status,
                timestamp: p.timestamp,
            }),
        "meter_updated" => serde_json::from_value::<MeterUpdatedPayload>(data.clone())
            .ok()
            .map(|p| PushEvent::MeterUpdated {
                mac: p.mac,
                name: p.name,
                number: p.number,
            }),
        "new_unnamed_meters" => serde_json::from_value::<UnnamedMetersPayload>(data.clone())
            .ok()
            .map(|p| PushEvent::UnnamedMeters {
                count: p.count,
                meters: p.meters,
            }),
        _ => None,
    };

    Some(event.unwrap_or(PushEvent::Other { name, data }))
}

// ── Tests ────────────────────────────────────────────────────────────
