#![allow(clippy::unwrap_used)]
// Integration tests for `PushChannel` against a scripted local
// Socket.IO-over-WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use meterdeck_api::{PushChannel, PushEvent, ReconnectConfig};

// ── Helpers ─────────────────────────────────────────────────────────

const OPEN: &str = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

/// Accept one connection, run the Socket.IO handshake, then send `frames`
/// and close. Returns the frames the client sent back.
async fn serve_once(listener: &TcpListener, frames: Vec<String>) -> Vec<String> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    let mut received = Vec::new();

    ws.send(Message::Text(OPEN.into())).await.unwrap();
    if let Some(Ok(Message::Text(text))) = ws.next().await {
        received.push(text.as_str().to_owned());
    }
    ws.send(Message::Text(r#"40{"sid":"n1"}"#.into())).await.unwrap();

    for frame in frames {
        ws.send(Message::Text(frame.into())).await.unwrap();
    }

    // Give the client a chance to answer pings before we hang up
    if let Ok(Some(Ok(Message::Text(text)))) =
        tokio::time::timeout(Duration::from_millis(200), ws.next()).await
    {
        received.push(text.as_str().to_owned());
    }

    let _ = ws.close(None).await;
    received
}

async fn next_event(rx: &mut broadcast::Receiver<Arc<PushEvent>>) -> Arc<PushEvent> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for push event")
        .unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_session_delivers_events_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = Url::parse(&format!("http://{addr}")).unwrap();

    let frames = vec![
        "2".to_owned(),
        json!([
            "mqtt_message",
            { "topic": "energy/aa:bb/status", "payload": { "status": "offline" } }
        ])
        .to_string()
        .replacen('[', "42[", 1),
    ];
    let server = tokio::spawn(async move { serve_once(&listener, frames).await });

    let cancel = CancellationToken::new();
    let reconnect = ReconnectConfig {
        delay: Duration::from_millis(50),
        max_attempts: Some(0),
    };
    let channel = PushChannel::spawn(&base, reconnect, cancel.clone()).unwrap();
    let mut rx = channel.subscribe();

    assert_eq!(*next_event(&mut rx).await, PushEvent::Connected);
    assert_eq!(
        *next_event(&mut rx).await,
        PushEvent::MqttMessage {
            topic: "energy/aa:bb/status".into(),
            payload: json!({ "status": "offline" }),
        }
    );
    assert_eq!(*next_event(&mut rx).await, PushEvent::Disconnected);

    let received = server.await.unwrap();
    assert_eq!(received.first().map(String::as_str), Some("40"));
    assert!(received.iter().any(|f| f == "3"), "ping was not answered: {received:?}");

    channel.shutdown();
}

#[tokio::test]
async fn test_gives_up_after_bounded_attempts() {
    // Bind then drop so nothing is listening on the port
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let base = Url::parse(&format!("http://{addr}")).unwrap();

    let reconnect = ReconnectConfig {
        delay: Duration::from_millis(10),
        max_attempts: Some(2),
    };
    let channel = PushChannel::spawn(&base, reconnect, CancellationToken::new()).unwrap();
    let mut rx = channel.subscribe();

    tokio::time::timeout(Duration::from_secs(5), channel.join())
        .await
        .expect("push loop should stop after its retry budget");

    // Never connected, so never disconnected either
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_shutdown_stops_the_loop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = Url::parse(&format!("http://{addr}")).unwrap();

    // Accept and hold the socket open without ever sending a frame
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let cancel = CancellationToken::new();
    let channel = PushChannel::spawn(&base, ReconnectConfig::default(), cancel.clone()).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), channel.join())
        .await
        .expect("cancelled push loop should exit promptly");
    server.abort();
}
