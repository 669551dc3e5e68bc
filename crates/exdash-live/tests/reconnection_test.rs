/*
[INPUT]:  Socket closes under paused time and against a local WebSocket server
[OUTPUT]: Reconnection backoff behaviour verification
[POS]:    Integration test layer - network resilience
[UPDATE]: When changing reconnection logic
*/

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Harness, MockBackend, CountingRefresher, advance};
use exdash_adapter::WsTransport;
use exdash_live::{
    ActivityLog, BackoffPolicy, Collaborators, ConnectionPhase, Indicator, LiveStreamManager,
    ManagerSettings,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

#[tokio::test(start_paused = true)]
async fn abnormal_close_reconnects_after_floor() {
    let h = Harness::new();
    h.manager.start_live("testnet").await.unwrap();
    let first = h.transport.latest();
    first.open();
    first.message(r#"{"type":"status","connected":true,"env":"testnet"}"#);
    h.manager.snapshot().await.unwrap();
    assert_eq!(h.manager.indicator(), Indicator::Ok);

    first.close(1006, "");
    let snapshot = h.manager.snapshot().await.unwrap();
    assert_eq!(h.manager.indicator(), Indicator::Fail);
    assert_eq!(snapshot.phase, ConnectionPhase::Closed);
    assert!(snapshot.reconnect_pending);
    assert!(!snapshot.socket_open());
    assert_eq!(snapshot.reconnect_delay, Duration::from_millis(2_400));
    assert!(h.log_contains("WS closed (code=1006, reason=)"));
    // Keepalive is independent of the socket
    assert!(snapshot.keepalive_running);

    advance(Duration::from_millis(1_400)).await;
    assert_eq!(h.transport.open_count(), 1);

    advance(Duration::from_millis(100)).await;
    assert_eq!(h.transport.open_count(), 2);
    assert_eq!(h.backend.start_calls(), 1);
    assert_eq!(h.manager.indicator(), Indicator::Pending);

    let second = h.transport.latest();
    assert_eq!(second.url.query(), Some("env=testnet"));
    second.open();
    let snapshot = h.manager.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, ConnectionPhase::Connected);
    assert_eq!(snapshot.reconnect_delay, Duration::from_millis(1_500));
}

#[tokio::test(start_paused = true)]
async fn backoff_grows_until_a_socket_opens() {
    let h = Harness::new();
    h.manager.start_live("testnet").await.unwrap();

    let expected = [1_500u64, 2_400, 3_840, 6_144, 9_830, 15_728, 20_000, 20_000];
    for (attempt, delay_ms) in expected.iter().enumerate() {
        h.transport.latest().close(1006, "");
        h.manager.snapshot().await.unwrap();

        advance(Duration::from_millis(delay_ms - 1)).await;
        assert_eq!(h.transport.open_count(), attempt + 1, "fired early");

        advance(Duration::from_millis(1)).await;
        assert_eq!(h.transport.open_count(), attempt + 2, "did not fire");
    }

    assert_eq!(h.backend.start_calls(), 1);

    h.transport.latest().open();
    let snapshot = h.manager.snapshot().await.unwrap();
    assert_eq!(snapshot.reconnect_delay, Duration::from_millis(1_500));
}

#[tokio::test(start_paused = true)]
async fn superseded_connection_events_are_ignored() {
    let h = Harness::new();
    h.manager.start_live("testnet").await.unwrap();
    let first = h.transport.latest();
    first.close(1006, "");
    h.manager.snapshot().await.unwrap();
    advance(Duration::from_millis(1_500)).await;

    let second = h.transport.latest();
    second.open();
    second.message(r#"{"type":"status","connected":true}"#);
    h.manager.snapshot().await.unwrap();

    first.message(r#"{"type":"status","connected":false}"#);
    first.close(1006, "");
    let snapshot = h.manager.snapshot().await.unwrap();

    assert_eq!(h.manager.indicator(), Indicator::Ok);
    assert_eq!(snapshot.phase, ConnectionPhase::Connected);
    assert!(!snapshot.reconnect_pending);
}

#[tokio::test(start_paused = true)]
async fn normal_close_also_reconnects() {
    let h = Harness::new();
    h.manager.start_live("testnet").await.unwrap();
    let socket = h.transport.latest();
    socket.open();
    socket.close(4001, "listen key expired");
    h.manager.snapshot().await.unwrap();
    assert!(h.log_contains("WS closed (code=4001, reason=listen key expired)"));

    advance(Duration::from_millis(1_500)).await;
    assert_eq!(h.transport.open_count(), 2);
}

#[tokio::test]
async fn reconnects_over_real_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // First connection: greet, then drop without a close handshake
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(r#"{"type":"hello","message":"first"}"#.into()))
            .await
            .unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"status","connected":true,"env":"testnet"}"#.into(),
        ))
        .await
        .unwrap();
        while let Some(Ok(frame)) = ws.next().await {
            if frame.is_close() {
                break;
            }
        }
    });

    let backend = MockBackend::new();
    let log = ActivityLog::default();
    let settings = ManagerSettings {
        backoff: BackoffPolicy {
            floor: Duration::from_millis(50),
            ceiling: Duration::from_millis(200),
            factor: 1.6,
        },
        ..ManagerSettings::default()
    };
    let manager = LiveStreamManager::new(
        Collaborators {
            backend: backend.clone(),
            transport: Arc::new(WsTransport::new()),
            balances: CountingRefresher::new(),
            log: log.clone(),
        },
        Url::parse(&format!("ws://{addr}/ws/user-stream")).unwrap(),
        settings,
    );

    manager.start_live("testnet").await.unwrap();
    let mut indicator = manager.subscribe_indicator();
    timeout(
        Duration::from_secs(5),
        indicator.wait_for(|state| *state == Indicator::Ok),
    )
    .await
    .expect("indicator never reached ok")
    .unwrap();

    let lines = log.texts();
    assert!(lines.iter().any(|line| line == "WS hello: first"));
    assert!(lines.iter().any(|line| line.starts_with("WS closed (code=1006")));
    assert_eq!(backend.start_calls(), 1);

    manager.shutdown_and_wait().await.unwrap();
    timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not see the close")
        .unwrap();
}
