/*
[INPUT]:  Test scenarios that need scripted backend, transport and refresher
[OUTPUT]: In-memory collaborators and a manager wired to them
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When collaborator traits change
*/

//! Common test utilities for exdash-live tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use exdash_adapter::{
    DashboardError, StreamAck, StreamBackend, StreamEnvironment, StreamTransport, TransportEvent,
    TransportEventSender, TransportHandle,
};
use exdash_live::{
    ActivityLog, BalanceRefresher, Collaborators, LiveStreamManager, ManagerSettings,
};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const STREAM_URL: &str = "ws://127.0.0.1:8000/ws/user-stream";

pub fn ack_ok() -> StreamAck {
    StreamAck {
        ok: true,
        error: None,
    }
}

pub fn ack_err(reason: &str) -> StreamAck {
    StreamAck {
        ok: false,
        error: Some(reason.to_string()),
    }
}

/// Backend whose replies are scripted per call; falls back to `{ok: true}`.
#[derive(Default)]
pub struct MockBackend {
    start_replies: Mutex<VecDeque<exdash_adapter::Result<StreamAck>>>,
    keepalive_replies: Mutex<VecDeque<exdash_adapter::Result<StreamAck>>>,
    start_envs: Mutex<Vec<StreamEnvironment>>,
    keepalive_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_start(&self, reply: exdash_adapter::Result<StreamAck>) {
        self.start_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_keepalive(&self, reply: exdash_adapter::Result<StreamAck>) {
        self.keepalive_replies.lock().unwrap().push_back(reply);
    }

    pub fn start_calls(&self) -> usize {
        self.start_envs.lock().unwrap().len()
    }

    pub fn start_envs(&self) -> Vec<String> {
        self.start_envs
            .lock()
            .unwrap()
            .iter()
            .map(|env| env.as_str().to_string())
            .collect()
    }

    pub fn keepalive_calls(&self) -> usize {
        self.keepalive_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamBackend for MockBackend {
    async fn start_stream(&self, env: &StreamEnvironment) -> exdash_adapter::Result<StreamAck> {
        self.start_envs.lock().unwrap().push(env.clone());
        self.start_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ack_ok()))
    }

    async fn keepalive(&self, _env: &StreamEnvironment) -> exdash_adapter::Result<StreamAck> {
        self.keepalive_calls.fetch_add(1, Ordering::SeqCst);
        self.keepalive_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ack_ok()))
    }
}

pub fn network_error() -> DashboardError {
    DashboardError::WebSocket("connection refused".to_string())
}

/// One socket the manager asked for.
#[derive(Clone)]
pub struct OpenedSocket {
    pub url: Url,
    pub events: TransportEventSender,
    pub cancel: CancellationToken,
}

impl OpenedSocket {
    pub fn emit(&self, event: TransportEvent) {
        self.events.send(event);
    }

    pub fn open(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn message(&self, text: &str) {
        self.emit(TransportEvent::Message(text.to_string()));
    }

    pub fn close(&self, code: u16, reason: &str) {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Transport that records every open and lets the test drive events.
#[derive(Default)]
pub struct MockTransport {
    sockets: Mutex<Vec<OpenedSocket>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open_count(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    pub fn socket(&self, index: usize) -> OpenedSocket {
        self.sockets.lock().unwrap()[index].clone()
    }

    pub fn latest(&self) -> OpenedSocket {
        self.sockets
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no socket opened")
    }
}

impl StreamTransport for MockTransport {
    fn open(&self, url: Url, events: TransportEventSender) -> TransportHandle {
        let cancel = CancellationToken::new();
        self.sockets.lock().unwrap().push(OpenedSocket {
            url,
            events,
            cancel: cancel.clone(),
        });
        TransportHandle::new(cancel)
    }
}

/// Refresher that only counts invocations.
#[derive(Default)]
pub struct CountingRefresher {
    calls: AtomicUsize,
}

impl CountingRefresher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BalanceRefresher for CountingRefresher {
    async fn refresh(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub manager: LiveStreamManager,
    pub backend: Arc<MockBackend>,
    pub transport: Arc<MockTransport>,
    pub refresher: Arc<CountingRefresher>,
    pub log: ActivityLog,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(ManagerSettings::default())
    }

    pub fn with_settings(settings: ManagerSettings) -> Self {
        let backend = MockBackend::new();
        let transport = MockTransport::new();
        let refresher = CountingRefresher::new();
        let log = ActivityLog::default();

        let manager = LiveStreamManager::new(
            Collaborators {
                backend: backend.clone(),
                transport: transport.clone(),
                balances: refresher.clone(),
                log: log.clone(),
            },
            Url::parse(STREAM_URL).unwrap(),
            settings,
        );

        Self {
            manager,
            backend,
            transport,
            refresher,
            log,
        }
    }

    pub fn log_contains(&self, needle: &str) -> bool {
        self.log.texts().iter().any(|line| line.contains(needle))
    }
}

/// Let spawned tasks run after the clock moved.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Advance paused time and let woken tasks finish.
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

pub fn balance_update() -> &'static str {
    r#"{"type":"binance_event","env":"testnet","data":{"e":"balanceUpdate","E":1700000000000,"a":"USDT","d":"10.0"}}"#
}
