/*
[INPUT]:  Stream URL and an event sender tagged with a connection id
[OUTPUT]: Open/message/error/close events for one WebSocket connection
[POS]:    WebSocket layer - transport lifecycle
[UPDATE]: When changing connection handling or close semantics
*/

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::types::StreamEnvironment;

/// Close code reported when the connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code reported for a close frame that carried no status
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Upper bound on TCP connect plus WebSocket handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Monotonic id distinguishing successive connections of one manager
pub type ConnectionId = u64;

/// Append the `env` query parameter to a stream base URL
pub fn stream_url_for(base: &Url, env: &StreamEnvironment) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("env", env.as_str());
    url
}

/// Lifecycle events of a single transport connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed { code: u16, reason: String },
}

/// Sender that stamps every event with the connection it belongs to.
#[derive(Debug, Clone)]
pub struct TransportEventSender {
    connection: ConnectionId,
    tx: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
}

impl TransportEventSender {
    pub fn new(
        connection: ConnectionId,
        tx: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
    ) -> Self {
        Self { connection, tx }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Returns false once the receiving side is gone
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send((self.connection, event)).is_ok()
    }
}

/// Owner's handle to an open (or opening) connection.
///
/// Closing or dropping the handle tears the connection down without emitting
/// further events for it.
#[derive(Debug)]
pub struct TransportHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel, task: None }
    }

    pub fn with_task(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Force-close the connection
    pub fn close(mut self) {
        self.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        // The task sends its own close frame; detach rather than abort.
        self.task.take();
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Opens streaming connections. `WsTransport` is the real implementation.
pub trait StreamTransport: Send + Sync + 'static {
    fn open(&self, url: Url, events: TransportEventSender) -> TransportHandle;
}

/// tokio-tungstenite backed transport
#[derive(Debug, Clone, Copy)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    /// A handshake that has not completed within `connect_timeout` is reported
    /// as an abnormal close.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTransport for WsTransport {
    fn open(&self, url: Url, events: TransportEventSender) -> TransportHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let connect_timeout = self.connect_timeout;
        let task = tokio::spawn(async move {
            run_connection(url, events, token, connect_timeout).await;
        });
        TransportHandle::with_task(cancel, task)
    }
}

async fn run_connection(
    url: Url,
    events: TransportEventSender,
    cancel: CancellationToken,
    connect_timeout: Duration,
) {
    let connection = events.connection();
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(connection, "connection closed before it opened");
            return;
        }
        result = tokio::time::timeout(connect_timeout, connect_async(url.as_str())) => result,
    };

    let opened = match connected {
        Ok(Ok((ws_stream, _response))) => Ok(ws_stream),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("connect timed out after {connect_timeout:?}")),
    };
    let ws_stream = match opened {
        Ok(ws_stream) => ws_stream,
        Err(err) => {
            warn!(connection, %url, error = %err, "user stream socket failed to open");
            events.send(TransportEvent::Error(err));
            events.send(TransportEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: String::new(),
            });
            return;
        }
    };

    info!(connection, %url, "user stream socket open");
    if !events.send(TransportEvent::Opened) {
        return;
    }

    let (mut write, mut read) = ws_stream.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client closing".to_string().into(),
                };
                let _ = write.send(WsMessage::Close(Some(frame))).await;
                debug!(connection, "user stream socket closed by owner");
                return;
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if !events.send(TransportEvent::Message(text.to_string())) {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        // Invalid UTF-8 is replaced and left to the dispatcher to reject
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        if !events.send(TransportEvent::Message(text)) {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|frame| (u16::from(frame.code), frame.reason.to_string()))
                            .unwrap_or((CLOSE_NO_STATUS, String::new()));
                        events.send(TransportEvent::Closed { code, reason });
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        events.send(TransportEvent::Error(err.to_string()));
                        events.send(TransportEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: String::new(),
                        });
                        return;
                    }
                    None => {
                        events.send(TransportEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: "stream ended".to_string(),
                        });
                        return;
                    }
                }
            }
        }
    }
}
