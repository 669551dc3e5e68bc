/*
[INPUT]:  start_live/stop commands, transport events, reconnect timer
[OUTPUT]: Indicator updates, activity log lines, keepalive and balance-refresh side effects
[POS]:    Live layer - user data stream connection manager (single owned session)
[UPDATE]: When changing connection lifecycle, backoff, or stop semantics
*/

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use exdash_adapter::{
    ConnectionId, StreamBackend, StreamEnvironment, StreamTransport, TransportEvent,
    TransportEventSender, TransportHandle, stream_url_for,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::activity_log::ActivityLog;
use crate::backoff::{Backoff, BackoffPolicy};
use crate::balance::BalanceRefresher;
use crate::dispatch::dispatch;
use crate::indicator::Indicator;
use crate::keepalive::{KEEPALIVE_INTERVAL, KeepaliveScheduler};
use crate::starter::StreamStarter;

pub const BALANCE_REFRESH_DELAY: Duration = Duration::from_millis(500);

/// Timing knobs of one manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    pub keepalive_interval: Duration,
    pub backoff: BackoffPolicy,
    pub balance_refresh_delay: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            keepalive_interval: KEEPALIVE_INTERVAL,
            backoff: BackoffPolicy::default(),
            balance_refresh_delay: BALANCE_REFRESH_DELAY,
        }
    }
}

/// External collaborators the manager talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn StreamBackend>,
    pub transport: Arc<dyn StreamTransport>,
    pub balances: Arc<dyn BalanceRefresher>,
    pub log: ActivityLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    Connected,
    /// Socket gone, reconnect pending
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A socket is being opened
    Connecting,
    /// The backend refused to open the feed; the manager is idle
    Rejected,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: ConnectionPhase,
    pub env: Option<StreamEnvironment>,
    pub started: bool,
    pub reconnect_delay: Duration,
    pub connection: Option<ConnectionId>,
    pub keepalive_running: bool,
    pub reconnect_pending: bool,
    pub pending_refreshes: usize,
}

impl SessionSnapshot {
    pub fn socket_open(&self) -> bool {
        self.connection.is_some()
    }
}

#[derive(Debug)]
enum Command {
    StartLive {
        env: StreamEnvironment,
        reply: oneshot::Sender<StartOutcome>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Handle to the live user data stream manager.
///
/// The session itself lives in a worker task; this handle only sends it
/// commands. Dropping the handle stops the session.
pub struct LiveStreamManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    indicator: watch::Receiver<Indicator>,
    log: ActivityLog,
    shutdown: CancellationToken,
    worker_handle: Option<JoinHandle<()>>,
}

impl LiveStreamManager {
    /// Spawn the worker. Must be called inside a Tokio runtime.
    pub fn new(collaborators: Collaborators, stream_url: Url, settings: ManagerSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (indicator_tx, indicator) = watch::channel(Indicator::Pending);
        let shutdown = CancellationToken::new();
        let log = collaborators.log.clone();

        let worker = LiveWorker::new(
            collaborators,
            stream_url,
            settings,
            indicator_tx,
            cmd_rx,
            shutdown.clone(),
        );
        let worker_handle = tokio::spawn(worker.run());

        Self {
            cmd_tx,
            indicator,
            log,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Start (or resume) the live feed for `env`.
    pub async fn start_live(
        &self,
        env: impl Into<StreamEnvironment>,
    ) -> anyhow::Result<StartOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartLive {
            env: env.into(),
            reply,
        })?;
        rx.await.context("live stream worker dropped start request")
    }

    /// Tear everything down. Safe in any state.
    pub async fn stop(&self) -> anyhow::Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply })?;
        rx.await.context("live stream worker dropped stop request")
    }

    pub async fn snapshot(&self) -> anyhow::Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        rx.await.context("live stream worker dropped snapshot request")
    }

    pub fn subscribe_indicator(&self) -> watch::Receiver<Indicator> {
        self.indicator.clone()
    }

    pub fn indicator(&self) -> Indicator {
        *self.indicator.borrow()
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    /// Stop the session and end the worker task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Shut down and wait for the worker to finish its teardown.
    pub async fn shutdown_and_wait(mut self) -> anyhow::Result<()> {
        self.shutdown();
        if let Some(handle) = self.worker_handle.take() {
            handle.await.context("join live stream worker")?;
        }
        Ok(())
    }

    fn send(&self, command: Command) -> anyhow::Result<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| anyhow!("live stream worker is not running"))
    }
}

impl Drop for LiveStreamManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ActiveSocket {
    id: ConnectionId,
    handle: TransportHandle,
}

/// Everything one session owns. `reset` is the only way back to idle.
struct Session {
    env: Option<StreamEnvironment>,
    started: bool,
    phase: ConnectionPhase,
    backoff: Backoff,
    socket: Option<ActiveSocket>,
    keepalive: KeepaliveScheduler,
    reconnect: Option<Pin<Box<Sleep>>>,
    refreshes: JoinSet<()>,
}

impl Session {
    fn close_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            debug!(connection = socket.id, "closing socket");
            socket.handle.close();
        }
    }

    fn cancel_reconnect(&mut self) {
        self.reconnect = None;
    }

    fn reset(&mut self) {
        self.cancel_reconnect();
        self.close_socket();
        self.keepalive.stop();
        // Dropping the set aborts any refresh still waiting on its delay
        self.refreshes = JoinSet::new();
        self.started = false;
        self.backoff.reset();
        self.env = None;
        self.phase = ConnectionPhase::Idle;
    }

    /// Refreshes spawned and not yet joined by the worker loop
    fn pending_refreshes(&self) -> usize {
        self.refreshes.len()
    }
}

struct LiveWorker {
    session: Session,
    starter: StreamStarter,
    transport: Arc<dyn StreamTransport>,
    balances: Arc<dyn BalanceRefresher>,
    log: ActivityLog,
    stream_url: Url,
    refresh_delay: Duration,
    indicator: watch::Sender<Indicator>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
    events_rx: mpsc::UnboundedReceiver<(ConnectionId, TransportEvent)>,
    shutdown: CancellationToken,
    next_connection: ConnectionId,
}

impl LiveWorker {
    fn new(
        collaborators: Collaborators,
        stream_url: Url,
        settings: ManagerSettings,
        indicator: watch::Sender<Indicator>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        shutdown: CancellationToken,
    ) -> Self {
        let Collaborators {
            backend,
            transport,
            balances,
            log,
        } = collaborators;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            session: Session {
                env: None,
                started: false,
                phase: ConnectionPhase::Idle,
                backoff: Backoff::new(settings.backoff),
                socket: None,
                keepalive: KeepaliveScheduler::new(
                    backend.clone(),
                    log.clone(),
                    settings.keepalive_interval,
                ),
                reconnect: None,
                refreshes: JoinSet::new(),
            },
            starter: StreamStarter::new(backend, log.clone()),
            transport,
            balances,
            log,
            stream_url,
            refresh_delay: settings.balance_refresh_delay,
            indicator,
            cmd_rx,
            events_tx,
            events_rx,
            shutdown,
            next_connection: 0,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                // Transport events and timers go ahead of commands so a caller
                // always observes the effects of everything already delivered.
                biased;

                _ = self.shutdown.cancelled() => {
                    self.stop();
                    break;
                }
                Some((connection, event)) = self.events_rx.recv() => {
                    self.on_transport_event(connection, event);
                }
                _ = reconnect_due(&mut self.session.reconnect) => {
                    self.session.reconnect = None;
                    self.on_reconnect_due().await;
                }
                Some(joined) = self.session.refreshes.join_next(), if !self.session.refreshes.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            warn!(error = %err, "balance refresh task panicked");
                        }
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::StartLive { env, reply }) => {
                            let outcome = self.start_live(env).await;
                            let _ = reply.send(outcome);
                        }
                        Some(Command::Stop { reply }) => {
                            self.stop();
                            let _ = reply.send(());
                        }
                        Some(Command::Snapshot { reply }) => {
                            let _ = reply.send(self.snapshot());
                        }
                        None => {
                            self.stop();
                            break;
                        }
                    }
                }
            }
        }
        debug!("live stream worker exited");
    }

    async fn start_live(&mut self, env: StreamEnvironment) -> StartOutcome {
        if let Some(current) = self.session.env.clone() {
            if current != env {
                self.log
                    .append(format!("Switching stream environment {current} -> {env}"));
                self.stop();
            }
        }
        self.session.env = Some(env.clone());

        if !self.session.started {
            self.set_indicator(Indicator::Pending);
            if !self.starter.ensure_started(&env).await {
                self.halt();
                return StartOutcome::Rejected;
            }
            self.session.started = true;
            self.session.keepalive.start(env.clone());
        } else if !self.session.keepalive.is_running() {
            self.session.keepalive.start(env.clone());
        }

        self.connect(&env);
        StartOutcome::Connecting
    }

    fn connect(&mut self, env: &StreamEnvironment) {
        self.session.close_socket();
        self.session.cancel_reconnect();
        self.set_indicator(Indicator::Pending);

        self.next_connection += 1;
        let id = self.next_connection;
        let url = stream_url_for(&self.stream_url, env);
        info!(connection = id, %url, "connecting user stream socket");
        self.log.append(format!("Connecting WS {url}"));

        let handle = self
            .transport
            .open(url, TransportEventSender::new(id, self.events_tx.clone()));
        self.session.socket = Some(ActiveSocket { id, handle });
        self.session.phase = ConnectionPhase::Connecting;
    }

    fn on_transport_event(&mut self, connection: ConnectionId, event: TransportEvent) {
        let current = self.session.socket.as_ref().map(|socket| socket.id);
        if current != Some(connection) {
            debug!(connection, ?current, ?event, "ignoring event from superseded connection");
            return;
        }

        match event {
            TransportEvent::Opened => {
                self.session.phase = ConnectionPhase::Connected;
                self.session.backoff.reset();
                self.log.append("WS connected");
            }
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Error(err) => {
                warn!(connection, error = %err, "user stream socket error");
                self.log.append(format!("WS error: {err}"));
                self.set_indicator(Indicator::Fail);
            }
            TransportEvent::Closed { code, reason } => {
                self.session.socket = None;
                self.set_indicator(Indicator::Fail);
                warn!(connection, code, %reason, "user stream socket closed");
                self.log
                    .append(format!("WS closed (code={code}, reason={reason})"));
                self.session.phase = ConnectionPhase::Closed;
                self.schedule_reconnect();
            }
        }
    }

    fn on_message(&mut self, text: &str) {
        let outcome = dispatch(text);
        self.log.append(outcome.log_line);
        if let Some(indicator) = outcome.indicator {
            self.set_indicator(indicator);
        }
        if outcome.refresh_balances {
            self.schedule_balance_refresh();
        }
    }

    fn schedule_reconnect(&mut self) {
        self.session.cancel_reconnect();
        let delay = self.session.backoff.next_delay();
        info!(?delay, "scheduling user stream reconnect");
        self.log
            .append(format!("Reconnecting in {:.1}s", delay.as_secs_f64()));
        self.session.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
    }

    async fn on_reconnect_due(&mut self) {
        let Some(env) = self.session.env.clone() else {
            return;
        };
        self.start_live(env).await;
    }

    fn schedule_balance_refresh(&mut self) {
        let balances = self.balances.clone();
        let due = Instant::now() + self.refresh_delay;
        self.session.refreshes.spawn(async move {
            tokio::time::sleep_until(due).await;
            balances.refresh().await;
        });
    }

    /// Start refused: leave the manager idle until the caller retries.
    fn halt(&mut self) {
        self.session.reset();
        self.set_indicator(Indicator::Fail);
    }

    fn stop(&mut self) {
        let was_active = self.session.started
            || self.session.socket.is_some()
            || self.session.reconnect.is_some();
        self.session.reset();
        self.set_indicator(Indicator::Fail);
        if was_active {
            self.log.append("Live stream stopped");
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.session.phase,
            env: self.session.env.clone(),
            started: self.session.started,
            reconnect_delay: self.session.backoff.current(),
            connection: self.session.socket.as_ref().map(|socket| socket.id),
            keepalive_running: self.session.keepalive.is_running(),
            reconnect_pending: self.session.reconnect.is_some(),
            pending_refreshes: self.session.pending_refreshes(),
        }
    }

    fn set_indicator(&self, indicator: Indicator) {
        let previous = self.indicator.send_replace(indicator);
        if previous != indicator {
            debug!(%previous, %indicator, "indicator changed");
        }
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
