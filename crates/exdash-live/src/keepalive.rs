/*
[INPUT]:  Stream environment and backend keepalive endpoint
[OUTPUT]: Periodic listen-key renewal, outcome written to the activity log
[POS]:    Live layer - keepalive scheduling (independent of socket state)
[UPDATE]: When changing keepalive cadence or failure handling
*/

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use exdash_adapter::{StreamBackend, StreamEnvironment};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::activity_log::ActivityLog;

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25 * 60);

/// At most one periodic keepalive task.
pub struct KeepaliveScheduler {
    backend: Arc<dyn StreamBackend>,
    log: ActivityLog,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl KeepaliveScheduler {
    pub fn new(backend: Arc<dyn StreamBackend>, log: ActivityLog, interval: Duration) -> Self {
        Self {
            backend,
            log,
            interval,
            task: None,
        }
    }

    /// (Re)arm the schedule for `env`; the first tick fires one interval from now.
    pub fn start(&mut self, env: StreamEnvironment) {
        self.stop();

        let backend = self.backend.clone();
        let log = self.log.clone();
        let period = self.interval;
        let first_tick = Instant::now() + period;
        debug!(%env, ?period, "keepalive armed");

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                keepalive_once(backend.as_ref(), &env, &log).await;
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("keepalive stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for KeepaliveScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for KeepaliveScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepaliveScheduler")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

/// One renewal attempt. Failures are logged only; the schedule keeps going.
pub async fn keepalive_once(
    backend: &dyn StreamBackend,
    env: &StreamEnvironment,
    log: &ActivityLog,
) -> bool {
    match backend.keepalive(env).await {
        Ok(ack) if ack.ok => {
            log.append(format!("Keepalive OK ({env})"));
            true
        }
        Ok(ack) => {
            warn!(%env, reason = ack.failure_reason(), "keepalive rejected");
            log.append(format!("Keepalive failed ({env}): {}", ack.failure_reason()));
            false
        }
        Err(err) => {
            warn!(%env, error = %err, "keepalive request failed");
            log.append(format!("Keepalive error ({env}): {err}"));
            false
        }
    }
}
