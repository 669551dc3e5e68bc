/*
[INPUT]:  Stream environment and backend start-stream endpoint
[OUTPUT]: Whether the upstream feed is open for the session
[POS]:    Live layer - one-shot stream start gate
[UPDATE]: When changing start semantics or failure handling
*/

use std::sync::Arc;

use exdash_adapter::{StreamBackend, StreamEnvironment};
use tracing::{info, warn};

use crate::activity_log::ActivityLog;

/// Asks the backend to open the upstream feed.
///
/// The manager's `started` flag keeps reconnects from calling this again.
#[derive(Clone)]
pub struct StreamStarter {
    backend: Arc<dyn StreamBackend>,
    log: ActivityLog,
}

impl StreamStarter {
    pub fn new(backend: Arc<dyn StreamBackend>, log: ActivityLog) -> Self {
        Self { backend, log }
    }

    /// True only on an explicit `{ok: true}`; network errors count as a refusal.
    pub async fn ensure_started(&self, env: &StreamEnvironment) -> bool {
        self.log.append(format!("Starting user stream ({env})..."));
        match self.backend.start_stream(env).await {
            Ok(ack) if ack.ok => {
                info!(%env, "user stream started");
                self.log.append(format!("User stream started ({env})"));
                true
            }
            Ok(ack) => {
                warn!(%env, reason = ack.failure_reason(), "user stream start rejected");
                self.log.append(format!(
                    "User stream start failed ({env}): {}",
                    ack.failure_reason()
                ));
                false
            }
            Err(err) => {
                warn!(%env, error = %err, "user stream start request failed");
                self.log.append(format!("User stream start error ({env}): {err}"));
                false
            }
        }
    }
}
