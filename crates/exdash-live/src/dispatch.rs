/*
[INPUT]:  Raw inbound message text
[OUTPUT]: Log line, indicator update and balance-refresh decision
[POS]:    Live layer - event dispatcher (pure; the manager applies the outcome)
[UPDATE]: When adding envelope types or balance-affecting events
*/

use exdash_adapter::InboundEnvelope;
use tracing::debug;

use crate::indicator::Indicator;

const RAW_LOG_MAX_BYTES: usize = 1024;

/// What the manager should do with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub log_line: String,
    pub indicator: Option<Indicator>,
    pub refresh_balances: bool,
}

impl DispatchOutcome {
    fn log_only(log_line: String) -> Self {
        Self {
            log_line,
            indicator: None,
            refresh_balances: false,
        }
    }
}

/// Parse and interpret one message. Non-conforming input never fails.
pub fn dispatch(raw: &str) -> DispatchOutcome {
    match InboundEnvelope::parse(raw) {
        Ok(envelope) => dispatch_envelope(&envelope),
        Err(err) => {
            debug!(error = %err, bytes = raw.len(), "non-conforming message");
            DispatchOutcome::log_only(format!(
                "WS message (non-conforming, ignored): {err}: {}",
                truncate_for_log(raw, RAW_LOG_MAX_BYTES)
            ))
        }
    }
}

pub fn dispatch_envelope(envelope: &InboundEnvelope) -> DispatchOutcome {
    match envelope {
        InboundEnvelope::Hello(hello) => {
            let message = hello.message.as_deref().unwrap_or("hello");
            DispatchOutcome::log_only(format!("WS hello: {message}"))
        }
        InboundEnvelope::Status(status) => {
            let env = status.env.as_deref().unwrap_or("?");
            let log_line = match status.phase.as_deref() {
                Some(phase) => format!(
                    "WS status: connected={} env={env} phase={phase}",
                    status.connected
                ),
                None => format!("WS status: connected={} env={env}", status.connected),
            };
            DispatchOutcome {
                log_line,
                indicator: Some(if status.connected {
                    Indicator::Ok
                } else {
                    Indicator::Fail
                }),
                refresh_balances: false,
            }
        }
        InboundEnvelope::Error(error) => DispatchOutcome {
            log_line: format!("WS error: {}", error.describe()),
            indicator: Some(Indicator::Fail),
            refresh_balances: false,
        },
        InboundEnvelope::BinanceEvent(event) => DispatchOutcome {
            log_line: format!("Binance event: {}", event.data.kind),
            indicator: Some(Indicator::Ok),
            refresh_balances: event.data.kind.is_balance_affecting(),
        },
        InboundEnvelope::Other { raw, .. } => {
            DispatchOutcome::log_only(format!("WS: {}", truncate_for_log(raw, RAW_LOG_MAX_BYTES)))
        }
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
