/*
[INPUT]:  Raw WebSocket message text
[OUTPUT]: Parsed InboundEnvelope values or a non-conforming payload error
[POS]:    WebSocket layer - message parsing and validation
[UPDATE]: When adding new envelope types or changing format
*/

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One message of the private stream, validated at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEnvelope {
    Hello(HelloPayload),
    Status(StatusPayload),
    Error(ErrorPayload),
    BinanceEvent(BinanceEventPayload),
    /// Well-formed envelope with a tag this client does not handle
    Other { kind: String, raw: String },
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct HelloPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StatusPayload {
    pub connected: bool,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ErrorPayload {
    #[serde(default, alias = "message")]
    pub error: Option<String>,
}

impl ErrorPayload {
    pub fn describe(&self) -> &str {
        self.error.as_deref().unwrap_or("unspecified error")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BinanceEventPayload {
    #[serde(alias = "event")]
    pub data: AccountEvent,
    #[serde(default)]
    pub env: Option<String>,
}

/// Inner exchange event, keyed by its `e` tag.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccountEvent {
    #[serde(rename = "e")]
    pub kind: AccountEventKind,
    #[serde(rename = "E", default)]
    pub event_time_ms: Option<i64>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl AccountEvent {
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        self.event_time_ms.and_then(DateTime::from_timestamp_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum AccountEventKind {
    OutboundAccountPosition,
    BalanceUpdate,
    ExecutionReport,
    ListStatus,
    ListenKeyExpired,
    Other(String),
}

impl AccountEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            AccountEventKind::OutboundAccountPosition => "outboundAccountPosition",
            AccountEventKind::BalanceUpdate => "balanceUpdate",
            AccountEventKind::ExecutionReport => "executionReport",
            AccountEventKind::ListStatus => "listStatus",
            AccountEventKind::ListenKeyExpired => "listenKeyExpired",
            AccountEventKind::Other(tag) => tag,
        }
    }

    /// Events after which the balance table is stale
    pub fn is_balance_affecting(&self) -> bool {
        matches!(
            self,
            AccountEventKind::OutboundAccountPosition | AccountEventKind::BalanceUpdate
        )
    }
}

impl From<String> for AccountEventKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "outboundAccountPosition" => AccountEventKind::OutboundAccountPosition,
            "balanceUpdate" => AccountEventKind::BalanceUpdate,
            "executionReport" => AccountEventKind::ExecutionReport,
            "listStatus" => AccountEventKind::ListStatus,
            "listenKeyExpired" => AccountEventKind::ListenKeyExpired,
            _ => AccountEventKind::Other(tag),
        }
    }
}

impl From<AccountEventKind> for String {
    fn from(kind: AccountEventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for AccountEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a message does not conform to the envelope format.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("message is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no string `type` field")]
    MissingType,

    #[error("`{kind}` payload does not conform: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl InboundEnvelope {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(EnvelopeError::InvalidJson)?;
        if !value.is_object() {
            return Err(EnvelopeError::NotAnObject);
        }

        let kind = value
            .get("type")
            .and_then(|tag| tag.as_str())
            .ok_or(EnvelopeError::MissingType)?
            .to_string();

        let envelope = match kind.as_str() {
            "hello" => InboundEnvelope::Hello(decode(&kind, value)?),
            "status" => InboundEnvelope::Status(decode(&kind, value)?),
            "error" => InboundEnvelope::Error(decode(&kind, value)?),
            "binance_event" => InboundEnvelope::BinanceEvent(decode(&kind, value)?),
            _ => InboundEnvelope::Other {
                kind,
                raw: text.to_string(),
            },
        };
        Ok(envelope)
    }

    /// The envelope's `type` tag
    pub fn kind(&self) -> &str {
        match self {
            InboundEnvelope::Hello(_) => "hello",
            InboundEnvelope::Status(_) => "status",
            InboundEnvelope::Error(_) => "error",
            InboundEnvelope::BinanceEvent(_) => "binance_event",
            InboundEnvelope::Other { kind, .. } => kind,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: &str,
    value: serde_json::Value,
) -> Result<T, EnvelopeError> {
    serde_json::from_value(value).map_err(|source| EnvelopeError::Payload {
        kind: kind.to_string(),
        source,
    })
}
