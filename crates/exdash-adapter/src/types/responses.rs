/*
[INPUT]:  Backend schema definitions and serde requirements
[OUTPUT]: Typed Rust response structs with serialization support
[POS]:    Data layer - type definitions for backend communication
[UPDATE]: When backend schema changes or new types added
*/

use serde::{Deserialize, Serialize};

use super::models::AssetBalance;

/// Acknowledgement returned by `start-stream` and `keepalive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAck {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamAck {
    /// Reason for a negative acknowledgement, for logging.
    pub fn failure_reason(&self) -> &str {
        self.error.as_deref().unwrap_or("no error given")
    }
}

/// Response of `GET active-exchange`.
///
/// `items` is the selector's option list; its shape belongs to the selector
/// form and is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveExchange {
    pub active: String,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

/// Response of `GET balances`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancesResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub balances: Vec<AssetBalance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
