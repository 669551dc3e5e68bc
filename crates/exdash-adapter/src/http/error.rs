/*
[INPUT]:  Error sources (HTTP, API, serialization, WebSocket)
[OUTPUT]: Structured error types with context
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the dashboard adapter
#[derive(Error, Debug)]
pub enum DashboardError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DashboardError {
    /// Check if the error came from the transport rather than the backend's answer
    pub fn is_network(&self) -> bool {
        matches!(self, DashboardError::Http(_) | DashboardError::WebSocket(_))
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        DashboardError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DashboardError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        DashboardError::WebSocket(err.to_string())
    }
}

/// Result type alias for dashboard operations
pub type Result<T> = std::result::Result<T, DashboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_network() {
        assert!(DashboardError::WebSocket("reset".to_string()).is_network());
        assert!(!DashboardError::InvalidResponse("empty".to_string()).is_network());
    }

    #[test]
    fn test_api_error_creation() {
        let err = DashboardError::api_error(StatusCode::UNAUTHORIZED, "unauthorized");
        match err {
            DashboardError::Api { code, message } => {
                assert_eq!(code, 401);
                assert_eq!(message, "unauthorized");
            }
            _ => panic!("Expected Api error variant"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = DashboardError::Config("stream_url must be ws:// or wss://".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: stream_url must be ws:// or wss://"
        );
    }
}
