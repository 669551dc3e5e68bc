/*
[INPUT]:  HTTP configuration (base URLs, timeouts)
[OUTPUT]: Configured reqwest client ready for backend calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::http::{DashboardError, Result};
use crate::types::StreamEnvironment;
use crate::ws::stream_url_for;

/// Default backend location (the dashboard server binds locally)
const API_BASE_URL: &str = "http://127.0.0.1:8000/api/";
const STREAM_URL: &str = "ws://127.0.0.1:8000/ws/user-stream";
const ERROR_BODY_MAX_BYTES: usize = 512;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// HTTP client for the dashboard backend
#[derive(Debug, Clone)]
pub struct DashboardClient {
    http_client: Client,
    api_base_url: Url,
    stream_url: Url,
}

impl DashboardClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Self::with_config_and_urls(config, API_BASE_URL, STREAM_URL)
    }

    /// Create a new client pointed at explicit backend and stream URLs
    pub fn with_config_and_urls(
        config: ClientConfig,
        api_base_url: &str,
        stream_url: &str,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        let stream_url = Url::parse(stream_url)?;
        if !matches!(stream_url.scheme(), "ws" | "wss") {
            return Err(DashboardError::Config(format!(
                "stream url must use ws:// or wss://, got {}",
                stream_url.scheme()
            )));
        }

        Ok(Self {
            http_client,
            api_base_url: parse_base_url(api_base_url)?,
            stream_url,
        })
    }

    /// Base URL every backend endpoint is resolved against
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    /// Streaming endpoint without the environment parameter
    pub fn stream_base_url(&self) -> &Url {
        &self.stream_url
    }

    /// Streaming endpoint for the given environment
    pub fn stream_url_for(&self, env: &StreamEnvironment) -> Url {
        stream_url_for(&self.stream_url, env)
    }

    /// Build request builder for a backend endpoint
    pub(crate) fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.api_base_url.join(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Send a request and decode the JSON body, mapping non-2xx to `Api`
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(status = status.as_u16(), bytes = body.len(), "backend returned error status");
            return Err(DashboardError::api_error(status, error_message(&body)));
        }

        if body.trim().is_empty() {
            return Err(DashboardError::InvalidResponse("empty body".to_string()));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    // Url::join drops the last path segment unless it ends with '/'
    if raw.ends_with('/') {
        Ok(Url::parse(raw)?)
    } else {
        Ok(Url::parse(&format!("{raw}/"))?)
    }
}

fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "detail", "message"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }

    if body.len() <= ERROR_BODY_MAX_BYTES {
        return body.to_string();
    }
    let mut end = ERROR_BODY_MAX_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
