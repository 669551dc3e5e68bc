/*
[INPUT]:  Stream environment identifier
[OUTPUT]: Start/keepalive acknowledgements for the upstream listen key
[POS]:    HTTP layer - user data stream endpoints
[UPDATE]: When the backend changes stream endpoints or ack format
*/

// ### User Stream Endpoints

use async_trait::async_trait;
use reqwest::Method;

use crate::http::{DashboardClient, Result};
use crate::types::{StreamAck, StreamEnvironment};

/// Backend calls that manage the upstream user data stream.
///
/// `DashboardClient` is the production implementation; the live manager only
/// depends on this trait.
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Open (or confirm) the upstream feed for `env`
    async fn start_stream(&self, env: &StreamEnvironment) -> Result<StreamAck>;

    /// Renew the upstream listen key for `env`
    async fn keepalive(&self, env: &StreamEnvironment) -> Result<StreamAck>;
}

impl DashboardClient {
    /// POST start-stream?env={env}
    pub async fn start_stream(&self, env: &StreamEnvironment) -> Result<StreamAck> {
        let builder = self
            .request(Method::POST, "start-stream")?
            .query(&[("env", env.as_str())]);
        self.send_json(builder).await
    }

    /// POST keepalive?env={env}
    pub async fn keepalive(&self, env: &StreamEnvironment) -> Result<StreamAck> {
        let builder = self
            .request(Method::POST, "keepalive")?
            .query(&[("env", env.as_str())]);
        self.send_json(builder).await
    }
}

#[async_trait]
impl StreamBackend for DashboardClient {
    async fn start_stream(&self, env: &StreamEnvironment) -> Result<StreamAck> {
        DashboardClient::start_stream(self, env).await
    }

    async fn keepalive(&self, env: &StreamEnvironment) -> Result<StreamAck> {
        DashboardClient::keepalive(self, env).await
    }
}
