/*
[INPUT]:  Refresh requests from the event dispatcher
[OUTPUT]: Latest filtered balance table via `watch`
[POS]:    Live layer - balance refresh collaborator
[UPDATE]: When changing balance source or filtering
*/

use std::fmt;

use async_trait::async_trait;
use exdash_adapter::{AssetBalance, DashboardClient, StreamEnvironment, extract_balances};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::warn;

use crate::activity_log::ActivityLog;

/// Fire-and-forget balance refresh invoked after balance-affecting events.
#[async_trait]
pub trait BalanceRefresher: Send + Sync {
    async fn refresh(&self);
}

/// Reloads balances from the dashboard backend and publishes the table.
#[derive(Clone)]
pub struct HttpBalanceRefresher {
    client: DashboardClient,
    env: StreamEnvironment,
    min_free: Decimal,
    log: ActivityLog,
    table: watch::Sender<Vec<AssetBalance>>,
}

impl HttpBalanceRefresher {
    pub fn new(
        client: DashboardClient,
        env: StreamEnvironment,
        min_free: Decimal,
        log: ActivityLog,
    ) -> Self {
        let (table, _rx) = watch::channel(Vec::new());
        Self {
            client,
            env,
            min_free,
            log,
            table,
        }
    }

    /// Subscribe to the balance table rendered by the dashboard.
    pub fn subscribe(&self) -> watch::Receiver<Vec<AssetBalance>> {
        self.table.subscribe()
    }
}

#[async_trait]
impl BalanceRefresher for HttpBalanceRefresher {
    async fn refresh(&self) {
        match self.client.balances(&self.env).await {
            Ok(rows) => {
                let rows = extract_balances(rows, self.min_free);
                self.log
                    .append(format!("Balances refreshed ({}): {} assets", self.env, rows.len()));
                self.table.send_replace(rows);
            }
            Err(err) => {
                warn!(env = %self.env, error = %err, "balance refresh failed");
                self.log.append(format!("Balance refresh failed ({}): {err}", self.env));
            }
        }
    }
}

impl fmt::Debug for HttpBalanceRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBalanceRefresher")
            .field("env", &self.env)
            .field("min_free", &self.min_free)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exdash_adapter::ClientConfig;
    use std::str::FromStr;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn refresh_publishes_filtered_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/balances"))
            .and(query_param("env", "testnet"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "balances": [
                    { "asset": "BTC", "free": "0.50000000", "locked": "0.00000000" },
                    { "asset": "LTC", "free": "0.00000000", "locked": "0.00000000" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DashboardClient::with_config_and_urls(
            ClientConfig::default(),
            &format!("{}/api/", server.uri()),
            "ws://127.0.0.1:1/ws/user-stream",
        )
        .expect("client init");
        let log = ActivityLog::default();
        let refresher =
            HttpBalanceRefresher::new(client, StreamEnvironment::new("testnet"), Decimal::ZERO, log.clone());
        let table = refresher.subscribe();

        refresher.refresh().await;

        let rows = table.borrow().clone();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].asset, "BTC");
        assert_eq!(rows[0].free, Decimal::from_str("0.5").unwrap());
        assert_eq!(
            log.latest().map(|line| line.text),
            Some("Balances refreshed (testnet): 1 assets".to_string())
        );
    }

    #[tokio::test]
    async fn refresh_failure_keeps_previous_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/balances"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = DashboardClient::with_config_and_urls(
            ClientConfig::default(),
            &format!("{}/api/", server.uri()),
            "ws://127.0.0.1:1/ws/user-stream",
        )
        .expect("client init");
        let log = ActivityLog::default();
        let refresher =
            HttpBalanceRefresher::new(client, StreamEnvironment::new("testnet"), Decimal::ZERO, log.clone());
        let table = refresher.subscribe();

        refresher.refresh().await;

        assert!(table.borrow().is_empty());
        let latest = log.latest().map(|line| line.text).unwrap_or_default();
        assert!(latest.starts_with("Balance refresh failed (testnet)"));
    }
}
