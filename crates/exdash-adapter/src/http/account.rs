/*
[INPUT]:  Stream environment identifier
[OUTPUT]: Active exchange selection and account balances
[POS]:    HTTP layer - dashboard account endpoints
[UPDATE]: When adding account endpoints or changing response format
*/

use reqwest::Method;

use crate::http::{DashboardClient, DashboardError, Result};
use crate::types::{ActiveExchange, AssetBalance, BalancesResponse, StreamEnvironment};

impl DashboardClient {
    /// GET active-exchange
    pub async fn active_exchange(&self) -> Result<ActiveExchange> {
        let builder = self.request(Method::GET, "active-exchange")?;
        self.send_json(builder).await
    }

    /// GET balances?env={env}
    ///
    /// A negative acknowledgement is turned into an error so callers only
    /// ever see usable rows.
    pub async fn balances(&self, env: &StreamEnvironment) -> Result<Vec<AssetBalance>> {
        let builder = self
            .request(Method::GET, "balances")?
            .query(&[("env", env.as_str())]);
        let response: BalancesResponse = self.send_json(builder).await?;
        if !response.ok {
            return Err(DashboardError::InvalidResponse(
                response
                    .error
                    .unwrap_or_else(|| "balances request rejected".to_string()),
            ));
        }
        Ok(response.balances)
    }
}
