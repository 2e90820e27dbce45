// Proxy configuration endpoints

use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::types::ProxyConfigPayload;

impl ApiClient {
    /// Current upstream proxy. The daemon only returns `type` and
    /// `address`; credentials are write-only.
    ///
    /// `GET /api/v1/proxy`
    pub async fn get_proxy(&self) -> Result<ProxyConfigPayload, Error> {
        debug!("fetching proxy config");
        self.get("proxy").await
    }

    /// Persist a new upstream proxy configuration.
    ///
    /// `POST /api/v1/proxy`
    pub async fn save_proxy(&self, config: &ProxyConfigPayload) -> Result<(), Error> {
        debug!(proxy_type = %config.proxy_type, address = %config.address, "saving proxy config");
        let _: Option<serde_json::Value> = self.post("proxy", config).await?;
        Ok(())
    }
}
