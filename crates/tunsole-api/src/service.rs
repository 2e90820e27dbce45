// Service endpoint (engine status snapshot)

use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::types::ServiceStatusResponse;

impl ApiClient {
    /// Engine status, including traffic counters while running.
    ///
    /// `GET /api/v1/service`
    pub async fn get_service(&self) -> Result<ServiceStatusResponse, Error> {
        debug!("fetching service status");
        self.get("service").await
    }
}
