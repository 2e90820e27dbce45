// Device endpoint
//
// Read-only: the console never creates or removes the TUN device.

use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::types::DeviceStatusResponse;

impl ApiClient {
    /// Current TUN device status.
    ///
    /// `GET /api/v1/device`
    pub async fn get_device(&self) -> Result<DeviceStatusResponse, Error> {
        debug!("fetching device status");
        self.get("device").await
    }
}
