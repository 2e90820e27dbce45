// Route table endpoints
//
// The daemon keys routes by destination CIDR. Deletion puts the CIDR in the
// path, so its `/` travels percent-encoded.

use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::types::{AddRouteRequest, RouteResponse};

impl ApiClient {
    /// List routes bound to the TUN device.
    ///
    /// `GET /api/v1/routes`
    pub async fn list_routes(&self) -> Result<Vec<RouteResponse>, Error> {
        debug!("listing routes");
        self.get("routes").await
    }

    /// Add a route. Returns the daemon's view of the new entry when the
    /// envelope carries one.
    ///
    /// `POST /api/v1/routes`
    pub async fn add_route(&self, req: &AddRouteRequest) -> Result<Option<RouteResponse>, Error> {
        debug!(cidr = %req.cidr, gateway = %req.gateway, metric = req.metric, "adding route");
        self.post("routes", req).await
    }

    /// Delete a route by CIDR.
    ///
    /// `DELETE /api/v1/routes/{cidr}`
    pub async fn delete_route(&self, cidr: &str) -> Result<(), Error> {
        debug!(cidr, "deleting route");
        let url = self.url_with_segment("routes", cidr)?;
        self.delete(url).await
    }
}
