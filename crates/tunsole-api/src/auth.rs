// Token login
//
// `/auth/login` is the only public endpoint. A successful login echoes the
// token back; the caller decides whether to attach it to this client.

use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::types::{AuthGrant, LoginRequest};

impl ApiClient {
    /// Validate `token` against the daemon.
    ///
    /// `POST /api/v1/auth/login`
    pub async fn login(&self, token: &str) -> Result<AuthGrant, Error> {
        debug!("logging in");
        self.post_public("auth/login", &LoginRequest { token }).await
    }
}
