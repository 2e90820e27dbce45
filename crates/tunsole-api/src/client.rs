// Async HTTP client for the tun2socks control API.
//
// Base path: /api/v1/
// Auth: `Authorization: Bearer <token>` on every request except login.
//
// Endpoint methods live in sibling modules (device, service, proxy, routes,
// auth, events) as inherent impls; this module owns URL construction,
// envelope unwrapping, and error mapping.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{ApiResponse, ErrorBody};

/// Async client for the daemon's REST control API.
///
/// Cheap to share behind an `Arc`; the bearer token can be swapped at
/// runtime (login/logout) without rebuilding the HTTP clients.
pub struct ApiClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    base_url: Url,
    token: ArcSwapOption<SecretString>,
    timeout: Duration,
}

impl ApiClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client for the daemon at `base_url`.
    ///
    /// Accepts either the daemon root (`http://127.0.0.1:9090`) or the full
    /// API root (`http://127.0.0.1:9090/api/v1`).
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let stream_http = transport.build_stream_client()?;
        Ok(Self {
            http,
            stream_http,
            base_url: Self::normalize_base_url(base_url)?,
            token: ArcSwapOption::empty(),
            timeout: transport.timeout,
        })
    }

    /// Wrap an existing `reqwest::Client` for both calls and the stream.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            stream_http: http.clone(),
            http,
            base_url: Self::normalize_base_url(base_url)?,
            token: ArcSwapOption::empty(),
            timeout: TransportConfig::default().timeout,
        })
    }

    /// Builder-style token attachment.
    pub fn with_token(self, token: SecretString) -> Self {
        self.set_token(token);
        self
    }

    /// Ensure the base URL ends with `/api/v1/`.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();

        if path.ends_with("/api/v1") {
            url.set_path(&format!("{path}/"));
        } else {
            url.set_path(&format!("{path}/api/v1/"));
        }

        Ok(url)
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// The normalized API root (always ends with `/api/v1/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn set_token(&self, token: SecretString) {
        self.token.store(Some(Arc::new(token)));
    }

    pub fn clear_token(&self) {
        self.token.store(None);
    }

    pub fn has_token(&self) -> bool {
        self.token.load().is_some()
    }

    pub(crate) fn token(&self) -> Option<Arc<SecretString>> {
        self.token.load_full()
    }

    pub(crate) fn stream_http(&self) -> &reqwest::Client {
        &self.stream_http
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Join a relative path (e.g. `"routes"`) onto the API root.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// Append one percent-encoded segment (a `/` inside it becomes `%2F`).
    pub(crate) fn url_with_segment(&self, path: &str, segment: &str) -> Result<Url, Error> {
        let mut url = self.url(path)?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.load().as_deref() {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.require_data(resp).await
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self
            .authorize(self.http.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.handle_envelope(resp).await
    }

    /// POST without attaching the bearer token (public endpoints).
    pub(crate) async fn post_public<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.require_data(resp).await
    }

    pub(crate) async fn delete(&self, url: Url) -> Result<(), Error> {
        debug!("DELETE {url}");

        let resp = self
            .authorize(self.http.delete(url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.handle_envelope::<serde_json::Value>(resp).await?;
        Ok(())
    }

    // ── Response handling ────────────────────────────────────────────

    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }

    async fn require_data<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, Error> {
        self.handle_envelope(resp)
            .await?
            .ok_or_else(|| Error::Deserialization {
                message: "envelope carried no data".into(),
                body: String::new(),
            })
    }

    /// Unwrap `{ success, message, data }`, mapping HTTP and envelope
    /// failures into `Error`.
    pub(crate) async fn handle_envelope<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<Option<T>, Error> {
        let status = resp.status();
        if !status.is_success() {
            return Err(Self::parse_error(status, resp).await);
        }

        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;
        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })?;

        if envelope.success {
            Ok(envelope.data)
        } else {
            Err(Error::Rejected {
                status: Some(status.as_u16()),
                message: envelope.message.filter(|m| !m.is_empty()),
            })
        }
    }

    pub(crate) async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&raw)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty());

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Error::Unauthorized {
                message: message.unwrap_or_else(|| status.to_string()),
            };
        }

        Error::Rejected {
            status: Some(status.as_u16()),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn base_url_gets_api_prefix() {
        let url = ApiClient::normalize_base_url("http://127.0.0.1:9090").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9090/api/v1/");
    }

    #[test]
    fn base_url_keeps_existing_prefix() {
        let url = ApiClient::normalize_base_url("http://host:9090/api/v1").unwrap();
        assert_eq!(url.as_str(), "http://host:9090/api/v1/");
        let url = ApiClient::normalize_base_url("http://host:9090/api/v1/").unwrap();
        assert_eq!(url.as_str(), "http://host:9090/api/v1/");
    }

    #[test]
    fn segment_encodes_slash() {
        let client = ApiClient::from_reqwest("http://h:1", reqwest::Client::new()).unwrap();
        let url = client.url_with_segment("routes", "10.0.0.0/8").unwrap();
        assert_eq!(url.as_str(), "http://h:1/api/v1/routes/10.0.0.0%2F8");
    }

    #[test]
    fn token_swaps() {
        let client = ApiClient::from_reqwest("http://h:1", reqwest::Client::new()).unwrap();
        assert!(!client.has_token());
        client.set_token(SecretString::from("abc".to_owned()));
        assert!(client.has_token());
        client.clear_token();
        assert!(!client.has_token());
    }
}
