// Service event stream (`GET /service/events`)
//
// The daemon pushes a JSON `ServiceStatus` in each `data:` frame, roughly
// once per second. Browsers cannot set headers on EventSource, so the
// daemon reads the token from the query string for this endpoint only.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::sse::{SseDecoder, SseMessage};

/// An open event stream. Yields decoded messages until the daemon closes the
/// connection or the transport fails; dropping it closes the connection.
pub struct ServiceEvents {
    inner: Pin<Box<dyn Stream<Item = Result<SseMessage, Error>> + Send>>,
}

impl Stream for ServiceEvents {
    type Item = Result<SseMessage, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl ApiClient {
    /// Open the service event stream.
    ///
    /// Fails with `Error::Unauthorized` on 401/403 so callers can stop
    /// reconnecting.
    pub async fn open_service_events(&self) -> Result<ServiceEvents, Error> {
        let mut url = self.url("service/events")?;
        debug!("GET {url} (event stream)");

        if let Some(token) = self.token() {
            url.query_pairs_mut()
                .append_pair("token", token.expose_secret());
        }

        let resp = self
            .stream_http()
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Self::parse_error(status, resp).await);
        }

        let mut body = resp.bytes_stream();
        let stream = async_stream::try_stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| Error::Stream(e.to_string()))?;
                for msg in decoder.feed(&chunk) {
                    yield msg;
                }
            }
        };

        Ok(ServiceEvents {
            inner: Box::pin(stream),
        })
    }
}
