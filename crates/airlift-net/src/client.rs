use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::Client;
use tracing::warn;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::Net,
    types::{Headers, NetOptions},
};

#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// # Panics
    ///
    /// Panics if the `reqwest::Client` builder fails to build.
    #[must_use]
    pub fn new(options: NetOptions) -> Self {
        let inner = Client::builder()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .expect("failed to build reqwest client");
        Self { inner, options }
    }

    fn apply_headers(
        mut req: reqwest::RequestBuilder,
        headers: Option<Headers>,
    ) -> reqwest::RequestBuilder {
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }

    /// # Errors
    ///
    /// Returns [`NetError`] on HTTP failure, timeout, or network error.
    pub async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> NetResult<Bytes> {
        <Self as Net>::get_bytes(self, url, headers).await
    }

    /// # Errors
    ///
    /// Returns [`NetError`] on HTTP failure or network error.
    pub async fn stream(&self, url: Url, headers: Option<Headers>) -> NetResult<crate::ByteStream> {
        <Self as Net>::stream(self, url, headers).await
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(NetOptions::default())
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError> {
        let req = self.inner.get(url.clone());
        let req = Self::apply_headers(req, headers);
        let req = req.timeout(self.options.request_timeout);

        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status();

        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "request failed");
            return Err(NetError::http_status(status.as_u16(), url.to_string()));
        }

        resp.bytes().await.map_err(NetError::from)
    }

    async fn stream(
        &self,
        url: Url,
        headers: Option<Headers>,
    ) -> Result<crate::ByteStream, NetError> {
        let req = self.inner.get(url.clone());
        let req = Self::apply_headers(req, headers);

        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status();

        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "stream request failed");
            return Err(NetError::http_status(status.as_u16(), url.to_string()));
        }

        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use airlift_test_utils::{TestHttpServer, UpdateServerFixture};
    use futures::StreamExt;

    use super::*;

    async fn fixture_server() -> (UpdateServerFixture, TestHttpServer) {
        let fixture = UpdateServerFixture::new();
        let server = TestHttpServer::new(fixture.router()).await;
        (fixture, server)
    }

    #[tokio::test]
    async fn get_bytes_round_trips_headers_and_body() {
        let (fixture, server) = fixture_server().await;
        fixture.add_asset("bundle", b"bundle bytes".to_vec());

        let client = HttpClient::default();
        let mut headers = Headers::new();
        headers.insert("accept", "application/octet-stream");
        let bytes = client
            .get_bytes(server.url("/assets/bundle"), Some(headers))
            .await
            .unwrap();

        assert_eq!(bytes.as_ref(), b"bundle bytes");
        assert_eq!(fixture.asset_hits(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (fixture, server) = fixture_server().await;
        fixture.add_failing_asset("broken", 500);

        let client = HttpClient::default();
        let err = client
            .get_bytes(server.url("/assets/broken"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, NetError::HttpStatus { status: 500, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn stream_yields_the_full_body() {
        let (fixture, server) = fixture_server().await;
        let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        fixture.add_asset("large", payload.clone());

        let client = HttpClient::default();
        let mut stream = client
            .stream(server.url("/assets/large"), None)
            .await
            .unwrap();

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, payload);
    }
}
