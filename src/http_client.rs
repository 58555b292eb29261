//! HTTP client and the transport seam used by every network call.
//!
//! Features:
//! - HTTP/2 with adaptive flow control, connection pooling
//! - TLS 1.3 via rustls
//! - Brotli / Gzip / Deflate (auto-negotiated)
//! - Bounded connect and whole-request timeouts on every call

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, USER_AGENT};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Status and body of a completed GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP surface needed by the resolver, providers and decoder.
///
/// Implementations must apply a bounded timeout to every call.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET `url` and return status plus body text, whatever the status.
    async fn get_text(&self, url: &str) -> Result<HttpResponse>;

    /// GET `url` and return the raw body; non-2xx is an error.
    async fn get_bytes(&self, url: &str) -> Result<Bytes>;

    /// HEAD `url` and return the status code.
    async fn head(&self, url: &str) -> Result<u16>;
}

/// reqwest-backed [`HttpTransport`].
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a client with the default 10 s connect / 15 s request timeouts.
    pub fn new() -> Result<Self> {
        Self::with_timeouts(Duration::from_secs(10), Duration::from_secs(15))
    }

    /// Create a client with explicit timeouts.
    pub fn with_timeouts(connect: Duration, request: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            // Let the server negotiate HTTP/2 vs HTTP/1.1
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .default_headers(headers)
            .connect_timeout(connect)
            .timeout(request)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for HttpClient {
    #[instrument(skip(self), fields(url = %url))]
    async fn get_text(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        debug!(status, version = ?response.version(), "Response received");
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }

    async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?)
    }

    async fn head(&self, url: &str) -> Result<u16> {
        let response = self.client.head(url).send().await?;
        Ok(response.status().as_u16())
    }
}
