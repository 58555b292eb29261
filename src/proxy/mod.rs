//! CORS-bypass proxy resolution.
//!
//! A [`ProxyResolver`] turns an arbitrary, possibly blocked URL into a
//! reachable one by rotating through an ordered list of relay backends.
//!
//! # Rotation
//!
//! The resolver owns a round-robin cursor. Every failed attempt advances it
//! before the next attempt reads it, and it is never reset, so after `k`
//! consecutive failures on a fresh resolver the active backend is `k mod N`.
//! Each request makes at most `N` proxied attempts.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use matchcast::http_client::HttpClient;
//! use matchcast::proxy::{default_backends, ProxyResolver};
//!
//! # async fn example() -> matchcast::Result<()> {
//! let resolver = ProxyResolver::new(Arc::new(HttpClient::new()?), default_backends());
//! let feed: serde_json::Value = resolver.resolve_json("https://example.com/feed.json").await?;
//! let playable = resolver.resolve_stream_url("https://cdn.example.com/live/index.m3u8").await;
//! # Ok(())
//! # }
//! ```

mod backend;

pub use backend::{default_backends, ProxyBackend, ProxyStyle};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http_client::HttpTransport;

const DEFAULT_LIVENESS_URL: &str = "https://httpbin.org/json";

/// Rotating proxy resolver. Share it behind an `Arc`.
pub struct ProxyResolver {
    transport: Arc<dyn HttpTransport>,
    backends: Arc<[ProxyBackend]>,
    cursor: AtomicUsize,
    direct_first: bool,
    liveness_url: String,
}

impl ProxyResolver {
    pub fn new(transport: Arc<dyn HttpTransport>, backends: Vec<ProxyBackend>) -> Self {
        Self {
            transport,
            backends: backends.into(),
            cursor: AtomicUsize::new(0),
            direct_first: false,
            liveness_url: DEFAULT_LIVENESS_URL.to_string(),
        }
    }

    pub fn from_config(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self::new(transport, config.proxies.clone())
            .with_direct_first(config.direct_first)
            .with_liveness_url(&config.liveness_url)
    }

    /// Try the target directly before rotating through proxies.
    #[must_use]
    pub fn with_direct_first(mut self, direct_first: bool) -> Self {
        self.direct_first = direct_first;
        self
    }

    #[must_use]
    pub fn with_liveness_url(mut self, url: &str) -> Self {
        self.liveness_url = url.to_string();
        self
    }

    pub fn backends(&self) -> &[ProxyBackend] {
        &self.backends
    }

    /// Index of the backend the next request will use first.
    pub fn current_index(&self) -> usize {
        match self.backends.len() {
            0 => 0,
            n => self.cursor.load(Ordering::SeqCst) % n,
        }
    }

    fn advance(&self) {
        self.cursor.fetch_add(1, Ordering::SeqCst);
    }

    /// Fetch `url` as text through the rotation.
    pub async fn resolve_text(&self, url: &str) -> Result<String> {
        self.resolve_with(url, Ok).await
    }

    /// Fetch and decode JSON. An undecodable body counts as a failed attempt.
    pub async fn resolve_json<T: DeserializeOwned + Send>(&self, url: &str) -> Result<T> {
        self.resolve_with(url, |body| Ok(serde_json::from_str(&body)?))
            .await
    }

    #[instrument(skip(self, parse), fields(url = %url))]
    async fn resolve_with<T, F>(&self, url: &str, parse: F) -> Result<T>
    where
        F: Fn(String) -> Result<T> + Send + Sync,
        T: Send,
    {
        if self.direct_first {
            match self.fetch_direct(url).await.and_then(&parse) {
                Ok(value) => {
                    debug!("Direct fetch succeeded");
                    return Ok(value);
                }
                Err(e) => debug!("Direct fetch failed, falling back to proxies: {e}"),
            }
        }

        let attempts = self.backends.len();
        let mut last: Option<String> = None;

        for attempt in 1..=attempts {
            let backend = &self.backends[self.current_index()];
            debug!(attempt, proxy = %backend.name, "Attempting proxied fetch");

            match self.fetch_via(backend, url).await.and_then(&parse) {
                Ok(value) => {
                    info!(proxy = %backend.name, "Proxied fetch succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(proxy = %backend.name, "Proxy attempt {attempt} failed: {e}");
                    last = Some(e.to_string());
                    self.advance();
                }
            }
        }

        Err(Error::AllProxiesExhausted {
            attempts,
            last: last.unwrap_or_else(|| "no proxy backends configured".to_string()),
        })
    }

    async fn fetch_direct(&self, url: &str) -> Result<String> {
        let response = self.transport.get_text(url).await?;
        if !response.is_success() {
            return Err(Error::Status {
                status: response.status,
                url: url.to_string(),
            });
        }
        Ok(response.body)
    }

    async fn fetch_via(&self, backend: &ProxyBackend, url: &str) -> Result<String> {
        let proxied = backend.wrap(url);
        let body = self.fetch_direct(&proxied).await?;
        match backend.style {
            ProxyStyle::Envelope => unwrap_envelope(&body),
            ProxyStyle::Query | ProxyStyle::Path => Ok(body),
        }
    }

    /// `true` if `url` already starts with a configured backend endpoint.
    pub fn is_proxied(&self, url: &str) -> bool {
        self.backends.iter().any(|b| b.is_wrapped(url))
    }

    /// Turn a stream URL into one a player can reach.
    ///
    /// Never fails: when nothing answers, the first pass-through backend is
    /// used anyway and playback surfaces the error.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn resolve_stream_url(&self, url: &str) -> String {
        if self.is_proxied(url) {
            debug!("Already proxied, returning unchanged");
            return url.to_string();
        }

        if is_playlist_url(url) {
            match self.transport.head(url).await {
                Ok(status) if (200..300).contains(&status) => {
                    debug!("Direct playlist access works");
                    return url.to_string();
                }
                Ok(status) => debug!(status, "Direct playlist probe rejected"),
                Err(e) => debug!("Direct playlist probe failed: {e}"),
            }
        }

        for backend in self.backends.iter().filter(|b| b.passes_body_through()) {
            if self.is_alive(backend).await {
                info!(proxy = %backend.name, "Using proxy for stream");
                return backend.wrap(url);
            }
        }

        let fallback = self
            .backends
            .iter()
            .find(|b| b.passes_body_through())
            .or_else(|| self.backends.first());

        let Some(backend) = fallback else {
            warn!("No proxy backends configured, using stream URL as-is");
            return url.to_string();
        };

        let err = Error::StreamResolutionFailed {
            url: url.to_string(),
            reason: format!("no backend answered, degrading to {}", backend.name),
        };
        warn!("{err}");
        backend.wrap(url)
    }

    async fn is_alive(&self, backend: &ProxyBackend) -> bool {
        let probe = backend.wrap(&self.liveness_url);
        match self.transport.get_text(&probe).await {
            Ok(response) => response.is_success(),
            Err(e) => {
                debug!(proxy = %backend.name, "Liveness probe failed: {e}");
                false
            }
        }
    }

    /// Liveness of every backend, in list order.
    pub async fn probe_backends(&self) -> Vec<(ProxyBackend, bool)> {
        let checks = self.backends.iter().map(|b| async move {
            let alive = self.is_alive(b).await;
            (b.clone(), alive)
        });
        futures::future::join_all(checks).await
    }
}

/// `true` for HLS playlist URLs (`.m3u8` in the path or the query).
pub fn is_playlist_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            parsed.path().to_ascii_lowercase().ends_with(".m3u8")
                || parsed
                    .query()
                    .is_some_and(|q| q.to_ascii_lowercase().contains(".m3u8"))
        }
        Err(_) => url.to_ascii_lowercase().contains(".m3u8"),
    }
}

#[derive(Deserialize)]
struct Envelope {
    contents: Option<serde_json::Value>,
}

/// Extract the original body from a `{ "contents": ... }` envelope.
fn unwrap_envelope(body: &str) -> Result<String> {
    let envelope: Envelope = serde_json::from_str(body)?;
    match envelope.contents {
        Some(serde_json::Value::String(text)) => Ok(text),
        Some(serde_json::Value::Null) | None => Err(Error::Json(
            <serde_json::Error as serde::de::Error>::custom("proxy envelope without contents"),
        )),
        Some(other) => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;

    const TARGET: &str = "https://api.test/feed.json";
    const STREAM: &str = "https://cdn.test/live/index.m3u8";

    fn three_backends() -> Vec<ProxyBackend> {
        vec![
            ProxyBackend::new("one", "https://one.test/?url=", ProxyStyle::Query),
            ProxyBackend::new("two", "https://two.test/fetch/", ProxyStyle::Path),
            ProxyBackend::new("three", "https://three.test/raw?u=", ProxyStyle::Query),
        ]
    }

    fn resolver(transport: FakeTransport) -> ProxyResolver {
        ProxyResolver::new(Arc::new(transport), three_backends())
    }

    #[tokio::test]
    async fn resolve_json_uses_current_backend() {
        let backends = three_backends();
        let transport = FakeTransport::new().on_get(&backends[0].wrap(TARGET), 200, r#"{"ok":1}"#);
        let resolver = resolver(transport);

        let value: serde_json::Value = resolver.resolve_json(TARGET).await.unwrap();
        assert_eq!(value["ok"], 1);
        assert_eq!(resolver.current_index(), 0);
    }

    #[tokio::test]
    async fn failures_rotate_to_next_backend() {
        let backends = three_backends();
        let transport = FakeTransport::new()
            .on_get(&backends[0].wrap(TARGET), 503, "busy")
            .on_get(&backends[1].wrap(TARGET), 200, "not json")
            .on_get(&backends[2].wrap(TARGET), 200, r#"[1,2]"#);
        let resolver = resolver(transport);

        let value: Vec<u32> = resolver.resolve_json(TARGET).await.unwrap();
        assert_eq!(value, vec![1, 2]);
        // Two failures moved the cursor twice and it stays on the winner.
        assert_eq!(resolver.current_index(), 2);
    }

    #[tokio::test]
    async fn cursor_is_k_mod_n_after_consecutive_failures() {
        let resolver = resolver(FakeTransport::new());
        for _ in 0..3 {
            let err = resolver.resolve_text(TARGET).await.unwrap_err();
            assert!(matches!(err, Error::AllProxiesExhausted { attempts: 3, .. }));
            // Three failures per round over three backends: back to the start.
            assert_eq!(resolver.current_index(), 0);
            assert_eq!(resolver.cursor.load(Ordering::SeqCst) % 3, 0);
        }
        assert_eq!(resolver.cursor.load(Ordering::SeqCst), 9);

        // A success on backend #2 after one more failure leaves the cursor at 1.
        let backends = three_backends();
        let transport = FakeTransport::new().on_get(&backends[1].wrap(TARGET), 200, "ok");
        let resolver = ProxyResolver::new(Arc::new(transport), backends);
        assert_eq!(resolver.resolve_text(TARGET).await.unwrap(), "ok");
        assert_eq!(resolver.current_index(), 1);
    }

    #[tokio::test]
    async fn exhausted_error_carries_last_reason() {
        let backends = three_backends();
        let transport = FakeTransport::new().on_get(&backends[2].wrap(TARGET), 429, "slow down");
        let resolver = resolver(transport);

        match resolver.resolve_text(TARGET).await.unwrap_err() {
            Error::AllProxiesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.contains("429"), "last = {last}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn envelope_backend_is_unwrapped() {
        let backend = ProxyBackend::new("env", "https://env.test/get?url=", ProxyStyle::Envelope);
        let transport = FakeTransport::new().on_get(
            &backend.wrap(TARGET),
            200,
            r#"{"contents":"{\"matches\":[]}","status":{"http_code":200}}"#,
        );
        let resolver = ProxyResolver::new(Arc::new(transport), vec![backend]);

        let value: serde_json::Value = resolver.resolve_json(TARGET).await.unwrap();
        assert!(value["matches"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn direct_first_skips_proxies_and_keeps_cursor() {
        let transport = Arc::new(FakeTransport::new().on_get(TARGET, 200, "direct"));
        let resolver =
            ProxyResolver::new(transport.clone(), three_backends()).with_direct_first(true);
        assert_eq!(resolver.resolve_text(TARGET).await.unwrap(), "direct");
        assert_eq!(resolver.current_index(), 0);
        assert_eq!(transport.calls(), vec![format!("GET {TARGET}")]);
    }

    #[tokio::test]
    async fn reachable_playlist_is_returned_unmodified() {
        let transport = FakeTransport::new().on_head(STREAM, 200);
        let resolver = resolver(transport);
        assert_eq!(resolver.resolve_stream_url(STREAM).await, STREAM);
    }

    #[tokio::test]
    async fn unreachable_playlist_uses_first_live_backend() {
        let backends = three_backends();
        let liveness = DEFAULT_LIVENESS_URL;
        let transport = FakeTransport::new()
            .on_head(STREAM, 403)
            .on_get(&backends[0].wrap(liveness), 500, "")
            .refuse_get(&backends[1].wrap(liveness))
            .on_get(&backends[2].wrap(liveness), 200, "{}");
        let resolver = resolver(transport);

        let resolved = resolver.resolve_stream_url(STREAM).await;
        assert_eq!(resolved, backends[2].wrap(STREAM));
    }

    #[tokio::test]
    async fn no_live_backend_degrades_to_first() {
        let backends = three_backends();
        let resolver = resolver(FakeTransport::new());
        assert_eq!(
            resolver.resolve_stream_url(STREAM).await,
            backends[0].wrap(STREAM)
        );
    }

    #[tokio::test]
    async fn stream_resolution_is_idempotent() {
        let transport = Arc::new(FakeTransport::new());
        let resolver = ProxyResolver::new(transport.clone(), three_backends());
        let once = resolver.resolve_stream_url(STREAM).await;
        let requests = transport.calls().len();

        let twice = resolver.resolve_stream_url(&once).await;
        assert_eq!(once, twice);
        // An already proxied URL is returned without touching the network.
        assert_eq!(transport.calls().len(), requests);
    }

    #[tokio::test]
    async fn envelope_backends_are_never_used_for_streams() {
        let envelope = ProxyBackend::new("env", "https://env.test/get?url=", ProxyStyle::Envelope);
        let raw = ProxyBackend::new("raw", "https://raw.test/?url=", ProxyStyle::Query);
        let transport = FakeTransport::new()
            .on_get(&envelope.wrap(DEFAULT_LIVENESS_URL), 200, "{}")
            .on_get(&raw.wrap(DEFAULT_LIVENESS_URL), 200, "{}");
        let resolver = ProxyResolver::new(Arc::new(transport), vec![envelope, raw.clone()]);
        assert_eq!(resolver.resolve_stream_url(STREAM).await, raw.wrap(STREAM));
    }

    #[tokio::test]
    async fn empty_backend_list_returns_stream_unchanged() {
        let resolver = ProxyResolver::new(Arc::new(FakeTransport::new()), vec![]);
        assert_eq!(resolver.resolve_stream_url(STREAM).await, STREAM);
        let err = resolver.resolve_text(TARGET).await.unwrap_err();
        assert!(err.to_string().contains("no proxy backends configured"));
    }

    #[test]
    fn detects_playlists_in_path_and_query() {
        assert!(is_playlist_url("https://cdn.test/a/index.m3u8"));
        assert!(is_playlist_url("https://cdn.test/a/INDEX.M3U8?token=1"));
        assert!(is_playlist_url("https://relay.test/?url=https%3A%2F%2Fc%2Fx.m3u8"));
        assert!(!is_playlist_url("https://cdn.test/a/video.mp4"));
    }

    #[test]
    fn envelope_without_contents_is_an_error() {
        assert!(unwrap_envelope(r#"{"contents":null}"#).is_err());
        assert!(unwrap_envelope("<html>").is_err());
        assert_eq!(unwrap_envelope(r#"{"contents":{"a":1}}"#).unwrap(), r#"{"a":1}"#);
    }
}
