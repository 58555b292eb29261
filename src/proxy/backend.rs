//! Proxy backend descriptors and their URL-wrapping conventions.

use serde::{Deserialize, Serialize};

/// How a backend expects the target URL and how it returns the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStyle {
    /// Target is percent-encoded and appended to the base (`...?url=`).
    Query,
    /// Target is appended verbatim as a path suffix.
    Path,
    /// Like [`Query`](Self::Query), but the response is a JSON envelope
    /// `{ "contents": "<original body>" }`.
    Envelope,
}

/// A third-party relay used to bypass cross-origin restrictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyBackend {
    pub name: String,
    #[serde(rename = "base")]
    pub base_endpoint: String,
    #[serde(default = "default_style")]
    pub style: ProxyStyle,
}

fn default_style() -> ProxyStyle {
    ProxyStyle::Query
}

impl ProxyBackend {
    pub fn new(name: &str, base_endpoint: &str, style: ProxyStyle) -> Self {
        Self {
            name: name.to_string(),
            base_endpoint: base_endpoint.to_string(),
            style,
        }
    }

    /// Wrap `target` according to this backend's convention.
    pub fn wrap(&self, target: &str) -> String {
        match self.style {
            ProxyStyle::Query | ProxyStyle::Envelope => {
                format!("{}{}", self.base_endpoint, urlencoding::encode(target))
            }
            ProxyStyle::Path => format!("{}{}", self.base_endpoint, target),
        }
    }

    /// `true` if `url` was already produced by [`wrap`](Self::wrap).
    pub fn is_wrapped(&self, url: &str) -> bool {
        !self.base_endpoint.is_empty() && url.starts_with(&self.base_endpoint)
    }

    /// Whether the backend passes the target body through unchanged, which
    /// is what a media player needs.
    pub fn passes_body_through(&self) -> bool {
        self.style != ProxyStyle::Envelope
    }
}

/// Relays known to pass bodies through; the order is the rotation order.
pub fn default_backends() -> Vec<ProxyBackend> {
    vec![
        ProxyBackend::new(
            "allorigins",
            "https://api.allorigins.win/raw?url=",
            ProxyStyle::Query,
        ),
        ProxyBackend::new("corsproxy", "https://corsproxy.io/?", ProxyStyle::Query),
        ProxyBackend::new(
            "codetabs",
            "https://api.codetabs.com/v1/proxy?quest=",
            ProxyStyle::Query,
        ),
        ProxyBackend::new(
            "thingproxy",
            "https://thingproxy.freeboard.io/fetch/",
            ProxyStyle::Path,
        ),
    ]
}
