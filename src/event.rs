//! Normalized event record shared by every source provider.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stream variant carrying dynamic ad insertion.
pub const VARIANT_PRIMARY: &str = "primary";
/// Stream variant without ad insertion.
pub const VARIANT_AD_FREE: &str = "ad-free";

/// Placeholder artwork for records whose upstream omits a thumbnail.
pub const PLACEHOLDER_THUMBNAIL: &str =
    "https://via.placeholder.com/400x200/1a1a1a/ffffff?text=Live+Match";

/// Broadcast status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Live,
    Upcoming,
}

impl EventStatus {
    pub fn is_live(self) -> bool {
        self == Self::Live
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => f.write_str("LIVE"),
            Self::Upcoming => f.write_str("UPCOMING"),
        }
    }
}

/// One live or upcoming broadcast event.
///
/// Live events should carry [`stream_refs`](Self::stream_refs); a missing
/// map means the stream is not available yet and is never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Identity, unique within one refresh cycle.
    pub id: String,
    pub title: String,
    pub competition_name: String,
    pub participant_a: String,
    pub participant_b: String,
    /// Start instant, always UTC.
    pub scheduled_at: DateTime<Utc>,
    pub status: EventStatus,
    pub thumbnail_url: String,
    pub category: String,
    /// Variant name (e.g. `"primary"`, `"ad-free"`) to upstream URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_refs: Option<BTreeMap<String, String>>,
}

impl EventRecord {
    /// Upstream URL for `variant`, if the event carries one.
    pub fn stream_ref(&self, variant: &str) -> Option<&str> {
        self.stream_refs
            .as_ref()
            .and_then(|refs| refs.get(variant))
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }

    /// First non-empty stream URL, preferring the primary variant.
    pub fn default_stream_ref(&self) -> Option<(&str, &str)> {
        if let Some(url) = self.stream_ref(VARIANT_PRIMARY) {
            return Some((VARIANT_PRIMARY, url));
        }
        self.stream_refs.as_ref().and_then(|refs| {
            refs.iter()
                .find(|(_, url)| !url.is_empty())
                .map(|(name, url)| (name.as_str(), url.as_str()))
        })
    }
}

/// Build a stream reference map from optional primary / ad-free URLs.
///
/// Returns `None` when neither URL is present so records keep the
/// "stream not yet available" shape.
pub fn stream_refs(
    primary: Option<String>,
    ad_free: Option<String>,
) -> Option<BTreeMap<String, String>> {
    let mut refs = BTreeMap::new();
    if let Some(url) = primary.filter(|u| !u.is_empty()) {
        refs.insert(VARIANT_PRIMARY.to_string(), url);
    }
    if let Some(url) = ad_free.filter(|u| !u.is_empty()) {
        refs.insert(VARIANT_AD_FREE.to_string(), url);
    }
    (!refs.is_empty()).then_some(refs)
}
