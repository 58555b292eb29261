//! Community-maintained JSON feed provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::CommunityFeedConfig;
use crate::error::{Error, Result};
use crate::event::{stream_refs, EventRecord, EventStatus, PLACEHOLDER_THUMBNAIL};
use crate::proxy::ProxyResolver;
use crate::source::time::parse_feed_time;
use crate::source::SourceProvider;

#[derive(Debug, Deserialize)]
struct FeedDocument {
    matches: Option<Vec<FeedMatch>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedMatch {
    match_id: Value,
    title: String,
    team_1: String,
    team_2: String,
    status: String,
    event_name: String,
    event_category: String,
    src: String,
    #[serde(rename = "startTime")]
    start_time: String,
    dai_url: Option<String>,
    adfree_url: Option<String>,
}

/// Provider for the community feed document.
pub struct CommunityFeedProvider {
    resolver: Arc<ProxyResolver>,
    url: String,
}

impl CommunityFeedProvider {
    pub fn new(resolver: Arc<ProxyResolver>, url: &str) -> Self {
        Self {
            resolver,
            url: url.to_string(),
        }
    }

    pub fn from_config(resolver: Arc<ProxyResolver>, config: &CommunityFeedConfig) -> Self {
        Self::new(resolver, &config.url)
    }
}

#[async_trait]
impl SourceProvider for CommunityFeedProvider {
    fn name(&self) -> &'static str {
        "community-feed"
    }

    async fn fetch_events(&self) -> Result<Vec<EventRecord>> {
        let document: FeedDocument = self
            .resolver
            .resolve_json(&self.url)
            .await
            .map_err(|e| Error::provider(self.name(), e))?;

        let Some(matches) = document.matches else {
            return Err(Error::provider(self.name(), "feed has no matches list"));
        };

        let events: Vec<EventRecord> = matches
            .into_iter()
            .enumerate()
            .filter_map(|(index, m)| normalize(m, index, self.name()))
            .collect();

        info!("Community feed yielded {} events", events.len());
        Ok(events)
    }
}

/// Map a raw feed entry; entries outside LIVE/UPCOMING/PAUSED are dropped.
fn normalize(m: FeedMatch, index: usize, provider: &str) -> Option<EventRecord> {
    let status = match m.status.trim().to_ascii_uppercase().as_str() {
        "LIVE" | "PAUSED" => EventStatus::Live,
        "UPCOMING" => EventStatus::Upcoming,
        _ => return None,
    };

    let id = match &m.match_id {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => format!("{provider}-{index}"),
    };

    let scheduled_at = parse_feed_time(&m.start_time).unwrap_or_else(|| {
        warn!(id = %id, "Unparseable start time {:?}, using now", m.start_time);
        Utc::now()
    });

    let title = if m.title.is_empty() {
        format!("{} vs {}", m.team_1, m.team_2)
    } else {
        m.title
    };

    Some(EventRecord {
        id,
        title,
        competition_name: m.event_name,
        participant_a: m.team_1,
        participant_b: m.team_2,
        scheduled_at,
        status,
        thumbnail_url: if m.src.is_empty() {
            PLACEHOLDER_THUMBNAIL.to_string()
        } else {
            m.src
        },
        category: m.event_category,
        stream_refs: stream_refs(m.dai_url, m.adfree_url),
    })
}
