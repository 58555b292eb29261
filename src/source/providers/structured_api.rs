//! Structured match API provider.
//!
//! Tries a list of candidate endpoints until one returns a non-empty
//! payload, then falls back to JSON embedded in the landing page's
//! `<script>` tags. Field names vary between API revisions, so every field
//! is resolved through an alias list where the first non-empty value wins
//! and missing required fields get conservative defaults.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::StructuredApiConfig;
use crate::content::script_blocks;
use crate::error::{Error, Result};
use crate::event::{stream_refs, EventRecord, EventStatus, PLACEHOLDER_THUMBNAIL};
use crate::proxy::ProxyResolver;
use crate::source::time::parse_iso;
use crate::source::SourceProvider;

const UNKNOWN_COMPETITION: &str = "Unknown Tournament";
const LIST_KEYS: [&str; 3] = ["matches", "data", "result"];

const ID: &[&str] = &["/id", "/match_id", "/matchId"];
const TITLE: &[&str] = &["/title", "/name"];
const COMPETITION: &[&str] = &["/tournament/name", "/tournament", "/series/name", "/league/name"];
const TEAM_A: &[&str] = &["/team1/name", "/team1", "/teams/0/name", "/teams/0", "/homeTeam/name"];
const TEAM_B: &[&str] = &["/team2/name", "/team2", "/teams/1/name", "/teams/1", "/awayTeam/name"];
const START: &[&str] = &["/start_time", "/startTime", "/datetime"];
const THUMBNAIL: &[&str] = &["/thumbnail", "/image", "/poster_url"];
const CATEGORY: &[&str] = &["/category", "/sport"];
const STREAM_PRIMARY: &[&str] = &["/streams/dai", "/streams/primary"];
const STREAM_AD_FREE: &[&str] = &["/streams/adfree", "/streams/secondary"];

/// Provider for a JSON match API with unstable field names.
pub struct StructuredApiProvider {
    resolver: Arc<ProxyResolver>,
    endpoints: Vec<String>,
    landing_page: Option<String>,
    category: String,
}

impl StructuredApiProvider {
    pub fn new(resolver: Arc<ProxyResolver>, endpoints: Vec<String>) -> Self {
        Self {
            resolver,
            endpoints,
            landing_page: None,
            category: "Cricket".to_string(),
        }
    }

    pub fn from_config(resolver: Arc<ProxyResolver>, config: &StructuredApiConfig) -> Self {
        Self {
            resolver,
            endpoints: config.endpoints.clone(),
            landing_page: config.landing_page.clone(),
            category: config.category.clone(),
        }
    }

    #[must_use]
    pub fn with_landing_page(mut self, url: &str) -> Self {
        self.landing_page = Some(url.to_string());
        self
    }

    async fn scrape_landing_page(&self, page: &str) -> Result<Vec<EventRecord>> {
        let html = self.resolver.resolve_text(page).await?;
        for block in script_blocks(&html) {
            if !block.contains("matches") {
                continue;
            }
            let (Some(start), Some(end)) = (block.find('{'), block.rfind('}')) else {
                continue;
            };
            if end <= start {
                continue;
            }
            match serde_json::from_str::<Value>(&block[start..=end]) {
                Ok(payload) => {
                    let events = parse_payload(&payload, self.name(), &self.category);
                    if !events.is_empty() {
                        return Ok(events);
                    }
                }
                Err(e) => debug!("Embedded script is not JSON: {e}"),
            }
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl SourceProvider for StructuredApiProvider {
    fn name(&self) -> &'static str {
        "structured-api"
    }

    async fn fetch_events(&self) -> Result<Vec<EventRecord>> {
        let mut last = String::from("no endpoints configured");

        for endpoint in &self.endpoints {
            debug!("Trying endpoint {endpoint}");
            match self.resolver.resolve_json::<Value>(endpoint).await {
                Ok(payload) => {
                    let events = parse_payload(&payload, self.name(), &self.category);
                    if !events.is_empty() {
                        info!("Fetched {} events from {endpoint}", events.len());
                        return Ok(events);
                    }
                    debug!("Endpoint {endpoint} returned no events");
                    last = format!("{endpoint} returned no events");
                }
                Err(e) => {
                    warn!("Endpoint {endpoint} failed: {e}");
                    last = e.to_string();
                }
            }
        }

        if let Some(page) = &self.landing_page {
            match self.scrape_landing_page(page).await {
                Ok(events) if !events.is_empty() => {
                    info!("Recovered {} events from {page} markup", events.len());
                    return Ok(events);
                }
                Ok(_) => last = format!("no embedded events in {page}"),
                Err(e) => {
                    warn!("Landing page {page} failed: {e}");
                    last = e.to_string();
                }
            }
        }

        Err(Error::provider(self.name(), last))
    }
}

/// Normalize every item of the payload's event list.
pub fn parse_payload(payload: &Value, provider: &str, category: &str) -> Vec<EventRecord> {
    locate_list(payload)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| parse_item(item, index, provider, category))
                .collect()
        })
        .unwrap_or_default()
}

/// The event array: the payload itself, a well-known key, or a nested
/// `matches` array anywhere below.
fn locate_list(payload: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = payload.as_array() {
        return Some(items);
    }
    if let Some(items) = LIST_KEYS
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_array))
    {
        return Some(items);
    }
    payload
        .as_object()?
        .values()
        .filter(|v| v.is_object())
        .find_map(locate_list)
}

fn parse_item(item: &Value, index: usize, provider: &str, category: &str) -> Option<EventRecord> {
    if !item.is_object() {
        return None;
    }

    let participant_a = first_str(item, TEAM_A).unwrap_or_else(|| "Team 1".to_string());
    let participant_b = first_str(item, TEAM_B).unwrap_or_else(|| "Team 2".to_string());
    let title = first_str(item, TITLE).unwrap_or_else(|| format!("{participant_a} vs {participant_b}"));

    let status = if is_live(item) {
        EventStatus::Live
    } else {
        EventStatus::Upcoming
    };

    let stream_refs = if status.is_live() {
        stream_refs(first_str(item, STREAM_PRIMARY), first_str(item, STREAM_AD_FREE))
    } else {
        None
    };

    Some(EventRecord {
        id: first_str(item, ID).unwrap_or_else(|| format!("{provider}-{index}")),
        title,
        competition_name: first_str(item, COMPETITION)
            .unwrap_or_else(|| UNKNOWN_COMPETITION.to_string()),
        participant_a,
        participant_b,
        scheduled_at: start_time(item).unwrap_or_else(Utc::now),
        status,
        thumbnail_url: first_str(item, THUMBNAIL)
            .unwrap_or_else(|| PLACEHOLDER_THUMBNAIL.to_string()),
        category: first_str(item, CATEGORY).unwrap_or_else(|| category.to_string()),
        stream_refs,
    })
}

/// First alias that resolves to a non-empty string or a number.
fn first_str(item: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| item.pointer(p))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn is_live(item: &Value) -> bool {
    let flagged = ["/status", "/state"].iter().any(|p| {
        item.pointer(p)
            .and_then(Value::as_str)
            .is_some_and(|s| s.eq_ignore_ascii_case("live"))
    });
    flagged || item.get("is_live").and_then(Value::as_bool).unwrap_or(false)
}

fn start_time(item: &Value) -> Option<DateTime<Utc>> {
    START.iter().filter_map(|p| item.pointer(p)).find_map(|v| match v {
        Value::String(s) => parse_iso(s.trim()),
        Value::Number(n) => n.as_i64().and_then(|ts| {
            // Millisecond epochs are 13 digits in this era.
            if ts > 100_000_000_000 {
                DateTime::from_timestamp_millis(ts)
            } else {
                DateTime::from_timestamp(ts, 0)
            }
        }),
        _ => None,
    })
}
