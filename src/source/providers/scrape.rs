//! Best-effort landing page scraper.
//!
//! The page is rendered for humans, so records are assembled from loose text
//! patterns: sections start at an emoji marker, team codes are short
//! uppercase tokens and the start time is a free-form date line. Results are
//! never authoritative, and an anti-bot challenge page yields no records
//! rather than an error.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::ScrapeConfig;
use crate::content::{html_to_text, looks_bot_protected};
use crate::error::{Error, Result};
use crate::event::{stream_refs, EventRecord, EventStatus, PLACEHOLDER_THUMBNAIL};
use crate::proxy::ProxyResolver;
use crate::source::time::{parse_scraped_time, SCRAPED_DATE};
use crate::source::SourceProvider;

static TEAM_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2,4}(?:-W)?$").expect("valid team regex"));

const SECTION_MARKERS: [char; 2] = ['\u{1F3CF}', '\u{1F3AE}'];
const COMPETITION_KEYWORDS: [&str; 6] = ["Trophy", "League", "T20", "Premier", "Hundred", "ECS"];
const MIN_SECTION_CHARS: usize = 10;
const MIN_SECTION_LINES: usize = 5;

/// Provider scraping a fixtures landing page.
pub struct ScrapeProvider {
    resolver: Arc<ProxyResolver>,
    url: String,
    category: String,
    default_stream: Option<String>,
}

impl ScrapeProvider {
    pub fn new(resolver: Arc<ProxyResolver>, url: &str) -> Self {
        Self {
            resolver,
            url: url.to_string(),
            category: "Cricket".to_string(),
            default_stream: None,
        }
    }

    pub fn from_config(resolver: Arc<ProxyResolver>, config: &ScrapeConfig) -> Self {
        Self {
            resolver,
            url: config.url.clone(),
            category: config.category.clone(),
            default_stream: config.default_stream.clone(),
        }
    }

    /// Stream attached to every live scraped event.
    #[must_use]
    pub fn with_default_stream(mut self, url: &str) -> Self {
        self.default_stream = Some(url.to_string());
        self
    }

    fn parse_text(&self, text: &str) -> Vec<EventRecord> {
        split_sections(text)
            .into_iter()
            .enumerate()
            .filter_map(|(index, section)| self.parse_section(section, index))
            .collect()
    }

    fn parse_section(&self, section: &str, index: usize) -> Option<EventRecord> {
        if section.trim().chars().count() < MIN_SECTION_CHARS {
            return None;
        }
        let lines: Vec<&str> = section
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.len() < MIN_SECTION_LINES {
            return None;
        }

        // "LIVE" is itself a valid team code shape.
        let teams: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|l| *l != "LIVE" && TEAM_CODE.is_match(l))
            .collect();
        let [team_a, team_b, ..] = teams.as_slice() else {
            debug!(section = index, "Fewer than two team codes, skipping");
            return None;
        };
        let date_line = lines.iter().find(|l| SCRAPED_DATE.is_match(l))?;

        let status = if lines.contains(&"LIVE") {
            EventStatus::Live
        } else {
            EventStatus::Upcoming
        };
        let competition = lines
            .iter()
            .find(|l| COMPETITION_KEYWORDS.iter().any(|k| l.contains(k)))
            .map_or("Unknown Tournament", |l| *l);

        let scheduled_at = parse_scraped_time(date_line).unwrap_or_else(|| {
            warn!(section = index, "Unparseable date {date_line:?}, using now");
            Utc::now()
        });

        let stream_refs = match (&self.default_stream, status) {
            (Some(url), EventStatus::Live) => stream_refs(Some(url.clone()), Some(url.clone())),
            _ => None,
        };

        Some(EventRecord {
            id: format!("{}-{index}", self.name()),
            title: format!("{team_a} vs {team_b}"),
            competition_name: competition.to_string(),
            participant_a: (*team_a).to_string(),
            participant_b: (*team_b).to_string(),
            scheduled_at,
            status,
            thumbnail_url: PLACEHOLDER_THUMBNAIL.to_string(),
            category: self.category.clone(),
            stream_refs,
        })
    }
}

#[async_trait]
impl SourceProvider for ScrapeProvider {
    fn name(&self) -> &'static str {
        "scrape"
    }

    async fn fetch_events(&self) -> Result<Vec<EventRecord>> {
        let body = self
            .resolver
            .resolve_text(&self.url)
            .await
            .map_err(|e| Error::provider(self.name(), e))?;

        if looks_bot_protected(&body) {
            warn!(url = %self.url, "Landing page looks bot-protected, returning no events");
            return Ok(Vec::new());
        }

        let events = self.parse_text(&html_to_text(&body));
        info!("Scraped {} events from {}", events.len(), self.url);
        Ok(events)
    }
}

/// Split text before every section marker; the marker stays with its section.
fn split_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if SECTION_MARKERS.contains(&c) && i > start {
            sections.push(&text[start..i]);
            start = i;
        }
    }
    sections.push(&text[start..]);
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ProxyBackend, ProxyStyle};
    use crate::testing::FakeTransport;
    use chrono::Timelike;

    const PAGE_URL: &str = "https://fixtures.test";

    fn fixture_page() -> String {
        let filler = "<p>Fixtures, scores and highlights for every match.</p>".repeat(30);
        format!(
            "<html><body>{filler}\
             <div>\u{1F3CF} Cricket<p>LIVE</p><p>Hundred Men 2025</p><p>BB</p><p>HT</p>\
             <p>13 August 2025 03:15 PM</p></div>\
             <div>\u{1F3AE} Cricket<p>UPCOMING</p><p>Caribbean Premier League</p><p>TKR-W</p>\
             <p>GAW-W</p><p>14 Aug 2025 12:00 AM</p></div>\
             <div>\u{1F3CF} Cricket<p>LIVE</p><p>Some Cup</p><p>ONLY</p><p>one team here</p>\
             <p>15 August 2025 10:00 AM</p></div>\
             </body></html>"
        )
    }

    fn provider(body: &str) -> ScrapeProvider {
        let relay = ProxyBackend::new("raw", "https://relay.test/?url=", ProxyStyle::Query);
        let transport = FakeTransport::new().on_get(&relay.wrap(PAGE_URL), 200, body);
        let resolver = Arc::new(ProxyResolver::new(Arc::new(transport), vec![relay]));
        ScrapeProvider::new(resolver, PAGE_URL)
    }

    #[test]
    fn splits_before_markers() {
        let sections = split_sections("intro \u{1F3CF} one \u{1F3AE} two");
        assert_eq!(sections.len(), 3);
        assert!(sections[1].starts_with('\u{1F3CF}'));
        assert!(sections[2].starts_with('\u{1F3AE}'));
    }

    #[test]
    fn team_codes() {
        for ok in ["BB", "IND", "TKRW", "GAW-W"] {
            assert!(TEAM_CODE.is_match(ok), "{ok}");
        }
        for bad in ["B", "INDIA", "Ind", "LIVE-X"] {
            assert!(!TEAM_CODE.is_match(bad), "{bad}");
        }
    }

    #[tokio::test]
    async fn assembles_records_from_sections() {
        let events = provider(&fixture_page()).fetch_events().await.unwrap();
        assert_eq!(events.len(), 2);

        let first = &events[0];
        assert_eq!(first.title, "BB vs HT");
        assert_eq!(first.competition_name, "Hundred Men 2025");
        assert!(first.status.is_live());
        assert_eq!(first.scheduled_at.hour(), 15);
        assert!(first.stream_refs.is_none());

        let second = &events[1];
        assert_eq!(second.participant_a, "TKR-W");
        assert_eq!(second.status, EventStatus::Upcoming);
        assert_eq!(second.scheduled_at.hour(), 0);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn live_events_get_the_default_stream() {
        let events = provider(&fixture_page())
            .with_default_stream("https://cdn.test/live.m3u8")
            .fetch_events()
            .await
            .unwrap();
        assert_eq!(events[0].stream_ref("primary"), Some("https://cdn.test/live.m3u8"));
        assert!(events[1].stream_refs.is_none());
    }

    #[tokio::test]
    async fn bot_protected_page_yields_nothing() {
        let challenge = "<html><script>var _0x1=Function('obfuscated')();</script></html>";
        let events = provider(challenge).fetch_events().await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn unreachable_page_is_unavailable() {
        let resolver = Arc::new(ProxyResolver::new(Arc::new(FakeTransport::new()), vec![]));
        let err = ScrapeProvider::new(resolver, PAGE_URL)
            .fetch_events()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable { .. }));
    }
}
