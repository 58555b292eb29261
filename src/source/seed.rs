//! Static fallback events shown when every provider fails.

use std::path::Path;

use chrono::{TimeZone, Utc};
use tracing::info;

use crate::error::{Error, Result};
use crate::event::{stream_refs, EventRecord, EventStatus};

const SEED_STREAM: &str =
    "https://in-mc-pdlive.fancode.com/mumbai/128760_english_hls_67492ta-di_h264/index.m3u8";
const SEED_THUMBNAIL: &str = "https://www.fancode.com/skillup-uploads/cms-media/New-Zealand-Tour-of-Zimbabwe-(Tests)Sporty-match-card-.jpg";

/// The built-in seed list.
pub fn builtin() -> Vec<EventRecord> {
    [
        ("zim-nz-test", "Zimbabwe vs New Zealand - 1st Test", 30),
        ("zim-nz-test-day2", "Zimbabwe vs New Zealand - 1st Test (Day 2)", 31),
    ]
    .into_iter()
    .map(|(id, title, day)| EventRecord {
        id: id.to_string(),
        title: title.to_string(),
        competition_name: "New Zealand Tour of Zimbabwe, 2025".to_string(),
        participant_a: "Zimbabwe".to_string(),
        participant_b: "New Zealand".to_string(),
        scheduled_at: Utc
            .with_ymd_and_hms(2025, 1, day, 6, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
        status: EventStatus::Live,
        thumbnail_url: SEED_THUMBNAIL.to_string(),
        category: "Cricket".to_string(),
        stream_refs: stream_refs(Some(SEED_STREAM.to_string()), Some(SEED_STREAM.to_string())),
    })
    .collect()
}

/// Load a seed list from a JSON array of event records.
pub fn load(path: &Path) -> Result<Vec<EventRecord>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read seed file {}: {e}", path.display())))?;
    let records: Vec<EventRecord> = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid seed file {}: {e}", path.display())))?;
    if records.is_empty() {
        return Err(Error::Config(format!("seed file {} is empty", path.display())));
    }
    info!("Loaded {} seed events from {}", records.len(), path.display());
    Ok(records)
}
