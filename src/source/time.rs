//! Upstream date/time formats normalized to UTC.
//!
//! Upstreams publish wall-clock times without a zone; they are taken as UTC
//! so every record shares one canonical representation.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// `d Month yyyy h:mm AM|PM`, as printed on scraped landing pages.
pub static SCRAPED_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})\s+([A-Za-z]+)\s+(\d{4})\s+(\d{1,2}):(\d{2})\s+([AP]M)")
        .expect("valid date regex")
});

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Convert a 12-hour clock reading to 24-hour.
///
/// 12 AM is hour 0, 12 PM stays 12, any other PM hour gains 12. Hours
/// outside `1..=12` or an unknown period yield `None`.
pub fn to_24_hour(hour: u32, period: &str) -> Option<u32> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    match period.to_ascii_uppercase().as_str() {
        "AM" => Some(if hour == 12 { 0 } else { hour }),
        "PM" => Some(if hour == 12 { 12 } else { hour + 12 }),
        _ => None,
    }
}

/// Parse the community feed format `hh:mm:ss AM dd-mm-yyyy`.
pub fn parse_feed_time(input: &str) -> Option<DateTime<Utc>> {
    let mut parts = input.split_whitespace();
    let (time, period, date) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let mut hms = time.split(':').map(str::parse::<u32>);
    let hour = hms.next()?.ok()?;
    let minute = hms.next()?.ok()?;
    let second = match hms.next() {
        Some(s) => s.ok()?,
        None => 0,
    };

    let mut dmy = date.split('-').map(str::parse::<u32>);
    let day = dmy.next()?.ok()?;
    let month = dmy.next()?.ok()?;
    let year = i32::try_from(dmy.next()?.ok()?).ok()?;

    let hour = to_24_hour(hour, period)?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    Some(naive.and_utc())
}

/// Parse `13 August 2025 03:15 PM` (month names may be abbreviated).
pub fn parse_scraped_time(input: &str) -> Option<DateTime<Utc>> {
    let caps = SCRAPED_DATE.captures(input)?;
    let day: u32 = caps[1].parse().ok()?;
    let month_name = caps[2].to_ascii_lowercase();
    let year: i32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;

    let month = MONTHS
        .iter()
        .position(|m| m.starts_with(&month_name) && month_name.len() >= 3)?;
    let month = u32::try_from(month).ok()? + 1;

    let hour = to_24_hour(hour, &caps[6])?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    Some(naive.and_utc())
}

/// Parse RFC 3339 or a zone-less ISO-8601 timestamp.
pub fn parse_iso(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| naive.and_utc())
}
