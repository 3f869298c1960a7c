//! Timestamp parsing tolerant of the formats the server emits
//!
//! Accepted inputs: RFC 3339 strings, `YYYY-MM-DD HH:MM:SS` (read as UTC),
//! and integer unix milliseconds.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer};

/// Layout used by the trade history endpoint
pub const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Millis(i64),
    Text(String),
}

/// Parse a textual timestamp in any accepted layout
pub fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, HISTORY_TIME_FORMAT)
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn from_raw<E: de::Error>(raw: RawTime) -> Result<DateTime<Utc>, E> {
    match raw {
        RawTime::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| E::custom(format!("timestamp out of range: {}", ms))),
        RawTime::Text(text) => {
            parse_text(&text).ok_or_else(|| E::custom(format!("unrecognised timestamp `{}`", text)))
        }
    }
}

/// Deserialize a required timestamp
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    from_raw(RawTime::deserialize(deserializer)?)
}

/// Deserialize an optional timestamp; `null` and empty strings become `None`
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawTime>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawTime::Text(text)) if text.is_empty() => Ok(None),
        Some(raw) => from_raw(raw).map(Some),
    }
}
