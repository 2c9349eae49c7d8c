//! Timestamp normalisation for inbound transaction records.
//!
//! Upstream history services emit either epoch milliseconds or RFC 3339 strings.
//! Both collapse to a single `DateTime<Utc>` at deserialisation time so the
//! detectors only ever see one instant type.

use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Calendar(String),
}

/// Convert epoch milliseconds into a UTC instant.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Parse an RFC 3339 calendar timestamp into a UTC instant.
pub fn from_calendar(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(ms) => from_epoch_millis(ms)
            .ok_or_else(|| de::Error::custom(format!("epoch millis out of range: {}", ms))),
        RawTimestamp::Calendar(s) => from_calendar(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid RFC 3339 timestamp: {}", s))),
    }
}

pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&timestamp.to_rfc3339())
}
