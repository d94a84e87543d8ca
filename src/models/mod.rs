//! Domain model module declarations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub mod descriptor;

/// Deserialize an optional timestamp without failing the enclosing record.
///
/// Accepts an RFC 3339 string or integer epoch milliseconds. Anything else,
/// including `null`, a missing field, or an unparseable string, yields
/// `None` so a single bad field never discards the rest of a descriptor.
pub(crate) fn deserialize_lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

/// Parse a JSON value as a UTC timestamp.
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}
