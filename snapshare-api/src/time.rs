use chrono::{DateTime, Utc};

use crate::Time;

/// Parses an ISO-8601 timestamp, treating timestamps without a zone designator as UTC
pub fn parse_timestamp(s: &str) -> Result<Time, chrono::ParseError> {
    let s = s.trim();
    let parsed = if has_zone(s) {
        DateTime::parse_from_rfc3339(s)
    } else {
        DateTime::parse_from_rfc3339(&format!("{s}Z"))
    };
    parsed.map(|t| t.with_timezone(&Utc))
}

fn has_zone(s: &str) -> bool {
    if s.ends_with('Z') || s.ends_with('z') {
        return true;
    }
    // the date part has dashes too, only look after the time separator
    match s.find(|c: char| c == 'T' || c == 't' || c == ' ') {
        Some(idx) => s[idx..].contains(|c: char| c == '+' || c == '-'),
        None => false,
    }
}

pub(crate) fn deserialize<'de, D>(d: D) -> Result<Time, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = <String as serde::Deserialize>::deserialize(d)?;
    parse_timestamp(&s).map_err(serde::de::Error::custom)
}
