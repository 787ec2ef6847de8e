use crate::api::{parse_timestamp, Time};

pub const DEFAULT_PREVIEW_CHARS: usize = 120;
pub const ELLIPSIS: &str = "...";

/// Age of `timestamp` as seen from `now`, eg. "3h ago"
///
/// Timestamps without a zone designator are read as UTC.
pub fn relative(timestamp: &str, now: Time) -> Result<String, chrono::ParseError> {
    Ok(relative_to(parse_timestamp(timestamp)?, now))
}

/// Age of `then` as seen from `now`; timestamps in the future are "0s ago"
pub fn relative_to(then: Time, now: Time) -> String {
    let secs = (now - then).num_seconds().max(0);
    if secs < 60 {
        return format!("{secs}s ago");
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{mins}m ago");
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{days}d ago");
    }
    let weeks = days / 7;
    if weeks < 4 {
        return format!("{weeks}w ago");
    }
    let months = weeks / 4;
    if months < 12 {
        return format!("{months}mo ago");
    }
    format!("{}y ago", months / 12)
}

/// Shortens `text` to at most `max_len` chars plus an ellipsis, cutting at a
/// space when there is one so that words are not split
pub fn truncate(text: &str, max_len: usize) -> String {
    let cut = match text.char_indices().nth(max_len) {
        None => return String::from(text),
        Some((idx, _)) => &text[..idx],
    };
    let cut = match cut.rfind(' ') {
        Some(space) => &cut[..space],
        None => cut,
    };
    format!("{cut}{ELLIPSIS}")
}

/// `truncate` with the length used for comment and caption previews
pub fn preview(text: &str) -> String {
    truncate(text, DEFAULT_PREVIEW_CHARS)
}
