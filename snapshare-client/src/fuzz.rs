#![cfg(test)]

use chrono::{Duration, TimeZone, Utc};

use crate::{
    api::Time,
    format::{relative_to, truncate, ELLIPSIS},
};

const UNITS: [&str; 7] = ["s", "m", "h", "d", "w", "mo", "y"];

fn now() -> Time {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Orders "Nunit ago" strings by how long ago they are
fn ago_rank(s: &str) -> (usize, u64) {
    let s = s.strip_suffix(" ago").expect("relative time without ' ago'");
    let split = s.find(|c: char| !c.is_ascii_digit()).expect("relative time without unit");
    let (count, unit) = s.split_at(split);
    let unit = UNITS
        .iter()
        .position(|u| *u == unit)
        .unwrap_or_else(|| panic!("unknown unit {unit:?}"));
    (unit, count.parse().expect("relative time count is not a number"))
}

#[test]
fn relative_time_is_monotonic() {
    bolero::check!()
        .with_type::<(u32, u32)>()
        .cloned()
        .for_each(|(a, b)| {
            let (near, far) = (a.min(b), a.max(b));
            let near = relative_to(now() - Duration::seconds(near as i64), now());
            let far = relative_to(now() - Duration::seconds(far as i64), now());
            assert!(ago_rank(&near) <= ago_rank(&far), "{near:?} is older than {far:?}");
        })
}

#[test]
fn relative_time_is_never_negative() {
    bolero::check!()
        .with_type::<i32>()
        .cloned()
        .for_each(|offset| {
            let res = relative_to(now() + Duration::seconds(offset as i64), now());
            assert!(!res.starts_with('-'), "negative relative time {res:?}");
            if offset >= 0 {
                assert_eq!(res, "0s ago");
            }
        })
}

#[test]
fn truncate_keeps_whole_words() {
    bolero::check!()
        .with_type::<(String, u8)>()
        .cloned()
        .for_each(|(text, max_len)| {
            let max_len = max_len as usize;
            let res = truncate(&text, max_len);
            if text.chars().count() <= max_len {
                assert_eq!(res, text);
                return;
            }
            let kept = res
                .strip_suffix(ELLIPSIS)
                .expect("truncated text without ellipsis");
            assert!(text.starts_with(kept));
            assert!(kept.chars().count() <= max_len);
            let window = text.chars().take(max_len).collect::<String>();
            if window.contains(' ') {
                // the cut happened right before a space of the original text
                assert_eq!(text[kept.len()..].chars().next(), Some(' '));
            } else {
                assert_eq!(kept, window);
            }
        })
}
