//! Date formats spoken by CVS servers. All timestamps are Unix seconds, UTC.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Upper bound used for open-ended `rlog -d` ranges.
pub const RLOG_DATE_CEILING: &str = "1 Jan 2038 05:00:00 -0000";

/// `date:` field of an rlog revision block.
///
/// Older servers send `2013/01/18 13:28:28`, newer ones
/// `2013-01-18 13:28:28 +0000`.
pub fn parse_rlog_date(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y/%m/%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Date column of an entry line, e.g. `Sun Mar 17 15:57:38 2013`.
pub fn parse_entry_date(s: &str) -> Option<i64> {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&collapsed, "%a %b %d %H:%M:%S %Y")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// `Mod-time` response payload, e.g. `17 Mar 2013 15:57:38 -0000`.
pub fn parse_rfc2822(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp());
    }
    DateTime::parse_from_str(s, "%d %b %Y %H:%M:%S %z")
        .ok()
        .map(|dt| dt.timestamp())
}

pub fn format_rfc2822(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.to_rfc2822(),
        None => RLOG_DATE_CEILING.to_string(),
    }
}
