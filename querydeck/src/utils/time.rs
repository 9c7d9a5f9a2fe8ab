//! Time utility functions

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Canonical text form dates are compared in (`YYYY-MM-DD HH:MM:SS`)
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Canonical text of a string that reads as a calendar date or datetime
///
/// Only ISO-style forms count, so numeric strings such as `"2024"` or
/// `"20240101"` are never treated as dates. A plain date keeps its
/// `YYYY-MM-DD` form; datetimes are rewritten to the canonical format
/// (offset-aware values in UTC).
pub fn canonical_date_text(s: &str) -> Option<String> {
    let s = s.trim();
    if s.len() < 10 {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(format_canonical(&dt.with_timezone(&Utc).naive_utc()));
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| format_canonical(&dt))
}

/// True when `s` reads as a calendar date or datetime
pub fn looks_like_date(s: &str) -> bool {
    canonical_date_text(s).is_some()
}

/// Format a naive datetime in the canonical form
pub fn format_canonical(dt: &NaiveDateTime) -> String {
    dt.format(CANONICAL_DATETIME_FORMAT).to_string()
}

/// Convert a UTC timestamp to RFC 3339 (microsecond precision)
pub fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
