//! Timestamp parsing and calendar helpers shared by readers, filters and
//! aggregations.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a timestamp in one of the accepted ISO-like layouts.
///
/// Offsets (RFC 3339) are normalised to UTC and dropped: the canonical
/// table is timezone-naive. A bare date means midnight.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }

    None
}

/// Day/month/year as written by the vendor exports (`31/12/2021`).
pub fn parse_dmy(s: &str) -> Option<NaiveDate> {
    let mut parts = s.trim().split('/');
    let d: u32 = parts.next()?.trim().parse().ok()?;
    let m: u32 = parts.next()?.trim().parse().ok()?;
    let y: i32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(y, m, d)
}

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

/// Calendar quarter, 1..=4.
pub fn quarter(ts: &NaiveDateTime) -> u32 {
    (ts.month() - 1) / 3 + 1
}

/// Monday = 0 .. Sunday = 6.
pub fn weekday(ts: &NaiveDateTime) -> u32 {
    ts.weekday().num_days_from_monday()
}

/// Minutes elapsed since midnight.
pub fn minute_of_day(ts: &NaiveDateTime) -> u32 {
    ts.hour() * 60 + ts.minute()
}
