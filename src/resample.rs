//! Resampling frequencies and the mapping of timestamps into buckets.
//!
//! - A [`Frequency`] is a fixed bucket width plus an anchor.
//! - Buckets are contiguous half-open intervals `[origin + k * width,
//!   origin + (k + 1) * width)` labelled by their start.
//! - The origin is midnight of the first day of the data (weekly buckets
//!   use the Monday of that week and are labelled by it), so daily
//!   buckets always start at midnight and hourly buckets on the hour
//!   whatever the first sample.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::model::ConsoError;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * 60;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    StartDay,
    Monday,
}

/// A resampling rule such as `"D"`, `"1h"`, `"30min"` or `"W"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Frequency {
    width: Duration,
    anchor: Anchor,
}

impl Frequency {
    /// A fixed-width frequency anchored at midnight of the first day.
    ///
    /// Returns `None` for non-positive widths.
    pub fn fixed(width: Duration) -> Option<Self> {
        if width <= Duration::zero() {
            return None;
        }
        Some(Frequency {
            width,
            anchor: Anchor::StartDay,
        })
    }

    pub fn minutes(n: i64) -> Self {
        Frequency {
            width: Duration::minutes(n.max(1)),
            anchor: Anchor::StartDay,
        }
    }

    pub fn hours(n: i64) -> Self {
        Frequency {
            width: Duration::hours(n.max(1)),
            anchor: Anchor::StartDay,
        }
    }

    pub fn days(n: i64) -> Self {
        Frequency {
            width: Duration::days(n.max(1)),
            anchor: Anchor::StartDay,
        }
    }

    pub fn width(&self) -> Duration {
        self.width
    }

    /// Start of the first bucket for data beginning at `first`.
    pub fn origin(&self, first: NaiveDateTime) -> NaiveDateTime {
        let midnight = first.date().and_time(NaiveTime::MIN);
        match self.anchor {
            Anchor::StartDay => midnight,
            Anchor::Monday => {
                midnight - Duration::days(i64::from(first.weekday().num_days_from_monday()))
            }
        }
    }

    /// Index of the bucket containing `ts`, counted from `origin`.
    ///
    /// Euclidean division keeps this monotonic for timestamps before the
    /// origin.
    pub fn bucket_id(&self, origin: NaiveDateTime, ts: NaiveDateTime) -> i64 {
        let width_us = self.width.num_microseconds().unwrap_or(i64::MAX).max(1);
        let offset_us = (ts - origin).num_microseconds().unwrap_or(i64::MAX);
        offset_us.div_euclid(width_us)
    }

    /// Label (start instant) of bucket `id`.
    pub fn bucket_start(&self, origin: NaiveDateTime, id: i64) -> NaiveDateTime {
        let width_us = self.width.num_microseconds().unwrap_or(i64::MAX);
        origin + Duration::microseconds(width_us.saturating_mul(id))
    }

    /// Human-readable decomposition into non-zero calendar components,
    /// e.g. `"1 day"` or `"1 hour, 30 minutes"`.
    pub fn describe(&self) -> String {
        describe_duration(self.width)
    }
}

impl FromStr for Frequency {
    type Err = ConsoError;

    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        let rule = rule.trim();
        let split = rule
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rule.len());
        let (count, unit) = rule.split_at(split);
        let count: i64 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| ConsoError::Configuration(format!("invalid resampling rule '{}'", rule)))?
        };
        if count <= 0 {
            return Err(ConsoError::Configuration(format!(
                "resampling rule '{}' must have a positive multiple",
                rule
            )));
        }

        let (seconds, anchor) = match unit {
            "s" | "S" => (1, Anchor::StartDay),
            "min" | "T" => (SECONDS_PER_MINUTE, Anchor::StartDay),
            "h" | "H" => (SECONDS_PER_HOUR, Anchor::StartDay),
            "D" | "d" => (SECONDS_PER_DAY, Anchor::StartDay),
            "W" | "w" => (7 * SECONDS_PER_DAY, Anchor::Monday),
            _ => {
                return Err(ConsoError::Configuration(format!(
                    "unknown resampling rule '{}', expected a multiple of s, min, h, D or W",
                    rule
                )));
            }
        };

        Ok(Frequency {
            width: Duration::seconds(seconds * count),
            anchor,
        })
    }
}

impl TryFrom<String> for Frequency {
    type Error = ConsoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.anchor {
            Anchor::Monday => write!(f, "{}W", self.width.num_days() / 7),
            Anchor::StartDay => write!(f, "{}", self.describe()),
        }
    }
}

/// Split a duration into days, hours, minutes, seconds, milliseconds and
/// microseconds, keeping the non-zero ones.
pub fn describe_duration(d: Duration) -> String {
    let total_us = d.num_microseconds().unwrap_or(i64::MAX).max(0);
    let us_per_second = 1_000_000;
    let components = [
        (total_us / (SECONDS_PER_DAY * us_per_second), "day"),
        (total_us / (SECONDS_PER_HOUR * us_per_second) % 24, "hour"),
        (total_us / (SECONDS_PER_MINUTE * us_per_second) % 60, "minute"),
        (total_us / us_per_second % 60, "second"),
        (total_us / 1000 % 1000, "millisecond"),
        (total_us % 1000, "microsecond"),
    ];

    let parts: Vec<String> = components
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| {
            if *value == 1 {
                format!("{} {}", value, unit)
            } else {
                format!("{} {}s", value, unit)
            }
        })
        .collect();

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(", ")
    }
}
