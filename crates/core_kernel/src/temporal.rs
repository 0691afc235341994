//! Timestamp handling for stored documents
//!
//! Timestamps are persisted as fixed-width RFC 3339 strings with millisecond
//! precision and a `Z` suffix (`2024-03-01T09:15:00.000Z`). With a fixed width
//! the lexical order of the strings is the chronological order, so range
//! filters and sorts on date fields behave the same in every store.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, SecondsFormat, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Date out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid window: start {start} must be before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Formats a timestamp in the canonical stored form
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The current time at the stored precision
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Parses any RFC 3339 timestamp into UTC
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, TemporalError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TemporalError::InvalidTimestamp(value.to_string()))
}

/// Midnight UTC of the day containing `timestamp`
pub fn start_of_day(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&timestamp.date_naive().and_time(NaiveTime::MIN))
}

/// Midnight UTC of the first day of the month containing `timestamp`
pub fn start_of_month(timestamp: DateTime<Utc>) -> Result<DateTime<Utc>, TemporalError> {
    month_start(timestamp.year(), timestamp.month())
}

/// Midnight UTC of the first day of the month after the one containing `timestamp`
pub fn start_of_next_month(timestamp: DateTime<Utc>) -> Result<DateTime<Utc>, TemporalError> {
    if timestamp.month() == 12 {
        month_start(timestamp.year() + 1, 1)
    } else {
        month_start(timestamp.year(), timestamp.month() + 1)
    }
}

fn month_start(year: i32, month: u32) -> Result<DateTime<Utc>, TemporalError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
        .ok_or_else(|| TemporalError::OutOfRange(format!("{}-{:02}", year, month)))
}

/// A half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "timestamp")]
    pub start: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TemporalError> {
        if start >= end {
            return Err(TemporalError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// The UTC calendar day containing `timestamp`
    pub fn day_of(timestamp: DateTime<Utc>) -> Self {
        let start = start_of_day(timestamp);
        Self {
            start,
            end: start + chrono::Duration::days(1),
        }
    }

    /// The UTC calendar month containing `timestamp`
    pub fn month_of(timestamp: DateTime<Utc>) -> Result<Self, TemporalError> {
        Self::new(start_of_month(timestamp)?, start_of_next_month(timestamp)?)
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

/// Serde adapter writing timestamps in the canonical stored form
///
/// ```rust
/// use chrono::{DateTime, Utc};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Entry {
///     #[serde(with = "core_kernel::temporal::timestamp")]
///     at: DateTime<Utc>,
/// }
/// ```
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Like [`timestamp`] for optional fields; pair with `default`
pub mod optional_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_str(&super::format_timestamp(value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| super::parse_timestamp(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::milliseconds(500);

        assert_eq!(format_timestamp(&whole), "2024-01-02T00:00:00.000Z");
        assert_eq!(format_timestamp(&fractional), "2024-01-02T00:00:00.500Z");
        assert!(format_timestamp(&whole) < format_timestamp(&fractional));
    }

    #[test]
    fn test_now_millis_survives_formatting() {
        let now = now_millis();
        assert_eq!(parse_timestamp(&format_timestamp(&now)).unwrap(), now);
    }

    #[test]
    fn test_parse_accepts_offsets() {
        let parsed = parse_timestamp("2024-01-02T05:30:00+05:30").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_month_window_wraps_year() {
        let dec = Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap();
        let window = TimeWindow::month_of(dec).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(window.contains(dec));
        assert!(!window.contains(window.end));
    }
}
