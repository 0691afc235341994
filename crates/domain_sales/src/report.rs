//! Sales reports
//!
//! A report totals sale amounts over a calendar window around "now":
//!
//! | stats type | window                     | bucket                  |
//! |------------|----------------------------|-------------------------|
//! | `daily`    | the current UTC day        | hour of day, `0..=23`   |
//! | `monthly`  | the current UTC month      | calendar day            |
//!
//! Buckets without sales are omitted. Entries are sorted by bucket.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::temporal::format_timestamp;
use core_kernel::TimeWindow;
use infra_db::{Accumulator, DateUnit, Filter, GroupKey, Pipeline, SortField};

use crate::error::SalesError;

const DATE_FIELD: &str = "date";
const AMOUNT_FIELD: &str = "amount";

/// Which report to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsType {
    Daily,
    Monthly,
}

impl StatsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsType::Daily => "daily",
            StatsType::Monthly => "monthly",
        }
    }

    /// The window of sales the report covers
    pub fn window(&self, now: DateTime<Utc>) -> Result<TimeWindow, SalesError> {
        match self {
            StatsType::Daily => Ok(TimeWindow::day_of(now)),
            StatsType::Monthly => Ok(TimeWindow::month_of(now)?),
        }
    }

    fn bucket_unit(&self) -> DateUnit {
        match self {
            StatsType::Daily => DateUnit::HourOfDay,
            StatsType::Monthly => DateUnit::Day,
        }
    }

    /// The aggregation pipeline computing this report
    pub fn pipeline(&self, now: DateTime<Utc>) -> Result<Pipeline, SalesError> {
        let window = self.window(now)?;
        let in_window = Filter::gte(DATE_FIELD, format_timestamp(&window.start))
            .and(Filter::lt(DATE_FIELD, format_timestamp(&window.end)));

        Ok(Pipeline::new()
            .match_filter(in_window)
            .group(
                GroupKey::DateBucket {
                    path: DATE_FIELD.to_string(),
                    unit: self.bucket_unit(),
                },
                vec![("totalAmount".to_string(), Accumulator::Sum(AMOUNT_FIELD.to_string()))],
            )
            .sort(vec![SortField::asc("_id")])
            .project(vec![
                ("bucket".to_string(), "_id".to_string()),
                ("totalAmount".to_string(), "totalAmount".to_string()),
            ]))
    }
}

impl fmt::Display for StatsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatsType {
    type Err = SalesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(StatsType::Daily),
            "monthly" => Ok(StatsType::Monthly),
            other => Err(SalesError::InvalidStatsType(other.to_string())),
        }
    }
}

/// Report bucket: an hour for daily reports, a day for monthly ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportBucket {
    Hour(u32),
    Day(NaiveDate),
}

/// Total sale amount in one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub bucket: ReportBucket,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use infra_db::Stage;
    use serde_json::json;

    #[test]
    fn test_stats_type_parsing() {
        assert_eq!("daily".parse::<StatsType>().unwrap(), StatsType::Daily);
        assert_eq!("monthly".parse::<StatsType>().unwrap(), StatsType::Monthly);
        assert!(matches!(
            "weekly".parse::<StatsType>(),
            Err(SalesError::InvalidStatsType(t)) if t == "weekly"
        ));
        assert_eq!(serde_json::to_value(StatsType::Monthly).unwrap(), json!("monthly"));
    }

    #[test]
    fn test_monthly_window_is_this_month_only() {
        let now = Utc.with_ymd_and_hms(2024, 12, 15, 10, 0, 0).unwrap();
        let window = StatsType::Monthly.window(now).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_daily_pipeline_shape() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let pipeline = StatsType::Daily.pipeline(now).unwrap();
        let stages = pipeline.stages();
        assert_eq!(stages.len(), 4);
        assert_eq!(
            stages[0],
            Stage::Match(
                Filter::gte("date", "2024-03-01T00:00:00.000Z")
                    .and(Filter::lt("date", "2024-03-02T00:00:00.000Z"))
            )
        );
        assert!(matches!(
            &stages[1],
            Stage::Group { key: GroupKey::DateBucket { unit: DateUnit::HourOfDay, .. }, .. }
        ));
    }

    #[test]
    fn test_entries_decode_both_bucket_kinds() {
        let hourly: ReportEntry =
            serde_json::from_value(json!({ "bucket": 9, "totalAmount": 15.5 })).unwrap();
        assert_eq!(hourly.bucket, ReportBucket::Hour(9));

        let daily: ReportEntry =
            serde_json::from_value(json!({ "bucket": "2024-03-01", "totalAmount": 100 })).unwrap();
        assert_eq!(
            daily.bucket,
            ReportBucket::Day(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(daily.total_amount, Decimal::from(100));
    }
}
