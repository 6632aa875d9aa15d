//! Daily summary report
//!
//! A [`DailyReport`] is all-or-nothing: a day with no samples yields
//! [`AnalyticsError::NoData`], never a partially filled record. Values keep
//! full precision in memory and are rounded to two decimals only when
//! serialized.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::{AnalyticsError, Result};
use crate::statistics::summary_stats;
use crate::types::Series;

/// Summary of one calendar day of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    /// First sample of the day by timestamp
    #[serde(serialize_with = "round2")]
    pub open: f64,
    /// Last sample of the day by timestamp
    #[serde(serialize_with = "round2")]
    pub close: f64,
    #[serde(serialize_with = "round2")]
    pub min: f64,
    #[serde(serialize_with = "round2")]
    pub max: f64,
    #[serde(serialize_with = "round2")]
    pub mean: f64,
    /// Sample standard deviation; `None` (`null`) for a single-sample day
    #[serde(serialize_with = "round2_opt")]
    pub volatility: Option<f64>,
}

impl DailyReport {
    /// Copy with every numeric field rounded the way it is serialized.
    pub fn rounded(&self) -> DailyReport {
        DailyReport {
            date: self.date,
            open: round_to_cents(self.open),
            close: round_to_cents(self.close),
            min: round_to_cents(self.min),
            max: round_to_cents(self.max),
            mean: round_to_cents(self.mean),
            volatility: self.volatility.map(round_to_cents),
        }
    }
}

/// Round to two decimal places.
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round2<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to_cents(*value))
}

fn round2_opt<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_some(&round_to_cents(*v)),
        None => serializer.serialize_none(),
    }
}

/// Builds [`DailyReport`]s for calendar days in a fixed time zone.
#[derive(Debug, Clone, Copy)]
pub struct ReportGenerator {
    offset: FixedOffset,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl ReportGenerator {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Calendar date of `now` in the generator's zone.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Summarize the samples of `series` that fall on `reference_date`.
    pub fn generate(&self, series: &Series, reference_date: NaiveDate) -> Result<DailyReport> {
        let day = series.on_date(reference_date, &self.offset);
        let no_data = AnalyticsError::NoData {
            date: reference_date,
        };

        let (Some(first), Some(last)) = (day.first(), day.last()) else {
            return Err(no_data);
        };

        let stats = summary_stats(&day);
        let mean = stats.mean.ok_or(no_data)?;
        let (min, max) = day
            .values()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

        Ok(DailyReport {
            date: reference_date,
            open: first.value,
            close: last.value,
            min,
            max,
            mean,
            volatility: stats.stddev,
        })
    }

    /// Summarize "today" as seen from `now`.
    pub fn generate_for(&self, series: &Series, now: DateTime<Utc>) -> Result<DailyReport> {
        self.generate(series, self.today(now))
    }
}
