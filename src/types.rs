//! Core data types shared by every stage of the pipeline

use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AnalyticsError, Result};

/// One timestamped price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Calendar date of this sample as seen from `offset`.
    pub fn date_in(&self, offset: &FixedOffset) -> NaiveDate {
        self.timestamp.with_timezone(offset).date_naive()
    }
}

/// Clean, ordered price series.
///
/// Invariants: samples are sorted ascending by timestamp, timestamps are
/// unique (last write wins for duplicates in input order) and every value is
/// finite. A `Series` is never mutated after construction; selections return
/// a new `Series`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Sample>", into = "Vec<Sample>")]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    /// Build a series from samples in any order.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self {
            samples: normalize(samples),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Time covered from first to last sample
    pub fn span(&self) -> Option<TimeDelta> {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => Some(last.timestamp - first.timestamp),
            _ => None,
        }
    }

    /// Samples whose timestamp falls inside `range` (bounds inclusive).
    pub fn between(&self, range: &TimeRange) -> Series {
        if range.is_unbounded() {
            return self.clone();
        }
        Series {
            samples: self
                .samples
                .iter()
                .filter(|s| range.contains(s.timestamp))
                .copied()
                .collect(),
        }
    }

    /// Samples whose calendar date in `offset` equals `date`.
    pub fn on_date(&self, date: NaiveDate, offset: &FixedOffset) -> Series {
        Series {
            samples: self
                .samples
                .iter()
                .filter(|s| s.date_in(offset) == date)
                .copied()
                .collect(),
        }
    }
}

impl From<Vec<Sample>> for Series {
    fn from(samples: Vec<Sample>) -> Self {
        Series::from_samples(samples)
    }
}

impl From<Series> for Vec<Sample> {
    fn from(series: Series) -> Self {
        series.samples
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

fn normalize(mut samples: Vec<Sample>) -> Vec<Sample> {
    samples.retain(|s| s.value.is_finite());
    // Stable sort keeps input order among equal timestamps, so the last
    // duplicate seen in the input is the one that survives.
    samples.sort_by_key(|s| s.timestamp);

    let mut out: Vec<Sample> = Vec::with_capacity(samples.len());
    for sample in samples {
        match out.last_mut() {
            Some(prev) if prev.timestamp == sample.timestamp => *prev = sample,
            _ => out.push(sample),
        }
    }
    out
}

/// Optional inclusive time filter used to select part of a series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| timestamp >= start)
            && self.end.is_none_or(|end| timestamp <= end)
    }
}

/// OHLC summary of one fixed-width time bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Number of samples folded into this bucket
    pub samples: usize,
}

impl Candle {
    pub(crate) fn open_at(bucket_start: DateTime<Utc>, value: f64) -> Self {
        Self {
            bucket_start,
            open: value,
            high: value,
            low: value,
            close: value,
            samples: 1,
        }
    }

    pub(crate) fn push(&mut self, value: f64) {
        self.high = self.high.max(value);
        self.low = self.low.min(value);
        self.close = value;
        self.samples += 1;
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// One point of a simple moving average curve, aligned to the right edge
/// of its window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingStat {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One point of a rolling volatility band.
///
/// `upper` and `lower` are `None` while the window holds fewer than two
/// samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPoint {
    pub timestamp: DateTime<Utc>,
    pub middle: f64,
    pub upper: Option<f64>,
    pub lower: Option<f64>,
    pub samples: usize,
}

/// Synthetic point produced by the trend fit; never part of a `Series`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Validate a window-like duration and return it in whole milliseconds.
pub(crate) fn positive_millis(width: TimeDelta, what: &str) -> Result<i64> {
    let millis = width.num_milliseconds();
    if millis <= 0 {
        return Err(AnalyticsError::invalid_window(format!(
            "{} must be at least 1ms, got {}",
            what, width
        )));
    }
    Ok(millis)
}

/// Seconds from `from` to `to`, with microsecond resolution.
pub(crate) fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}
