//! Feed decoding and sample normalization
//!
//! Turns raw `(timestamp, value)` text rows into a clean [`Series`]. Rows whose
//! timestamp or value cannot be coerced are dropped and only counted in a
//! debug event. Input with no rows at all is the one parse error.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{AnalyticsError, Result};
use crate::types::{Sample, Series};

/// Zone-less timestamp layouts, tried in order
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Zoned layouts not covered by RFC 3339 (space separator)
const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Epoch values above this are treated as milliseconds
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

/// Shortest integer part read as an epoch; shorter numbers (a bare year) are
/// not timestamps
const EPOCH_MIN_DIGITS: usize = 9;

/// Encoding of a raw feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Csv,
    Json,
}

impl FeedFormat {
    /// Guess the format from a file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(FeedFormat::Csv),
            "json" => Some(FeedFormat::Json),
            _ => None,
        }
    }
}

impl FromStr for FeedFormat {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(FeedFormat::Csv),
            "json" => Ok(FeedFormat::Json),
            other => Err(AnalyticsError::parse(format!("unknown feed format: {}", other))),
        }
    }
}

/// Parses raw rows into a normalized [`Series`].
#[derive(Debug, Clone, Copy)]
pub struct SampleStore {
    /// Zone applied to timestamps that carry no offset
    offset: FixedOffset,
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl SampleStore {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Parse `(timestamp, value)` rows.
    ///
    /// Fails with [`AnalyticsError::Parse`] only when `rows` is empty. An
    /// empty series (every row dropped) is a valid result.
    pub fn parse<I, T, V>(&self, rows: I) -> Result<Series>
    where
        I: IntoIterator<Item = (T, V)>,
        T: AsRef<str>,
        V: AsRef<str>,
    {
        let mut total = 0usize;
        let mut samples = Vec::new();

        for (raw_ts, raw_value) in rows {
            total += 1;
            let (Some(timestamp), Some(value)) =
                (self.parse_timestamp(raw_ts.as_ref()), parse_value(raw_value.as_ref()))
            else {
                continue;
            };
            samples.push(Sample::new(timestamp, value));
        }

        if total == 0 {
            return Err(AnalyticsError::parse("feed contains no rows"));
        }

        let dropped = total - samples.len();
        if dropped > 0 {
            debug!(dropped, total, "dropped rows that failed timestamp/value coercion");
        }

        let series = Series::from_samples(samples);
        if series.is_empty() {
            warn!(total, "no usable samples left after cleaning");
        }
        Ok(series)
    }

    /// Decode raw feed bytes and parse them.
    pub fn parse_feed(&self, bytes: &[u8], format: FeedFormat) -> Result<Series> {
        let rows = match format {
            FeedFormat::Csv => read_csv_rows(bytes)?,
            FeedFormat::Json => read_json_rows(bytes)?,
        };
        self.parse(rows)
    }

    /// Parse one timestamp string. Zone-less forms are read in the store's
    /// offset.
    pub fn parse_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        for format in ZONED_FORMATS {
            if let Ok(ts) = DateTime::parse_from_str(raw, format) {
                return Some(ts.with_timezone(&Utc));
            }
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return self.localize(naive);
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return self.localize(date.and_hms_opt(0, 0, 0)?);
        }

        parse_epoch(raw)
    }

    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    let integer = raw.strip_prefix('-').unwrap_or(raw);
    let integer = integer.split_once('.').map_or(integer, |(int, _)| int);
    if integer.len() < EPOCH_MIN_DIGITS || !integer.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let epoch: f64 = raw.parse().ok().filter(|v: &f64| v.is_finite())?;
    let millis = if epoch.abs() > EPOCH_MILLIS_THRESHOLD {
        epoch
    } else {
        epoch * 1_000.0
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

/// Coerce a value string: strip grouping commas, parse as `f64`, reject
/// non-finite results.
pub fn parse_value(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Decode a headerless two-column CSV feed into text rows.
///
/// Records with fewer than two fields are skipped. Fields after the timestamp
/// are rejoined with `,`, so an unquoted grouped value such as `1,050.25`
/// survives and anything else fails value coercion. A header line is returned
/// like any other row and later dropped by [`SampleStore::parse`].
pub fn read_csv_rows(bytes: &[u8]) -> Result<Vec<(String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        if record.len() < 2 {
            continue;
        }
        let mut fields = record.iter().map(String::from_utf8_lossy);
        let ts = fields.next().unwrap_or_default().into_owned();
        let value = fields.collect::<Vec<_>>().join(",");
        rows.push((ts, value));
    }
    Ok(rows)
}

/// Decode a JSON feed into text rows.
///
/// Accepts an array of `{"timestamp": .., "value": ..}` objects or of
/// `[timestamp, value]` pairs; scalars may be strings or numbers. Elements of
/// any other shape are skipped.
pub fn read_json_rows(bytes: &[u8]) -> Result<Vec<(String, String)>> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| AnalyticsError::parse(format!("JSON decoding failed: {}", e)))?;

    let Value::Array(elements) = document else {
        return Err(AnalyticsError::parse("expected a JSON array of samples"));
    };

    Ok(elements.iter().filter_map(json_row).collect())
}

fn json_row(element: &Value) -> Option<(String, String)> {
    match element {
        Value::Object(map) => Some((
            scalar_text(map.get("timestamp")?)?,
            scalar_text(map.get("value")?)?,
        )),
        Value::Array(pair) if pair.len() >= 2 => {
            Some((scalar_text(&pair[0])?, scalar_text(&pair[1])?))
        }
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
