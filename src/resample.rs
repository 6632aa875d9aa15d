//! Fixed-width OHLC resampling
//!
//! Buckets are calendar independent: a bucket starts at
//! `floor(t / width) * width` measured from the Unix epoch, so the first
//! candle opens at the floor-aligned boundary of the first sample. Buckets
//! without samples produce no candle.

use chrono::{DateTime, TimeDelta, Utc};

use crate::errors::{AnalyticsError, Result};
use crate::types::{Candle, Series, positive_millis};

/// Resample `series` into OHLC candles of `bucket_width`.
///
/// `open`/`close` are the earliest/latest sample in each bucket, `high`/`low`
/// the extremes. The series is already sorted and deduplicated, so the result
/// does not depend on the order the raw rows arrived in.
pub fn resample(series: &Series, bucket_width: TimeDelta) -> Result<Vec<Candle>> {
    let width_ms = positive_millis(bucket_width, "bucket width")?;
    let mut candles: Vec<Candle> = Vec::new();

    for sample in series {
        let start = bucket_start(sample.timestamp, width_ms)?;
        match candles.last_mut() {
            Some(candle) if candle.bucket_start == start => candle.push(sample.value),
            _ => candles.push(Candle::open_at(start, sample.value)),
        }
    }

    Ok(candles)
}

/// Start of the bucket containing `timestamp`
pub fn bucket_start(timestamp: DateTime<Utc>, width_ms: i64) -> Result<DateTime<Utc>> {
    let floored = timestamp.timestamp_millis().div_euclid(width_ms) * width_ms;
    DateTime::from_timestamp_millis(floored).ok_or_else(|| {
        AnalyticsError::invalid_window(format!("bucket boundary for {} is out of range", timestamp))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sample;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32, second: u32, value: f64) -> Sample {
        Sample::new(
            Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, second).unwrap(),
            value,
        )
    }

    /// Deterministic pseudo-random walk for property-style checks
    fn rand_like(seed: usize) -> f64 {
        let x = (seed.wrapping_mul(1103515245).wrapping_add(12345)) & 0x7fff_ffff;
        (x as f64) / (0x7fff_ffff as f64)
    }

    #[test]
    fn test_resample_basic_ohlc() {
        let series = Series::from_samples(vec![
            at(0, 0, 30, 10.0),
            at(0, 1, 0, 14.0),
            at(0, 3, 0, 9.0),
            at(0, 4, 59, 11.0),
            at(0, 5, 0, 20.0),
        ]);

        let candles = resample(&series, TimeDelta::minutes(5)).unwrap();
        assert_eq!(candles.len(), 2);

        let first = &candles[0];
        assert_eq!(first.bucket_start, at(0, 0, 0, 0.0).timestamp);
        assert_eq!(
            (first.open, first.high, first.low, first.close),
            (10.0, 14.0, 9.0, 11.0)
        );
        assert_eq!(first.samples, 4);

        let second = &candles[1];
        assert_eq!(second.bucket_start, at(0, 5, 0, 0.0).timestamp);
        assert_eq!((second.open, second.close), (20.0, 20.0));
    }

    #[test]
    fn test_resample_first_bucket_is_floor_aligned() {
        let series = Series::from_samples(vec![at(10, 7, 13, 1.0)]);
        let candles = resample(&series, TimeDelta::minutes(15)).unwrap();
        assert_eq!(candles[0].bucket_start, at(10, 0, 0, 0.0).timestamp);
    }

    #[test]
    fn test_resample_skips_empty_buckets() {
        let series = Series::from_samples(vec![at(0, 0, 0, 1.0), at(3, 0, 0, 2.0)]);
        let candles = resample(&series, TimeDelta::hours(1)).unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].bucket_start, at(3, 0, 0, 0.0).timestamp);
    }

    #[test]
    fn test_resample_empty_series() {
        let candles = resample(&Series::empty(), TimeDelta::minutes(1)).unwrap();
        assert!(candles.is_empty());
    }

    #[test]
    fn test_resample_rejects_non_positive_width() {
        let series = Series::from_samples(vec![at(0, 0, 0, 1.0)]);
        assert!(matches!(
            resample(&series, TimeDelta::zero()),
            Err(AnalyticsError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_resample_invariant_to_input_order() {
        let rows = vec![at(0, 2, 0, 3.0), at(0, 0, 0, 1.0), at(0, 1, 0, 2.0)];
        let mut reversed = rows.clone();
        reversed.reverse();

        let a = resample(&Series::from_samples(rows), TimeDelta::minutes(5)).unwrap();
        let b = resample(&Series::from_samples(reversed), TimeDelta::minutes(5)).unwrap();
        assert_eq!(a, b);
        assert_eq!((a[0].open, a[0].close), (1.0, 3.0));
    }

    #[test]
    fn test_candles_ordered_non_overlapping_and_bounded() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut price = 34_000.0;
        let mut samples = Vec::new();
        let mut offset_s = 0i64;
        for i in 0..500 {
            price += (rand_like(i) - 0.5) * 40.0;
            offset_s += 1 + (rand_like(i * 7) * 90.0) as i64;
            samples.push(Sample::new(base + TimeDelta::seconds(offset_s), price));
        }
        let series = Series::from_samples(samples);
        let width = TimeDelta::minutes(5);

        let candles = resample(&series, width).unwrap();
        assert!(!candles.is_empty());
        assert_eq!(candles.iter().map(|c| c.samples).sum::<usize>(), series.len());

        for pair in candles.windows(2) {
            assert!(pair[1].bucket_start >= pair[0].bucket_start + width);
        }
        for candle in &candles {
            assert!(candle.low <= candle.open && candle.open <= candle.high);
            assert!(candle.low <= candle.close && candle.close <= candle.high);
        }
    }
}
