//! Rolling and global statistics over a price series
//!
//! Every function here is a pure computation over a borrowed [`Series`]:
//!
//! - [`rolling_mean`]: trailing time-window SMA, partial windows included
//! - [`rolling_bands`]: SMA ± k rolling standard deviations
//! - [`summary_stats`]: mean and **sample** standard deviation (divide by n−1)
//! - [`detect_anomalies`]: z-score outliers against the same series
//!
//! Standard deviation is undefined for n ≤ 1 and is reported as `None`;
//! callers treat that as "no volatility band available".

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::{BandPoint, RollingStat, Sample, Series, positive_millis};

/// Default z-score threshold for anomaly detection
pub const DEFAULT_ANOMALY_K: f64 = 2.0;

/// Global mean and sample standard deviation of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    /// `None` for an empty series
    pub mean: Option<f64>,
    /// `None` when fewer than two samples are present
    pub stddev: Option<f64>,
}

impl SummaryStats {
    /// `(lower, upper)` band at `k` standard deviations, if volatility is
    /// defined.
    pub fn band(&self, k: f64) -> Option<(f64, f64)> {
        let (mean, stddev) = (self.mean?, self.stddev?);
        Some((mean - k * stddev, mean + k * stddev))
    }

    /// Z-score of `value`; `None` when stddev is undefined or zero.
    pub fn z_score(&self, value: f64) -> Option<f64> {
        let (mean, stddev) = (self.mean?, self.stddev?);
        if stddev > 0.0 {
            Some((value - mean) / stddev)
        } else {
            None
        }
    }
}

/// Compute mean and sample standard deviation over every value in `series`.
pub fn summary_stats(series: &Series) -> SummaryStats {
    let count = series.len();
    if count == 0 {
        return SummaryStats {
            count,
            mean: None,
            stddev: None,
        };
    }

    let (mean, stddev) = mean_and_stddev(series);
    SummaryStats {
        count,
        mean: Some(mean),
        stddev: Some(stddev).filter(|s| count > 1 && s.is_finite()),
    }
}

#[cfg(feature = "statistics")]
fn mean_and_stddev(series: &Series) -> (f64, f64) {
    use statrs::statistics::Statistics;

    let values: Vec<f64> = series.values().collect();
    // statrs uses the unbiased (n-1) estimator and yields NaN for n < 2
    (values.iter().mean(), values.iter().std_dev())
}

#[cfg(not(feature = "statistics"))]
fn mean_and_stddev(series: &Series) -> (f64, f64) {
    welford_mean_and_stddev(series.values())
}

/// Single-pass Welford estimate; a constant input yields an exact mean and a
/// zero deviation.
#[cfg(any(test, not(feature = "statistics")))]
fn welford_mean_and_stddev(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let acc = RollingWindow::from_values(values);
    (acc.mean(), acc.sample_stddev().unwrap_or(f64::NAN))
}

/// Samples with `|value - mean| > k * stddev`, in timestamp order.
///
/// The baseline is [`summary_stats`] of the same series that is being
/// flagged. When stddev is undefined or zero, or every value is identical,
/// nothing is flagged.
pub fn detect_anomalies(series: &Series, k: f64) -> Vec<Sample> {
    let stats = summary_stats(series);
    let (Some(mean), Some(stddev)) = (stats.mean, stats.stddev) else {
        return Vec::new();
    };
    if stddev <= 0.0 || is_flat(series) {
        return Vec::new();
    }

    let threshold = k * stddev;
    series
        .iter()
        .filter(|s| (s.value - mean).abs() > threshold)
        .copied()
        .collect()
}

fn is_flat(series: &Series) -> bool {
    let mut values = series.values();
    match values.next() {
        Some(first) => values.all(|v| v == first),
        None => true,
    }
}

/// Trailing simple moving average.
///
/// Each point is the mean of the samples with timestamp in
/// `(t - window, t]`, aligned to the sample at `t`. Windows that cover less
/// history than `window` still produce a value.
pub fn rolling_mean(series: &Series, window: TimeDelta) -> Result<Vec<RollingStat>> {
    positive_millis(window, "rolling window")?;

    let mut out = Vec::with_capacity(series.len());
    for_each_window(series, window, |sample, acc| {
        out.push(RollingStat {
            timestamp: sample.timestamp,
            value: acc.mean(),
        });
    });
    Ok(out)
}

/// Rolling volatility bands: window mean ± `k` window sample stddevs.
///
/// Uses the same trailing windows as [`rolling_mean`]. Band edges are `None`
/// while a window holds a single sample.
pub fn rolling_bands(series: &Series, window: TimeDelta, k: f64) -> Result<Vec<BandPoint>> {
    positive_millis(window, "band window")?;

    let mut out = Vec::with_capacity(series.len());
    for_each_window(series, window, |sample, acc| {
        let middle = acc.mean();
        let stddev = acc.sample_stddev();
        out.push(BandPoint {
            timestamp: sample.timestamp,
            middle,
            upper: stddev.map(|s| middle + k * s),
            lower: stddev.map(|s| middle - k * s),
            samples: acc.count,
        });
    });
    Ok(out)
}

/// Drive a trailing window over `series`, calling `f` once per sample with
/// the accumulator covering `(t - window, t]`.
fn for_each_window<F>(series: &Series, window: TimeDelta, mut f: F)
where
    F: FnMut(&Sample, &RollingWindow),
{
    let samples = series.samples();
    let mut acc = RollingWindow::default();
    let mut start = 0usize;

    for (i, sample) in samples.iter().enumerate() {
        acc.add(sample.value);
        if let Some(cutoff) = sample.timestamp.checked_sub_signed(window) {
            let mut degraded = false;
            // start never passes the current sample: window > 0
            while samples[start].timestamp <= cutoff {
                degraded |= acc.remove(samples[start].value);
                start += 1;
            }
            if degraded {
                acc = RollingWindow::from_values(samples[start..=i].iter().map(|s| s.value));
            }
        }
        f(sample, &acc);
    }
}

/// Removed-to-remaining second moment ratio past which an incremental
/// removal is no longer trusted
const CANCELLATION_RATIO: f64 = 1e6;

/// Welford accumulator supporting removal for sliding windows
#[derive(Debug, Default, Clone)]
struct RollingWindow {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RollingWindow {
    fn add(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn from_values(values: impl Iterator<Item = f64>) -> Self {
        let mut acc = Self::default();
        for v in values {
            acc.add(v);
        }
        acc
    }

    /// Drop `x` from the window. Returns `true` when the removed term
    /// dwarfed what is left, so the remaining moments have lost precision
    /// and must be rebuilt from the window's values.
    fn remove(&mut self, x: f64) -> bool {
        if self.count <= 1 {
            *self = Self::default();
            return false;
        }
        let delta = x - self.mean;
        self.mean = (self.mean * self.count as f64 - x) / (self.count - 1) as f64;
        let removed = delta * (x - self.mean);
        self.m2 -= removed;
        self.count -= 1;

        if self.m2 < 0.0 {
            self.m2 = 0.0;
        }
        removed > CANCELLATION_RATIO * self.m2
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn sample_stddev(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some((self.m2 / (self.count - 1) as f64).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn minutes(values: &[f64]) -> Series {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Series::from_samples(
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| Sample::new(base + TimeDelta::minutes(i as i64), v))
                .collect(),
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_summary_stats_sample_stddev() {
        let stats = summary_stats(&minutes(&[10.0, 12.0, 8.0]));

        assert_eq!(stats.count, 3);
        assert!(close(stats.mean.unwrap(), 10.0));
        assert!(close(stats.stddev.unwrap(), 2.0));
    }

    #[test]
    fn test_summary_stats_degenerate_sizes() {
        let empty = summary_stats(&Series::empty());
        assert_eq!((empty.mean, empty.stddev), (None, None));

        let single = summary_stats(&minutes(&[42.0]));
        assert_eq!(single.mean, Some(42.0));
        assert_eq!(single.stddev, None);
        assert_eq!(single.band(2.0), None);
    }

    #[test]
    fn test_summary_mean_within_range() {
        let values = [34_010.5, 33_998.25, 34_120.0, 34_001.75, 33_870.0];
        let mean = summary_stats(&minutes(&values)).mean.unwrap();

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(mean >= min && mean <= max);
    }

    #[test]
    fn test_band_and_z_score() {
        let stats = summary_stats(&minutes(&[10.0, 12.0, 8.0]));
        let (lower, upper) = stats.band(2.0).unwrap();
        assert!(close(lower, 6.0) && close(upper, 14.0));
        assert!(close(stats.z_score(14.0).unwrap(), 2.0));

        let flat = summary_stats(&minutes(&[5.0, 5.0]));
        assert_eq!(flat.z_score(6.0), None);
    }

    #[test]
    fn test_no_anomalies_at_exact_threshold() {
        // Largest deviation is 2, inside 2 * 2
        assert!(detect_anomalies(&minutes(&[10.0, 12.0, 8.0]), DEFAULT_ANOMALY_K).is_empty());
    }

    #[test]
    fn test_detects_spike() {
        let mut values = vec![100.0; 20];
        values[7] = 130.0;
        let series = minutes(&values);

        let anomalies = detect_anomalies(&series, DEFAULT_ANOMALY_K);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0], series.samples()[7]);
    }

    #[test]
    fn test_identical_values_never_flagged() {
        assert!(detect_anomalies(&minutes(&[0.1; 9]), 0.5).is_empty());
        assert!(detect_anomalies(&minutes(&[7.0]), 2.0).is_empty());
        assert!(detect_anomalies(&Series::empty(), 2.0).is_empty());
    }

    #[test]
    fn test_welford_estimate_exact_on_constant_input() {
        let (mean, stddev) = welford_mean_and_stddev([0.1; 9].into_iter());
        assert_eq!(mean, 0.1);
        assert_eq!(stddev, 0.0);

        let (mean, stddev) = welford_mean_and_stddev([10.0, 12.0, 8.0].into_iter());
        assert!(close(mean, 10.0) && close(stddev, 2.0));
        assert!(welford_mean_and_stddev([3.0].into_iter()).1.is_nan());
    }

    #[test]
    fn test_flat_series_detection() {
        assert!(is_flat(&minutes(&[0.1; 9])));
        assert!(!is_flat(&minutes(&[0.1, 0.2])));
        assert!(is_flat(&Series::empty()));
    }

    #[test]
    fn test_rolling_bands_recover_after_outlier_leaves_window() {
        let mut values: Vec<f64> = (0..120).map(|i| 37_000.0 + (i % 5) as f64 * 0.3).collect();
        values[10] = 3.7e9;
        let series = minutes(&values);

        let bands = rolling_bands(&series, TimeDelta::minutes(5), 1.0).unwrap();
        let sma = rolling_mean(&series, TimeDelta::minutes(5)).unwrap();

        // 5-minute window over 1-minute spacing holds the last five samples
        for i in 20..values.len() {
            let window = &values[i - 4..=i];
            let mean = window.iter().sum::<f64>() / 5.0;
            let sd = (window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0).sqrt();

            assert!((bands[i].middle - mean).abs() < 1e-8, "mean at {}", i);
            assert!((sma[i].value - mean).abs() < 1e-8);
            assert!((bands[i].upper.unwrap() - bands[i].middle - sd).abs() < 1e-8, "sd at {}", i);
        }
    }

    #[test]
    fn test_rolling_mean_trailing_partial_windows() {
        let series = minutes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        // 3-minute window covers (t-3m, t]: up to three samples
        let sma = rolling_mean(&series, TimeDelta::minutes(3)).unwrap();

        let values: Vec<f64> = sma.iter().map(|p| p.value).collect();
        let expected = [1.0, 1.5, 2.0, 3.0, 4.0];
        assert_eq!(values.len(), expected.len());
        for (got, want) in values.iter().zip(expected) {
            assert!(close(*got, want), "got {} want {}", got, want);
        }
        assert_eq!(sma[4].timestamp, series.samples()[4].timestamp);
    }

    #[test]
    fn test_rolling_mean_window_longer_than_series() {
        let sma = rolling_mean(&minutes(&[2.0, 4.0, 6.0]), TimeDelta::days(1)).unwrap();
        assert!(close(sma[2].value, 4.0));
    }

    #[test]
    fn test_rolling_mean_irregular_spacing() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let series = Series::from_samples(vec![
            Sample::new(base, 10.0),
            Sample::new(base + TimeDelta::seconds(30), 20.0),
            Sample::new(base + TimeDelta::minutes(10), 30.0),
        ]);
        let sma = rolling_mean(&series, TimeDelta::minutes(1)).unwrap();

        assert!(close(sma[1].value, 15.0));
        // Gap longer than the window: only the current sample remains
        assert!(close(sma[2].value, 30.0));
    }

    #[test]
    fn test_rolling_mean_rejects_zero_window() {
        assert!(rolling_mean(&minutes(&[1.0]), TimeDelta::zero()).is_err());
    }

    #[test]
    fn test_rolling_bands() {
        let series = minutes(&[10.0, 12.0, 8.0, 10.0]);
        let bands = rolling_bands(&series, TimeDelta::minutes(3), 2.0).unwrap();

        assert_eq!(bands[0].upper, None);
        assert_eq!(bands[0].samples, 1);

        // Window over [10, 12, 8]: mean 10, stddev 2
        let third = &bands[2];
        assert!(close(third.middle, 10.0));
        assert!(close(third.upper.unwrap(), 14.0));
        assert!(close(third.lower.unwrap(), 6.0));

        // Window over [12, 8, 10]
        let fourth = &bands[3];
        assert_eq!(fourth.samples, 3);
        assert!(close(fourth.middle, 10.0));
        assert!(close(fourth.upper.unwrap(), 14.0));
    }

    #[test]
    fn test_rolling_window_matches_direct_computation() {
        let values: Vec<f64> = (0..200)
            .map(|i| 34_000.0 + ((i * 37) % 101) as f64 - 50.0)
            .collect();
        let series = minutes(&values);
        let bands = rolling_bands(&series, TimeDelta::minutes(20), 1.0).unwrap();

        for (i, band) in bands.iter().enumerate().skip(25) {
            let window = &values[i - 19..=i];
            let mean = window.iter().sum::<f64>() / window.len() as f64;
            let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (window.len() - 1) as f64;
            assert!((band.middle - mean).abs() < 1e-6);
            assert!((band.upper.unwrap() - band.middle - var.sqrt()).abs() < 1e-6);
        }
    }
}
