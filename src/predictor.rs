//! Naive linear trend fit and one-step extrapolation
//!
//! Ordinary least squares of value against elapsed seconds since the first
//! sample, solved in closed form. This is a linear projection for a chart
//! overlay, not a validated forecast: no confidence interval is produced.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AnalyticsError, Result};
use crate::types::{Series, TrendPoint, elapsed_seconds};

/// Minimum number of samples needed to fit a line
pub const MIN_TREND_SAMPLES: usize = 2;

/// Fitted line `value = slope * elapsed_seconds(origin, t) + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTrend {
    /// Value change per second
    pub slope: f64,
    pub intercept: f64,
    /// Timestamp of the first sample; elapsed time is measured from here
    pub origin: DateTime<Utc>,
}

impl LinearTrend {
    pub fn value_at(&self, timestamp: DateTime<Utc>) -> f64 {
        self.slope * elapsed_seconds(self.origin, timestamp) + self.intercept
    }

    /// The fitted line evaluated at every sample of `series`.
    pub fn fitted(&self, series: &Series) -> Vec<TrendPoint> {
        series
            .iter()
            .map(|s| TrendPoint {
                timestamp: s.timestamp,
                value: self.value_at(s.timestamp),
            })
            .collect()
    }
}

/// Fit a least-squares line through `series`.
///
/// Fails with [`AnalyticsError::InsufficientData`] for fewer than two samples.
/// Timestamps in a `Series` are unique, so two samples always span a non-zero
/// interval.
pub fn fit_trend(series: &Series) -> Result<LinearTrend> {
    let insufficient = AnalyticsError::InsufficientData {
        needed: MIN_TREND_SAMPLES,
        have: series.len(),
    };
    if series.len() < MIN_TREND_SAMPLES {
        return Err(insufficient);
    }
    let origin = series.first().ok_or(insufficient)?.timestamp;

    let n = series.len() as f64;
    let xs: Vec<f64> = series
        .iter()
        .map(|s| elapsed_seconds(origin, s.timestamp))
        .collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = series.values().sum::<f64>() / n;

    // Centered sums keep large epoch-scale offsets out of the products
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs.iter().zip(series.values()) {
        let dx = x - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }

    if sxx <= 0.0 {
        return Err(AnalyticsError::InsufficientData {
            needed: MIN_TREND_SAMPLES,
            have: series.len(),
        });
    }

    let slope = sxy / sxx;
    Ok(LinearTrend {
        slope,
        intercept: mean_y - slope * mean_x,
        origin,
    })
}

/// Project the fitted line `horizon` past the last sample.
///
/// `timestamp = last + horizon`,
/// `value = slope * (last_elapsed + horizon_seconds) + intercept`.
pub fn extrapolate(series: &Series, horizon: TimeDelta) -> Result<TrendPoint> {
    let trend = fit_trend(series)?;
    let last = series.last().ok_or(AnalyticsError::InsufficientData {
        needed: MIN_TREND_SAMPLES,
        have: 0,
    })?;
    trend.project(last.timestamp, horizon)
}

impl LinearTrend {
    /// The line evaluated `horizon` after `from`.
    pub fn project(&self, from: DateTime<Utc>, horizon: TimeDelta) -> Result<TrendPoint> {
        if horizon < TimeDelta::zero() {
            return Err(AnalyticsError::invalid_window(format!(
                "trend horizon must not be negative, got {}",
                horizon
            )));
        }
        let timestamp = from
            .checked_add_signed(horizon)
            .ok_or_else(|| AnalyticsError::invalid_window("trend horizon overflows the calendar"))?;

        Ok(TrendPoint {
            timestamp,
            value: self.value_at(timestamp),
        })
    }
}
