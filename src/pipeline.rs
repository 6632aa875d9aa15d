//! End-to-end analysis of one feed snapshot
//!
//! ```text
//! rows ─► SampleStore::parse ─► Series ─► select(range) ─┬─► resample        ─► candles
//!                                  │                     ├─► rolling_mean    ─► SMA
//!                                  │                     ├─► rolling_bands   ─► bands
//!                                  │                     ├─► summary + z     ─► anomalies
//!                                  │                     └─► fit_trend       ─► trend
//!                                  └─► ReportGenerator (today) ─► DailyReport
//! ```
//!
//! The independent views run on the rayon pool. Each call recomputes from
//! scratch; nothing is cached between calls.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::errors::{AnalyticsError, Result};
use crate::predictor::fit_trend;
use crate::report::{DailyReport, ReportGenerator};
use crate::report_store::ReportStore;
use crate::resample::resample;
use crate::sample_store::{FeedFormat, SampleStore};
use crate::statistics::{SummaryStats, detect_anomalies, rolling_bands, rolling_mean, summary_stats};
use crate::types::{BandPoint, Candle, RollingStat, Sample, Series, TimeRange, TrendPoint};

/// What to analyze: the reference instant and the selected time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Defines "today" for the daily report
    pub now: DateTime<Utc>,
    pub range: TimeRange,
}

impl AnalysisRequest {
    pub fn new(now: DateTime<Utc>, range: TimeRange) -> Self {
        Self { now, range }
    }

    /// Whole series, report for the day containing `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self::new(now, TimeRange::all())
    }
}

/// Every derived view of one feed snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// Cleaned, full series
    pub series: Series,
    /// The part of `series` inside the requested range; all views below
    /// except `report` are computed from it
    pub selection: Series,
    pub candles: Vec<Candle>,
    pub rolling_mean: Vec<RollingStat>,
    pub bands: Vec<BandPoint>,
    pub summary: SummaryStats,
    pub anomalies: Vec<Sample>,
    /// `None` when the selection has fewer than two samples
    pub trend: Option<TrendPoint>,
    pub trend_line: Vec<TrendPoint>,
    /// `None` when the full series has no samples for today
    pub report: Option<DailyReport>,
    /// SHA-256 of the raw feed bytes, when built from bytes
    pub source_fingerprint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnalyticsPipeline {
    config: PipelineConfig,
}

impl AnalyticsPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze already-decoded `(timestamp, value)` rows.
    pub fn analyze<I, T, V>(&self, rows: I, request: &AnalysisRequest) -> Result<Analysis>
    where
        I: IntoIterator<Item = (T, V)>,
        T: AsRef<str>,
        V: AsRef<str>,
    {
        let series = self.sample_store()?.parse(rows)?;
        self.run(series, request, None)
    }

    /// Decode and analyze a raw CSV or JSON feed.
    pub fn analyze_feed(
        &self,
        bytes: &[u8],
        format: FeedFormat,
        request: &AnalysisRequest,
    ) -> Result<Analysis> {
        let series = self.sample_store()?.parse_feed(bytes, format)?;
        self.run(series, request, fingerprint(bytes))
    }

    fn sample_store(&self) -> Result<SampleStore> {
        Ok(SampleStore::new(self.config.offset()?))
    }

    fn run(
        &self,
        series: Series,
        request: &AnalysisRequest,
        source_fingerprint: Option<String>,
    ) -> Result<Analysis> {
        let bucket_width = self.config.bucket_width()?;
        let window = self.config.sma_window()?;
        let horizon = self.config.trend_horizon()?;
        let (band_k, anomaly_k) = (self.config.band_k, self.config.anomaly_k);

        let selection = series.between(&request.range);
        let sel = &selection;

        let ((candles, (sma, bands)), ((summary, anomalies), trend)) = rayon::join(
            || {
                rayon::join(
                    || resample(sel, bucket_width),
                    || {
                        rayon::join(
                            || rolling_mean(sel, window),
                            || rolling_bands(sel, window, band_k),
                        )
                    },
                )
            },
            || {
                rayon::join(
                    || (summary_stats(sel), detect_anomalies(sel, anomaly_k)),
                    || {
                        let trend = fit_trend(sel)?;
                        let last = sel.last().map(|s| s.timestamp).unwrap_or(trend.origin);
                        Ok::<_, AnalyticsError>((trend.project(last, horizon)?, trend.fitted(sel)))
                    },
                )
            },
        );

        let (trend, trend_line) = match available(trend, "trend")? {
            Some((point, line)) => (Some(point), line),
            None => (None, Vec::new()),
        };

        let report = available(
            ReportGenerator::new(self.config.offset()?).generate_for(&series, request.now),
            "daily report",
        )?;

        debug!(
            samples = series.len(),
            selected = selection.len(),
            anomalies = anomalies.len(),
            "analysis complete"
        );

        Ok(Analysis {
            candles: candles?,
            rolling_mean: sma?,
            bands: bands?,
            summary,
            anomalies,
            trend,
            trend_line,
            report,
            source_fingerprint,
            series,
            selection,
        })
    }
}

/// Write the analysis' report to `store` if one was produced.
pub fn publish_report(analysis: &Analysis, store: &dyn ReportStore) -> Result<bool> {
    match &analysis.report {
        Some(report) => {
            store.write(report)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Turn "not enough data" into `None`; other errors still fail.
fn available<T>(result: Result<T>, view: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_unavailable() => {
            debug!(view, reason = %err, "view unavailable");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(feature = "data-integrity")]
fn fingerprint(bytes: &[u8]) -> Option<String> {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Some(format!("{:x}", hasher.finalize()))
}

#[cfg(not(feature = "data-integrity"))]
fn fingerprint(_bytes: &[u8]) -> Option<String> {
    None
}
