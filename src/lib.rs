//! # US30 Analytics
//!
//! Turns a noisy feed of timestamped index prices into chart-ready views and
//! a daily summary report.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use us30_analytics::{AnalysisRequest, AnalyticsPipeline, PipelineConfig};
//!
//! let rows = vec![
//!     ("2024-01-01T09:30:00Z", "37,689.54"),
//!     ("2024-01-01T09:35:00Z", "37,701.10"),
//!     ("2024-01-01T09:40:00Z", "37,695.80"),
//!     ("not a time", "x"),
//! ];
//!
//! let pipeline = AnalyticsPipeline::new(PipelineConfig::default());
//! let now = Utc.with_ymd_and_hms(2024, 1, 1, 16, 0, 0).unwrap();
//! let analysis = pipeline.analyze(rows, &AnalysisRequest::at(now)).unwrap();
//!
//! assert_eq!(analysis.series.len(), 3);
//! for candle in &analysis.candles {
//!     println!("{} O={} H={} L={} C={}",
//!              candle.bucket_start, candle.open, candle.high, candle.low, candle.close);
//! }
//!
//! let report = analysis.report.unwrap();
//! assert_eq!(report.open, 37_689.54);
//! ```
//!
//! ## Stages
//!
//! 1. **Ingest**: [`SampleStore`] coerces raw rows, drops unparseable ones,
//!    sorts and deduplicates by timestamp
//! 2. **Resample**: fixed-width OHLC candles aligned to the epoch
//! 3. **Statistics**: trailing SMA, volatility bands, sample standard
//!    deviation, z-score anomalies
//! 4. **Predict**: least-squares line projected one horizon ahead
//! 5. **Report**: open/close/min/max/mean/volatility for one calendar day
//!
//! ## Features
//!
//! - **`statistics`** (default): mean and standard deviation via `statrs`
//! - **`data-integrity`** (default): SHA-256 fingerprint of each raw feed

pub mod config;
pub mod errors;
pub mod pipeline;
pub mod predictor;
pub mod report;
pub mod report_store;
pub mod resample;
pub mod sample_store;
pub mod statistics;
pub mod types;

// Re-export commonly used types for convenience
pub use config::PipelineConfig;
pub use errors::{AnalyticsError, Result};
pub use pipeline::{Analysis, AnalysisRequest, AnalyticsPipeline, publish_report};
pub use predictor::{LinearTrend, extrapolate, fit_trend};
pub use report::{DailyReport, ReportGenerator};
pub use report_store::{JsonReportStore, MemoryReportStore, ReportStore};
pub use resample::resample;
pub use sample_store::{FeedFormat, SampleStore};
pub use statistics::{SummaryStats, detect_anomalies, rolling_bands, rolling_mean, summary_stats};
pub use types::{BandPoint, Candle, RollingStat, Sample, Series, TimeRange, TrendPoint};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
