//! Layered pipeline configuration
//!
//! Sources are applied in order, later ones overriding earlier ones:
//! built-in defaults, an optional TOML file, then `US30_`-prefixed
//! environment variables (`US30_BAND_K=2.5`).

use std::path::{Path, PathBuf};

use chrono::{FixedOffset, TimeDelta};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{AnalyticsError, Result};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "US30";

const MAX_OFFSET_MINUTES: i32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Zone used for calendar-day grouping and zone-less timestamps
    pub utc_offset_minutes: i32,
    /// OHLC candle width
    pub bucket_width_secs: i64,
    /// Trailing window of the moving average and bands
    pub sma_window_secs: i64,
    /// Band half-width in standard deviations
    pub band_k: f64,
    /// Z-score threshold for anomalies
    pub anomaly_k: f64,
    /// How far past the last sample the trend is projected
    pub trend_horizon_secs: i64,
    /// Destination of the daily report written by the CLI
    pub report_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            bucket_width_secs: 300,
            sma_window_secs: 3600,
            band_k: 2.0,
            anomaly_k: crate::statistics::DEFAULT_ANOMALY_K,
            trend_horizon_secs: 3600,
            report_path: PathBuf::from("report.json"),
        }
    }
}

impl PipelineConfig {
    /// Load defaults, then `path` if given and present, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("utc_offset_minutes", i64::from(defaults.utc_offset_minutes))?
            .set_default("bucket_width_secs", defaults.bucket_width_secs)?
            .set_default("sma_window_secs", defaults.sma_window_secs)?
            .set_default("band_k", defaults.band_k)?
            .set_default("anomaly_k", defaults.anomaly_k)?
            .set_default("trend_horizon_secs", defaults.trend_horizon_secs)?
            .set_default(
                "report_path",
                defaults.report_path.to_string_lossy().into_owned(),
            )?;

        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let config: PipelineConfig = builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no stage can run with.
    pub fn validate(&self) -> Result<()> {
        if self.utc_offset_minutes.abs() >= MAX_OFFSET_MINUTES {
            return Err(config_error(format!(
                "utc_offset_minutes must be within ±{}, got {}",
                MAX_OFFSET_MINUTES - 1,
                self.utc_offset_minutes
            )));
        }
        for (name, secs) in [
            ("bucket_width_secs", self.bucket_width_secs),
            ("sma_window_secs", self.sma_window_secs),
        ] {
            if secs <= 0 {
                return Err(config_error(format!("{} must be positive, got {}", name, secs)));
            }
        }
        if self.trend_horizon_secs < 0 {
            return Err(config_error(format!(
                "trend_horizon_secs must not be negative, got {}",
                self.trend_horizon_secs
            )));
        }
        for (name, k) in [("band_k", self.band_k), ("anomaly_k", self.anomaly_k)] {
            if !k.is_finite() || k <= 0.0 {
                return Err(config_error(format!("{} must be a positive number, got {}", name, k)));
            }
        }
        Ok(())
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            config_error(format!("invalid utc offset: {} minutes", self.utc_offset_minutes))
        })
    }

    pub fn bucket_width(&self) -> Result<TimeDelta> {
        seconds(self.bucket_width_secs, "bucket_width_secs")
    }

    pub fn sma_window(&self) -> Result<TimeDelta> {
        seconds(self.sma_window_secs, "sma_window_secs")
    }

    pub fn trend_horizon(&self) -> Result<TimeDelta> {
        seconds(self.trend_horizon_secs, "trend_horizon_secs")
    }
}

fn seconds(secs: i64, name: &str) -> Result<TimeDelta> {
    TimeDelta::try_seconds(secs)
        .ok_or_else(|| config_error(format!("{} is out of range: {}", name, secs)))
}

fn config_error(message: String) -> AnalyticsError {
    AnalyticsError::Config { message }
}
