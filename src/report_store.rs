//! Destinations for the daily report

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{debug, info};

use crate::errors::{AnalyticsError, Result};
use crate::report::DailyReport;

/// Somewhere a [`DailyReport`] can be persisted and read back.
///
/// `read` returns `Ok(None)` when nothing has been written yet.
pub trait ReportStore: Send + Sync {
    fn write(&self, report: &DailyReport) -> Result<()>;
    fn read(&self) -> Result<Option<DailyReport>>;
}

/// Single JSON document on disk, indented with four spaces.
#[derive(Debug, Clone)]
pub struct JsonReportStore {
    path: PathBuf,
}

impl JsonReportStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "report.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Encode `report` as pretty JSON with a four-space indent.
pub fn to_pretty_json(report: &DailyReport) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    report.serialize(&mut ser)?;
    Ok(buf)
}

impl ReportStore for JsonReportStore {
    fn write(&self, report: &DailyReport) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        fs::write(&tmp, to_pretty_json(report)?)?;
        fs::rename(&tmp, &self.path)?;

        info!(
            path = %self.path.display(),
            date = %report.date,
            "daily report written"
        );
        Ok(())
    }

    fn read(&self) -> Result<Option<DailyReport>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no report stored yet");
                return Ok(None);
            }
            Err(err) => return Err(AnalyticsError::from(err)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// In-process slot holding the most recent report.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    slot: RwLock<Option<DailyReport>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for MemoryReportStore {
    fn write(&self, report: &DailyReport) -> Result<()> {
        // A poisoned lock still holds a whole report; DailyReport is Copy
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(*report);
        Ok(())
    }

    fn read(&self) -> Result<Option<DailyReport>> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        Ok(*slot)
    }
}
