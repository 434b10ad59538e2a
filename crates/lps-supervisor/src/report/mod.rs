//! Session report rendering
//!
//! The supervisor hands the frozen `SessionReport` record to a renderer;
//! everything about layout and naming lives behind this seam. The bundled
//! renderer writes a JSON artifact with a collision-free timestamped name.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use lps_common::{SessionReport, SupervisorError, SupervisorResult};

use crate::config::ReportConfig;

pub trait ReportRenderer: Send + Sync {
    /// Persist the report and return the artifact location
    fn render(&self, report: &SessionReport) -> SupervisorResult<PathBuf>;
}

/// Writes the report as pretty-printed JSON into the configured directory
pub struct JsonReportRenderer {
    dir: PathBuf,
    stem: String,
}

impl JsonReportRenderer {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            stem: config.stem.clone(),
        }
    }
}

impl ReportRenderer for JsonReportRenderer {
    fn render(&self, report: &SessionReport) -> SupervisorResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = unique_path(&self.dir, &self.stem, report.start_time);

        let json = serde_json::to_string_pretty(report)
            .map_err(|e| SupervisorError::Report(e.to_string()))?;
        std::fs::write(&path, json)?;

        tracing::info!(path = %path.display(), "session report written");
        Ok(path)
    }
}

/// `<stem>-YYYYmmdd-HHMMSS.json`, with a `(n)` counter appended until the
/// name is free — an existing report is never overwritten.
fn unique_path(dir: &Path, stem: &str, start: DateTime<Utc>) -> PathBuf {
    let timestamped = format!("{stem}-{}", start.format("%Y%m%d-%H%M%S"));
    let mut path = dir.join(format!("{timestamped}.json"));
    let mut duplicates = 0;
    while path.exists() {
        duplicates += 1;
        path = dir.join(format!("{timestamped}({duplicates}).json"));
    }
    path
}
