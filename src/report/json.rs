//! Structured JSON report

use std::fs;
use std::path::{Path, PathBuf};

use action_flow::{ReportError, ReportSink, RunSnapshot, StepResult};
use serde::Serialize;
use tracing::info;

use super::{run_dir, PARTIAL_DIR};

pub const REPORT_FILE: &str = "report.json";

#[derive(Serialize)]
struct JsonReport<'a> {
    partial: bool,
    run: &'a RunSnapshot,
    steps: &'a [StepResult],
}

/// Writes the whole run model to `report.json`.
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    output_dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn write(&self, dir: &Path, report: &JsonReport<'_>) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE);
        let body = serde_json::to_string_pretty(report)
            .map_err(|err| ReportError::Encode(err.to_string()))?;
        fs::write(&path, body)?;
        Ok(path)
    }
}

impl ReportSink for JsonReportWriter {
    fn export_partial(&self, snapshot: &RunSnapshot, steps: &[StepResult]) -> Result<(), ReportError> {
        let dir = run_dir(&self.output_dir, &snapshot.run_id).join(PARTIAL_DIR);
        let path = self.write(
            &dir,
            &JsonReport {
                partial: true,
                run: snapshot,
                steps,
            },
        )?;
        info!(path = %path.display(), "Saved partial JSON report");
        Ok(())
    }

    fn export_final(&self, snapshot: &RunSnapshot, steps: &[StepResult]) -> Result<(), ReportError> {
        let dir = run_dir(&self.output_dir, &snapshot.run_id);
        let path = self.write(
            &dir,
            &JsonReport {
                partial: false,
                run: snapshot,
                steps,
            },
        )?;
        info!(path = %path.display(), "Saved JSON report");
        Ok(())
    }
}
