//! CSV report layout

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use action_flow::{ReportError, ReportSink, RunSnapshot, StepResult};
use beaconcheck_core_types::Platform;
use csv::{Writer, WriterBuilder};
use expect_gate::{matrix, HitMatrix, PlatformValidation};
use tracing::{debug, info};

use super::{clean_cell, run_dir, section_name, PARTIAL_DIR, SECTION_NAME_LIMIT};

pub const SUMMARY_FILE: &str = "Summary.csv";
pub const VALIDATION_SUMMARY_FILE: &str = "validation_summary.csv";

/// Writes one CSV per step and platform plus the run summaries.
#[derive(Debug, Clone)]
pub struct CsvReportWriter {
    output_dir: PathBuf,
}

impl CsvReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// `<journey>_<platform>_hits_per_step/<PLATFORM> Step - <step>.csv`
    pub fn step_file(root: &Path, journey: &str, platform: Platform, step: &str) -> PathBuf {
        Self::numbered_step_file(root, journey, platform, step, 1)
    }

    /// Copy `n` of a step file name; copies after the first end in `-<n>` and
    /// still fit the section name limit.
    fn numbered_step_file(root: &Path, journey: &str, platform: Platform, step: &str, n: usize) -> PathBuf {
        let folder = format!(
            "{}_{}_hits_per_step",
            section_name(journey).replace(' ', "_"),
            platform.key()
        );
        let mut name = section_name(&format!("{} Step - {step}", platform.label()));
        if n > 1 {
            let suffix = format!("-{n}");
            name = name
                .chars()
                .take(SECTION_NAME_LIMIT - suffix.len())
                .chain(suffix.chars())
                .collect();
        }
        root.join(folder).join(format!("{name}.csv"))
    }

    fn write_steps(&self, root: &Path, journey: &str, steps: &[StepResult]) -> Result<usize, ReportError> {
        let mut taken = HashSet::new();
        let mut written = 0;
        for step in steps {
            for validation in &step.validations {
                let mut n = 1;
                let path = loop {
                    let path = Self::numbered_step_file(root, journey, validation.platform, &step.step, n);
                    if taken.insert(path.clone()) {
                        break path;
                    }
                    n += 1;
                };
                if n > 1 {
                    debug!(step = %step.step, path = %path.display(), "step file name already used");
                }
                write_step_section(&path, &step.step, validation)?;
                written += 1;
            }
        }
        Ok(written)
    }
}

impl ReportSink for CsvReportWriter {
    fn export_partial(&self, snapshot: &RunSnapshot, steps: &[StepResult]) -> Result<(), ReportError> {
        let root = run_dir(&self.output_dir, &snapshot.run_id).join(PARTIAL_DIR);
        let written = self.write_steps(&root, &snapshot.journey, steps)?;
        info!(path = %root.display(), files = written, "Saved partial CSV results");
        Ok(())
    }

    fn export_final(&self, snapshot: &RunSnapshot, steps: &[StepResult]) -> Result<(), ReportError> {
        let root = run_dir(&self.output_dir, &snapshot.run_id);
        let written = self.write_steps(&root, &snapshot.journey, steps)?;

        if !snapshot.hits.is_empty() {
            write_hit_matrix(&root.join(SUMMARY_FILE), &matrix(&snapshot.hits, None))?;
        }
        if snapshot.has_failures() {
            write_failures(&root.join(VALIDATION_SUMMARY_FILE), snapshot)?;
        }
        info!(
            path = %root.display(),
            files = written,
            failures = snapshot.failures.len(),
            "Saved CSV report"
        );
        Ok(())
    }
}

fn open(path: &Path) -> Result<Writer<fs::File>, ReportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(encode_error)
}

fn encode_error(err: csv::Error) -> ReportError {
    ReportError::Encode(err.to_string())
}

fn status(passed: bool) -> &'static str {
    if passed {
        "Pass"
    } else {
        "Fail"
    }
}

fn matrix_rows(writer: &mut Writer<fs::File>, matrix: &HitMatrix, with_status: bool) -> Result<(), ReportError> {
    let mut header = vec!["Param".to_string()];
    header.extend((1..=matrix.hit_count()).map(|i| format!("Hit {i}")));
    if with_status {
        header.push("Status".to_string());
    }
    writer.write_record(&header).map_err(encode_error)?;

    for row in &matrix.rows {
        let mut record = vec![row.parameter.clone()];
        record.extend(
            row.values
                .iter()
                .map(|value| clean_cell(value.as_deref().unwrap_or_default())),
        );
        if with_status {
            record.push(status(row.passed).to_string());
        }
        writer.write_record(&record).map_err(encode_error)?;
    }
    Ok(())
}

fn write_step_section(path: &Path, step: &str, validation: &PlatformValidation) -> Result<(), ReportError> {
    let mut writer = open(path)?;
    matrix_rows(&mut writer, &validation.matrix, true)?;

    writer.write_record([""]).map_err(encode_error)?;
    writer
        .write_record(["Step", "Parameter", "Expected", "Actual", "Status"])
        .map_err(encode_error)?;
    for verdict in &validation.verdicts {
        writer
            .write_record([
                step,
                verdict.parameter.as_str(),
                clean_cell(&verdict.expected).as_str(),
                clean_cell(&verdict.actual).as_str(),
                status(verdict.passed),
            ])
            .map_err(encode_error)?;
    }
    let origin = format!("{step} [{}]", validation.platform.label());
    writer
        .write_record([origin.as_str(), "", "", "", status(validation.passed)])
        .map_err(encode_error)?;
    writer.flush()?;
    debug!(path = %path.display(), "step section written");
    Ok(())
}

fn write_hit_matrix(path: &Path, matrix: &HitMatrix) -> Result<(), ReportError> {
    let mut writer = open(path)?;
    matrix_rows(&mut writer, matrix, false)?;
    writer.flush()?;
    Ok(())
}

fn write_failures(path: &Path, snapshot: &RunSnapshot) -> Result<(), ReportError> {
    let mut writer = open(path)?;
    writer
        .write_record(["Platform", "Step", "Parameter", "Expected", "Actual", "Status"])
        .map_err(encode_error)?;
    for failure in &snapshot.failures {
        writer
            .write_record([
                failure.platform.label(),
                failure.origin().as_str(),
                failure.parameter.as_str(),
                clean_cell(&failure.expected).as_str(),
                clean_cell(&failure.actual).as_str(),
                status(failure.passed),
            ])
            .map_err(encode_error)?;
    }
    writer.flush()?;
    Ok(())
}
