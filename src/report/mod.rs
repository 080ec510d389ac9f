//! Report writers
//!
//! Both writers implement [`action_flow::ReportSink`] and lay files out under
//! `<output_dir>/<run_id>/`.

mod csv;
mod json;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_flow::{FanoutSink, ReportSink};

use crate::config::{ReportConfig, ReportFormat};

pub use self::csv::CsvReportWriter;
pub use self::json::JsonReportWriter;

pub const PARTIAL_DIR: &str = "partial";
pub(crate) const SECTION_NAME_LIMIT: usize = 31;

/// Strips characters that cannot appear in a sheet or file name and caps it
/// at 31 characters.
pub fn section_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ':' | '\\' | '/' | '?' | '*' | '[' | ']'))
        .take(SECTION_NAME_LIMIT)
        .collect()
}

/// Removes control characters spreadsheets refuse to store. Tab, line feed
/// and carriage return are kept.
pub fn clean_cell(value: &str) -> String {
    value
        .chars()
        .filter(|c| {
            !matches!(*c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}')
        })
        .collect()
}

pub(crate) fn run_dir(output_dir: &Path, run_id: &str) -> PathBuf {
    output_dir.join(run_id)
}

/// One sink per configured format.
pub fn build_sinks(config: &ReportConfig) -> Arc<dyn ReportSink> {
    let mut sinks: Vec<Arc<dyn ReportSink>> = Vec::new();
    for format in &config.formats {
        match format {
            ReportFormat::Csv => sinks.push(Arc::new(CsvReportWriter::new(&config.output_dir))),
            ReportFormat::Json => sinks.push(Arc::new(JsonReportWriter::new(&config.output_dir))),
        }
    }
    Arc::new(FanoutSink::new(sinks))
}
