//! Interpretation of the `--report-plist` file written by `autopkg run`.
//!
//! Only structural problems with the file itself are errors. Missing keys at
//! any level collapse to empty row lists.
use anyhow::{Context, Result};
use plist::{Dictionary, Value};
use std::path::Path;

/// Summary result written by the IntuneAppUploader processor.
pub const IMPORT_SUMMARY_KEY: &str = "intuneappuploader_summary_result";
/// Summary result written by the IntuneAppCleaner processor.
pub const REMOVAL_SUMMARY_KEY: &str = "intuneappcleaner_summary_result";
/// Summary result written by the IntuneAppPromoter processor.
pub const PROMOTION_SUMMARY_KEY: &str = "intuneapppromoter_summary_result";

const FAILURES_KEY: &str = "failures";
const SUMMARY_RESULTS_KEY: &str = "summary_results";
const DATA_ROWS_KEY: &str = "data_rows";

/// One loosely structured record; its fields belong to the processor that wrote it.
pub type ReportRow = Dictionary;

/// Parsed outcome of one execution attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub imported: Vec<ReportRow>,
    pub failed: Vec<ReportRow>,
    pub removed: Vec<ReportRow>,
    pub promoted: Vec<ReportRow>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.imported.is_empty()
            && self.failed.is_empty()
            && self.removed.is_empty()
            && self.promoted.is_empty()
    }
}

/// Read and interpret a report file.
pub fn parse_report(path: &Path) -> Result<Report> {
    let value = Value::from_file(path)
        .with_context(|| format!("read report plist {}", path.display()))?;
    Ok(interpret_report(&value))
}

/// Interpret an already-loaded report tree.
pub fn interpret_report(value: &Value) -> Report {
    let Some(root) = value.as_dictionary() else {
        return Report::default();
    };

    let failed = rows(root.get(FAILURES_KEY));
    let summaries = root
        .get(SUMMARY_RESULTS_KEY)
        .and_then(Value::as_dictionary);

    let summary_rows = |key: &str| {
        summaries
            .and_then(|summaries| summaries.get(key))
            .and_then(Value::as_dictionary)
            .map(|summary| rows(summary.get(DATA_ROWS_KEY)))
            .unwrap_or_default()
    };

    Report {
        imported: summary_rows(IMPORT_SUMMARY_KEY),
        failed,
        removed: summary_rows(REMOVAL_SUMMARY_KEY),
        promoted: summary_rows(PROMOTION_SUMMARY_KEY),
    }
}

fn rows(value: Option<&Value>) -> Vec<ReportRow> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_dictionary)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Render a row field for humans; arrays become comma-separated lists.
pub fn field_text(row: &ReportRow, key: &str) -> Option<String> {
    row.get(key).and_then(value_text)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Integer(number) => Some(number.to_string()),
        Value::Real(number) => Some(number.to_string()),
        Value::Boolean(flag) => Some(flag.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    }
}
