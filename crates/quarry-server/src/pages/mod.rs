//! Quarry Pages - View Models
//!
//! One view-model builder per dashboard page. Each builder composes data
//! from the data service, derived aggregates, chart figures and download
//! links into a JSON document the browser shell renders as-is.
//!
//! Key Features:
//! - Overview with metric tiles, summary charts and drill-downs
//! - Parameterized table browser
//! - Custom SQL results, templates and formatting
//! - Advanced analytics over a session-loaded dataset
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod analytics;
pub mod overview;
pub mod query;
pub mod tables;

use chrono::NaiveDate;
use quarry_analytics::export::dated_stem;
use quarry_analytics::ExportFormat;
use quarry_common::{Column, ResultSet};
use serde::Serialize;
use serde_json::{Map, Value as Json};

// =============================================================================
// Shared View Types
// =============================================================================

/// A headline number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTile {
    pub label: String,
    pub value: String,
}

impl MetricTile {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    /// "Label: value".
    pub fn caption(&self) -> String {
        format!("{}: {}", self.label, self.value)
    }
}

/// Rows of a result set ready for a data grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub columns: Vec<Column>,
    pub rows: Vec<Map<String, Json>>,
    pub row_count: usize,
}

impl TableView {
    /// At most `max_rows` leading rows; `row_count` is the full length.
    pub fn preview(rs: &ResultSet, max_rows: usize) -> Self {
        let mut records = rs.records();
        records.truncate(max_rows);
        Self {
            columns: rs.columns.clone(),
            rows: records,
            row_count: rs.len(),
        }
    }
}

impl From<&ResultSet> for TableView {
    fn from(rs: &ResultSet) -> Self {
        Self::preview(rs, usize::MAX)
    }
}

/// A file the page offers for download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadLink {
    pub format: ExportFormat,
    pub label: String,
    pub filename: String,
}

/// One link per format for a file named after `subject` and `date`.
pub fn download_links(subject: &str, date: NaiveDate, formats: &[ExportFormat]) -> Vec<DownloadLink> {
    let stem = dated_stem(subject, date);
    formats
        .iter()
        .map(|format| DownloadLink {
            format: *format,
            label: format!("Download as {}", format_label(*format)),
            filename: format!("{}.{}", stem, format.extension()),
        })
        .collect()
}

fn format_label(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Csv => "CSV",
        ExportFormat::Xlsx => "Excel",
        ExportFormat::Json => "JSON",
    }
}
