//! Quarry Export - Result Set Serialization
//!
//! Serializes result sets for download as CSV, Excel workbooks or JSON
//! records, and names the downloaded files.
//!
//! Key Features:
//! - CSV with quoting of separators, quotes and line breaks
//! - XLSX with a styled header row and a sanitized sheet name
//! - Pretty-printed JSON records
//! - Date-stamped file names
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{NaiveDate, NaiveDateTime};
use quarry_common::{QuarryError, Result, ResultSet, Value};
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const MAX_SHEET_NAME_LEN: usize = 31;
const FORBIDDEN_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];
const HEADER_BACKGROUND: u32 = 0x000080;

// =============================================================================
// Export Format
// =============================================================================

/// Supported download formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = QuarryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "excel" => Ok(Self::Xlsx),
            "json" => Ok(Self::Json),
            other => Err(QuarryError::BadRequest(format!("unknown export format: {other}"))),
        }
    }
}

// =============================================================================
// Export File
// =============================================================================

/// A serialized download.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportFile {
    /// Serialize `rs` in `format`, naming the file `<stem>.<ext>`.
    pub fn build(rs: &ResultSet, format: ExportFormat, stem: &str, sheet_name: &str) -> Result<Self> {
        let bytes = match format {
            ExportFormat::Csv => to_csv(rs).into_bytes(),
            ExportFormat::Xlsx => to_xlsx(rs, sheet_name)?,
            ExportFormat::Json => to_json(rs)?.into_bytes(),
        };
        Ok(Self {
            filename: format!("{}.{}", stem, format.extension()),
            content_type: format.content_type(),
            bytes,
        })
    }
}

/// `<subject>_<YYYYMMDD>` with the subject reduced to filename-safe characters.
pub fn dated_stem(subject: &str, date: NaiveDate) -> String {
    format!("{}_{}", safe_subject(subject), date.format("%Y%m%d"))
}

/// `query_<YYYYMMDD_HHMMSS>`.
pub fn query_stem(at: NaiveDateTime) -> String {
    format!("query_{}", at.format("%Y%m%d_%H%M%S"))
}

fn safe_subject(subject: &str) -> String {
    let cleaned: String = subject
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "export".to_string()
    } else {
        cleaned
    }
}

// =============================================================================
// CSV
// =============================================================================

fn csv_field(text: &str) -> String {
    if text.contains(|c: char| matches!(c, ',' | '"' | '\r' | '\n')) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// CSV with a header row and `\n` line endings. Nulls are empty fields.
pub fn to_csv(rs: &ResultSet) -> String {
    let mut out = String::new();
    let header: Vec<String> = rs.columns.iter().map(|c| csv_field(&c.name)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in &rs.rows {
        let fields: Vec<String> = row.iter().map(|v| csv_field(&v.to_display())).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

// =============================================================================
// XLSX
// =============================================================================

/// Strip characters Excel forbids in sheet names and cap the length.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !FORBIDDEN_SHEET_CHARS.contains(c))
        .take(MAX_SHEET_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('\'').to_string();
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

fn xlsx_error(err: rust_xlsxwriter::XlsxError) -> QuarryError {
    QuarryError::Export(err.to_string())
}

/// Single-sheet workbook with a bold white-on-navy bordered header.
pub fn to_xlsx(rs: &ResultSet, sheet_name: &str) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_BACKGROUND))
        .set_border(FormatBorder::Thin);

    let sheet = workbook.add_worksheet();
    sheet
        .set_name(sanitize_sheet_name(sheet_name))
        .map_err(xlsx_error)?;

    for (col, column) in rs.columns.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, &column.name, &header)
            .map_err(xlsx_error)?;
    }

    for (r, row) in rs.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let c = c as u16;
            match value {
                Value::Null => continue,
                Value::Bool(b) => sheet.write_boolean(r, c, *b).map(|_| ()),
                Value::Int(i) => sheet.write_number(r, c, *i as f64).map(|_| ()),
                Value::Float(f) if f.is_finite() => sheet.write_number(r, c, *f).map(|_| ()),
                other => sheet.write_string(r, c, other.to_display()).map(|_| ()),
            }
            .map_err(xlsx_error)?;
        }
    }

    sheet.autofit();
    workbook.save_to_buffer().map_err(xlsx_error)
}

// =============================================================================
// JSON
// =============================================================================

/// Array of row objects, pretty printed.
pub fn to_json(rs: &ResultSet) -> Result<String> {
    serde_json::to_string_pretty(&rs.records()).map_err(|e| QuarryError::Export(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
