//! Quarry Dataset - Column Profiling
//!
//! Helpers that profile a loaded result set: category counts, missing
//! values, column types, data quality, per-column memory and single-column
//! profiles, and the small-slice grouping used by pie charts.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::stats::{describe, ColumnSummary};
use quarry_common::utils::format_size;
use quarry_common::{ColumnKind, ResultSet};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Label given to grouped small pie slices.
pub const OTHERS_LABEL: &str = "Others";

// =============================================================================
// Category Counts
// =============================================================================

/// Occurrences of each non-null value of a column, most frequent first,
/// ties broken by value.
pub fn value_counts(rs: &ResultSet, column: &str) -> Option<Vec<(String, u64)>> {
    let values = rs.column_values(column)?;
    let mut counts: HashMap<String, u64> = HashMap::new();
    for value in values.into_iter().filter(|v| !v.is_null()) {
        *counts.entry(value.to_display()).or_default() += 1;
    }
    let mut counts: Vec<(String, u64)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Some(counts)
}

/// The `n` most frequent values of a column.
pub fn top_values(rs: &ResultSet, column: &str, n: usize) -> Option<Vec<(String, u64)>> {
    let mut counts = value_counts(rs, column)?;
    counts.truncate(n);
    Some(counts)
}

/// Sorted distinct non-null values of a column.
pub fn distinct_values(rs: &ResultSet, column: &str) -> Option<Vec<String>> {
    let values = rs.column_values(column)?;
    let set: BTreeSet<String> = values
        .into_iter()
        .filter(|v| !v.is_null())
        .map(|v| v.to_display())
        .collect();
    Some(set.into_iter().collect())
}

/// Merge slices below `threshold` (a fraction of the total) into one
/// "Others" slice appended at the end. Slices keep their order.
pub fn group_small_slices(slices: Vec<(String, f64)>, threshold: f64) -> Vec<(String, f64)> {
    let total: f64 = slices.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return slices;
    }

    let mut kept = Vec::new();
    let mut others = 0.0;
    for (label, value) in slices {
        if value / total < threshold {
            others += value;
        } else {
            kept.push((label, value));
        }
    }
    if others > 0.0 {
        kept.push((OTHERS_LABEL.to_string(), others));
    }
    kept
}

// =============================================================================
// Column Profiles
// =============================================================================

/// Missing-value count of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingValues {
    pub column: String,
    pub missing: usize,
    pub percent: f64,
}

/// Null counts of every column, in column order.
pub fn missing_values(rs: &ResultSet) -> Vec<MissingValues> {
    rs.columns
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let missing = rs.rows.iter().filter(|row| row[idx].is_null()).count();
            MissingValues {
                column: col.name.clone(),
                missing,
                percent: percent(missing, rs.len()),
            }
        })
        .collect()
}

/// Type information of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnType {
    pub column: String,
    pub type_name: String,
    pub kind: ColumnKind,
}

pub fn column_types(rs: &ResultSet) -> Vec<ColumnType> {
    rs.columns
        .iter()
        .map(|c| ColumnType {
            column: c.name.clone(),
            type_name: c.type_name.clone(),
            kind: c.kind,
        })
        .collect()
}

/// Headline numbers of a loaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetOverview {
    pub rows: usize,
    pub columns: usize,
    pub numeric_columns: usize,
    pub memory: String,
}

pub fn overview(rs: &ResultSet) -> DatasetOverview {
    DatasetOverview {
        rows: rs.len(),
        columns: rs.columns.len(),
        numeric_columns: rs.columns_of_kind(ColumnKind::Numeric).len(),
        memory: format_size(rs.approximate_size() as u64),
    }
}

// =============================================================================
// Data Quality
// =============================================================================

/// Completeness and duplication of a dataset's rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQuality {
    pub total_records: usize,
    pub complete_records: usize,
    pub records_with_nulls: usize,
    pub duplicate_records: usize,
    pub unique_records: usize,
    /// Share of complete records, in percent with two decimals.
    pub completeness: f64,
}

pub fn data_quality(rs: &ResultSet) -> DataQuality {
    let complete = rs
        .rows
        .iter()
        .filter(|row| row.iter().all(|v| !v.is_null()))
        .count();
    // Debug output tells apart values that display alike (1 vs "1").
    let distinct: HashSet<String> = rs.rows.iter().map(|row| format!("{:?}", row)).collect();

    DataQuality {
        total_records: rs.len(),
        complete_records: complete,
        records_with_nulls: rs.len() - complete,
        duplicate_records: rs.len() - distinct.len(),
        unique_records: distinct.len(),
        completeness: percent(complete, rs.len()),
    }
}

/// Approximate memory taken by one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMemory {
    pub column: String,
    pub bytes: usize,
    pub size: String,
}

pub fn column_memory(rs: &ResultSet) -> Vec<ColumnMemory> {
    rs.columns
        .iter()
        .zip(rs.column_sizes())
        .map(|(col, bytes)| ColumnMemory {
            column: col.name.clone(),
            bytes,
            size: format_size(bytes as u64),
        })
        .collect()
}

// =============================================================================
// Column Profile
// =============================================================================

/// The most frequent value of a text column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MostCommon {
    pub value: String,
    pub count: u64,
}

/// Everything the column analysis tab shows about one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub column: String,
    pub type_name: String,
    pub kind: ColumnKind,
    pub non_null: usize,
    pub nulls: usize,
    pub null_percent: f64,
    pub unique: usize,
    pub unique_percent: f64,
    /// Text columns only.
    pub most_common: Option<MostCommon>,
    /// Numeric columns only.
    pub stats: Option<ColumnSummary>,
}

/// Profile of `column`, or `None` when the dataset has no such column.
pub fn column_profile(rs: &ResultSet, column: &str) -> Option<ColumnProfile> {
    let col = rs.column(column)?;
    let values = rs.column_values(column)?;
    let nulls = values.iter().filter(|v| v.is_null()).count();
    let unique = distinct_values(rs, column)?.len();

    let most_common = match col.kind {
        ColumnKind::Text => value_counts(rs, column)?
            .into_iter()
            .next()
            .map(|(value, count)| MostCommon { value, count }),
        _ => None,
    };
    let stats = match col.kind {
        ColumnKind::Numeric => describe(&rs.project(&[column.to_string()])).into_iter().next(),
        _ => None,
    };

    Some(ColumnProfile {
        column: col.name.clone(),
        type_name: col.type_name.clone(),
        kind: col.kind,
        non_null: values.len() - nulls,
        nulls,
        null_percent: percent(nulls, values.len()),
        unique,
        unique_percent: percent(unique, values.len()),
        most_common,
        stats,
    })
}

/// `part` of `whole` in percent, two decimals; 0 for an empty whole.
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10000.0).round() / 100.0
}

// =============================================================================
// Tests
// =============================================================================
