//! Quarry Filter - In-Memory Dataset Filters
//!
//! Derives filter controls from a loaded dataset and applies user-chosen
//! filters to it without re-querying the database.
//!
//! Key Features:
//! - Numeric range controls for the first numeric columns
//! - Multi-select controls for low-cardinality text columns
//! - Date range controls for the first temporal columns
//! - Conjunctive application of any number of filters
//! - Case-insensitive text search across every cell
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::dataset::distinct_values;
use chrono::NaiveDate;
use quarry_common::{ColumnKind, QuarryError, Result, ResultSet, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MAX_RANGE_CONTROLS: usize = 5;
pub const MAX_MULTI_SELECT_CONTROLS: usize = 3;
pub const MAX_MULTI_SELECT_OPTIONS: usize = 20;
pub const MAX_DATE_CONTROLS: usize = 2;

// =============================================================================
// Filter Controls
// =============================================================================

/// A control the analytics page offers for narrowing the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterControl {
    Range { column: String, min: f64, max: f64 },
    MultiSelect { column: String, options: Vec<String> },
    DateRange { column: String, min: NaiveDate, max: NaiveDate },
}

/// Controls for a dataset. Columns without usable values get no control.
pub fn derive_controls(rs: &ResultSet) -> Vec<FilterControl> {
    let mut controls = Vec::new();

    for column in rs
        .columns_of_kind(ColumnKind::Numeric)
        .into_iter()
        .take(MAX_RANGE_CONTROLS)
    {
        let values = rs.numeric_values(&column).unwrap_or_default();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if min.is_finite() && max.is_finite() {
            controls.push(FilterControl::Range { column, min, max });
        }
    }

    for column in rs
        .columns_of_kind(ColumnKind::Text)
        .into_iter()
        .take(MAX_MULTI_SELECT_CONTROLS)
    {
        let options = distinct_values(rs, &column).unwrap_or_default();
        if !options.is_empty() && options.len() <= MAX_MULTI_SELECT_OPTIONS {
            controls.push(FilterControl::MultiSelect { column, options });
        }
    }

    for column in rs
        .columns_of_kind(ColumnKind::Temporal)
        .into_iter()
        .take(MAX_DATE_CONTROLS)
    {
        let dates: Vec<NaiveDate> = rs
            .column_values(&column)
            .unwrap_or_default()
            .into_iter()
            .filter_map(Value::as_date)
            .collect();
        if let (Some(min), Some(max)) = (dates.iter().min(), dates.iter().max()) {
            controls.push(FilterControl::DateRange {
                column,
                min: *min,
                max: *max,
            });
        }
    }

    controls
}

// =============================================================================
// Filters
// =============================================================================

/// A filter chosen by the user. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    Range { column: String, min: f64, max: f64 },
    MultiSelect { column: String, values: Vec<String> },
    DateRange { column: String, from: NaiveDate, to: NaiveDate },
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Self::Range { column, .. }
            | Self::MultiSelect { column, .. }
            | Self::DateRange { column, .. } => column,
        }
    }
}

enum Compiled {
    Range(usize, f64, f64),
    Set(usize, HashSet<String>),
    Dates(usize, NaiveDate, NaiveDate),
}

impl Compiled {
    fn matches(&self, row: &[Value]) -> bool {
        match self {
            Self::Range(idx, min, max) => row[*idx]
                .as_f64()
                .map(|v| v >= *min && v <= *max)
                .unwrap_or(false),
            Self::Set(idx, values) => {
                !row[*idx].is_null() && values.contains(&row[*idx].to_display())
            }
            Self::Dates(idx, from, to) => row[*idx]
                .as_date()
                .map(|d| d >= *from && d <= *to)
                .unwrap_or(false),
        }
    }
}

/// Keep rows matching every filter. A multi-select with no values selected
/// does not filter. Rows with null in a filtered column are dropped.
pub fn apply_filters(rs: &ResultSet, filters: &[Filter]) -> Result<ResultSet> {
    let mut compiled = Vec::with_capacity(filters.len());
    for filter in filters {
        let idx = rs.column_index(filter.column()).ok_or_else(|| {
            QuarryError::BadRequest(format!("unknown column: {}", filter.column()))
        })?;
        match filter {
            Filter::Range { min, max, .. } => compiled.push(Compiled::Range(idx, *min, *max)),
            Filter::MultiSelect { values, .. } if values.is_empty() => {}
            Filter::MultiSelect { values, .. } => {
                compiled.push(Compiled::Set(idx, values.iter().cloned().collect()))
            }
            Filter::DateRange { from, to, .. } => compiled.push(Compiled::Dates(idx, *from, *to)),
        }
    }

    Ok(rs.filter_rows(|row| compiled.iter().all(|f| f.matches(row))))
}

/// Keep rows where any cell's text contains `term`, ignoring case. A blank
/// term keeps every row; null cells never match.
pub fn search_rows(rs: &ResultSet, term: &str) -> ResultSet {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return rs.clone();
    }
    rs.filter_rows(|row| {
        row.iter()
            .filter(|v| !v.is_null())
            .any(|v| v.to_display().to_lowercase().contains(&needle))
    })
}

// =============================================================================
// Tests
// =============================================================================
