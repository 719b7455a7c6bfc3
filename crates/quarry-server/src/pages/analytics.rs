//! Quarry Advanced Analytics Page
//!
//! Views over the dataset a session has loaded: filter controls,
//! distributions, daily trends, correlations, outliers and summary
//! statistics. Everything here works on rows already in memory.
//!
//! Key Features:
//! - "Original" / "Filtered" data status
//! - Default chart picks for the distributions tab
//! - Trend, correlation and outlier views with explicit column choices
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::{MetricTile, TableView};
use crate::session::AnalyticsDataset;
use quarry_analytics::charts::{bar_from_pairs, pie_from_pairs};
use quarry_analytics::dataset::{
    column_types, missing_values, overview, top_values, ColumnType, DatasetOverview, MissingValues,
};
use quarry_analytics::stats::{
    correlation_matrix, describe, detect_outliers, daily_trend, ColumnSummary, CorrelationPair,
    OutlierReport,
};
use quarry_analytics::{
    build_chart, derive_controls, AggregateFunction, ChartKind, ChartSpec, Figure, Filter,
    FilterControl,
};
use quarry_common::utils::format_count;
use quarry_common::{ColumnKind, QuarryError, Result, ResultSet};
use quarry_db::{DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, MIN_ROW_LIMIT};
use serde::Serialize;

/// Rows shown in the dataset preview grid.
pub const PREVIEW_ROWS: usize = 100;
const TOP_CORRELATIONS: usize = 10;

/// Rows to load for analysis: default 1000, within 100..=50 000.
pub fn load_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_ROW_LIMIT)
        .clamp(MIN_ROW_LIMIT, MAX_ROW_LIMIT)
}

// =============================================================================
// Page
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsPage {
    pub tables: Vec<String>,
    pub message: Option<String>,
    pub dataset: Option<DatasetView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distributions {
    pub histogram: Option<Figure>,
    pub scatter: Option<Figure>,
    pub category_bar: Option<Figure>,
    pub category_pie: Option<Figure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub describe: Vec<ColumnSummary>,
    pub column_types: Vec<ColumnType>,
    pub missing_values: Vec<MissingValues>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetView {
    pub table: String,
    pub limit: usize,
    pub status: &'static str,
    pub original_rows: usize,
    pub tiles: Vec<MetricTile>,
    pub overview: DatasetOverview,
    pub controls: Vec<FilterControl>,
    pub filters: Vec<Filter>,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub temporal_columns: Vec<String>,
    pub preview: TableView,
    pub distributions: Distributions,
    pub summary: Summary,
}

pub fn build_analytics_page(tables: Vec<String>, dataset: Option<&AnalyticsDataset>) -> AnalyticsPage {
    match dataset {
        Some(dataset) => AnalyticsPage {
            tables,
            message: None,
            dataset: Some(dataset_view(dataset)),
        },
        None => AnalyticsPage {
            tables,
            message: Some("Select a table and load data to begin analysis.".to_string()),
            dataset: None,
        },
    }
}

fn dataset_view(dataset: &AnalyticsDataset) -> DatasetView {
    let view = dataset.view();
    DatasetView {
        table: dataset.table.clone(),
        limit: dataset.limit,
        status: dataset.status(),
        original_rows: dataset.original.len(),
        tiles: vec![
            MetricTile::new("Current Table", dataset.table.clone()),
            MetricTile::new("Total Rows", format_count(view.len() as u64)),
            MetricTile::new("Total Columns", view.columns.len().to_string()),
            MetricTile::new("Data Status", dataset.status()),
        ],
        overview: overview(view),
        controls: derive_controls(&dataset.original),
        filters: dataset.filters.clone(),
        numeric_columns: view.columns_of_kind(ColumnKind::Numeric),
        categorical_columns: view.columns_of_kind(ColumnKind::Text),
        temporal_columns: view.columns_of_kind(ColumnKind::Temporal),
        preview: TableView::preview(view, PREVIEW_ROWS),
        distributions: distributions(view),
        summary: summary(view),
    }
}

/// Default picks: histogram of the first numeric column, scatter of the
/// first two, top-10 bar and pie of the first categorical column.
pub fn distributions(rs: &ResultSet) -> Distributions {
    let numeric = rs.columns_of_kind(ColumnKind::Numeric);
    let categorical = rs.columns_of_kind(ColumnKind::Text);

    let histogram = numeric.first().and_then(|col| {
        build_chart(
            rs,
            &ChartSpec::new(ChartKind::Histogram, format!("Distribution of {}", col)).x(col.clone()),
        )
    });
    let scatter = match numeric.as_slice() {
        [x, y, ..] => build_chart(
            rs,
            &ChartSpec::new(ChartKind::Scatter, format!("{} vs {}", x, y))
                .x(x.clone())
                .y(y.clone()),
        ),
        _ => None,
    };

    let top: Vec<(String, f64)> = categorical
        .first()
        .and_then(|col| top_values(rs, col, 10))
        .unwrap_or_default()
        .into_iter()
        .map(|(k, n)| (k, n as f64))
        .collect();
    let (category_bar, category_pie) = match categorical.first() {
        Some(col) => (
            bar_from_pairs(&format!("Top 10 {} Values", col), &top, false),
            pie_from_pairs(&format!("{} Distribution", col), &top),
        ),
        None => (None, None),
    };

    Distributions {
        histogram,
        scatter,
        category_bar,
        category_pie,
    }
}

/// Describe table, column types, and the columns with missing values,
/// most missing first.
pub fn summary(rs: &ResultSet) -> Summary {
    let mut missing: Vec<MissingValues> = missing_values(rs)
        .into_iter()
        .filter(|m| m.missing > 0)
        .collect();
    missing.sort_by(|a, b| b.missing.cmp(&a.missing));
    Summary {
        describe: describe(rs),
        column_types: column_types(rs),
        missing_values: missing,
    }
}

// =============================================================================
// Trend
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendView {
    pub date_column: String,
    pub value_column: String,
    pub aggregation: AggregateFunction,
    pub points: usize,
    pub figure: Option<Figure>,
}

/// Daily aggregation of `value_column` over `date_column` drawn as a time
/// series. Missing choices default to the first temporal and numeric
/// columns.
pub fn build_trend(
    rs: &ResultSet,
    date_column: Option<&str>,
    value_column: Option<&str>,
    aggregation: AggregateFunction,
) -> Result<TrendView> {
    let date_column = match date_column {
        Some(c) => c.to_string(),
        None => rs
            .columns_of_kind(ColumnKind::Temporal)
            .into_iter()
            .next()
            .ok_or_else(|| {
                QuarryError::BadRequest(
                    "No date columns found for trend analysis.".to_string(),
                )
            })?,
    };
    let value_column = match value_column {
        Some(c) => c.to_string(),
        None => rs
            .columns_of_kind(ColumnKind::Numeric)
            .into_iter()
            .next()
            .ok_or_else(|| {
                QuarryError::BadRequest("No numeric columns found for trend analysis.".to_string())
            })?,
    };

    let points = daily_trend(rs, &date_column, &value_column, aggregation).ok_or_else(|| {
        QuarryError::BadRequest(format!(
            "cannot trend {} over {}: unknown column or not a date column",
            value_column, date_column
        ))
    })?;

    let series = ResultSet::new(
        vec![
            quarry_common::Column::new(date_column.clone(), "date"),
            quarry_common::Column::new(value_column.clone(), "float8"),
        ],
        points
            .iter()
            .map(|p| vec![p.date.into(), p.value.into()])
            .collect(),
    );
    let title = format!("{} of {} over Time", capitalize(aggregation.as_str()), value_column);
    let figure = build_chart(
        &series,
        &ChartSpec::new(ChartKind::TimeSeries, title)
            .x(date_column.clone())
            .y(value_column.clone()),
    );

    Ok(TrendView {
        date_column,
        value_column,
        aggregation,
        points: points.len(),
        figure,
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// Correlations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationsView {
    pub heatmap: Option<Figure>,
    pub top_pairs: Vec<CorrelationPair>,
    pub message: Option<String>,
}

pub fn build_correlations(rs: &ResultSet) -> CorrelationsView {
    match correlation_matrix(rs) {
        Some(matrix) => CorrelationsView {
            heatmap: build_chart(rs, &ChartSpec::new(ChartKind::Heatmap, "Correlation Matrix")),
            top_pairs: matrix.top_pairs(TOP_CORRELATIONS),
            message: None,
        },
        None => CorrelationsView {
            heatmap: None,
            top_pairs: Vec::new(),
            message: Some("Need at least 2 numeric columns for correlation analysis.".to_string()),
        },
    }
}

// =============================================================================
// Outliers
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutliersView {
    pub report: OutlierReport,
    pub total: usize,
    pub percent: f64,
    pub box_plot: Option<Figure>,
    pub outliers: TableView,
}

/// IQR outliers of `column`, or of the first numeric column.
pub fn build_outliers(rs: &ResultSet, column: Option<&str>) -> Result<OutliersView> {
    let column = match column {
        Some(c) => c.to_string(),
        None => rs
            .columns_of_kind(ColumnKind::Numeric)
            .into_iter()
            .next()
            .ok_or_else(|| QuarryError::BadRequest("No numeric columns to analyse.".to_string()))?,
    };
    let report = detect_outliers(rs, &column)
        .ok_or_else(|| QuarryError::BadRequest(format!("not a numeric column: {}", column)))?;

    let mut flagged = report.select(rs);
    if let Some(idx) = flagged.column_index(&column) {
        flagged.rows.sort_by(|a, b| {
            a[idx]
                .as_f64()
                .partial_cmp(&b[idx].as_f64())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    let percent = if rs.is_empty() {
        0.0
    } else {
        (report.count() as f64 / rs.len() as f64 * 10000.0).round() / 100.0
    };

    Ok(OutliersView {
        box_plot: build_chart(
            rs,
            &ChartSpec::new(ChartKind::Box, format!("Box Plot - {}", column)).y(column.clone()),
        ),
        total: report.count(),
        percent,
        outliers: TableView::from(&flagged),
        report,
    })
}

// =============================================================================
// Tests
// =============================================================================
