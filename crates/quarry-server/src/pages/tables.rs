//! Quarry Table Browser
//!
//! The table list and the parameterized per-table page: descriptor, a
//! searchable data preview, automatic visualizations, statistics, column
//! analysis and downloads.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::{download_links, DownloadLink, MetricTile, TableView};
use chrono::NaiveDate;
use quarry_analytics::charts::{bar_from_pairs, line_from_points, pie_from_pairs};
use quarry_analytics::dataset::{
    column_memory, column_profile, data_quality, top_values, ColumnMemory, ColumnProfile,
    DataQuality,
};
use quarry_analytics::filter::search_rows;
use quarry_analytics::stats::{daily_trend, describe, ColumnSummary};
use quarry_analytics::{build_chart, AggregateFunction, ChartKind, ChartSpec, ExportFormat, Figure};
use quarry_common::utils::{format_count, format_size};
use quarry_common::{Column, ColumnKind, QuarryError, Result, ResultSet, TableDescriptor};
use quarry_db::{DataService, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT};
use serde::{Deserialize, Serialize};

/// Columns shown in the preview when none are chosen.
pub const DEFAULT_PREVIEW_COLUMNS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableListing {
    pub name: String,
    pub rows: u64,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableListPage {
    pub schema: String,
    pub tables: Vec<TableListing>,
    pub errors: Vec<String>,
}

/// Query parameters of the table page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TablePageParams {
    pub limit: Option<usize>,
    /// Case-insensitive text searched in every shown column.
    pub search: Option<String>,
    /// Comma-separated preview columns; empty selects all.
    pub columns: Option<String>,
    /// Column of the column analysis tab.
    pub column: Option<String>,
    pub numeric_column: Option<String>,
    pub category_column: Option<String>,
    pub date_column: Option<String>,
    pub value_column: Option<String>,
}

impl TablePageParams {
    pub fn limit(&self) -> usize {
        sample_limit(self.limit)
    }

    /// `None` when no selection was sent.
    pub fn selected_columns(&self) -> Option<Vec<String>> {
        self.columns.as_deref().map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePage {
    pub table: TableDescriptor,
    pub limit: usize,
    pub tiles: Vec<MetricTile>,
    pub preview: DataPreview,
    pub visualizations: Visualizations,
    pub statistics: TableStatistics,
    pub column_analysis: Option<ColumnProfile>,
    pub downloads: Vec<DownloadLink>,
    pub errors: Vec<String>,
}

/// Sample size for the table page: default 1000, at least 1, at most 50 000.
pub fn sample_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_ROW_LIMIT).clamp(1, MAX_ROW_LIMIT)
}

pub async fn build_table_list(data: &DataService) -> TableListPage {
    let schema = data.schema();
    let tables = data.list_tables(schema).await;
    let mut errors: Vec<String> = tables.error.into_iter().collect();
    let mut listings = Vec::with_capacity(tables.data.len());

    for name in tables.data {
        let meta = data.get_table_metadata(&name, schema).await;
        errors.extend(meta.error);
        listings.push(TableListing {
            rows: meta.data.row_count,
            size: meta.data.size,
            name,
        });
    }

    TableListPage {
        schema: schema.to_string(),
        tables: listings,
        errors,
    }
}

/// Build the page of one table. Tables outside the catalog and column picks
/// the sample does not have are errors; everything else degrades.
pub async fn build_table_page(
    data: &DataService,
    table: &str,
    params: &TablePageParams,
    today: NaiveDate,
) -> Result<TablePage> {
    let schema = data.schema();
    data.check_table(table, schema).await?;

    let limit = params.limit();
    let meta = data.get_table_metadata(table, schema).await;
    let rows = data.get_table_data(table, limit, schema).await;
    let errors = meta.error.into_iter().chain(rows.error).collect();
    let sample = rows.data;

    let column_analysis = match pick(&sample, params.column.as_deref(), None)? {
        Some(column) => column_profile(&sample, &column),
        None => None,
    };

    Ok(TablePage {
        tiles: table_tiles(&meta.data),
        limit,
        preview: DataPreview::new(&sample, params),
        visualizations: Visualizations::new(&sample, params)?,
        statistics: TableStatistics::new(&sample),
        column_analysis,
        downloads: download_links(table, today, &[ExportFormat::Csv, ExportFormat::Xlsx]),
        table: meta.data,
        errors,
    })
}

fn table_tiles(table: &TableDescriptor) -> Vec<MetricTile> {
    vec![
        MetricTile::new("Total Rows", format_count(table.row_count)),
        MetricTile::new("Total Columns", format_count(table.columns.len() as u64)),
        MetricTile::new("Table Size", table.size.clone()),
        MetricTile::new("Primary Keys", table.primary_keys().len().to_string()),
    ]
}

/// `requested` when the sample has it (and it is of `kind`, if given),
/// otherwise the first column of `kind`. Unknown picks are a bad request.
fn pick(rs: &ResultSet, requested: Option<&str>, kind: Option<ColumnKind>) -> Result<Option<String>> {
    let fits = |c: &Column| kind.map(|k| c.kind == k).unwrap_or(true);
    match requested {
        Some(name) => match rs.column(name) {
            Some(col) if fits(col) => Ok(Some(col.name.clone())),
            _ => Err(QuarryError::BadRequest(format!("cannot use column {}", name))),
        },
        None => Ok(rs.columns.iter().find(|&c| fits(c)).map(|c| c.name.clone())),
    }
}

// =============================================================================
// Data Preview
// =============================================================================

/// The sample narrowed to the chosen columns and rows matching the search.
pub fn preview_selection(rs: &ResultSet, params: &TablePageParams) -> ResultSet {
    let projected = match params.selected_columns() {
        Some(columns) if columns.is_empty() => rs.clone(),
        Some(columns) => rs.project(&columns),
        None => rs.project(
            &rs.columns
                .iter()
                .take(DEFAULT_PREVIEW_COLUMNS)
                .map(|c| c.name.clone())
                .collect::<Vec<_>>(),
        ),
    };
    match params.search.as_deref() {
        Some(term) => search_rows(&projected, term),
        None => projected,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPreview {
    /// Every column of the sample, for the column picker.
    pub available_columns: Vec<String>,
    pub search: Option<String>,
    pub data: TableView,
    pub message: String,
}

impl DataPreview {
    fn new(sample: &ResultSet, params: &TablePageParams) -> Self {
        let shown = preview_selection(sample, params);
        Self {
            available_columns: sample.columns.iter().map(|c| c.name.clone()).collect(),
            search: params.search.clone().filter(|s| !s.trim().is_empty()),
            message: format!("Showing {} rows × {} columns", shown.len(), shown.columns.len()),
            data: TableView::from(&shown),
        }
    }
}

// =============================================================================
// Visualizations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visualizations {
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub date_columns: Vec<String>,
    pub histogram: Option<Figure>,
    pub correlation: Option<Figure>,
    pub top_values: Option<Figure>,
    pub top_five: Option<Figure>,
    pub time_series: Option<Figure>,
}

impl Visualizations {
    fn new(rs: &ResultSet, params: &TablePageParams) -> Result<Self> {
        let numeric_columns = rs.columns_of_kind(ColumnKind::Numeric);
        let numeric = pick(rs, params.numeric_column.as_deref(), Some(ColumnKind::Numeric))?;
        let category = pick(rs, params.category_column.as_deref(), Some(ColumnKind::Text))?;
        let date = pick(rs, params.date_column.as_deref(), Some(ColumnKind::Temporal))?;
        let value = pick(rs, params.value_column.as_deref(), Some(ColumnKind::Numeric))?;

        let histogram = numeric.and_then(|column| {
            let spec = ChartSpec::new(ChartKind::Histogram, format!("Distribution of {}", column)).x(column);
            build_chart(rs, &spec)
        });
        let correlation = if numeric_columns.len() >= 2 {
            build_chart(rs, &ChartSpec::new(ChartKind::Heatmap, "Correlation Matrix"))
        } else {
            None
        };

        let (top_values, top_five) = match &category {
            Some(column) => {
                let top: Vec<(String, f64)> = top_values(rs, column, 10)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, n)| (k, n as f64))
                    .collect();
                (
                    bar_from_pairs(&format!("Top 10 {} Values", column), &top, true),
                    pie_from_pairs(
                        &format!("Top 5 {} Distribution", column),
                        &top[..top.len().min(5)],
                    ),
                )
            }
            None => (None, None),
        };

        let time_series = match (&date, &value) {
            (Some(date), Some(value)) => average_over_time(rs, date, value),
            _ => None,
        };

        Ok(Self {
            categorical_columns: rs.columns_of_kind(ColumnKind::Text),
            date_columns: rs.columns_of_kind(ColumnKind::Temporal),
            numeric_columns,
            histogram,
            correlation,
            top_values,
            top_five,
            time_series,
        })
    }
}

/// Daily mean of `value` as a line chart.
fn average_over_time(rs: &ResultSet, date: &str, value: &str) -> Option<Figure> {
    let points: Vec<(String, f64)> = daily_trend(rs, date, value, AggregateFunction::Mean)?
        .into_iter()
        .map(|p| (p.date.to_string(), p.value))
        .collect();
    line_from_points(&format!("Average {} over Time", value), date, value, &points)
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStatistics {
    pub describe: Vec<ColumnSummary>,
    pub quality: DataQuality,
    pub memory: Vec<ColumnMemory>,
    pub total_memory: String,
}

impl TableStatistics {
    fn new(rs: &ResultSet) -> Self {
        Self {
            describe: describe(rs),
            quality: data_quality(rs),
            memory: column_memory(rs),
            total_memory: format_size(rs.approximate_size() as u64),
        }
    }
}
