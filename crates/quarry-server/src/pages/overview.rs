//! Quarry Overview Page
//!
//! Database-wide metric tiles, the table summary, summary charts, the
//! highlight-table section and the per-metric drill-downs.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use super::MetricTile;
use quarry_analytics::charts::{bar_from_pairs, line_from_points, pie_from_pairs};
use quarry_analytics::dataset::{group_small_slices, value_counts};
use quarry_analytics::stats::daily_counts;
use quarry_analytics::Figure;
use quarry_common::config::DashboardConfig;
use quarry_common::utils::format_count;
use quarry_common::QuarryError;
use quarry_db::{DataService, MAX_ROW_LIMIT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::str::FromStr;

/// Bars shown in the top-N charts.
pub const TOP_TABLES: usize = 10;
/// Tables holding less than this share of all records share one pie slice.
pub const PIE_GROUP_THRESHOLD: f64 = 0.05;
const PREVIEW_COLUMNS: usize = 5;

// =============================================================================
// View Models
// =============================================================================

/// One row of the table summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: u64,
    pub columns: usize,
    pub size: String,
    pub primary_keys: Vec<String>,
}

/// The configured highlight table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightSection {
    pub label: String,
    pub table: String,
    pub total: u64,
    pub tile: MetricTile,
    pub summary: String,
    pub trend: Option<Figure>,
    pub distribution: Option<Figure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewPage {
    pub schema: String,
    pub tiles: Vec<MetricTile>,
    pub tables: Vec<TableSummary>,
    pub charts: Vec<Figure>,
    pub highlight: Option<HighlightSection>,
    pub errors: Vec<String>,
}

// =============================================================================
// Builders
// =============================================================================

/// Build the overview page. Failing widgets degrade; their messages are
/// collected in `errors`.
pub async fn build_overview(data: &DataService, dashboard: &DashboardConfig) -> OverviewPage {
    let mut errors = Vec::new();

    let stats = data.get_table_stats().await;
    errors.extend(stats.error.clone());
    let stats = stats.data;

    let tables = data.list_tables(data.schema()).await;
    errors.extend(tables.error.clone());

    let summaries = table_summaries(data, &tables.data, &mut errors).await;

    let db_size = if stats.db_size.is_empty() {
        "N/A".to_string()
    } else {
        stats.db_size.clone()
    };
    let tiles = vec![
        MetricTile::new("Total Tables", format_count(stats.table_count)),
        MetricTile::new("Total Columns", format_count(stats.total_columns)),
        MetricTile::new("Total Records", format_count(stats.total_records)),
        MetricTile::new("Database Size", db_size),
    ];

    let highlight = if tables.data.contains(&dashboard.highlight_table) {
        Some(highlight_section(data, dashboard).await)
    } else {
        None
    };

    OverviewPage {
        schema: data.schema().to_string(),
        tiles,
        charts: summary_charts(&summaries),
        tables: summaries,
        highlight,
        errors,
    }
}

async fn table_summaries(
    data: &DataService,
    tables: &[String],
    errors: &mut Vec<String>,
) -> Vec<TableSummary> {
    let mut summaries = Vec::with_capacity(tables.len());
    for table in tables {
        let meta = data.get_table_metadata(table, data.schema()).await;
        if let Some(e) = meta.error {
            errors.push(format!("Could not load metadata for {}: {}", table, e));
            continue;
        }
        let meta = meta.data;
        summaries.push(TableSummary {
            primary_keys: meta.primary_keys(),
            name: meta.name,
            rows: meta.row_count,
            columns: meta.column_count,
            size: meta.size,
        });
    }
    summaries
}

/// Top-10 bars by rows and by columns, and the record distribution pie.
pub fn summary_charts(summaries: &[TableSummary]) -> Vec<Figure> {
    let mut charts = Vec::new();

    let mut by_rows: Vec<&TableSummary> = summaries.iter().collect();
    by_rows.sort_by(|a, b| b.rows.cmp(&a.rows));
    let pairs: Vec<(String, f64)> = by_rows
        .iter()
        .take(TOP_TABLES)
        .map(|t| (t.name.clone(), t.rows as f64))
        .collect();
    charts.extend(bar_from_pairs("Top 10 Tables by Row Count", &pairs, true));

    let mut by_columns: Vec<&TableSummary> = summaries.iter().collect();
    by_columns.sort_by(|a, b| b.columns.cmp(&a.columns));
    let pairs: Vec<(String, f64)> = by_columns
        .iter()
        .take(TOP_TABLES)
        .map(|t| (t.name.clone(), t.columns as f64))
        .collect();
    charts.extend(bar_from_pairs("Top 10 Tables by Column Count", &pairs, true));

    let total: u64 = summaries.iter().map(|t| t.rows).sum();
    if total > 0 {
        let slices = summaries
            .iter()
            .map(|t| (t.name.clone(), t.rows as f64))
            .collect();
        let slices = group_small_slices(slices, PIE_GROUP_THRESHOLD);
        charts.extend(pie_from_pairs("Record Distribution Across Tables", &slices));
    }

    charts
}

async fn highlight_section(data: &DataService, dashboard: &DashboardConfig) -> HighlightSection {
    let label = &dashboard.highlight_label;
    let table = &dashboard.highlight_table;
    let count = data.get_table_count(table, data.schema()).await;
    let tile = MetricTile::new(format!("Total {}", label), format_count(count.data));

    let mut section = HighlightSection {
        label: label.clone(),
        table: table.clone(),
        total: count.data,
        summary: tile.caption(),
        tile,
        trend: None,
        distribution: None,
        error: count.error,
    };
    if section.total == 0 {
        return section;
    }

    let rows = data.get_table_data(table, MAX_ROW_LIMIT, data.schema()).await;
    if rows.error.is_some() {
        section.error = rows.error;
        return section;
    }
    let rs = rows.data;

    if let Some(points) = daily_counts(&rs, &dashboard.highlight_date_column) {
        let points: Vec<(String, f64)> = points
            .into_iter()
            .map(|p| (p.date.to_string(), p.value))
            .collect();
        section.trend = line_from_points(&format!("Daily {} Trend", label), "Date", "Count", &points);
    }

    if let Some(counts) = value_counts(&rs, &dashboard.highlight_category_column) {
        let slices: Vec<(String, f64)> = counts.into_iter().map(|(k, n)| (k, n as f64)).collect();
        section.distribution = pie_from_pairs(&format!("{} Type Distribution", label), &slices);
    }

    section
}

// =============================================================================
// Drill-downs
// =============================================================================

/// Which metric tile was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverviewDetail {
    Tables,
    Columns,
    Records,
    Sizes,
}

impl OverviewDetail {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Tables => "All Tables in Database",
            Self::Columns => "Columns per Table",
            Self::Records => "Records per Table",
            Self::Sizes => "Table Sizes",
        }
    }
}

impl FromStr for OverviewDetail {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tables" => Ok(Self::Tables),
            "columns" => Ok(Self::Columns),
            "records" => Ok(Self::Records),
            "sizes" | "size" => Ok(Self::Sizes),
            other => Err(QuarryError::NotFound(format!("overview detail '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailPage {
    pub detail: OverviewDetail,
    pub title: &'static str,
    pub rows: Vec<Json>,
    pub errors: Vec<String>,
}

/// First few column names, with "..." when there are more.
pub fn column_preview(names: &[String]) -> String {
    let shown: Vec<&str> = names.iter().take(PREVIEW_COLUMNS).map(String::as_str).collect();
    let mut preview = shown.join(", ");
    if names.len() > PREVIEW_COLUMNS {
        preview.push_str("...");
    }
    preview
}

pub async fn build_detail(data: &DataService, detail: OverviewDetail) -> DetailPage {
    let schema = data.schema();
    let tables = data.list_tables(schema).await;
    let mut errors: Vec<String> = tables.error.into_iter().collect();
    let mut rows = Vec::with_capacity(tables.data.len());

    match detail {
        OverviewDetail::Tables => {
            for (i, table) in tables.data.iter().enumerate() {
                rows.push(json!({"position": i + 1, "table": table}));
            }
        }
        OverviewDetail::Columns => {
            for table in &tables.data {
                let columns = data.list_columns(table, schema).await;
                errors.extend(columns.error);
                if columns.data.is_empty() {
                    continue;
                }
                let names: Vec<String> = columns.data.into_iter().map(|c| c.name).collect();
                rows.push(json!({
                    "table": table,
                    "column_count": names.len(),
                    "columns": column_preview(&names),
                }));
            }
        }
        OverviewDetail::Records => {
            let mut counts = Vec::with_capacity(tables.data.len());
            for table in &tables.data {
                let count = data.get_table_count(table, schema).await;
                errors.extend(count.error);
                counts.push((table, count.data));
            }
            counts.sort_by(|a, b| b.1.cmp(&a.1));
            rows.extend(
                counts
                    .into_iter()
                    .map(|(table, records)| json!({"table": table, "records": records})),
            );
        }
        OverviewDetail::Sizes => {
            for table in &tables.data {
                let meta = data.get_table_metadata(table, schema).await;
                errors.extend(meta.error);
                let size = if meta.data.size.is_empty() {
                    "N/A".to_string()
                } else {
                    meta.data.size
                };
                rows.push(json!({"table": table, "size": size, "rows": meta.data.row_count}));
            }
        }
    }

    DetailPage {
        detail,
        title: detail.title(),
        rows,
        errors,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use quarry_common::{Column, ResultSet, Value};
    use quarry_db::{MemoryBackend, MemoryTable};
    use std::sync::Arc;

    fn numbered(n: i64) -> MemoryTable {
        MemoryTable::new(ResultSet::new(
            vec![
                Column::new("id", "int4"),
                Column::new("a", "text"),
                Column::new("b", "text"),
                Column::new("c", "text"),
                Column::new("d", "text"),
                Column::new("e", "text"),
            ],
            (1..=n)
                .map(|i| {
                    let mut row = vec![Value::Int(i)];
                    row.extend((0..5).map(|_| Value::Text("x".into())));
                    row
                })
                .collect(),
        ))
        .with_primary_key("id")
        .with_size("16 kB")
    }

    fn feedback(rows: &[(u32, &str)]) -> MemoryTable {
        MemoryTable::new(ResultSet::new(
            vec![
                Column::new("id", "int4"),
                Column::new("created_at", "timestamp"),
                Column::new("feedback_type", "text"),
            ],
            rows.iter()
                .enumerate()
                .map(|(i, (day, kind))| {
                    let at = NaiveDate::from_ymd_opt(2024, 4, *day)
                        .unwrap()
                        .and_hms_opt(9, 30, 0)
                        .unwrap();
                    vec![Value::Int(i as i64), Value::Timestamp(at), Value::Text(kind.to_string())]
                })
                .collect(),
        ))
    }

    fn service(backend: Arc<MemoryBackend>) -> DataService {
        DataService::new(backend, "public", &DashboardConfig::default())
    }

    #[tokio::test]
    async fn test_overview_tiles_and_charts() {
        let backend = Arc::new(MemoryBackend::default());
        backend.insert_table("orders", numbered(960));
        backend.insert_table("users", numbered(30));
        backend.insert_table("tags", numbered(10));

        let page = build_overview(&service(backend), &DashboardConfig::default()).await;
        assert!(page.errors.is_empty());
        assert_eq!(page.tiles[0].value, "3");
        assert_eq!(page.tiles[2], MetricTile::new("Total Records", "1,000"));
        assert_eq!(page.tables.len(), 3);
        assert_eq!(page.tables[0].primary_keys, vec!["id".to_string()]);
        assert_eq!(page.charts.len(), 3);
        assert!(page.highlight.is_none());

        // users (3%) and tags (1%) fall under the pie threshold
        let pie = &page.charts[2].data[0];
        assert_eq!(pie["labels"], json!(["orders", "Others"]));
        assert_eq!(pie["values"], json!([960.0, 40.0]));
    }

    #[tokio::test]
    async fn test_empty_highlight_table() {
        let backend = Arc::new(MemoryBackend::default());
        backend.insert_table("chat_feedback", feedback(&[]));

        let page = build_overview(&service(backend), &DashboardConfig::default()).await;
        let highlight = page.highlight.unwrap();
        assert_eq!(highlight.summary, "Total Feedback: 0");
        assert!(highlight.trend.is_none());
        assert!(highlight.distribution.is_none());
        assert!(highlight.error.is_none());
        assert!(page.errors.is_empty());
    }

    #[tokio::test]
    async fn test_highlight_charts() {
        let backend = Arc::new(MemoryBackend::default());
        backend.insert_table(
            "chat_feedback",
            feedback(&[(1, "positive"), (1, "negative"), (2, "positive")]),
        );

        let page = build_overview(&service(backend), &DashboardConfig::default()).await;
        let highlight = page.highlight.unwrap();
        assert_eq!(highlight.total, 3);

        let trend = highlight.trend.unwrap();
        assert_eq!(trend.layout["title"]["text"], "Daily Feedback Trend");
        assert_eq!(trend.data[0]["x"], json!(["2024-04-01", "2024-04-02"]));
        assert_eq!(trend.data[0]["y"], json!([2.0, 1.0]));

        let pie = highlight.distribution.unwrap();
        assert_eq!(pie.layout["title"]["text"], "Feedback Type Distribution");
        assert_eq!(pie.data[0]["labels"], json!(["positive", "negative"]));
    }

    #[tokio::test]
    async fn test_overview_degrades_on_outage() {
        let backend = Arc::new(MemoryBackend::default());
        backend.insert_table("orders", numbered(5));
        backend.set_outage(Some(QuarryError::Connection("connection refused".into())));

        let page = build_overview(&service(backend), &DashboardConfig::default()).await;
        assert_eq!(page.tiles[0].value, "0");
        assert_eq!(page.tiles[3].value, "N/A");
        assert!(page.charts.is_empty());
        assert!(page.errors.iter().any(|e| e.contains("connection refused")));
    }

    #[tokio::test]
    async fn test_drill_downs() {
        let backend = Arc::new(MemoryBackend::default());
        backend.insert_table("orders", numbered(7));
        backend.insert_table("users", numbered(12));
        let data = service(backend);

        let records = build_detail(&data, OverviewDetail::Records).await;
        assert_eq!(records.rows[0], json!({"table": "users", "records": 12}));

        let columns = build_detail(&data, OverviewDetail::Columns).await;
        assert_eq!(columns.rows[0]["columns"], "id, a, b, c, d...");
        assert_eq!(columns.rows[0]["column_count"], 6);

        let sizes = build_detail(&data, "sizes".parse().unwrap()).await;
        assert_eq!(sizes.rows[1], json!({"table": "users", "size": "16 kB", "rows": 12}));
        assert_eq!(sizes.title, "Table Sizes");

        assert!("bogus".parse::<OverviewDetail>().is_err());
    }

    #[test]
    fn test_column_preview() {
        let names: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(column_preview(&names), "a, b");
    }
}
