//! Quarry Charts - Plotly Figure Builder
//!
//! Turns a result set and a chart description into a Plotly-compatible
//! figure (`data` traces plus `layout`) styled with the dashboard theme.
//! Building is pure: a figure that cannot be drawn yields `None`, never an
//! error.
//!
//! Key Features:
//! - Bar, pie, line, histogram, box, scatter and time series charts
//! - Correlation heatmaps over numeric columns
//! - Gauge indicators for a column mean
//! - Treemap and sunburst hierarchies aggregated from path columns
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::dataset::value_counts;
use crate::stats::correlation_matrix;
use crate::theme;
use quarry_common::{ColumnKind, ResultSet, Value};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::{BTreeMap, HashMap};

const DEFAULT_BINS: usize = 30;

// =============================================================================
// Chart Types
// =============================================================================

/// Kind of chart to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Pie,
    Line,
    Histogram,
    Box,
    Heatmap,
    Scatter,
    TimeSeries,
    Gauge,
    Treemap,
    Sunburst,
}

/// What to draw and from which columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x: Option<String>,
    pub y: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub path: Vec<String>,
    pub values: Option<String>,
    pub bins: Option<usize>,
    pub horizontal: bool,
}

impl Default for ChartSpec {
    fn default() -> Self {
        Self {
            kind: ChartKind::Bar,
            title: String::new(),
            x: None,
            y: None,
            color: None,
            size: None,
            path: Vec::new(),
            values: None,
            bins: None,
            horizontal: false,
        }
    }
}

impl ChartSpec {
    pub fn new(kind: ChartKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn x(mut self, column: impl Into<String>) -> Self {
        self.x = Some(column.into());
        self
    }

    pub fn y(mut self, column: impl Into<String>) -> Self {
        self.y = Some(column.into());
        self
    }

    pub fn color(mut self, column: impl Into<String>) -> Self {
        self.color = Some(column.into());
        self
    }

    pub fn values(mut self, column: impl Into<String>) -> Self {
        self.values = Some(column.into());
        self
    }

    pub fn path<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn bins(mut self, bins: usize) -> Self {
        self.bins = Some(bins);
        self
    }

    pub fn horizontal(mut self) -> Self {
        self.horizontal = true;
        self
    }

    fn referenced_columns(&self) -> impl Iterator<Item = &String> {
        self.x
            .iter()
            .chain(self.y.iter())
            .chain(self.color.iter())
            .chain(self.size.iter())
            .chain(self.values.iter())
            .chain(self.path.iter())
    }
}

/// A Plotly figure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub data: Vec<Json>,
    pub layout: Json,
}

impl Figure {
    fn new(title: &str, data: Vec<Json>) -> Self {
        Self {
            data,
            layout: theme::base_layout(title),
        }
    }

    fn axis_titles(mut self, x: Option<&str>, y: Option<&str>) -> Self {
        if let Some(x) = x {
            self.layout["xaxis"]["title"] = json!({ "text": x });
        }
        if let Some(y) = y {
            self.layout["yaxis"]["title"] = json!({ "text": y });
        }
        self
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Build a figure. Returns `None` for empty input, missing columns, or data
/// the chart kind cannot show.
pub fn build(rs: &ResultSet, spec: &ChartSpec) -> Option<Figure> {
    if rs.is_empty() {
        return None;
    }
    if spec.referenced_columns().any(|c| rs.column_index(c).is_none()) {
        return None;
    }

    match spec.kind {
        ChartKind::Bar => bar(rs, spec),
        ChartKind::Pie => pie(rs, spec),
        ChartKind::Line => line(rs, spec, false),
        ChartKind::TimeSeries => line(rs, spec, true),
        ChartKind::Histogram => histogram(rs, spec),
        ChartKind::Box => box_plot(rs, spec),
        ChartKind::Heatmap => heatmap(rs, spec),
        ChartKind::Scatter => scatter(rs, spec),
        ChartKind::Gauge => gauge(rs, spec),
        ChartKind::Treemap => hierarchy(rs, spec, "treemap"),
        ChartKind::Sunburst => hierarchy(rs, spec, "sunburst"),
    }
}

/// Bar chart directly from label/value pairs.
pub fn bar_from_pairs(title: &str, pairs: &[(String, f64)], horizontal: bool) -> Option<Figure> {
    if pairs.is_empty() {
        return None;
    }
    let labels: Vec<&str> = pairs.iter().map(|(l, _)| l.as_str()).collect();
    let values: Vec<f64> = pairs.iter().map(|(_, v)| *v).collect();
    let trace = if horizontal {
        json!({"type": "bar", "x": values, "y": labels, "orientation": "h",
               "marker": {"color": theme::NAVY}})
    } else {
        json!({"type": "bar", "x": labels, "y": values, "marker": {"color": theme::NAVY}})
    };
    let mut figure = Figure::new(title, vec![trace]);
    if horizontal {
        figure.layout["yaxis"]["autorange"] = json!("reversed");
    }
    Some(figure)
}

/// Pie chart directly from label/value pairs.
pub fn pie_from_pairs(title: &str, pairs: &[(String, f64)]) -> Option<Figure> {
    if pairs.is_empty() {
        return None;
    }
    let labels: Vec<&str> = pairs.iter().map(|(l, _)| l.as_str()).collect();
    let values: Vec<f64> = pairs.iter().map(|(_, v)| *v).collect();
    Some(Figure::new(
        title,
        vec![json!({
            "type": "pie",
            "labels": labels,
            "values": values,
            "marker": {"colors": theme::PALETTE},
            "textinfo": "percent+label"
        })],
    ))
}

/// Line chart of dated values.
pub fn line_from_points(title: &str, x_title: &str, y_title: &str, points: &[(String, f64)]) -> Option<Figure> {
    if points.is_empty() {
        return None;
    }
    let xs: Vec<&str> = points.iter().map(|(x, _)| x.as_str()).collect();
    let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
    Some(
        Figure::new(
            title,
            vec![json!({
                "type": "scatter",
                "mode": "lines+markers",
                "x": xs,
                "y": ys,
                "line": {"color": theme::NAVY, "width": 3},
                "marker": {"color": theme::RED, "size": 8}
            })],
        )
        .axis_titles(Some(x_title), Some(y_title)),
    )
}

// =============================================================================
// Chart Kinds
// =============================================================================

fn to_json(value: &Value) -> Json {
    serde_json::to_value(value).unwrap_or(Json::Null)
}

fn column_json(rs: &ResultSet, idx: usize, rows: &[usize]) -> Vec<Json> {
    rows.iter().map(|&r| to_json(&rs.rows[r][idx])).collect()
}

/// Row indices grouped by the display value of a column, in first-seen order.
fn groups(rs: &ResultSet, column: Option<&String>) -> Vec<(Option<String>, Vec<usize>)> {
    let Some(idx) = column.and_then(|c| rs.column_index(c)) else {
        return vec![(None, (0..rs.len()).collect())];
    };
    let mut order: Vec<(Option<String>, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (r, row) in rs.rows.iter().enumerate() {
        let key = row[idx].to_display();
        let pos = *positions.entry(key.clone()).or_insert_with(|| {
            order.push((Some(key), Vec::new()));
            order.len() - 1
        });
        order[pos].1.push(r);
    }
    order
}

fn bar(rs: &ResultSet, spec: &ChartSpec) -> Option<Figure> {
    let x = spec.x.as_ref()?;
    let Some(y) = spec.y.as_ref() else {
        let counts: Vec<(String, f64)> = value_counts(rs, x)?
            .into_iter()
            .map(|(label, n)| (label, n as f64))
            .collect();
        return bar_from_pairs(&spec.title, &counts, spec.horizontal)
            .map(|f| f.axis_titles(Some(x), Some("count")));
    };

    let xi = rs.column_index(x)?;
    let yi = rs.column_index(y)?;
    let traces = groups(rs, spec.color.as_ref())
        .into_iter()
        .enumerate()
        .map(|(i, (name, rows))| {
            let (xs, ys) = (column_json(rs, xi, &rows), column_json(rs, yi, &rows));
            let mut trace = if spec.horizontal {
                json!({"type": "bar", "x": ys, "y": xs, "orientation": "h"})
            } else {
                json!({"type": "bar", "x": xs, "y": ys})
            };
            trace["marker"] = json!({"color": theme::color(i + 1)});
            if let Some(name) = name {
                trace["name"] = json!(name);
            }
            trace
        })
        .collect();
    Some(Figure::new(&spec.title, traces).axis_titles(Some(x), Some(y)))
}

fn pie(rs: &ResultSet, spec: &ChartSpec) -> Option<Figure> {
    let names = spec.x.as_ref()?;
    let pairs: Vec<(String, f64)> = match spec.values.as_ref().or(spec.y.as_ref()) {
        Some(values) => {
            let ni = rs.column_index(names)?;
            let vi = rs.column_index(values)?;
            rs.rows
                .iter()
                .filter_map(|row| Some((row[ni].to_display(), row[vi].as_f64()?)))
                .collect()
        }
        None => value_counts(rs, names)?
            .into_iter()
            .map(|(label, n)| (label, n as f64))
            .collect(),
    };
    pie_from_pairs(&spec.title, &pairs)
}

fn line(rs: &ResultSet, spec: &ChartSpec, temporal: bool) -> Option<Figure> {
    let x = spec.x.as_ref()?;
    let y = spec.y.as_ref()?;
    let xi = rs.column_index(x)?;
    let yi = rs.column_index(y)?;
    if temporal && rs.columns[xi].kind != ColumnKind::Temporal {
        return None;
    }

    let traces = groups(rs, spec.color.as_ref())
        .into_iter()
        .enumerate()
        .map(|(i, (name, mut rows))| {
            if temporal {
                rows.retain(|&r| rs.rows[r][xi].as_timestamp().is_some());
                rows.sort_by_key(|&r| rs.rows[r][xi].as_timestamp());
            }
            let mut trace = json!({
                "type": "scatter",
                "mode": if temporal { "lines" } else { "lines+markers" },
                "x": column_json(rs, xi, &rows),
                "y": column_json(rs, yi, &rows),
                "line": {"color": theme::color(i + 1), "width": 2}
            });
            if let Some(name) = name {
                trace["name"] = json!(name);
            }
            trace
        })
        .collect();

    let mut figure = Figure::new(&spec.title, traces).axis_titles(Some(x), Some(y));
    if temporal {
        figure.layout["xaxis"]["type"] = json!("date");
    }
    Some(figure)
}

fn histogram(rs: &ResultSet, spec: &ChartSpec) -> Option<Figure> {
    let x = spec.x.as_ref()?;
    let values = rs.numeric_values(x)?;
    if values.is_empty() {
        return None;
    }
    Some(
        Figure::new(
            &spec.title,
            vec![json!({
                "type": "histogram",
                "x": values,
                "nbinsx": spec.bins.unwrap_or(DEFAULT_BINS),
                "marker": {"color": theme::NAVY, "line": {"color": theme::WHITE, "width": 1}}
            })],
        )
        .axis_titles(Some(x), Some("count")),
    )
}

fn box_plot(rs: &ResultSet, spec: &ChartSpec) -> Option<Figure> {
    let y = spec.y.as_ref().or(spec.x.as_ref())?;
    let yi = rs.column_index(y)?;
    if rs.columns[yi].kind != ColumnKind::Numeric {
        return None;
    }
    let group_by = if spec.y.is_some() { spec.x.as_ref() } else { None };

    let traces = groups(rs, group_by)
        .into_iter()
        .enumerate()
        .map(|(i, (name, rows))| {
            let ys: Vec<f64> = rows.iter().filter_map(|&r| rs.rows[r][yi].as_f64()).collect();
            let mut trace = json!({
                "type": "box",
                "y": ys,
                "boxpoints": "outliers",
                "marker": {"color": theme::color(i)},
                "line": {"color": theme::NAVY}
            });
            trace["name"] = json!(name.unwrap_or_else(|| y.clone()));
            trace
        })
        .collect();
    Some(Figure::new(&spec.title, traces).axis_titles(None, Some(y)))
}

fn heatmap(rs: &ResultSet, spec: &ChartSpec) -> Option<Figure> {
    let matrix = correlation_matrix(rs)?;
    let z: Vec<Vec<Option<f64>>> = matrix
        .values
        .iter()
        .map(|row| row.iter().map(|v| v.map(|r| (r * 100.0).round() / 100.0)).collect())
        .collect();
    let mut figure = Figure::new(
        &spec.title,
        vec![json!({
            "type": "heatmap",
            "x": matrix.columns,
            "y": matrix.columns,
            "z": z,
            "text": z,
            "texttemplate": "%{text}",
            "colorscale": theme::diverging_scale(),
            "zmin": -1.0,
            "zmax": 1.0
        })],
    );
    figure.layout["yaxis"]["autorange"] = json!("reversed");
    Some(figure)
}

fn scatter(rs: &ResultSet, spec: &ChartSpec) -> Option<Figure> {
    let x = spec.x.as_ref()?;
    let y = spec.y.as_ref()?;
    let xi = rs.column_index(x)?;
    let yi = rs.column_index(y)?;
    let size_idx = spec.size.as_ref().and_then(|s| rs.column_index(s));
    let max_size = size_idx
        .and_then(|si| rs.rows.iter().filter_map(|row| row[si].as_f64()).reduce(f64::max))
        .filter(|m| *m > 0.0);

    let traces = groups(rs, spec.color.as_ref())
        .into_iter()
        .enumerate()
        .map(|(i, (name, rows))| {
            let mut marker = json!({"color": theme::color(i), "opacity": 0.7});
            if let (Some(si), Some(max)) = (size_idx, max_size) {
                let sizes: Vec<f64> = rows
                    .iter()
                    .map(|&r| 6.0 + 24.0 * rs.rows[r][si].as_f64().unwrap_or(0.0).max(0.0) / max)
                    .collect();
                marker["size"] = json!(sizes);
            }
            let mut trace = json!({
                "type": "scatter",
                "mode": "markers",
                "x": column_json(rs, xi, &rows),
                "y": column_json(rs, yi, &rows),
                "marker": marker
            });
            if let Some(name) = name {
                trace["name"] = json!(name);
            }
            trace
        })
        .collect();
    Some(Figure::new(&spec.title, traces).axis_titles(Some(x), Some(y)))
}

fn gauge(rs: &ResultSet, spec: &ChartSpec) -> Option<Figure> {
    let column = spec.values.as_ref().or(spec.y.as_ref()).or(spec.x.as_ref())?;
    let values = rs.numeric_values(column)?;
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(Figure::new(
        &spec.title,
        vec![json!({
            "type": "indicator",
            "mode": "gauge+number",
            "value": mean,
            "title": {"text": column},
            "gauge": {
                "axis": {"range": [0.0, max.max(mean)]},
                "bar": {"color": theme::NAVY},
                "bgcolor": theme::ASH,
                "bordercolor": theme::MEDIUM_ASH
            }
        })],
    ))
}

fn hierarchy(rs: &ResultSet, spec: &ChartSpec, trace_type: &str) -> Option<Figure> {
    if spec.path.is_empty() {
        return None;
    }
    let path: Vec<usize> = spec
        .path
        .iter()
        .map(|c| rs.column_index(c))
        .collect::<Option<_>>()?;
    let value_idx = match &spec.values {
        Some(v) => Some(rs.column_index(v)?),
        None => None,
    };

    // id -> (label, parent, total)
    let mut nodes: BTreeMap<String, (String, String, f64)> = BTreeMap::new();
    for row in &rs.rows {
        if path.iter().any(|&i| row[i].is_null()) {
            continue;
        }
        let weight = match value_idx {
            Some(vi) => match row[vi].as_f64() {
                Some(w) => w,
                None => continue,
            },
            None => 1.0,
        };
        let mut parent = String::new();
        for &i in &path {
            let label = row[i].to_display();
            let id = if parent.is_empty() {
                label.clone()
            } else {
                format!("{parent}/{label}")
            };
            let node = nodes
                .entry(id.clone())
                .or_insert_with(|| (label, parent.clone(), 0.0));
            node.2 += weight;
            parent = id;
        }
    }
    if nodes.is_empty() {
        return None;
    }

    let ids: Vec<&String> = nodes.keys().collect();
    let labels: Vec<&String> = nodes.values().map(|n| &n.0).collect();
    let parents: Vec<&String> = nodes.values().map(|n| &n.1).collect();
    let values: Vec<f64> = nodes.values().map(|n| n.2).collect();
    let mut figure = Figure::new(
        &spec.title,
        vec![json!({
            "type": trace_type,
            "ids": ids,
            "labels": labels,
            "parents": parents,
            "values": values,
            "branchvalues": "total",
            "marker": {"colorscale": theme::sequential_scale()}
        })],
    );
    figure.layout["colorway"] = json!(theme::PALETTE);
    Some(figure)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use quarry_common::Column;

    fn sales() -> ResultSet {
        let day = |d| Value::Date(NaiveDate::from_ymd_opt(2024, 2, d).unwrap());
        ResultSet::new(
            vec![
                Column::new("region", "text"),
                Column::new("product", "text"),
                Column::new("units", "int4"),
                Column::new("revenue", "float8"),
                Column::new("sold_on", "date"),
            ],
            vec![
                vec!["east".into(), "a".into(), Value::Int(3), Value::Float(30.0), day(3)],
                vec!["east".into(), "b".into(), Value::Int(1), Value::Float(15.0), day(1)],
                vec!["west".into(), "a".into(), Value::Int(4), Value::Float(41.0), day(2)],
                vec!["west".into(), "c".into(), Value::Int(2), Value::Float(18.5), day(4)],
            ],
        )
    }

    #[test]
    fn test_missing_column_or_empty_input() {
        let spec = ChartSpec::new(ChartKind::Bar, "t").x("nope").y("units");
        assert!(build(&sales(), &spec).is_none());
        let spec = ChartSpec::new(ChartKind::Bar, "t").x("region").y("units");
        assert!(build(&ResultSet::empty(), &spec).is_none());
        assert!(build(&sales(), &spec).is_some());
    }

    #[test]
    fn test_bar_counts_without_y() {
        let fig = build(&sales(), &ChartSpec::new(ChartKind::Bar, "Regions").x("region")).unwrap();
        assert_eq!(fig.data[0]["x"], json!(["east", "west"]));
        assert_eq!(fig.data[0]["y"], json!([2.0, 2.0]));
        assert_eq!(fig.layout["title"]["text"], "Regions");
    }

    #[test]
    fn test_heatmap_requires_two_numeric_columns() {
        let spec = ChartSpec::new(ChartKind::Heatmap, "Correlation");
        let fig = build(&sales(), &spec).unwrap();
        assert_eq!(fig.data[0]["x"], json!(["units", "revenue"]));

        let one = ResultSet::new(
            vec![Column::new("units", "int4")],
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        );
        assert!(build(&one, &spec).is_none());
    }

    #[test]
    fn test_time_series_requires_temporal_x() {
        let spec = ChartSpec::new(ChartKind::TimeSeries, "Units").x("sold_on").y("units");
        let fig = build(&sales(), &spec).unwrap();
        assert_eq!(fig.data[0]["y"], json!([1, 4, 3, 2]));

        let spec = ChartSpec::new(ChartKind::TimeSeries, "Units").x("region").y("units");
        assert!(build(&sales(), &spec).is_none());
    }

    #[test]
    fn test_sunburst_hierarchy() {
        let spec = ChartSpec::new(ChartKind::Sunburst, "Revenue")
            .path(["region", "product"])
            .values("revenue");
        let fig = build(&sales(), &spec).unwrap();
        let trace = &fig.data[0];
        assert_eq!(trace["type"], "sunburst");
        assert_eq!(trace["ids"], json!(["east", "east/a", "east/b", "west", "west/a", "west/c"]));
        assert_eq!(trace["parents"][1], "east");
        assert_eq!(trace["values"][0], 45.0);
    }

    #[test]
    fn test_gauge_and_histogram() {
        let gauge = build(&sales(), &ChartSpec::new(ChartKind::Gauge, "Units").values("units")).unwrap();
        assert_eq!(gauge.data[0]["value"], 2.5);
        assert_eq!(gauge.data[0]["gauge"]["axis"]["range"][1], 4.0);

        let hist = build(&sales(), &ChartSpec::new(ChartKind::Histogram, "Rev").x("revenue").bins(5)).unwrap();
        assert_eq!(hist.data[0]["nbinsx"], 5);
        assert!(build(&sales(), &ChartSpec::new(ChartKind::Histogram, "R").x("region")).is_none());
    }

    #[test]
    fn test_pie_and_scatter_groups() {
        let pie = build(&sales(), &ChartSpec::new(ChartKind::Pie, "Mix").x("product").values("units")).unwrap();
        assert_eq!(pie.data[0]["labels"], json!(["a", "b", "a", "c"]));

        let scatter = build(
            &sales(),
            &ChartSpec::new(ChartKind::Scatter, "Units vs revenue").x("units").y("revenue").color("region"),
        )
        .unwrap();
        assert_eq!(scatter.data.len(), 2);
        assert_eq!(scatter.data[1]["name"], "west");
    }

    #[test]
    fn test_spec_deserialization() {
        let spec: ChartSpec =
            serde_json::from_str(r#"{"kind":"box","title":"Spread","y":"revenue","x":"region"}"#).unwrap();
        let fig = build(&sales(), &spec).unwrap();
        assert_eq!(fig.data.len(), 2);
    }
}
