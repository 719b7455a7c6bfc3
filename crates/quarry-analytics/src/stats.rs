//! Quarry Stats - Descriptive Statistics
//!
//! Aggregation functions, quantiles, outlier detection, correlations and
//! daily trends over the columns of a loaded result set.
//!
//! Quantiles use linear interpolation between closest ranks, and standard
//! deviation uses one delta degree of freedom.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::NaiveDate;
use quarry_common::{ColumnKind, QuarryError, ResultSet, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

// =============================================================================
// Aggregate Function
// =============================================================================

/// Aggregation function type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Mean,
    Sum,
    Count,
    Max,
    Min,
    Median,
    Std,
}

impl AggregateFunction {
    /// Apply the aggregation to a set of values.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        Some(match self {
            Self::Sum => values.iter().sum(),
            Self::Count => values.len() as f64,
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Median => quantile(values, 0.5)?,
            Self::Std => {
                if values.len() < 2 {
                    return None;
                }
                let mean = Self::Mean.apply(values)?;
                let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
                (sum_sq / (values.len() - 1) as f64).sqrt()
            }
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Max => "max",
            Self::Min => "min",
            Self::Median => "median",
            Self::Std => "std",
        }
    }
}

impl FromStr for AggregateFunction {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" | "avg" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            "median" => Ok(Self::Median),
            "std" => Ok(Self::Std),
            other => Err(QuarryError::BadRequest(format!(
                "unknown aggregation: {other}"
            ))),
        }
    }
}

// =============================================================================
// Quantiles
// =============================================================================

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Linear-interpolated quantile, `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    quantile_sorted(&sorted(values), q)
}

// =============================================================================
// Describe
// =============================================================================

/// Summary statistics of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub q1: Option<f64>,
    #[serde(rename = "50%")]
    pub median: Option<f64>,
    #[serde(rename = "75%")]
    pub q3: Option<f64>,
    pub max: Option<f64>,
}

/// Summaries of every numeric column, in column order.
pub fn describe(rs: &ResultSet) -> Vec<ColumnSummary> {
    rs.columns_of_kind(ColumnKind::Numeric)
        .into_iter()
        .filter_map(|name| {
            let values = rs.numeric_values(&name)?;
            let sorted = sorted(&values);
            Some(ColumnSummary {
                count: sorted.len(),
                mean: AggregateFunction::Mean.apply(&sorted),
                std: AggregateFunction::Std.apply(&sorted),
                min: sorted.first().copied(),
                q1: quantile_sorted(&sorted, 0.25),
                median: quantile_sorted(&sorted, 0.5),
                q3: quantile_sorted(&sorted, 0.75),
                max: sorted.last().copied(),
                column: name,
            })
        })
        .collect()
}

// =============================================================================
// Outliers
// =============================================================================

/// IQR outlier bounds of a column and the rows outside them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierReport {
    pub column: String,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Indices into the result set of rows strictly outside the bounds.
    pub rows: Vec<usize>,
}

impl OutlierReport {
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// The flagged rows as their own result set.
    pub fn select(&self, rs: &ResultSet) -> ResultSet {
        ResultSet {
            columns: rs.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter_map(|&idx| rs.rows.get(idx).cloned())
                .collect(),
        }
    }
}

/// Flag values outside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`. Returns `None` when the
/// column is missing or has no numeric values.
pub fn detect_outliers(rs: &ResultSet, column: &str) -> Option<OutlierReport> {
    let idx = rs.column_index(column)?;
    let sorted = sorted(&rs.numeric_values(column)?);
    let q1 = quantile_sorted(&sorted, 0.25)?;
    let q3 = quantile_sorted(&sorted, 0.75)?;
    let iqr = q3 - q1;
    let lower_bound = q1 - 1.5 * iqr;
    let upper_bound = q3 + 1.5 * iqr;

    let rows = rs
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            row[idx]
                .as_f64()
                .map(|v| v < lower_bound || v > upper_bound)
                .unwrap_or(false)
        })
        .map(|(i, _)| i)
        .collect();

    Some(OutlierReport {
        column: column.to_string(),
        q1,
        q3,
        iqr,
        lower_bound,
        upper_bound,
        rows,
    })
}

// =============================================================================
// Correlation
// =============================================================================

/// Pearson correlation over pairwise-complete observations.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0))
}

const PERFECT_EPSILON: f64 = 1e-12;

/// Square correlation matrix of the numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

/// A pair of distinct columns and their correlation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationPair {
    pub first: String,
    pub second: String,
    pub correlation: f64,
}

/// Correlation matrix of all numeric columns. Needs at least two.
pub fn correlation_matrix(rs: &ResultSet) -> Option<CorrelationMatrix> {
    let columns = rs.columns_of_kind(ColumnKind::Numeric);
    if columns.len() < 2 {
        return None;
    }
    let indices: Vec<usize> = columns
        .iter()
        .filter_map(|c| rs.column_index(c))
        .collect();

    let values = indices
        .iter()
        .map(|&a| {
            indices
                .iter()
                .map(|&b| {
                    let pairs: Vec<(f64, f64)> = rs
                        .rows
                        .iter()
                        .filter_map(|row| Some((row[a].as_f64()?, row[b].as_f64()?)))
                        .collect();
                    pearson(&pairs)
                })
                .collect()
        })
        .collect();

    Some(CorrelationMatrix { columns, values })
}

impl CorrelationMatrix {
    /// Strongest `n` distinct-column pairs by absolute correlation, leaving
    /// out perfect correlations, rounded to three decimals.
    pub fn top_pairs(&self, n: usize) -> Vec<CorrelationPair> {
        let mut pairs = Vec::new();
        for i in 0..self.columns.len() {
            for j in (i + 1)..self.columns.len() {
                if let Some(r) = self.values[i][j] {
                    if r.abs() < 1.0 - PERFECT_EPSILON {
                        pairs.push(CorrelationPair {
                            first: self.columns[i].clone(),
                            second: self.columns[j].clone(),
                            correlation: r,
                        });
                    }
                }
            }
        }
        pairs.sort_by(|a, b| {
            b.correlation
                .abs()
                .partial_cmp(&a.correlation.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pairs.truncate(n);
        for pair in &mut pairs {
            pair.correlation = (pair.correlation * 1000.0).round() / 1000.0;
        }
        pairs
    }
}

// =============================================================================
// Daily Trend
// =============================================================================

/// One day of an aggregated trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Group rows by calendar day of `date_column` and aggregate `value_column`.
/// `Count` counts non-null values of any kind; other functions use numeric
/// values. Days with nothing to aggregate are left out.
pub fn daily_trend(
    rs: &ResultSet,
    date_column: &str,
    value_column: &str,
    function: AggregateFunction,
) -> Option<Vec<TrendPoint>> {
    let date_idx = rs.column_index(date_column)?;
    let value_idx = rs.column_index(value_column)?;
    if rs.columns[date_idx].kind != ColumnKind::Temporal {
        return None;
    }

    let mut buckets: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for row in &rs.rows {
        let Some(date) = row[date_idx].as_date() else {
            continue;
        };
        let value = match (&row[value_idx], function) {
            (Value::Null, _) => None,
            (_, AggregateFunction::Count) => Some(1.0),
            (v, _) => v.as_f64(),
        };
        if let Some(v) = value {
            buckets.entry(date).or_default().push(v);
        }
    }

    Some(
        buckets
            .into_iter()
            .filter_map(|(date, values)| {
                Some(TrendPoint {
                    date,
                    value: function.apply(&values)?,
                })
            })
            .collect(),
    )
}

/// Row count per calendar day of a temporal column.
pub fn daily_counts(rs: &ResultSet, date_column: &str) -> Option<Vec<TrendPoint>> {
    let idx = rs.column_index(date_column)?;
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in &rs.rows {
        if let Some(date) = row[idx].as_date() {
            *buckets.entry(date).or_default() += 1.0;
        }
    }
    Some(
        buckets
            .into_iter()
            .map(|(date, value)| TrendPoint { date, value })
            .collect(),
    )
}

// =============================================================================
// Tests
// =============================================================================
