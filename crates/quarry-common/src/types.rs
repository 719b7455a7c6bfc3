//! Quarry Types - Core Data Types
//!
//! Fundamental data types used throughout the dashboard. Provides the value
//! representation returned by the database layer, the tabular result set
//! that analytics and exports operate on, and the catalog descriptors used
//! by the overview and table browser pages.
//!
//! Key Features:
//! - Scalar, temporal and JSON value representation
//! - Column kind inference (numeric, boolean, temporal, text)
//! - Ordered result sets with record-style views
//! - Fail-soft `Outcome` wrapper for degraded widgets
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

// =============================================================================
// Value Types
// =============================================================================

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
}

impl Value {
    /// Check if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value. Null and non-numeric values yield `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Timestamp view of the value; dates are taken at midnight.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            Self::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// Calendar date of a temporal value.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Timestamp(ts) => Some(ts.date()),
            _ => None,
        }
    }

    /// Plain-text rendering used for CSV cells and category labels.
    /// Null renders as the empty string.
    pub fn to_display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Self::Json(v) => v.to_string(),
        }
    }

    /// Bytes a cell takes: the enum itself plus any heap text.
    fn footprint(&self) -> usize {
        let heap = match self {
            Self::Text(s) => s.len(),
            Self::Json(j) => j.to_string().len(),
            _ => 0,
        };
        std::mem::size_of::<Value>() + heap
    }

    /// Kind this value would give a column on its own.
    fn kind(&self) -> Option<ColumnKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ColumnKind::Boolean),
            Self::Int(_) | Self::Float(_) => Some(ColumnKind::Numeric),
            Self::Date(_) | Self::Timestamp(_) => Some(ColumnKind::Temporal),
            Self::Text(_) | Self::Json(_) => Some(ColumnKind::Text),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(_) => serializer.serialize_none(),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            Self::Timestamp(ts) => {
                serializer.serialize_str(&ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Self::Json(v) => v.serialize(serializer),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Column Types
// =============================================================================

/// Broad classification of a column used to pick charts and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Boolean,
    Temporal,
    Text,
}

impl ColumnKind {
    /// Classify a database type name. Returns `None` for types whose kind
    /// has to be inferred from the values.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        let name = type_name.to_ascii_lowercase();
        match name.as_str() {
            "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "float4"
            | "float8" | "real" | "double precision" | "numeric" | "decimal" | "oid" => {
                Some(Self::Numeric)
            }
            "bool" | "boolean" => Some(Self::Boolean),
            "date" | "timestamp" | "timestamptz" | "timestamp without time zone"
            | "timestamp with time zone" => Some(Self::Temporal),
            "text" | "varchar" | "bpchar" | "char" | "name" | "character varying"
            | "character" | "uuid" | "json" | "jsonb" | "citext" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Metadata about a result column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    pub kind: ColumnKind,
}

impl Column {
    /// Create a column whose kind is derived from the type name, defaulting
    /// to text until values are seen.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let kind = ColumnKind::from_type_name(&type_name).unwrap_or(ColumnKind::Text);
        Self {
            name: name.into(),
            type_name,
            kind,
        }
    }
}

// =============================================================================
// Result Set
// =============================================================================

/// An ordered tabular result. Every row holds one value per column.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Build a result set, refining the kind of columns whose type name gave
    /// no classification by looking at the values.
    pub fn new(mut columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        for (idx, column) in columns.iter_mut().enumerate() {
            if ColumnKind::from_type_name(&column.type_name).is_some() {
                continue;
            }
            column.kind = infer_kind(rows.iter().filter_map(|r| r.get(idx)));
        }
        Self { columns, rows }
    }

    /// Create an empty result set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column metadata by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Non-null numeric values of one column.
    pub fn numeric_values(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row[idx].as_f64()).collect())
    }

    /// Names of columns of the given kind, in order.
    pub fn columns_of_kind(&self, kind: ColumnKind) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Keep only the rows matching the predicate.
    pub fn filter_rows<F>(&self, mut predicate: F) -> ResultSet
    where
        F: FnMut(&[Value]) -> bool,
    {
        ResultSet {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| predicate(row))
                .cloned()
                .collect(),
        }
    }

    /// Rows as JSON objects keyed by column name.
    pub fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(col, value)| {
                        let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                        (col.name.clone(), json)
                    })
                    .collect()
            })
            .collect()
    }

    /// Approximate in-memory footprint in bytes, shown as the "Memory" tile.
    pub fn approximate_size(&self) -> usize {
        self.column_sizes().into_iter().sum()
    }

    /// Approximate footprint of each column: its name plus every cell.
    pub fn column_sizes(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let cells: usize = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(idx))
                    .map(Value::footprint)
                    .sum();
                col.name.len() + cells
            })
            .collect()
    }

    /// The named columns, in the order given. Unknown names are skipped.
    pub fn project(&self, names: &[String]) -> ResultSet {
        let indexes: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        ResultSet {
            columns: indexes.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }
}

/// Infer a column kind from its values. Mixed or all-null columns are text.
fn infer_kind<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnKind {
    let mut kind = None;
    for value in values {
        match (kind, value.kind()) {
            (_, None) => {}
            (None, Some(k)) => kind = Some(k),
            (Some(a), Some(b)) if a == b => {}
            _ => return ColumnKind::Text,
        }
    }
    kind.unwrap_or(ColumnKind::Text)
}

// =============================================================================
// Catalog Descriptors
// =============================================================================

/// One column of a table as described by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub position: i32,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_primary_key: bool,
}

/// One index of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub definition: String,
}

/// Catalog-derived description of a table.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub row_count: u64,
    pub column_count: usize,
    pub size: String,
    pub columns: Vec<ColumnDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    /// Names of primary key columns.
    pub fn primary_keys(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Database-wide summary statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DatabaseStats {
    pub table_count: u64,
    pub total_columns: u64,
    pub db_size: String,
    pub total_records: u64,
}

// =============================================================================
// Outcome
// =============================================================================

/// A value paired with the error that forced it to a fallback, if any.
///
/// Read operations never fail a page: on error they return an empty or zero
/// value and carry the message so the widget can show it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self { data, error: None }
    }

    pub fn degraded(data: T, error: impl ToString) -> Self {
        Self {
            data,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// =============================================================================
// Tests
// =============================================================================
