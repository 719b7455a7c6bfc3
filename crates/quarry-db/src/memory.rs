//! Quarry Memory - In-Memory Backend
//!
//! A backend holding tables in memory, for testing and development. Ad-hoc
//! queries are answered from canned responses registered up front. Every
//! call counts as one round trip so callers can observe cache behaviour.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::backend::DatabaseBackend;
use async_trait::async_trait;
use parking_lot::RwLock;
use quarry_common::{
    ColumnDescriptor, IndexDescriptor, QuarryError, Result, ResultSet,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Memory Table
// =============================================================================

/// A table held by the memory backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub data: ResultSet,
    pub primary_keys: Vec<String>,
    pub indexes: Vec<IndexDescriptor>,
    pub size: String,
}

impl MemoryTable {
    pub fn new(data: ResultSet) -> Self {
        Self {
            data,
            size: "8192 bytes".to_string(),
            ..Default::default()
        }
    }

    /// A view: no keys, indexes or storage of its own.
    pub fn view(data: ResultSet) -> Self {
        Self {
            data,
            size: "0 bytes".to_string(),
            ..Default::default()
        }
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_keys.push(column.into());
        self
    }

    pub fn with_index(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.indexes.push(IndexDescriptor {
            name: name.into(),
            definition: definition.into(),
        });
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    fn descriptors(&self) -> Vec<ColumnDescriptor> {
        self.data
            .columns
            .iter()
            .enumerate()
            .map(|(idx, col)| ColumnDescriptor {
                position: idx as i32 + 1,
                name: col.name.clone(),
                data_type: col.type_name.clone(),
                nullable: !self.primary_keys.contains(&col.name),
                default: None,
                is_primary_key: self.primary_keys.contains(&col.name),
            })
            .collect()
    }
}

// =============================================================================
// Memory Backend
// =============================================================================

/// In-memory backend for testing and development.
pub struct MemoryBackend {
    schema: String,
    database_size: String,
    tables: RwLock<BTreeMap<String, MemoryTable>>,
    queries: RwLock<HashMap<String, Result<ResultSet>>>,
    statements: RwLock<HashMap<String, Result<u64>>>,
    outage: RwLock<Option<QuarryError>>,
    round_trips: AtomicU64,
    count_calls: AtomicU64,
}

impl MemoryBackend {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            database_size: "7453 kB".to_string(),
            tables: RwLock::new(BTreeMap::new()),
            queries: RwLock::new(HashMap::new()),
            statements: RwLock::new(HashMap::new()),
            outage: RwLock::new(None),
            round_trips: AtomicU64::new(0),
            count_calls: AtomicU64::new(0),
        }
    }

    /// Add or replace a table.
    pub fn insert_table(&self, name: impl Into<String>, table: MemoryTable) {
        self.tables.write().insert(name.into(), table);
    }

    /// Register the response to an ad-hoc SELECT.
    pub fn on_query(&self, sql: impl Into<String>, response: Result<ResultSet>) {
        self.queries.write().insert(normalize(&sql.into()), response);
    }

    /// Register the response to a statement.
    pub fn on_statement(&self, sql: impl Into<String>, response: Result<u64>) {
        self.statements.write().insert(normalize(&sql.into()), response);
    }

    /// Make every call fail with the given error until cleared.
    pub fn set_outage(&self, error: Option<QuarryError>) {
        *self.outage.write() = error;
    }

    /// Total calls made against this backend.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Calls to `count_rows` only.
    pub fn count_calls(&self) -> u64 {
        self.count_calls.load(Ordering::SeqCst)
    }

    fn begin_call(&self, schema: Option<&str>) -> Result<()> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.outage.read().clone() {
            return Err(err);
        }
        match schema {
            Some(s) if s != self.schema => Err(QuarryError::Query(format!(
                "schema \"{s}\" does not exist"
            ))),
            _ => Ok(()),
        }
    }

    fn with_table<T>(&self, table: &str, f: impl FnOnce(&MemoryTable) -> T) -> Result<T> {
        self.tables
            .read()
            .get(table)
            .map(f)
            .ok_or_else(|| QuarryError::Query(format!("relation \"{table}\" does not exist")))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("public")
    }
}

fn normalize(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim().to_string()
}

#[async_trait]
impl DatabaseBackend for MemoryBackend {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        self.begin_call(Some(schema))?;
        Ok(self.tables.read().keys().cloned().collect())
    }

    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnDescriptor>> {
        self.begin_call(Some(schema))?;
        self.with_table(table, MemoryTable::descriptors)
    }

    async fn count_columns(&self, schema: &str) -> Result<u64> {
        self.begin_call(Some(schema))?;
        Ok(self
            .tables
            .read()
            .values()
            .map(|t| t.data.columns.len() as u64)
            .sum())
    }

    async fn count_rows(&self, schema: &str, table: &str) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.begin_call(Some(schema))?;
        self.with_table(table, |t| t.data.len() as u64)
    }

    async fn fetch_rows(&self, schema: &str, table: &str, limit: usize) -> Result<ResultSet> {
        self.begin_call(Some(schema))?;
        self.with_table(table, |t| ResultSet {
            columns: t.data.columns.clone(),
            rows: t.data.rows.iter().take(limit).cloned().collect(),
        })
    }

    async fn table_size(&self, schema: &str, table: &str) -> Result<String> {
        self.begin_call(Some(schema))?;
        self.with_table(table, |t| t.size.clone())
    }

    async fn list_indexes(&self, schema: &str, table: &str) -> Result<Vec<IndexDescriptor>> {
        self.begin_call(Some(schema))?;
        self.with_table(table, |t| t.indexes.clone())
    }

    async fn database_size(&self) -> Result<String> {
        self.begin_call(None)?;
        Ok(self.database_size.clone())
    }

    async fn query(&self, sql: &str) -> Result<ResultSet> {
        self.begin_call(None)?;
        self.queries
            .read()
            .get(&normalize(sql))
            .cloned()
            .unwrap_or_else(|| Err(QuarryError::Query(format!("no canned response for: {sql}"))))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.begin_call(None)?;
        self.statements
            .read()
            .get(&normalize(sql))
            .cloned()
            .unwrap_or(Ok(0))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// Tests
// =============================================================================
