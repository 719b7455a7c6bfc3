//! Quarry Service - Memoized Data Access
//!
//! The data service every page talks to. Read operations are memoized per
//! (operation, arguments) for a fixed TTL and fail soft: on error they log a
//! warning and return an empty or zero value together with the message.
//! Custom queries are never cached and report errors directly.
//!
//! Key Features:
//! - Table allow-list check before any identifier reaches SQL
//! - Separate TTLs for catalog metadata and table data
//! - Read-only mode gating non-SELECT statements
//! - Whole-database statistics with per-table row counting
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::backend::DatabaseBackend;
use crate::cache::{CacheKey, CacheStats, TtlCache};
use crate::identifier::{ensure_known_table, ensure_schema};
use quarry_common::config::DashboardConfig;
use quarry_common::{
    ColumnDescriptor, DatabaseStats, Outcome, QuarryError, Result, ResultSet, TableDescriptor,
};
use std::sync::Arc;
use std::time::Duration;

/// Smallest row limit offered by the table loaders.
pub const MIN_ROW_LIMIT: usize = 100;
/// Default number of sample rows.
pub const DEFAULT_ROW_LIMIT: usize = 1000;
/// Largest number of rows a single table read returns.
pub const MAX_ROW_LIMIT: usize = 50_000;

// =============================================================================
// Query Outcome
// =============================================================================

/// Result of a custom query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(ResultSet),
    Affected(u64),
}

/// True when the statement is treated as a read query.
pub fn is_select(sql: &str) -> bool {
    sql.trim_start().to_uppercase().starts_with("SELECT")
}

// =============================================================================
// Data Service
// =============================================================================

/// Memoized, fail-soft access to the configured database schema.
pub struct DataService {
    backend: Arc<dyn DatabaseBackend>,
    cache: TtlCache,
    schema: String,
    read_only: bool,
    metadata_ttl: Duration,
    data_ttl: Duration,
}

impl DataService {
    pub fn new(
        backend: Arc<dyn DatabaseBackend>,
        schema: impl Into<String>,
        config: &DashboardConfig,
    ) -> Self {
        Self {
            backend,
            cache: TtlCache::new(),
            schema: schema.into(),
            read_only: config.read_only,
            metadata_ttl: config.metadata_ttl(),
            data_ttl: config.data_ttl(),
        }
    }

    /// The configured schema.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every memoized result. Returns the number of entries dropped.
    pub fn refresh(&self) -> usize {
        let dropped = self.cache.invalidate_all();
        tracing::info!("Cache refreshed, {} entries dropped", dropped);
        dropped
    }

    // -------------------------------------------------------------------------
    // Allow-list
    // -------------------------------------------------------------------------

    async fn cached_tables(&self, schema: &str) -> Result<Vec<String>> {
        ensure_schema(schema, &self.schema)?;
        self.cache
            .get_or_try_insert(
                CacheKey::new("list_tables", [schema]),
                self.metadata_ttl,
                || self.backend.list_tables(schema),
            )
            .await
    }

    /// Check schema and table against the catalog allow-list.
    pub async fn check_table(&self, table: &str, schema: &str) -> Result<()> {
        let tables = self.cached_tables(schema).await?;
        ensure_known_table(table, &tables)
    }

    // -------------------------------------------------------------------------
    // Read Operations
    // -------------------------------------------------------------------------

    /// Table names of a schema, ordered by name.
    pub async fn list_tables(&self, schema: &str) -> Outcome<Vec<String>> {
        degrade("list_tables", self.cached_tables(schema).await)
    }

    /// Column descriptors of a table, ordered by position.
    pub async fn list_columns(&self, table: &str, schema: &str) -> Outcome<Vec<ColumnDescriptor>> {
        let result = async {
            self.check_table(table, schema).await?;
            self.cache
                .get_or_try_insert(
                    CacheKey::new("list_columns", [schema, table]),
                    self.metadata_ttl,
                    || self.backend.list_columns(schema, table),
                )
                .await
        }
        .await;
        degrade("list_columns", result)
    }

    /// Row count of a table; 0 on error.
    pub async fn get_table_count(&self, table: &str, schema: &str) -> Outcome<u64> {
        let result = async {
            self.check_table(table, schema).await?;
            self.cached_count(table, schema).await
        }
        .await;
        degrade("get_table_count", result)
    }

    /// Row counts are shared by the count, metadata and stats readers.
    async fn cached_count(&self, table: &str, schema: &str) -> Result<u64> {
        self.cache
            .get_or_try_insert(
                CacheKey::new("get_table_count", [schema, table]),
                self.data_ttl,
                || self.backend.count_rows(schema, table),
            )
            .await
    }

    /// At most `limit` rows of a table; empty on error. Limits above the
    /// maximum are clamped.
    pub async fn get_table_data(&self, table: &str, limit: usize, schema: &str) -> Outcome<ResultSet> {
        let limit = limit.min(MAX_ROW_LIMIT);
        let result = async {
            self.check_table(table, schema).await?;
            let limit_arg = limit.to_string();
            self.cache
                .get_or_try_insert(
                    CacheKey::new("get_table_data", [schema, table, limit_arg.as_str()]),
                    self.data_ttl,
                    || self.backend.fetch_rows(schema, table, limit),
                )
                .await
        }
        .await;
        degrade("get_table_data", result)
    }

    /// Size, row count, columns and indexes of a table.
    pub async fn get_table_metadata(&self, table: &str, schema: &str) -> Outcome<TableDescriptor> {
        let result = async {
            self.check_table(table, schema).await?;
            self.cache
                .get_or_try_insert(
                    CacheKey::new("get_table_metadata", [schema, table]),
                    self.metadata_ttl,
                    || self.describe_table(table, schema),
                )
                .await
        }
        .await;
        degrade("get_table_metadata", result)
    }

    async fn describe_table(&self, table: &str, schema: &str) -> Result<TableDescriptor> {
        let size = self.backend.table_size(schema, table).await?;
        let row_count = self.cached_count(table, schema).await?;
        let columns = self.backend.list_columns(schema, table).await?;
        let indexes = self.backend.list_indexes(schema, table).await?;
        Ok(TableDescriptor {
            name: table.to_string(),
            row_count,
            column_count: columns.len(),
            size,
            columns,
            indexes,
        })
    }

    /// Database-wide statistics for the configured schema.
    pub async fn get_table_stats(&self) -> Outcome<DatabaseStats> {
        let schema = self.schema.as_str();
        let result = self
            .cache
            .get_or_try_insert(
                CacheKey::new("get_table_stats", [schema]),
                self.metadata_ttl,
                || self.compute_stats(schema),
            )
            .await;
        degrade("get_table_stats", result)
    }

    async fn compute_stats(&self, schema: &str) -> Result<DatabaseStats> {
        let tables = self.cached_tables(schema).await?;
        let total_columns = self.backend.count_columns(schema).await?;
        let db_size = self.backend.database_size().await?;

        let mut total_records = 0;
        for table in &tables {
            match self.cached_count(table, schema).await {
                Ok(count) => total_records += count,
                Err(e) => tracing::warn!("Skipping row count for '{}': {}", table, e),
            }
        }

        Ok(DatabaseStats {
            table_count: tables.len() as u64,
            total_columns,
            db_size,
            total_records,
        })
    }

    // -------------------------------------------------------------------------
    // Custom Queries
    // -------------------------------------------------------------------------

    /// Run user-supplied SQL. SELECT text runs read-only; anything else is
    /// executed as a statement unless read-only mode is on.
    pub async fn execute_query(&self, raw_sql: &str) -> Result<QueryOutcome> {
        let sql = raw_sql.trim();
        if sql.is_empty() {
            return Err(QuarryError::BadRequest("query is empty".to_string()));
        }

        if is_select(sql) {
            return self.backend.query(sql).await.map(QueryOutcome::Rows);
        }

        if self.read_only {
            tracing::warn!("Rejected non-SELECT statement in read-only mode");
            return Err(QuarryError::ReadOnly);
        }

        let affected = self.backend.execute(sql).await?;
        tracing::info!("Statement executed, {} rows affected", affected);
        Ok(QueryOutcome::Affected(affected))
    }
}

fn degrade<T: Default>(operation: &str, result: Result<T>) -> Outcome<T> {
    match result {
        Ok(value) => Outcome::ok(value),
        Err(e) => {
            tracing::warn!("{} degraded: {}", operation, e);
            Outcome::degraded(T::default(), e)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
