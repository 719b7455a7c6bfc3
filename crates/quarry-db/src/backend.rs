//! Quarry Backend - Database Backend Abstraction
//!
//! Defines the backend trait the data service talks to. The PostgreSQL
//! backend is used in production; the in-memory backend serves tests and
//! local development.
//!
//! Identifiers passed to a backend have already been checked against the
//! table allow-list; backends still quote them.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use async_trait::async_trait;
use quarry_common::{ColumnDescriptor, IndexDescriptor, Result, ResultSet};

// =============================================================================
// Database Backend Trait
// =============================================================================

/// Pluggable database backend interface.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Table and view names in a schema, ordered by name.
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Columns of a table ordered by ordinal position, with primary keys flagged.
    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Number of columns across every table and view of a schema.
    async fn count_columns(&self, schema: &str) -> Result<u64>;

    /// `COUNT(*)` of a table.
    async fn count_rows(&self, schema: &str, table: &str) -> Result<u64>;

    /// At most `limit` rows of a table.
    async fn fetch_rows(&self, schema: &str, table: &str, limit: usize) -> Result<ResultSet>;

    /// Pretty-printed on-disk size of a table.
    async fn table_size(&self, schema: &str, table: &str) -> Result<String>;

    /// Indexes defined on a table.
    async fn list_indexes(&self, schema: &str, table: &str) -> Result<Vec<IndexDescriptor>>;

    /// Pretty-printed size of the current database.
    async fn database_size(&self) -> Result<String>;

    /// Run a SELECT inside a read-only transaction that is rolled back.
    async fn query(&self, sql: &str) -> Result<ResultSet>;

    /// Run a statement in autocommit mode and return the affected row count.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;
}
