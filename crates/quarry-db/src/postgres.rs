//! Quarry Postgres - PostgreSQL Backend
//!
//! Backend implementation over `tokio-postgres`. Each call opens its own
//! connection, drives it on a spawned task, and drops it when the call
//! returns. There is no pooling.
//!
//! Key Features:
//! - Catalog introspection through `information_schema` and `pg_indexes`
//! - Schema and table names bound as text parameters in catalog predicates
//! - Ad-hoc SELECTs run in a `READ ONLY` transaction that is rolled back
//! - Driver error text surfaced verbatim
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::backend::DatabaseBackend;
use crate::decode::decode_text;
use crate::identifier::qualified_name;
use async_trait::async_trait;
use quarry_common::config::DatabaseConfig;
use quarry_common::{
    Column, ColumnDescriptor, IndexDescriptor, QuarryError, Result, ResultSet,
};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

// =============================================================================
// Catalog Queries
// =============================================================================

const LIST_TABLES_SQL: &str = "SELECT table_name::text \
     FROM information_schema.tables \
     WHERE table_schema = $1::text \
     ORDER BY table_name";

const LIST_COLUMNS_SQL: &str = "SELECT c.ordinal_position::int4, c.column_name::text, \
            c.data_type::text, c.is_nullable::text, c.column_default::text, \
            (pk.column_name IS NOT NULL) AS is_primary_key \
     FROM information_schema.columns c \
     LEFT JOIN ( \
         SELECT kcu.column_name \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name \
          AND tc.table_schema = kcu.table_schema \
          AND tc.table_name = kcu.table_name \
         WHERE tc.constraint_type = 'PRIMARY KEY' \
           AND tc.table_schema = $1::text \
           AND tc.table_name = $2::text \
     ) pk ON pk.column_name = c.column_name \
     WHERE c.table_schema = $1::text AND c.table_name = $2::text \
     ORDER BY c.ordinal_position";

const COUNT_COLUMNS_SQL: &str =
    "SELECT COUNT(*) FROM information_schema.columns WHERE table_schema = $1::text";

const TABLE_SIZE_SQL: &str = "SELECT pg_size_pretty(pg_relation_size($1::text::regclass))";

const LIST_INDEXES_SQL: &str = "SELECT indexname::text, indexdef::text \
     FROM pg_indexes \
     WHERE schemaname = $1::text AND tablename = $2::text \
     ORDER BY indexname";

const DATABASE_SIZE_SQL: &str = "SELECT pg_size_pretty(pg_database_size(current_database()))";

// =============================================================================
// PostgreSQL Backend
// =============================================================================

/// Connection-per-call PostgreSQL backend.
pub struct PostgresBackend {
    config: tokio_postgres::Config,
}

impl PostgresBackend {
    pub fn new(db: &DatabaseConfig) -> Self {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&db.host)
            .port(db.port)
            .user(&db.user)
            .dbname(&db.name)
            .application_name("quarry")
            .connect_timeout(db.connect_timeout());
        if !db.password.is_empty() {
            config.password(&db.password);
        }
        Self { config }
    }

    async fn connect(&self) -> Result<Client> {
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|e| QuarryError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(client)
    }
}

/// Map a driver error, keeping the server's message text when there is one.
fn query_error(err: tokio_postgres::Error) -> QuarryError {
    if let Some(db) = err.as_db_error() {
        return QuarryError::Query(db.message().to_string());
    }
    if err.is_closed() {
        return QuarryError::Connection(err.to_string());
    }
    QuarryError::Query(err.to_string())
}

/// Run a SELECT in a rolled-back read-only transaction and decode the rows.
async fn read_only_select(client: &mut Client, sql: &str) -> Result<ResultSet> {
    let tx = client
        .build_transaction()
        .read_only(true)
        .start()
        .await
        .map_err(query_error)?;

    let statement = tx.prepare(sql).await.map_err(query_error)?;
    let columns: Vec<Column> = statement
        .columns()
        .iter()
        .map(|c| Column::new(c.name(), c.type_().name()))
        .collect();

    let messages = tx.simple_query(sql).await.map_err(query_error)?;
    let mut rows = Vec::new();
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            let values = columns
                .iter()
                .enumerate()
                .map(|(idx, col)| decode_text(&col.type_name, row.try_get(idx).ok().flatten()))
                .collect();
            rows.push(values);
        }
    }

    tx.rollback().await.map_err(query_error)?;
    Ok(ResultSet::new(columns, rows))
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

#[async_trait]
impl DatabaseBackend for PostgresBackend {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let client = self.connect().await?;
        let rows = client
            .query(LIST_TABLES_SQL, &[&schema])
            .await
            .map_err(query_error)?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let client = self.connect().await?;
        let rows = client
            .query(LIST_COLUMNS_SQL, &[&schema, &table])
            .await
            .map_err(query_error)?;
        Ok(rows
            .iter()
            .map(|r| ColumnDescriptor {
                position: r.get(0),
                name: r.get(1),
                data_type: r.get(2),
                nullable: r.get::<_, String>(3) == "YES",
                default: r.get(4),
                is_primary_key: r.get(5),
            })
            .collect())
    }

    async fn count_columns(&self, schema: &str) -> Result<u64> {
        let client = self.connect().await?;
        let row = client
            .query_one(COUNT_COLUMNS_SQL, &[&schema])
            .await
            .map_err(query_error)?;
        Ok(to_count(row.get(0)))
    }

    async fn count_rows(&self, schema: &str, table: &str) -> Result<u64> {
        let client = self.connect().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", qualified_name(schema, table));
        let row = client.query_one(&sql, &[]).await.map_err(query_error)?;
        Ok(to_count(row.get(0)))
    }

    async fn fetch_rows(&self, schema: &str, table: &str, limit: usize) -> Result<ResultSet> {
        let mut client = self.connect().await?;
        let sql = format!("SELECT * FROM {} LIMIT {}", qualified_name(schema, table), limit);
        read_only_select(&mut client, &sql).await
    }

    async fn table_size(&self, schema: &str, table: &str) -> Result<String> {
        let client = self.connect().await?;
        let name = qualified_name(schema, table);
        let row = client
            .query_one(TABLE_SIZE_SQL, &[&name])
            .await
            .map_err(query_error)?;
        Ok(row.get(0))
    }

    async fn list_indexes(&self, schema: &str, table: &str) -> Result<Vec<IndexDescriptor>> {
        let client = self.connect().await?;
        let rows = client
            .query(LIST_INDEXES_SQL, &[&schema, &table])
            .await
            .map_err(query_error)?;
        Ok(rows
            .iter()
            .map(|r| IndexDescriptor {
                name: r.get(0),
                definition: r.get(1),
            })
            .collect())
    }

    async fn database_size(&self) -> Result<String> {
        let client = self.connect().await?;
        let row = client
            .query_one(DATABASE_SIZE_SQL, &[])
            .await
            .map_err(query_error)?;
        Ok(row.get(0))
    }

    async fn query(&self, sql: &str) -> Result<ResultSet> {
        let mut client = self.connect().await?;
        read_only_select(&mut client, sql).await
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let client = self.connect().await?;
        let messages = client.simple_query(sql).await.map_err(query_error)?;
        let affected = messages
            .iter()
            .filter_map(|m| match m {
                SimpleQueryMessage::CommandComplete(n) => Some(*n),
                _ => None,
            })
            .last()
            .unwrap_or(0);
        Ok(affected)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
