//! Quarry DB - Database Access Layer
//!
//! Read-mostly access to the external PostgreSQL database behind the
//! dashboard. Every operation opens one fresh connection, and read results
//! are memoized for a fixed TTL so repeated page views within the window
//! never reach the database.
//!
//! Key Features:
//! - Async backend trait with PostgreSQL and in-memory implementations
//! - Catalog introspection (tables, columns, keys, indexes, sizes)
//! - Read-only transactions for ad-hoc SELECT statements
//! - Table name allow-list and identifier quoting
//! - Fail-soft results carrying the error alongside a fallback value
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod backend;
pub mod cache;
pub mod decode;
pub mod identifier;
pub mod memory;
pub mod postgres;
pub mod service;

pub use backend::DatabaseBackend;
pub use cache::{CacheKey, CacheStats, TtlCache};
pub use memory::{MemoryBackend, MemoryTable};
pub use postgres::PostgresBackend;
pub use service::{DataService, QueryOutcome, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, MIN_ROW_LIMIT};
