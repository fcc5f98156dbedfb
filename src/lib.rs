//! chainql - deferred query algebra with SQL and key-value backends
//!
//! Queries are chains of operations queued on a node and run on demand.
//! The same chain runs statically over in-memory values, compiles to SQL
//! (SQLite or Postgres flavored), or compiles to a stage pipeline over an
//! ordered key-value store.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use chainql::{Chain, FieldType, InsertOptions, KvDatabase, MemoryStore, SchemaEntry};
//! use serde_json::json;
//!
//! let db = KvDatabase::new(Arc::new(MemoryStore::new()));
//! let docs = db
//!     .table_create("docs", &[
//!         SchemaEntry::indexed("key", FieldType::String),
//!         SchemaEntry::new("value", FieldType::Any),
//!     ])
//!     .await?;
//! docs.insert(json!({"key": "a", "value": 5}), InsertOptions::default()).await?;
//!
//! let rows = docs.fork().filter(|doc| doc.select("value").eq(5)).run().await?;
//! ```
//!
//! # Architecture
//!
//! - [`chainql_core`]: values, the operation queue, the static evaluator,
//!   schemas, write results, errors and configuration
//! - [`sql`]: dialects, the filter and stream compilers, SQL tables
//! - [`kv`]: ordered stores, index maintenance, key-value tables

pub use chainql_core::*;

pub use chainql_kv as kv;
pub use chainql_sql as sql;

pub use chainql_kv::{KvDatabase, KvSelection, KvSingleSelection, KvTable, MemoryStore, OrderedStore};
pub use chainql_sql::{
    Dialect, PostgresDatabase, PostgresDialect, SqlConnector, SqlDatabase, SqlSelection,
    SqlSingleSelection, SqlTable, SqliteDatabase, SqliteDialect,
};
