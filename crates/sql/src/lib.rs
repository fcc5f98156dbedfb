//! SQL backend for chainql
//!
//! Compiles chains into SQL text for two dialects and runs it through a
//! [`SqlConnector`]:
//! - dialect: identifier quoting, literal embedding, dialect-specific DDL
//! - filter: row predicates to one boolean expression
//! - stream: filter/distinct/pluck/limit to one SELECT, plus a post-pass
//! - table: `SqlTable`, `SqlSelection`, `SqlSingleSelection`
//! - database: `SqlDatabase` and table administration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connector;
pub mod database;
pub mod dialect;
pub mod filter;
pub mod stream;
pub mod table;

pub use connector::{Row, SqlConnector};
pub use database::{PostgresDatabase, SqlDatabase, SqliteDatabase};
pub use dialect::{Dialect, PostgresDialect, SqliteDialect};
pub use filter::{compile_predicate, Condition};
pub use stream::{compile_stream, StreamQuery};
pub use table::{SqlSelection, SqlSingleSelection, SqlTable};
