//! Storage connector contract
//!
//! The SQL backend never talks to a driver directly. It generates SQL text
//! and hands it to a [`SqlConnector`], which wraps whatever connection or
//! pool the application uses.

use async_trait::async_trait;
use chainql_core::{Object, Result};

/// One result row, column name to stored value
pub type Row = Object;

/// Connection wrapper consumed by the SQL backend
///
/// Implementations report driver failures as `Error::Storage`.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    /// Run a query and return its first row, if any
    async fn get(&self, sql: &str) -> Result<Option<Row>>;

    /// Run a query and return every row
    async fn all(&self, sql: &str) -> Result<Vec<Row>>;

    /// Run a statement that returns no rows
    async fn exec(&self, sql: &str) -> Result<()>;

    /// Name of the primary-key column of `table`
    async fn primary_key(&self, table: &str) -> Result<String>;
}
