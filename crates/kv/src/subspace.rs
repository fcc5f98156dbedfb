//! Key-prefix partitions of the ordered store
//!
//! Every table owns three kinds of sub-space:
//!
//! | Sub-space             | Key                     | Value                      |
//! |-----------------------|-------------------------|----------------------------|
//! | `!{table}!p!`         | JSON of the primary key | JSON document              |
//! | `!{table}!i!{field}!` | JSON of indexed value   | JSON array of primary keys |
//! | `!{table}!m!`         | `__index_list__`        | JSON array of field names  |
//!
//! The database keeps its table list under `!!m!__table_list__`. Names may
//! not contain `!`, so one table's prefix never covers another's.

use chainql_core::value::fingerprint;
use chainql_core::{Error, Result, Value};

/// Record naming a table's index fields; the first one is the primary key
pub const INDEX_LIST: &str = "__index_list__";

/// Record naming every table of the database
pub const TABLE_LIST: &str = "__table_list__";

const SEPARATOR: char = '!';

/// A key prefix dedicated to one table and role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subspace {
    prefix: String,
}

impl Subspace {
    /// Everything stored for `table`
    pub fn table(table: &str) -> Self {
        Self {
            prefix: format!("!{}!", table),
        }
    }

    /// Primary rows of `table`
    pub fn primary(table: &str) -> Self {
        Self {
            prefix: format!("!{}!p!", table),
        }
    }

    /// Secondary index of `table` on `field`
    pub fn index(table: &str, field: &str) -> Self {
        Self {
            prefix: format!("!{}!i!{}!", table, field),
        }
    }

    /// Metadata records of `table`
    pub fn meta(table: &str) -> Self {
        Self {
            prefix: format!("!{}!m!", table),
        }
    }

    /// Database-wide metadata records
    pub fn database() -> Self {
        Self {
            prefix: "!!m!".to_string(),
        }
    }

    /// Raw prefix bytes
    pub fn prefix(&self) -> &[u8] {
        self.prefix.as_bytes()
    }

    /// Key of a value in this sub-space
    pub fn key(&self, value: &Value) -> Vec<u8> {
        self.named(&fingerprint(value))
    }

    /// Key of a named record in this sub-space
    pub fn named(&self, name: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + name.len());
        key.extend_from_slice(self.prefix.as_bytes());
        key.extend_from_slice(name.as_bytes());
        key
    }
}

/// Reject names that would break sub-space isolation
///
/// # Errors
///
/// Returns `Error::Argument` for an empty name or one containing `!`.
pub fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains(SEPARATOR) {
        return Err(Error::argument(format!(
            "{} name must be non-empty and must not contain '{}': {:?}",
            kind, SEPARATOR, name
        )));
    }
    Ok(())
}
