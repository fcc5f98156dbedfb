//! Stream compiler
//!
//! Folds the stream-level prefix of a table or selection queue into one
//! SELECT statement:
//!
//! ```text
//! SELECT [DISTINCT] cols FROM t
//!   WHERE <scope> AND pk IN (SELECT pk FROM t WHERE f1 AND (f2) ...)
//!   LIMIT n
//! ```
//!
//! Compilation stops at the first operation SQL cannot run in queue order
//! (`map`, `count`, a `filter` after `limit` or `pluck`, ...). Filters
//! test whole rows in the subquery, so a filter may only be pushed down
//! while no projection has been applied. That operation and
//! everything after it are kept in [`StreamQuery::rest`] and run through
//! the static evaluator over the fetched rows. A filter that is statically
//! false sets [`StreamQuery::kill`]: the result is empty and storage is not
//! touched.

use tracing::debug;

use chainql_core::value::type_name;
use chainql_core::{eval, resolve, Error, QueryEntry, Result, Value};

use crate::dialect::Dialect;
use crate::filter::{compile_predicate, Condition};

/// Compiled form of a stream queue
#[derive(Debug, Clone, Default)]
pub struct StreamQuery {
    /// Filter conditions, in queue order
    pub filters: Vec<String>,
    /// `SELECT DISTINCT`
    pub distinct: bool,
    /// Projected columns, all columns when `None`
    pub columns: Option<Vec<String>>,
    /// Row limit
    pub limit: Option<u64>,
    /// Statically empty result
    pub kill: bool,
    /// Operations left for the static post-pass
    pub rest: Vec<QueryEntry>,
}

impl StreamQuery {
    fn where_clause<D: Dialect>(
        &self,
        dialect: &D,
        table: &str,
        primary_key: &str,
        scope: Option<&str>,
    ) -> String {
        let mut parts = Vec::new();
        if let Some(scope) = scope {
            parts.push(scope.to_string());
        }
        if let Some((first, others)) = self.filters.split_first() {
            let mut sub = format!(
                "{} IN (SELECT {} FROM {} WHERE {}",
                dialect.quote_ident(primary_key),
                dialect.quote_ident(primary_key),
                dialect.quote_ident(table),
                first
            );
            for filter in others {
                sub.push_str(&format!(" AND ({})", filter));
            }
            sub.push(')');
            parts.push(sub);
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }

    /// Statement fetching the rows
    pub fn select_sql<D: Dialect>(
        &self,
        dialect: &D,
        table: &str,
        primary_key: &str,
        scope: Option<&str>,
    ) -> String {
        let columns = match &self.columns {
            Some(columns) => dialect.ident_list(columns),
            None => "*".to_string(),
        };
        let mut sql = format!(
            "SELECT {}{} FROM {}{}",
            if self.distinct { "DISTINCT " } else { "" },
            columns,
            dialect.quote_ident(table),
            self.where_clause(dialect, table, primary_key, scope)
        );
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }

    /// Statement fetching only the primary keys of the matching rows
    pub fn keys_sql<D: Dialect>(
        &self,
        dialect: &D,
        table: &str,
        primary_key: &str,
        scope: Option<&str>,
    ) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            dialect.quote_ident(primary_key),
            dialect.quote_ident(table),
            self.where_clause(dialect, table, primary_key, scope)
        );
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }

    /// Run the post-pass over fetched rows
    pub async fn finish(self, rows: Vec<Value>) -> Result<Value> {
        eval::evaluate(Value::Array(rows), self.rest).await
    }
}

/// Compile a stream queue
///
/// # Errors
///
/// Returns `UnsupportedOperation` for a second `distinct`, a second `pluck`
/// or a `pluck` after `distinct`, and propagates filter compilation errors.
pub async fn compile_stream<D: Dialect>(dialect: &D, entries: Vec<QueryEntry>) -> Result<StreamQuery> {
    let mut query = StreamQuery::default();
    let mut entries = entries.into_iter();

    while let Some(entry) = entries.next() {
        let command = entry.command();
        match entry {
            QueryEntry::Filter(predicate) if query.limit.is_none() && query.columns.is_none() => {
                match compile_predicate(dialect, &predicate).await? {
                    Condition::Const(true) => {}
                    Condition::Const(false) => {
                        query.kill = true;
                        break;
                    }
                    Condition::Sql(sql) => query.filters.push(sql),
                }
            }
            QueryEntry::Distinct if query.limit.is_none() => {
                if query.distinct {
                    return Err(Error::unsupported(command, "distinct may only be applied once"));
                }
                query.distinct = true;
            }
            QueryEntry::Pluck(fields) => {
                if query.columns.is_some() {
                    return Err(Error::unsupported(command, "pluck may only be applied once"));
                }
                if query.distinct {
                    return Err(Error::unsupported(command, "cannot pluck after distinct"));
                }
                query.columns = Some(eval::field_names(&fields, command).await?);
            }
            QueryEntry::Limit(n) => {
                let n = resolve(&n).await?;
                let n = n.as_f64().ok_or(Error::TypeMismatch {
                    command,
                    expected: "number",
                    actual: type_name(&n),
                })?;
                let n = n.max(0.0) as u64;
                query.limit = Some(query.limit.map_or(n, |m| m.min(n)));
            }
            other => {
                query.rest.push(other);
                break;
            }
        }
    }
    query.rest.extend(entries);

    debug!(
        target: "chainql::sql",
        filters = query.filters.len(),
        distinct = query.distinct,
        limit = ?query.limit,
        kill = query.kill,
        post_pass = query.rest.len(),
        "compiled stream"
    );
    Ok(query)
}

/// `column IN (v1, v2, ...)`, statically false for an empty key list
pub fn in_list<D: Dialect>(dialect: &D, column: &str, keys: &[Value]) -> Condition {
    if keys.is_empty() {
        return Condition::Const(false);
    }
    let keys: Vec<String> = keys.iter().map(|k| dialect.comparable(k)).collect();
    Condition::Sql(format!("{} IN ({})", dialect.quote_ident(column), keys.join(", ")))
}

/// Primary keys of fetched key rows
pub fn key_values(rows: Vec<crate::connector::Row>, primary_key: &str) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|mut row| row.remove(primary_key))
        .filter(|k| !k.is_null())
        .collect()
}
