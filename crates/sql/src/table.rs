//! Table, selection and single-row handles
//!
//! All three share a [`TableHandle`] (connector, dialect, config, table
//! name and schema) and carry their own queue of operations:
//!
//! - [`SqlTable`]: the whole table; `get`, `get_all`, `insert`
//! - [`SqlSelection`]: rows scoped to a key list on the primary key or an
//!   index; adds `delete`
//! - [`SqlSingleSelection`]: one row by primary key; adds `update`,
//!   `replace` and `delete`
//!
//! Reads propagate storage errors. Mutations turn storage errors into a
//! failed [`WriteResult`] and raise argument errors before any statement
//! is issued.

use std::sync::Arc;

use tracing::debug;

use chainql_core::mutation::{self, check_key, single_document};
use chainql_core::value::{documents, same_document, truthy};
use chainql_core::{
    decode_row, eval, resolve, resolve_all, ChainConfig, Conflict, Error, InsertOptions, Object,
    Operand, QueryEntry, Result, SchemaEntry, Value, WriteResult,
};

use crate::connector::{Row, SqlConnector};
use crate::dialect::{upsert_sql, Dialect};
use crate::filter::Condition;
use crate::stream::{compile_stream, in_list, key_values, StreamQuery};

/// State shared by every handle bound to one table
#[derive(Clone)]
pub(crate) struct TableHandle<D> {
    pub(crate) connector: Arc<dyn SqlConnector>,
    pub(crate) dialect: D,
    pub(crate) config: Arc<ChainConfig>,
    pub(crate) name: Arc<str>,
    pub(crate) schema: Arc<[SchemaEntry]>,
}

impl<D: Dialect> TableHandle<D> {
    async fn primary_key(&self) -> Result<String> {
        self.connector.primary_key(&self.name).await
    }

    async fn all(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(target: "chainql::sql", dialect = self.dialect.name(), sql, "all");
        self.connector.all(sql).await
    }

    async fn get(&self, sql: &str) -> Result<Option<Row>> {
        debug!(target: "chainql::sql", dialect = self.dialect.name(), sql, "get");
        self.connector.get(sql).await
    }

    async fn exec(&self, sql: &str) -> Result<()> {
        debug!(target: "chainql::sql", dialect = self.dialect.name(), sql, "exec");
        self.connector.exec(sql).await
    }

    fn table(&self) -> String {
        self.dialect.quote_ident(&self.name)
    }

    fn key_condition(&self, primary_key: &str, key: &Value) -> String {
        format!(
            "{} = {}",
            self.dialect.quote_ident(primary_key),
            self.dialect.comparable(key)
        )
    }

    /// Fetch and decode one row by primary key
    async fn fetch_row(&self, primary_key: &str, key: &Value) -> Result<Option<Value>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {}",
            self.table(),
            self.key_condition(primary_key, key)
        );
        self.get(&sql)
            .await?
            .map(|row| decode_row(&self.schema, row))
            .transpose()
    }

    fn schema_columns(&self) -> Vec<String> {
        self.schema.iter().map(|e| e.name.clone()).collect()
    }

    fn degrade(&self, op: &'static str, outcome: Result<WriteResult>) -> Result<WriteResult> {
        mutation::degrade("sql", &self.name, op, outcome)
    }

    /// Compile a stream queue and resolve its scope into a WHERE fragment
    ///
    /// `None` means the result is statically empty.
    async fn prepare(
        &self,
        scope: Option<&Scope>,
        entries: Vec<QueryEntry>,
    ) -> Result<(StreamQuery, Option<(String, Option<String>)>)> {
        let query = compile_stream(&self.dialect, entries).await?;
        if query.kill {
            return Ok((query, None));
        }
        let primary_key = self.primary_key().await?;
        let scope = match scope {
            None => None,
            Some(scope) => match scope.condition(&self.dialect, &primary_key).await? {
                Condition::Const(false) => return Ok((query, None)),
                Condition::Const(true) => None,
                Condition::Sql(sql) => Some(sql),
            },
        };
        Ok((query, Some((primary_key, scope))))
    }

    async fn fetch(&self, query: &StreamQuery, primary_key: &str, scope: Option<&str>) -> Result<Vec<Value>> {
        let sql = query.select_sql(&self.dialect, &self.name, primary_key, scope);
        self.all(&sql)
            .await?
            .into_iter()
            .map(|row| decode_row(&self.schema, row))
            .collect()
    }

    async fn stream(&self, scope: Option<&Scope>, entries: Vec<QueryEntry>) -> Result<Value> {
        let (query, target) = self.prepare(scope, entries).await?;
        let rows = match target {
            None => Vec::new(),
            Some((primary_key, scope)) => self.fetch(&query, &primary_key, scope.as_deref()).await?,
        };
        query.finish(rows).await
    }

    async fn delete_matching(&self, scope: Option<&Scope>, entries: Vec<QueryEntry>) -> Result<WriteResult> {
        let (query, target) = self.prepare(scope, entries).await?;
        let Some((primary_key, scope)) = target else {
            return Ok(WriteResult::default());
        };
        let outcome = async {
            let keys = if query.rest.is_empty() {
                let sql = query.keys_sql(&self.dialect, &self.name, &primary_key, scope.as_deref());
                key_values(self.all(&sql).await?, &primary_key)
            } else {
                let rows = self.fetch(&query, &primary_key, scope.as_deref()).await?;
                match query.finish(rows).await? {
                    Value::Array(items) => items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::Object(mut obj) => obj.remove(&primary_key),
                            _ => None,
                        })
                        .filter(|k| !k.is_null())
                        .collect(),
                    _ => {
                        return Err(Error::unsupported(
                            "delete",
                            "the selection no longer yields rows",
                        ))
                    }
                }
            };
            match in_list(&self.dialect, &primary_key, &keys) {
                Condition::Sql(condition) => {
                    self.exec(&format!("DELETE FROM {} WHERE {}", self.table(), condition))
                        .await?;
                    Ok(WriteResult::deleted(keys.len() as u64))
                }
                Condition::Const(_) => Ok(WriteResult::default()),
            }
        }
        .await;
        self.degrade("delete", outcome)
    }
}

/// Key list a selection is scoped to
#[derive(Clone)]
pub(crate) struct Scope {
    index: Option<String>,
    keys: Vec<Operand>,
}

impl Scope {
    async fn condition<D: Dialect>(&self, dialect: &D, primary_key: &str) -> Result<Condition> {
        let keys = resolve_all(&self.keys).await?;
        Ok(in_list(dialect, self.index.as_deref().unwrap_or(primary_key), &keys))
    }
}

/// A table of a SQL database
#[derive(Clone)]
pub struct SqlTable<D> {
    handle: TableHandle<D>,
    entries: Vec<QueryEntry>,
}

impl<D: Dialect> SqlTable<D> {
    pub(crate) fn new(handle: TableHandle<D>) -> Self {
        Self {
            handle,
            entries: Vec::new(),
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.handle.name
    }

    /// Declared schema
    pub fn schema(&self) -> &[SchemaEntry] {
        &self.handle.schema
    }

    /// The row with primary key `key`
    pub fn get(&self, key: impl Into<Operand>) -> SqlSingleSelection<D> {
        SqlSingleSelection {
            handle: self.handle.clone(),
            key: key.into(),
            entries: Vec::new(),
        }
    }

    /// Rows whose primary key (or `index` column) is one of `keys`
    pub fn get_all<I, V>(&self, keys: I, index: Option<&str>) -> SqlSelection<D>
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        SqlSelection {
            handle: self.handle.clone(),
            scope: Scope {
                index: index.map(str::to_string),
                keys: keys.into_iter().map(Into::into).collect(),
            },
            entries: Vec::new(),
        }
    }

    /// Insert one document or an array of documents
    ///
    /// On a primary-key collision the row fails, is replaced, or is merged
    /// with the stored row depending on the conflict mode (per call, else
    /// configured).
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` when `docs` is not an object or an array of
    /// objects. Storage failures are reported in the result.
    pub async fn insert(&self, docs: Value, options: InsertOptions) -> Result<WriteResult> {
        let docs = documents(docs)?;
        let conflict = self.handle.config.conflict_for(&options);
        let primary_key = match self.handle.primary_key().await {
            Ok(pk) => pk,
            Err(e) => return self.handle.degrade("insert", Err(e)),
        };
        let mut total = WriteResult::default();
        for doc in docs {
            let outcome = self.insert_one(&primary_key, doc, conflict).await;
            total.merge(self.handle.degrade("insert", outcome)?);
        }
        Ok(total)
    }

    async fn insert_one(&self, primary_key: &str, doc: Object, conflict: Conflict) -> Result<WriteResult> {
        let h = &self.handle;
        let columns: Vec<String> = doc.keys().cloned().collect();
        let values: Vec<String> = doc.values().map(|v| h.dialect.literal(v)).collect();
        let old = match doc.get(primary_key) {
            Some(key) if conflict != Conflict::Error => h.fetch_row(primary_key, key).await?,
            _ => None,
        };

        let sql = match conflict {
            Conflict::Error => format!(
                "INSERT INTO {} ({}) VALUES ({})",
                h.table(),
                h.dialect.ident_list(&columns),
                values.join(", ")
            ),
            Conflict::Replace => h.dialect.replace_sql(
                &h.name,
                primary_key,
                &columns,
                &values,
                &h.schema_columns(),
            ),
            Conflict::Update => upsert_sql(&h.dialect, &h.name, primary_key, &columns, &values, &columns, &[]),
        };

        let result = match old {
            None => WriteResult::inserted(1),
            Some(old) => {
                let new = match (&old, conflict) {
                    (Value::Object(stored), Conflict::Update) => {
                        let mut merged = stored.clone();
                        merged.extend(doc);
                        Value::Object(merged)
                    }
                    _ => Value::Object(doc),
                };
                if same_document(&old, &new) {
                    return Ok(WriteResult::unchanged(1));
                }
                WriteResult::replaced(1)
            }
        };
        h.exec(&sql).await?;
        Ok(result)
    }

    /// Run the queued operations over the table's rows
    ///
    /// # Errors
    ///
    /// Propagates compile, storage and evaluation errors.
    pub async fn run(&mut self) -> Result<Value> {
        let entries = std::mem::take(&mut self.entries);
        self.handle.stream(None, entries).await
    }

    /// Delete every row matched by the queued operations
    ///
    /// # Errors
    ///
    /// Propagates compile errors; storage failures are reported in the result.
    pub async fn delete(&mut self) -> Result<WriteResult> {
        let entries = std::mem::take(&mut self.entries);
        self.handle.delete_matching(None, entries).await
    }
}

/// Rows of a table scoped to a key list
#[derive(Clone)]
pub struct SqlSelection<D> {
    handle: TableHandle<D>,
    scope: Scope,
    entries: Vec<QueryEntry>,
}

impl<D: Dialect> SqlSelection<D> {
    /// Run the queued operations over the selected rows
    ///
    /// # Errors
    ///
    /// Propagates compile, storage and evaluation errors.
    pub async fn run(&mut self) -> Result<Value> {
        let entries = std::mem::take(&mut self.entries);
        self.handle.stream(Some(&self.scope), entries).await
    }

    /// Delete the selected rows
    ///
    /// Selects the matching primary keys first, then issues one `DELETE`.
    ///
    /// # Errors
    ///
    /// Propagates compile errors; storage failures are reported in the result.
    pub async fn delete(&mut self) -> Result<WriteResult> {
        let entries = std::mem::take(&mut self.entries);
        self.handle.delete_matching(Some(&self.scope), entries).await
    }
}

/// One row of a table, by primary key
#[derive(Clone)]
pub struct SqlSingleSelection<D> {
    handle: TableHandle<D>,
    key: Operand,
    entries: Vec<QueryEntry>,
}

impl<D: Dialect> SqlSingleSelection<D> {
    /// Run the queued operations over the row (`null` when absent)
    ///
    /// # Errors
    ///
    /// Propagates storage and evaluation errors.
    pub async fn run(&mut self) -> Result<Value> {
        let entries = std::mem::take(&mut self.entries);
        let key = resolve(&self.key).await?;
        let primary_key = self.handle.primary_key().await?;
        let row = self.handle.fetch_row(&primary_key, &key).await?;
        eval::evaluate(row.unwrap_or(Value::Null), entries).await
    }

    /// Set the given fields on the row
    ///
    /// An update whose fields are all falsy (including `{}`) deletes the row.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` when `patch` is not an object or changes the
    /// primary key. Storage failures are reported in the result.
    pub async fn update(&self, patch: Value) -> Result<WriteResult> {
        let patch = single_document(patch, "update")?;
        if patch.values().all(|v| !truthy(v)) {
            return self.delete().await;
        }
        let h = &self.handle;
        let outcome = async {
            let (primary_key, key) = self.target().await?;
            check_key(&patch, &primary_key, &key)?;
            let Some(old) = h.fetch_row(&primary_key, &key).await? else {
                return Ok(WriteResult::skipped(1));
            };
            let mut merged = match &old {
                Value::Object(stored) => stored.clone(),
                _ => Object::new(),
            };
            merged.extend(patch.clone());
            if same_document(&old, &Value::Object(merged)) {
                return Ok(WriteResult::unchanged(1));
            }
            let assignments: Vec<String> = patch
                .iter()
                .map(|(k, v)| format!("{} = {}", h.dialect.quote_ident(k), h.dialect.literal(v)))
                .collect();
            h.exec(&format!(
                "UPDATE {} SET {} WHERE {}",
                h.table(),
                assignments.join(", "),
                h.key_condition(&primary_key, &key)
            ))
            .await?;
            Ok(WriteResult::replaced(1))
        }
        .await;
        h.degrade("update", outcome)
    }

    /// Overwrite the row with `doc`
    ///
    /// A document whose fields are all falsy deletes the row.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` when `doc` is not an object or names a
    /// different primary key. Storage failures are reported in the result.
    pub async fn replace(&self, doc: Value) -> Result<WriteResult> {
        let doc = single_document(doc, "replace")?;
        if doc.values().all(|v| !truthy(v)) {
            return self.delete().await;
        }
        let h = &self.handle;
        let outcome = async {
            let (primary_key, key) = self.target().await?;
            check_key(&doc, &primary_key, &key)?;
            let mut row = Object::new();
            row.insert(primary_key.clone(), key.clone());
            row.extend(doc.into_iter().filter(|(k, _)| *k != primary_key));

            let result = match h.fetch_row(&primary_key, &key).await? {
                None => WriteResult::inserted(1),
                Some(old) if same_document(&old, &Value::Object(row.clone())) => {
                    return Ok(WriteResult::unchanged(1))
                }
                Some(_) => WriteResult::replaced(1),
            };
            let columns: Vec<String> = row.keys().cloned().collect();
            let values: Vec<String> = row.values().map(|v| h.dialect.literal(v)).collect();
            h.exec(&h.dialect.replace_sql(&h.name, &primary_key, &columns, &values, &h.schema_columns()))
                .await?;
            Ok(result)
        }
        .await;
        h.degrade("replace", outcome)
    }

    /// Delete the row
    ///
    /// # Errors
    ///
    /// Storage failures are reported in the result.
    pub async fn delete(&self) -> Result<WriteResult> {
        let h = &self.handle;
        let outcome = async {
            let (primary_key, key) = self.target().await?;
            if h.fetch_row(&primary_key, &key).await?.is_none() {
                return Ok(WriteResult::skipped(1));
            }
            h.exec(&format!(
                "DELETE FROM {} WHERE {}",
                h.table(),
                h.key_condition(&primary_key, &key)
            ))
            .await?;
            Ok(WriteResult::deleted(1))
        }
        .await;
        h.degrade("delete", outcome)
    }

    async fn target(&self) -> Result<(String, Value)> {
        let key = resolve(&self.key).await?;
        let primary_key = self.handle.primary_key().await?;
        Ok((primary_key, key))
    }
}

chainql_core::impl_chain!(<D: Dialect> SqlTable, SqlSelection, SqlSingleSelection);
