//! Table, selection and single-row handles over an ordered store
//!
//! Reads scan the table's primary sub-space (or fetch the keys a selection
//! is scoped to) and push every document through the compiled
//! [`Pipeline`]. Writes go through [`index::commit`], so the primary row
//! and every secondary index change in one batch.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use chainql_core::mutation::{self, check_key, single_document};
use chainql_core::value::{documents, fingerprint, same_document, truthy};
use chainql_core::{
    eval, resolve, resolve_all, ChainConfig, Conflict, Error, InsertOptions, Object, Operand,
    QueryEntry, Result, SchemaEntry, Value, WriteResult,
};

use crate::index::{self, IndexList};
use crate::pipeline::Pipeline;
use crate::store::{BatchOp, OrderedStore};
use crate::subspace::{check_name, Subspace};

/// State shared by every handle bound to one table
#[derive(Clone)]
pub(crate) struct TableHandle {
    pub(crate) store: Arc<dyn OrderedStore>,
    pub(crate) config: Arc<ChainConfig>,
    pub(crate) name: Arc<str>,
    pub(crate) schema: Arc<[SchemaEntry]>,
}

impl TableHandle {
    async fn indexes(&self) -> Result<IndexList> {
        IndexList::load(self.store.as_ref(), &self.name).await
    }

    async fn fetch(&self, key: &Value) -> Result<Option<Object>> {
        match self.store.get(&Subspace::primary(&self.name).key(key)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn scan(&self) -> Result<Vec<Value>> {
        self.store
            .read_prefix(Subspace::primary(&self.name).prefix())
            .await?
            .into_iter()
            .map(|(_, bytes)| Ok(serde_json::from_slice(&bytes)?))
            .collect()
    }

    /// Documents whose primary key (or indexed value) is one of the scope's keys
    async fn scoped(&self, scope: &Scope) -> Result<Vec<Value>> {
        let keys = resolve_all(&scope.keys).await?;
        let indexes = self.indexes().await?;
        let primary_keys = match scope.index.as_deref() {
            None => keys,
            Some(field) if field == indexes.primary_key() => keys,
            Some(field) => {
                if !indexes.has_index(field) {
                    return Err(Error::argument(format!(
                        "table `{}` has no index on `{}`",
                        self.name, field
                    )));
                }
                let mut found = Vec::new();
                for key in &keys {
                    found.extend(index::lookup(self.store.as_ref(), &self.name, field, key).await?);
                }
                found
            }
        };

        let mut seen = HashSet::new();
        let mut docs = Vec::new();
        for key in primary_keys {
            if !seen.insert(fingerprint(&key)) {
                continue;
            }
            if let Some(doc) = self.fetch(&key).await? {
                docs.push(Value::Object(doc));
            }
        }
        Ok(docs)
    }

    async fn commit(&self, indexes: &IndexList, key: &Value, old: Option<&Object>, new: Option<&Object>) -> Result<()> {
        index::commit(self.store.as_ref(), &self.name, indexes, key, old, new).await
    }

    fn degrade(&self, op: &'static str, outcome: Result<WriteResult>) -> Result<WriteResult> {
        mutation::degrade("kv", &self.name, op, outcome)
    }

    async fn stream(&self, scope: Option<&Scope>, entries: Vec<QueryEntry>) -> Result<Value> {
        let pipeline = Pipeline::compile(entries).await?;
        let docs = match scope {
            None => self.scan().await?,
            Some(scope) => self.scoped(scope).await?,
        };
        pipeline.run(docs).await
    }

    async fn delete_matching(&self, scope: Option<&Scope>, entries: Vec<QueryEntry>) -> Result<WriteResult> {
        let pipeline = Pipeline::compile(entries).await?;
        let outcome = async {
            let indexes = self.indexes().await?;
            let docs = match scope {
                None => self.scan().await?,
                Some(scope) => self.scoped(scope).await?,
            };
            let Value::Array(items) = pipeline.run(docs).await? else {
                return Err(Error::unsupported("delete", "the selection no longer yields rows"));
            };
            let mut total = WriteResult::default();
            for item in items {
                let Some(key) = item.get(indexes.primary_key()).filter(|k| !k.is_null()) else {
                    continue;
                };
                let result = match self.fetch(key).await {
                    Ok(None) => Ok(WriteResult::skipped(1)),
                    Ok(Some(old)) => self
                        .commit(&indexes, key, Some(&old), None)
                        .await
                        .map(|_| WriteResult::deleted(1)),
                    Err(e) => Err(e),
                };
                total.merge(self.degrade("delete", result)?);
            }
            Ok(total)
        }
        .await;
        self.degrade("delete", outcome)
    }

    /// A random primary key not yet present in the table
    async fn fresh_key(&self) -> Result<Value> {
        for _ in 0..self.config.id_attempts {
            let key = Value::String(Uuid::new_v4().to_string());
            if self.fetch(&key).await?.is_none() {
                return Ok(key);
            }
        }
        Err(Error::storage(format!(
            "no free primary key after {} attempts",
            self.config.id_attempts
        )))
    }
}

/// Key list a selection is scoped to
#[derive(Clone)]
pub(crate) struct Scope {
    index: Option<String>,
    keys: Vec<Operand>,
}

/// A table of a key-value database
#[derive(Clone)]
pub struct KvTable {
    handle: TableHandle,
    entries: Vec<QueryEntry>,
}

impl KvTable {
    pub(crate) fn new(handle: TableHandle) -> Self {
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

    /// The document with primary key `key`
    pub fn get(&self, key: impl Into<Operand>) -> KvSingleSelection {
        KvSingleSelection {
            handle: self.handle.clone(),
            key: key.into(),
            entries: Vec::new(),
        }
    }

    /// Documents whose primary key (or `index` value) is one of `keys`
    ///
    /// Result order is unspecified when an index maps several keys.
    pub fn get_all<I, V>(&self, keys: I, index: Option<&str>) -> KvSelection
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        KvSelection {
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
    /// A document without a primary key gets a random one. On a collision
    /// the row fails, is replaced, or is merged with the stored document
    /// depending on the conflict mode (per call, else configured).
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` when `docs` is not an object or an array of
    /// objects. Storage failures are reported in the result.
    pub async fn insert(&self, docs: Value, options: InsertOptions) -> Result<WriteResult> {
        let docs = documents(docs)?;
        let conflict = self.handle.config.conflict_for(&options);
        let indexes = match self.handle.indexes().await {
            Ok(indexes) => indexes,
            Err(e) => return self.handle.degrade("insert", Err(e)),
        };
        let mut total = WriteResult::default();
        for doc in docs {
            let outcome = self.insert_one(&indexes, doc, conflict).await;
            total.merge(self.handle.degrade("insert", outcome)?);
        }
        Ok(total)
    }

    async fn insert_one(&self, indexes: &IndexList, doc: Object, conflict: Conflict) -> Result<WriteResult> {
        let h = &self.handle;
        let primary_key = indexes.primary_key();
        let (key, doc) = match doc.get(primary_key) {
            Some(key) if !key.is_null() => (key.clone(), doc),
            _ => {
                let key = h.fresh_key().await?;
                let mut keyed = Object::new();
                keyed.insert(primary_key.to_string(), key.clone());
                keyed.extend(doc.into_iter().filter(|(k, _)| k != primary_key));
                (key, keyed)
            }
        };

        let Some(old) = h.fetch(&key).await? else {
            h.commit(indexes, &key, None, Some(&doc)).await?;
            return Ok(WriteResult::inserted(1));
        };
        let new = match conflict {
            Conflict::Error => {
                return Err(Error::storage(format!("duplicate primary key {}", key)));
            }
            Conflict::Replace => doc,
            Conflict::Update => {
                let mut merged = old.clone();
                merged.extend(doc);
                merged
            }
        };
        if same_document(&Value::Object(old.clone()), &Value::Object(new.clone())) {
            return Ok(WriteResult::unchanged(1));
        }
        h.commit(indexes, &key, Some(&old), Some(&new)).await?;
        Ok(WriteResult::replaced(1))
    }

    /// Create a secondary index on `field` from the stored documents
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` for an invalid name or an existing index;
    /// propagates storage errors.
    pub async fn index_create(&self, field: &str) -> Result<()> {
        check_name("index", field)?;
        let h = &self.handle;
        let indexes = h.indexes().await?;
        if field == indexes.primary_key() || indexes.has_index(field) {
            return Err(Error::argument(format!(
                "index `{}` already exists on table `{}`",
                field, h.name
            )));
        }
        let mut ops = index::rebuild(h.store.as_ref(), &h.name, field, indexes.primary_key()).await?;
        ops.push(indexes.with(field).record(&h.name)?);
        let entries = ops.len() - 1;
        h.store.batch(ops).await?;
        info!(target: "chainql::kv", table = %h.name, field, entries, "index created");
        Ok(())
    }

    /// Drop the secondary index on `field`
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` when there is no such index; propagates
    /// storage errors.
    pub async fn index_drop(&self, field: &str) -> Result<()> {
        let h = &self.handle;
        let indexes = h.indexes().await?;
        if !indexes.has_index(field) {
            return Err(Error::argument(format!(
                "table `{}` has no index on `{}`",
                h.name, field
            )));
        }
        let mut ops: Vec<BatchOp> = h
            .store
            .read_prefix(Subspace::index(&h.name, field).prefix())
            .await?
            .into_iter()
            .map(|(key, _)| BatchOp::Del { key })
            .collect();
        ops.push(indexes.without(field).record(&h.name)?);
        h.store.batch(ops).await?;
        info!(target: "chainql::kv", table = %h.name, field, "index dropped");
        Ok(())
    }

    /// Secondary index fields
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn index_list(&self) -> Result<Vec<String>> {
        Ok(self.handle.indexes().await?.secondary().to_vec())
    }

    /// Run the queued operations over the table's documents
    ///
    /// # Errors
    ///
    /// Propagates storage and evaluation errors.
    pub async fn run(&mut self) -> Result<Value> {
        let entries = std::mem::take(&mut self.entries);
        self.handle.stream(None, entries).await
    }

    /// Delete every document matched by the queued operations
    ///
    /// # Errors
    ///
    /// Propagates operand errors; storage failures are reported in the result.
    pub async fn delete(&mut self) -> Result<WriteResult> {
        let entries = std::mem::take(&mut self.entries);
        self.handle.delete_matching(None, entries).await
    }
}

/// Documents of a table scoped to a key list
#[derive(Clone)]
pub struct KvSelection {
    handle: TableHandle,
    scope: Scope,
    entries: Vec<QueryEntry>,
}

impl KvSelection {
    /// Run the queued operations over the selected documents
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` when scoped to a missing index; propagates
    /// storage and evaluation errors.
    pub async fn run(&mut self) -> Result<Value> {
        let entries = std::mem::take(&mut self.entries);
        self.handle.stream(Some(&self.scope), entries).await
    }

    /// Delete the selected documents
    ///
    /// # Errors
    ///
    /// Propagates argument errors; storage failures are reported in the result.
    pub async fn delete(&mut self) -> Result<WriteResult> {
        let entries = std::mem::take(&mut self.entries);
        self.handle.delete_matching(Some(&self.scope), entries).await
    }
}

/// One document of a table, by primary key
#[derive(Clone)]
pub struct KvSingleSelection {
    handle: TableHandle,
    key: Operand,
    entries: Vec<QueryEntry>,
}

impl KvSingleSelection {
    /// Run the queued operations over the document (`null` when absent)
    ///
    /// # Errors
    ///
    /// Propagates storage and evaluation errors.
    pub async fn run(&mut self) -> Result<Value> {
        let entries = std::mem::take(&mut self.entries);
        let key = resolve(&self.key).await?;
        let doc = self.handle.fetch(&key).await?.map(Value::Object);
        eval::evaluate(doc.unwrap_or(Value::Null), entries).await
    }

    /// Set the given fields on the document
    ///
    /// An update whose fields are all falsy (including `{}`) deletes the
    /// document.
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
            let (indexes, key) = self.target().await?;
            check_key(&patch, indexes.primary_key(), &key)?;
            let Some(old) = h.fetch(&key).await? else {
                return Ok(WriteResult::skipped(1));
            };
            let mut merged = old.clone();
            merged.extend(patch.clone());
            if same_document(&Value::Object(old.clone()), &Value::Object(merged.clone())) {
                return Ok(WriteResult::unchanged(1));
            }
            h.commit(&indexes, &key, Some(&old), Some(&merged)).await?;
            Ok(WriteResult::replaced(1))
        }
        .await;
        h.degrade("update", outcome)
    }

    /// Overwrite the document with `doc`
    ///
    /// A document whose fields are all falsy deletes the stored one.
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
            let (indexes, key) = self.target().await?;
            let primary_key = indexes.primary_key();
            check_key(&doc, primary_key, &key)?;
            let mut new = Object::new();
            new.insert(primary_key.to_string(), key.clone());
            new.extend(doc.into_iter().filter(|(k, _)| k != primary_key));

            let old = h.fetch(&key).await?;
            let result = match &old {
                None => WriteResult::inserted(1),
                Some(old) if same_document(&Value::Object(old.clone()), &Value::Object(new.clone())) => {
                    return Ok(WriteResult::unchanged(1))
                }
                Some(_) => WriteResult::replaced(1),
            };
            h.commit(&indexes, &key, old.as_ref(), Some(&new)).await?;
            Ok(result)
        }
        .await;
        h.degrade("replace", outcome)
    }

    /// Delete the document
    ///
    /// # Errors
    ///
    /// Storage failures are reported in the result.
    pub async fn delete(&self) -> Result<WriteResult> {
        let h = &self.handle;
        let outcome = async {
            let (indexes, key) = self.target().await?;
            let Some(old) = h.fetch(&key).await? else {
                return Ok(WriteResult::skipped(1));
            };
            h.commit(&indexes, &key, Some(&old), None).await?;
            Ok(WriteResult::deleted(1))
        }
        .await;
        h.degrade("delete", outcome)
    }

    async fn target(&self) -> Result<(IndexList, Value)> {
        let key = resolve(&self.key).await?;
        let indexes = self.handle.indexes().await?;
        Ok((indexes, key))
    }
}

chainql_core::impl_chain!(KvTable, KvSelection, KvSingleSelection);
