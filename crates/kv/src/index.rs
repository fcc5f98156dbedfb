//! Secondary-index maintenance
//!
//! A table's `__index_list__` record names its index fields; the first
//! entry is the primary key and has no index sub-space of its own. Each
//! secondary index maps the JSON of an indexed value to the JSON array of
//! primary keys holding it.
//!
//! Every single-row write goes through [`commit`], which computes the index
//! delta between the old and new document and writes it together with the
//! primary row in one batch.

use std::collections::BTreeMap;

use chainql_core::value::{fingerprint, loose_eq};
use chainql_core::{Error, Object, Result, Value};

use crate::store::{BatchOp, OrderedStore};
use crate::subspace::{Subspace, INDEX_LIST};

/// Index fields of one table, primary key first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexList {
    fields: Vec<String>,
}

impl IndexList {
    /// Build from the primary key and the secondary fields
    pub fn new(primary_key: impl Into<String>, secondary: impl IntoIterator<Item = String>) -> Self {
        let primary_key = primary_key.into();
        let mut fields = vec![primary_key.clone()];
        fields.extend(secondary.into_iter().filter(|f| *f != primary_key));
        Self { fields }
    }

    /// Read a table's list
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` when the table has no list (it was never
    /// created) and `Error::Serialization` for a corrupt record.
    pub async fn load(store: &dyn OrderedStore, table: &str) -> Result<Self> {
        let record = store
            .get(&Subspace::meta(table).named(INDEX_LIST))
            .await?
            .ok_or_else(|| Error::storage(format!("table `{}` does not exist", table)))?;
        let fields: Vec<String> = serde_json::from_slice(&record)?;
        if fields.is_empty() {
            return Err(Error::Serialization(format!("empty index list for table `{}`", table)));
        }
        Ok(Self { fields })
    }

    /// The write storing this list for `table`
    pub fn record(&self, table: &str) -> Result<BatchOp> {
        Ok(BatchOp::Put {
            key: Subspace::meta(table).named(INDEX_LIST),
            value: serde_json::to_vec(&self.fields)?,
        })
    }

    /// Primary-key field
    pub fn primary_key(&self) -> &str {
        &self.fields[0]
    }

    /// Secondary index fields
    pub fn secondary(&self) -> &[String] {
        &self.fields[1..]
    }

    /// Whether `field` has a secondary index
    pub fn has_index(&self, field: &str) -> bool {
        self.secondary().iter().any(|f| f == field)
    }

    pub(crate) fn with(mut self, field: &str) -> Self {
        self.fields.push(field.to_string());
        self
    }

    pub(crate) fn without(mut self, field: &str) -> Self {
        let primary_key = self.fields[0].clone();
        self.fields.retain(|f| f != field || *f == primary_key);
        self
    }
}

/// Primary keys stored under one indexed value
pub async fn lookup(store: &dyn OrderedStore, table: &str, field: &str, value: &Value) -> Result<Vec<Value>> {
    match store.get(&Subspace::index(table, field).key(value)).await? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Vec::new()),
    }
}

fn indexed<'a>(doc: Option<&'a Object>, field: &str) -> Option<&'a Value> {
    doc.and_then(|d| d.get(field)).filter(|v| !v.is_null())
}

fn list_op(key: Vec<u8>, keys: &[Value]) -> Result<BatchOp> {
    if keys.is_empty() {
        return Ok(BatchOp::Del { key });
    }
    Ok(BatchOp::Put {
        key,
        value: serde_json::to_vec(keys)?,
    })
}

/// Write `new` over `old` for primary key `key`, keeping every index in step
///
/// `new = None` deletes the row.
///
/// # Errors
///
/// Propagates store and serialization errors; nothing is written unless
/// the whole batch is.
pub async fn commit(
    store: &dyn OrderedStore,
    table: &str,
    indexes: &IndexList,
    key: &Value,
    old: Option<&Object>,
    new: Option<&Object>,
) -> Result<()> {
    let mut ops = Vec::new();

    for field in indexes.secondary() {
        let before = indexed(old, field);
        let after = indexed(new, field);
        if before.map(fingerprint) == after.map(fingerprint) {
            continue;
        }
        let space = Subspace::index(table, field);
        if let Some(value) = before {
            let mut keys = lookup(store, table, field, value).await?;
            keys.retain(|k| !loose_eq(k, key));
            ops.push(list_op(space.key(value), &keys)?);
        }
        if let Some(value) = after {
            let mut keys = lookup(store, table, field, value).await?;
            if !keys.iter().any(|k| loose_eq(k, key)) {
                keys.push(key.clone());
            }
            ops.push(list_op(space.key(value), &keys)?);
        }
    }

    let primary = Subspace::primary(table).key(key);
    ops.push(match new {
        Some(doc) => BatchOp::Put {
            key: primary,
            value: serde_json::to_vec(doc)?,
        },
        None => BatchOp::Del { key: primary },
    });

    store.batch(ops).await
}

/// Writes rebuilding the index on `field` from the primary rows
pub async fn rebuild(store: &dyn OrderedStore, table: &str, field: &str, primary_key: &str) -> Result<Vec<BatchOp>> {
    let space = Subspace::index(table, field);
    let mut lists: BTreeMap<Vec<u8>, Vec<Value>> = BTreeMap::new();
    for (_, bytes) in store.read_prefix(Subspace::primary(table).prefix()).await? {
        let doc: Object = serde_json::from_slice(&bytes)?;
        let (Some(value), Some(key)) = (indexed(Some(&doc), field), doc.get(primary_key)) else {
            continue;
        };
        lists.entry(space.key(value)).or_default().push(key.clone());
    }
    lists
        .into_iter()
        .map(|(key, keys)| list_op(key, &keys))
        .collect()
}
