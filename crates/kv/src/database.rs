//! Key-value database handle

use std::sync::Arc;

use tracing::info;

use chainql_core::{primary_field, validate_schema, ChainConfig, Error, Result, SchemaEntry};

use crate::index::IndexList;
use crate::store::{BatchOp, OrderedStore};
use crate::subspace::{check_name, Subspace, TABLE_LIST};
use crate::table::{KvTable, TableHandle};

/// Root entry point of a key-value backend
#[derive(Clone)]
pub struct KvDatabase {
    store: Arc<dyn OrderedStore>,
    config: Arc<ChainConfig>,
}

impl KvDatabase {
    /// Wrap a store with the default configuration
    pub fn new(store: Arc<dyn OrderedStore>) -> Self {
        Self::with_config(store, ChainConfig::default())
    }

    /// Wrap a store with an explicit configuration
    pub fn with_config(store: Arc<dyn OrderedStore>, config: ChainConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Bind a table by name and schema
    pub fn table(&self, name: &str, schema: Vec<SchemaEntry>) -> KvTable {
        KvTable::new(TableHandle {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            name: Arc::from(name),
            schema: Arc::from(schema),
        })
    }

    async fn tables(&self) -> Result<Vec<String>> {
        match self.store.get(&Subspace::database().named(TABLE_LIST)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn tables_record(tables: &[String]) -> Result<BatchOp> {
        Ok(BatchOp::Put {
            key: Subspace::database().named(TABLE_LIST),
            value: serde_json::to_vec(tables)?,
        })
    }

    /// Create a table
    ///
    /// The primary key is the first indexed field, else the first field.
    /// Every other indexed field gets a secondary index.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` for an invalid schema, a name containing
    /// `!`, or an existing table; propagates storage errors.
    pub async fn table_create(&self, name: &str, schema: &[SchemaEntry]) -> Result<KvTable> {
        validate_schema(schema)?;
        check_name("table", name)?;
        for entry in schema.iter().filter(|e| e.index) {
            check_name("index", &entry.name)?;
        }
        let primary = primary_field(schema)
            .map(|e| e.name.clone())
            .ok_or_else(|| Error::argument("schema has no fields"))?;

        let mut tables = self.tables().await?;
        if tables.iter().any(|t| t == name) {
            return Err(Error::argument(format!("table `{}` already exists", name)));
        }
        tables.push(name.to_string());

        let indexes = IndexList::new(
            primary.clone(),
            schema.iter().filter(|e| e.index).map(|e| e.name.clone()),
        );
        self.store
            .batch(vec![indexes.record(name)?, Self::tables_record(&tables)?])
            .await?;

        info!(target: "chainql::kv", table = name, primary_key = %primary, indexes = ?indexes.secondary(), "created table");
        Ok(self.table(name, schema.to_vec()))
    }

    /// Drop a table and everything stored for it, if it exists
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn table_drop(&self, name: &str) -> Result<()> {
        let mut tables = self.tables().await?;
        if !tables.iter().any(|t| t == name) {
            return Ok(());
        }
        tables.retain(|t| t != name);

        let mut ops: Vec<BatchOp> = self
            .store
            .read_prefix(Subspace::table(name).prefix())
            .await?
            .into_iter()
            .map(|(key, _)| BatchOp::Del { key })
            .collect();
        let keys = ops.len();
        ops.push(Self::tables_record(&tables)?);
        self.store.batch(ops).await?;

        info!(target: "chainql::kv", table = name, keys, "dropped table");
        Ok(())
    }

    /// Names of all tables, in creation order
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn table_list(&self) -> Result<Vec<String>> {
        self.tables().await
    }
}
