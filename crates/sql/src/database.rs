//! SQL database handle

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::info;

use chainql_core::{primary_field, validate_schema, ChainConfig, Result, SchemaEntry, Value};

use crate::connector::SqlConnector;
use crate::dialect::{Dialect, PostgresDialect, SqliteDialect};
use crate::table::{SqlTable, TableHandle};

/// Root entry point of a SQL backend
pub struct SqlDatabase<D> {
    connector: Arc<dyn SqlConnector>,
    config: Arc<ChainConfig>,
    _dialect: PhantomData<D>,
}

/// SQLite-flavored database
pub type SqliteDatabase = SqlDatabase<SqliteDialect>;

/// Postgres-flavored database
pub type PostgresDatabase = SqlDatabase<PostgresDialect>;

impl<D: Dialect> SqlDatabase<D> {
    /// Wrap a connector with the default configuration
    pub fn new(connector: Arc<dyn SqlConnector>) -> Self {
        Self::with_config(connector, ChainConfig::default())
    }

    /// Wrap a connector with an explicit configuration
    pub fn with_config(connector: Arc<dyn SqlConnector>, config: ChainConfig) -> Self {
        Self {
            connector,
            config: Arc::new(config),
            _dialect: PhantomData,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Bind a table by name and schema
    pub fn table(&self, name: &str, schema: Vec<SchemaEntry>) -> SqlTable<D> {
        SqlTable::new(TableHandle {
            connector: Arc::clone(&self.connector),
            dialect: D::default(),
            config: Arc::clone(&self.config),
            name: Arc::from(name),
            schema: Arc::from(schema),
        })
    }

    /// Create a table
    ///
    /// The primary key is the first indexed field, else the first field.
    /// Every other indexed field gets its own index.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` for an invalid schema before any statement
    /// is issued, and propagates storage errors.
    pub async fn table_create(&self, name: &str, schema: &[SchemaEntry]) -> Result<SqlTable<D>> {
        validate_schema(schema)?;
        let dialect = D::default();
        let primary = primary_field(schema).map(|e| e.name.clone()).unwrap_or_default();

        let columns: Vec<String> = schema
            .iter()
            .map(|e| {
                let mut column = format!(
                    "{} {}",
                    dialect.quote_ident(&e.name),
                    dialect.column_type(e.field_type)
                );
                if e.name == primary {
                    column.push_str(" PRIMARY KEY");
                }
                column
            })
            .collect();
        self.connector
            .exec(&format!(
                "CREATE TABLE {} ({})",
                dialect.quote_ident(name),
                columns.join(", ")
            ))
            .await?;

        for entry in schema.iter().filter(|e| e.index && e.name != primary) {
            self.connector
                .exec(&format!(
                    "CREATE INDEX {} ON {} ({})",
                    dialect.quote_ident(&format!("{}_{}_idx", name, entry.name)),
                    dialect.quote_ident(name),
                    dialect.quote_ident(&entry.name)
                ))
                .await?;
        }

        info!(target: "chainql::sql", table = name, primary_key = %primary, dialect = dialect.name(), "created table");
        Ok(self.table(name, schema.to_vec()))
    }

    /// Drop a table if it exists
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn table_drop(&self, name: &str) -> Result<()> {
        let dialect = D::default();
        self.connector
            .exec(&format!("DROP TABLE IF EXISTS {}", dialect.quote_ident(name)))
            .await?;
        info!(target: "chainql::sql", table = name, "dropped table");
        Ok(())
    }

    /// Names of all tables
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn table_list(&self) -> Result<Vec<String>> {
        let rows = self.connector.all(&D::default().list_tables_sql()).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| match row.remove("name") {
                Some(Value::String(name)) => Some(name),
                _ => None,
            })
            .collect())
    }
}

impl<D> Clone for SqlDatabase<D> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
            _dialect: PhantomData,
        }
    }
}
