//! Connector doubles shared by the SQL backend tests
//!
//! - `Recorder` logs statements and answers from canned responses
//! - `Sqlite` runs statements against an in-memory SQLite database

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chainql_core::value::number;
use chainql_core::{Error, Result, Value};
use chainql_sql::{Row, SqlConnector};
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

/// Records every statement and answers queries from canned responses
pub struct Recorder {
    primary_key: String,
    log: Mutex<Vec<String>>,
    responses: Mutex<HashMap<String, Vec<Row>>>,
    fail_writes: Mutex<bool>,
}

impl Recorder {
    pub fn new(primary_key: &str) -> Arc<Self> {
        Arc::new(Self {
            primary_key: primary_key.to_string(),
            log: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
            fail_writes: Mutex::new(false),
        })
    }

    /// Answer `sql` with `rows` (a JSON array of objects)
    pub fn respond(&self, sql: &str, rows: Value) {
        let rows = rows
            .as_array()
            .map(|items| items.iter().filter_map(|r| r.as_object().cloned()).collect())
            .unwrap_or_default();
        self.responses.lock().insert(sql.to_string(), rows);
    }

    /// Make every `exec` fail with a storage error
    pub fn fail_writes(&self) {
        *self.fail_writes.lock() = true;
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn answer(&self, sql: &str) -> Vec<Row> {
        self.log.lock().push(sql.to_string());
        self.responses.lock().get(sql).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SqlConnector for Recorder {
    async fn get(&self, sql: &str) -> Result<Option<Row>> {
        Ok(self.answer(sql).into_iter().next())
    }

    async fn all(&self, sql: &str) -> Result<Vec<Row>> {
        Ok(self.answer(sql))
    }

    async fn exec(&self, sql: &str) -> Result<()> {
        self.log.lock().push(sql.to_string());
        if *self.fail_writes.lock() {
            return Err(Error::storage("disk is full"));
        }
        Ok(())
    }

    async fn primary_key(&self, _table: &str) -> Result<String> {
        Ok(self.primary_key.clone())
    }
}

/// In-memory SQLite database
pub struct Sqlite {
    conn: Mutex<Connection>,
    log: Mutex<Vec<String>>,
}

impl Sqlite {
    pub fn open() -> Arc<Self> {
        Arc::new(Self {
            conn: Mutex::new(Connection::open_in_memory().unwrap()),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.log.lock().push(sql.to_string());
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(storage)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([]).map_err(storage)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(storage)? {
            let mut record = Row::new();
            for (i, name) in names.iter().enumerate() {
                record.insert(name.clone(), json_value(row.get_ref(i).map_err(storage)?));
            }
            out.push(record);
        }
        Ok(out)
    }
}

fn storage(e: rusqlite::Error) -> Error {
    Error::storage(e.to_string())
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => number(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    }
}

#[async_trait]
impl SqlConnector for Sqlite {
    async fn get(&self, sql: &str) -> Result<Option<Row>> {
        Ok(self.query(sql)?.into_iter().next())
    }

    async fn all(&self, sql: &str) -> Result<Vec<Row>> {
        self.query(sql)
    }

    async fn exec(&self, sql: &str) -> Result<()> {
        self.log.lock().push(sql.to_string());
        self.conn.lock().execute_batch(sql).map_err(storage)
    }

    async fn primary_key(&self, table: &str) -> Result<String> {
        let columns = self.query(&format!("PRAGMA table_info(`{}`)", table.replace('`', "``")))?;
        columns
            .into_iter()
            .find(|c| c.get("pk").and_then(Value::as_i64) == Some(1))
            .and_then(|c| c.get("name").and_then(Value::as_str).map(String::from))
            .ok_or_else(|| Error::storage(format!("table `{}` has no primary key", table)))
    }
}
