//! Shared test utilities for the root integration suites.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use chainql::{FieldType, InsertOptions, KvDatabase, KvTable, MemoryStore, SchemaEntry, Value};
use tracing_subscriber::filter::LevelFilter;

static INIT_TRACING: Once = Once::new();

/// Route library logs to the test harness output
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(LevelFilter::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Schema shared by the suites: string key plus free-form value
pub fn schema() -> Vec<SchemaEntry> {
    vec![
        SchemaEntry::indexed("key", FieldType::String),
        SchemaEntry::new("value", FieldType::Any),
    ]
}

/// A fresh key-value table holding `docs`
pub async fn kv_table(docs: Value) -> KvTable {
    init_tracing();
    let db = KvDatabase::new(Arc::new(MemoryStore::new()));
    let table = db.table_create("docs", &schema()).await.unwrap();
    let result = table.insert(docs, InsertOptions::default()).await.unwrap();
    assert_eq!(result.errors, 0);
    table
}
