//! SQLite Integration Tests
//!
//! Runs the generated statements against an in-memory SQLite database and
//! checks the results against the static evaluator where both apply.

mod common;

use chainql_core::{expr, Chain, Conflict, Datum, FieldType, InsertOptions, SchemaEntry, Value};
use chainql_sql::{SqlTable, SqliteDatabase, SqliteDialect};
use common::Sqlite;
use serde_json::json;

fn schema() -> Vec<SchemaEntry> {
    vec![
        SchemaEntry::indexed("key", FieldType::String),
        SchemaEntry::new("value", FieldType::Any),
    ]
}

async fn docs_table(docs: Value) -> (SqliteDatabase, SqlTable<SqliteDialect>) {
    let db = SqliteDatabase::new(Sqlite::open());
    let table = db.table_create("docs", &schema()).await.unwrap();
    let result = table.insert(docs, InsertOptions::default()).await.unwrap();
    assert_eq!(result.errors, 0);
    (db, table)
}

/// Run a filter through SQLite and through the static evaluator
async fn both(table: &SqlTable<SqliteDialect>, docs: Value, f: fn(Datum) -> Datum) -> (Value, Value) {
    let stored = table.fork().filter(f).run().await.unwrap();
    let evaluated = expr(docs).filter(f).run().await.unwrap();
    (stored, evaluated)
}

#[tokio::test]
async fn test_end_to_end_filter() {
    let (_db, table) = docs_table(json!([{"key": "a", "value": 5}, {"key": "b", "value": "x"}])).await;

    let rows = table
        .fork()
        .filter(|doc| doc.select("value").eq(5))
        .run()
        .await
        .unwrap();
    assert_eq!(rows, json!([{"key": "a", "value": 5}]));

    assert_eq!(table.get("b").select("value").run().await.unwrap(), json!("x"));
    assert_eq!(table.fork().count().run().await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_any_column_compares_numbers_numerically() {
    let docs = json!([{"key": "a", "value": 10}, {"key": "b", "value": 3}]);
    let (_db, table) = docs_table(docs.clone()).await;

    let (stored, evaluated) = both(&table, docs, |doc| doc.select("value").gt(5)).await;
    assert_eq!(stored, json!([{"key": "a", "value": 10}]));
    assert_eq!(stored, evaluated);
}

#[tokio::test]
async fn test_any_column_keeps_text_apart_from_numbers() {
    let docs = json!([{"key": "a", "value": "5"}, {"key": "b", "value": 5}]);
    let (_db, table) = docs_table(docs).await;

    let rows = table
        .fork()
        .filter(|doc| doc.select("value").eq(5))
        .pluck(["key"])
        .run()
        .await
        .unwrap();
    assert_eq!(rows, json!([{"key": "b"}]));
}

#[tokio::test]
async fn test_filter_after_pluck_sees_projected_rows() {
    let docs = json!([{"key": "a", "value": 5}, {"key": "b", "value": 6}]);
    let (_db, table) = docs_table(docs.clone()).await;

    let projected_first = table
        .fork()
        .pluck(["key"])
        .filter(|doc| doc.select("value").eq(5))
        .run()
        .await
        .unwrap();
    let evaluated = expr(docs)
        .pluck(["key"])
        .filter(|doc| doc.select("value").eq(5))
        .run()
        .await
        .unwrap();
    assert_eq!(projected_first, json!([]));
    assert_eq!(projected_first, evaluated);

    let filtered_first = table
        .fork()
        .filter(|doc| doc.select("value").eq(5))
        .pluck(["key"])
        .run()
        .await
        .unwrap();
    assert_eq!(filtered_first, json!([{"key": "a"}]));
}

#[tokio::test]
async fn test_ne_keeps_rows_without_the_field() {
    let (_db, table) = docs_table(json!([{"key": "a", "value": "x"}, {"key": "b"}])).await;

    let rows = table
        .fork()
        .filter(|doc| doc.select("value").ne("x"))
        .run()
        .await
        .unwrap();
    assert_eq!(rows, json!([{"key": "b", "value": null}]));
}

#[tokio::test]
async fn test_sub_object_equality() {
    let docs = json!([
        {"key": "a", "value": {"b": 1, "c": 2}},
        {"key": "b", "value": {"b": 10}},
        {"key": "c", "value": {"c": 1}},
    ]);
    let (_db, table) = docs_table(docs.clone()).await;

    let (stored, evaluated) = both(&table, docs, |doc| doc.select("value").select("b").eq(1)).await;
    assert_eq!(stored, json!([{"key": "a", "value": {"b": 1, "c": 2}}]));
    assert_eq!(stored, evaluated);

    let structural = table
        .fork()
        .filter_match(json!({"value": {"b": 10}}))
        .pluck(["key"])
        .run()
        .await
        .unwrap();
    assert_eq!(structural, json!([{"key": "b"}]));
}

#[tokio::test]
async fn test_embedded_literals_stay_inert() {
    let hostile = "x'; DROP TABLE docs; --";
    let (db, table) = docs_table(json!([
        {"key": hostile, "value": "it's"},
        {"key": "plain", "value": hostile},
    ]))
    .await;

    let rows = table
        .fork()
        .filter(move |doc| doc.select("value").eq(hostile))
        .pluck(["key"])
        .run()
        .await
        .unwrap();
    assert_eq!(rows, json!([{"key": "plain"}]));

    assert_eq!(table.get(hostile).select("value").run().await.unwrap(), json!("it's"));
    table.get(hostile).update(json!({"value": "'); --"})).await.unwrap();
    assert_eq!(table.get(hostile).select("value").run().await.unwrap(), json!("'); --"));
    assert_eq!(db.table_list().await.unwrap(), vec!["docs"]);
}

#[tokio::test]
async fn test_writes_and_conflicts() {
    let (_db, table) = docs_table(json!({"key": "a", "value": 1})).await;

    let replaced = table
        .insert(json!({"key": "a", "value": 2}), InsertOptions::default())
        .await
        .unwrap();
    assert_eq!(replaced.replaced, 1);

    let duplicate = table
        .insert(
            json!({"key": "a", "value": 3}),
            InsertOptions::conflict(Conflict::Error),
        )
        .await
        .unwrap();
    assert_eq!(duplicate.errors, 1);
    assert!(duplicate.first_error.unwrap().contains("UNIQUE"));

    let updated = table.get("a").update(json!({"value": 7})).await.unwrap();
    assert_eq!(updated.replaced, 1);
    assert_eq!(table.get("a").run().await.unwrap(), json!({"key": "a", "value": 7}));

    let deleted = table
        .get_all(["a", "zzz"], None)
        .filter(|doc| doc.select("value").ge(7))
        .delete()
        .await
        .unwrap();
    assert_eq!(deleted.deleted, 1);
    assert_eq!(table.fork().count().run().await.unwrap(), json!(0));
}
