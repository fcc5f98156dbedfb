//! SQL Backend Integration Tests
//!
//! Drives tables, selections and single selections through a recording
//! connector and checks the generated statements and results.

mod common;

use std::sync::Arc;

use chainql_core::{expr, Chain, Conflict, Error, FieldType, InsertOptions, SchemaEntry};
use chainql_sql::{PostgresDatabase, SqliteDatabase};
use common::Recorder;
use serde_json::json;

fn schema() -> Vec<SchemaEntry> {
    vec![
        SchemaEntry::indexed("key", FieldType::String),
        SchemaEntry::new("value", FieldType::Any),
    ]
}

fn setup() -> (Arc<Recorder>, SqliteDatabase) {
    let rec = Recorder::new("key");
    let db = SqliteDatabase::new(rec.clone());
    (rec, db)
}

const ROW_A: &str = "SELECT * FROM `docs` WHERE `key` = 'a'";

#[tokio::test]
async fn test_end_to_end_filter() {
    let (rec, db) = setup();
    let table = db.table_create("docs", &schema()).await.unwrap();

    let result = table
        .insert(
            json!([{"key": "a", "value": 5}, {"key": "b", "value": "x"}]),
            InsertOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.inserted, 2);
    assert_eq!(result.errors, 0);

    let select = "SELECT * FROM `docs` WHERE `key` IN (SELECT `key` FROM `docs` WHERE `value` = 5)";
    rec.respond(select, json!([{"key": "a", "value": "5"}]));

    let rows = table
        .fork()
        .filter(|doc| doc.select("value").eq(5))
        .run()
        .await
        .unwrap();
    assert_eq!(rows, json!([{"key": "a", "value": 5}]));

    assert_eq!(
        rec.statements(),
        vec![
            "CREATE TABLE `docs` (`key` TEXT PRIMARY KEY, `value` BLOB)".to_string(),
            ROW_A.to_string(),
            "INSERT OR REPLACE INTO `docs` (`key`, `value`) VALUES ('a', 5)".to_string(),
            "SELECT * FROM `docs` WHERE `key` = 'b'".to_string(),
            "INSERT OR REPLACE INTO `docs` (`key`, `value`) VALUES ('b', 'x')".to_string(),
            select.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_table_create_indexes_and_rejects_empty_schema() {
    let (rec, db) = setup();
    let err = db.table_create("empty", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
    assert!(rec.statements().is_empty());

    db.table_create(
        "notes",
        &[
            SchemaEntry::indexed("id", FieldType::Number),
            SchemaEntry::indexed("tag", FieldType::String),
            SchemaEntry::new("body", FieldType::Object),
        ],
    )
    .await
    .unwrap();
    assert_eq!(
        rec.statements(),
        vec![
            "CREATE TABLE `notes` (`id` REAL PRIMARY KEY, `tag` TEXT, `body` TEXT)".to_string(),
            "CREATE INDEX `notes_tag_idx` ON `notes` (`tag`)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_table_list_and_drop() {
    let (rec, db) = setup();
    rec.respond(
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        json!([{"name": "docs"}, {"name": "notes"}]),
    );
    assert_eq!(db.table_list().await.unwrap(), vec!["docs", "notes"]);

    db.table_drop("docs").await.unwrap();
    assert_eq!(rec.statements().last().unwrap(), "DROP TABLE IF EXISTS `docs`");
}

#[tokio::test]
async fn test_static_false_filter_never_touches_storage() {
    let (rec, db) = setup();
    let mut table = db.table("docs", schema()).filter(|_| false);
    assert_eq!(table.run().await.unwrap(), json!([]));

    let mut counted = db.table("docs", schema()).filter(|_| false).count();
    assert_eq!(counted.run().await.unwrap(), json!(0));
    assert!(rec.statements().is_empty());
}

#[tokio::test]
async fn test_map_runs_as_post_pass() {
    let (rec, db) = setup();
    rec.respond(
        "SELECT * FROM `docs` LIMIT 2",
        json!([{"key": "a", "value": "1"}, {"key": "b", "value": "2"}]),
    );
    let mut table = db
        .table("docs", schema())
        .limit(2)
        .map(|doc| doc.select("value").mul(10));
    assert_eq!(table.run().await.unwrap(), json!([10, 20]));
}

#[tokio::test]
async fn test_literal_embedding_is_inert() {
    let (rec, db) = setup();
    let mut table = db
        .table("docs", schema())
        .filter(|doc| doc.select("value").eq("a'; DROP TABLE x; --"));
    table.run().await.unwrap();
    assert_eq!(
        rec.statements(),
        vec!["SELECT * FROM `docs` WHERE `key` IN (SELECT `key` FROM `docs` WHERE `value` = 'a''; DROP TABLE x; --')"
            .to_string()]
    );
}

#[tokio::test]
async fn test_structural_filter_matches_function_filter() {
    let (rec, db) = setup();
    db.table("docs", schema())
        .filter_match(json!({"value": {"b": 1}}))
        .run()
        .await
        .unwrap();
    let structural = rec.statements();
    rec.clear();

    db.table("docs", schema())
        .filter(|doc| doc.select("value").select("b").eq(1))
        .run()
        .await
        .unwrap();
    assert_eq!(rec.statements(), structural);
    assert!(structural[0].contains(r#"`value` LIKE '%"b":1,%' ESCAPE '\'"#));
}

#[tokio::test]
async fn test_get_all_by_key_and_index() {
    let (rec, db) = setup();
    let table = db.table("docs", schema());

    table.get_all(["a", "b"], None).run().await.unwrap();
    table.get_all(["x"], Some("value")).run().await.unwrap();
    assert_eq!(
        table
            .get_all(Vec::<&str>::new(), None)
            .run()
            .await
            .unwrap(),
        json!([])
    );
    assert_eq!(
        rec.statements(),
        vec![
            "SELECT * FROM `docs` WHERE `key` IN ('a', 'b')".to_string(),
            "SELECT * FROM `docs` WHERE `value` IN ('x')".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_selection_delete_selects_keys_first() {
    let (rec, db) = setup();
    let keys = "SELECT `key` FROM `docs` WHERE `key` IN ('a', 'b') AND `key` IN (SELECT `key` FROM `docs` WHERE (`value` <> 'x' OR `value` IS NULL))";
    rec.respond(keys, json!([{"key": "a"}]));

    let result = db
        .table("docs", schema())
        .get_all(["a", "b"], None)
        .filter(|doc| doc.select("value").ne("x"))
        .delete()
        .await
        .unwrap();
    assert_eq!(result.deleted, 1);
    assert_eq!(
        rec.statements(),
        vec![
            keys.to_string(),
            "DELETE FROM `docs` WHERE `key` IN ('a')".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_single_selection_run_and_operand() {
    let (rec, db) = setup();
    rec.respond(ROW_A, json!([{"key": "a", "value": "5"}]));
    let table = db.table("docs", schema());

    assert_eq!(table.get("a").select("value").run().await.unwrap(), json!(5));
    assert_eq!(table.get("zzz").run().await.unwrap(), json!(null));

    let mut node = expr(table.get("a")).select("value").add(1);
    assert_eq!(node.run().await.unwrap(), json!(6));
}

#[tokio::test]
async fn test_empty_update_is_delete() {
    let (rec, db) = setup();
    rec.respond(ROW_A, json!([{"key": "a", "value": "5"}]));
    let table = db.table("docs", schema());

    let deleted = table.get("a").delete().await.unwrap();
    let via_delete = rec.statements();
    rec.clear();

    let updated = table.get("a").update(json!({})).await.unwrap();
    assert_eq!(updated, deleted);
    assert_eq!(rec.statements(), via_delete);
    rec.clear();

    let falsy = table
        .get("a")
        .update(json!({"value": 0, "note": ""}))
        .await
        .unwrap();
    assert_eq!(falsy.deleted, 1);
    assert_eq!(rec.statements(), via_delete);
    assert_eq!(
        via_delete,
        vec![ROW_A.to_string(), "DELETE FROM `docs` WHERE `key` = 'a'".to_string()]
    );
}

#[tokio::test]
async fn test_update_and_replace() {
    let (rec, db) = setup();
    rec.respond(ROW_A, json!([{"key": "a", "value": "5"}]));
    let table = db.table("docs", schema());

    let result = table.get("a").update(json!({"value": 7})).await.unwrap();
    assert_eq!(result.replaced, 1);
    assert_eq!(
        rec.statements().last().unwrap(),
        "UPDATE `docs` SET `value` = 7 WHERE `key` = 'a'"
    );

    let result = table.get("a").update(json!({"value": 5})).await.unwrap();
    assert_eq!(result.unchanged, 1);

    let result = table.get("b").update(json!({"value": 1})).await.unwrap();
    assert_eq!(result.skipped, 1);

    let result = table.get("b").replace(json!({"value": 9})).await.unwrap();
    assert_eq!(result.inserted, 1);
    assert_eq!(
        rec.statements().last().unwrap(),
        "INSERT OR REPLACE INTO `docs` (`key`, `value`) VALUES ('b', 9)"
    );

    let err = table
        .get("a")
        .replace(json!({"key": "c", "value": 1}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
}

#[tokio::test]
async fn test_insert_conflict_modes() {
    let (rec, db) = setup();
    rec.respond(ROW_A, json!([{"key": "a", "value": "5"}]));
    let table = db.table("docs", schema());

    let unchanged = table
        .insert(json!({"key": "a", "value": 5}), InsertOptions::default())
        .await
        .unwrap();
    assert_eq!(unchanged.unchanged, 1);
    assert_eq!(rec.statements(), vec![ROW_A.to_string()]);
    rec.clear();

    let strict = table
        .insert(
            json!({"key": "a", "value": 6}),
            InsertOptions::conflict(Conflict::Error),
        )
        .await
        .unwrap();
    assert_eq!(strict.inserted, 1);
    assert_eq!(
        rec.statements(),
        vec!["INSERT INTO `docs` (`key`, `value`) VALUES ('a', 6)".to_string()]
    );
}

#[tokio::test]
async fn test_postgres_upsert() {
    let rec = Recorder::new("key");
    let db = PostgresDatabase::new(rec.clone());
    let table = db.table("docs", schema());

    let result = table
        .insert(
            json!({"key": "a", "value": "it's"}),
            InsertOptions::conflict(Conflict::Update),
        )
        .await
        .unwrap();
    assert_eq!(result.inserted, 1);
    assert_eq!(
        rec.statements(),
        vec![
            "SELECT * FROM \"docs\" WHERE \"key\" = 'a'".to_string(),
            "INSERT INTO \"docs\" (\"key\", \"value\") VALUES ('a', 'it''s') ON CONFLICT (\"key\") DO UPDATE SET \"value\" = excluded.\"value\"".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_storage_failure_degrades_to_result() {
    let (rec, db) = setup();
    rec.fail_writes();
    let table = db.table("docs", schema());

    let result = table
        .insert(json!({"key": "a", "value": 1}), InsertOptions::default())
        .await
        .unwrap();
    assert_eq!(result.errors, 1);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.inserted, 0);
    assert!(result.first_error.unwrap().contains("disk is full"));
}

#[tokio::test]
async fn test_argument_errors_surface_before_statements() {
    let (rec, db) = setup();
    let table = db.table("docs", schema());

    let err = table.insert(json!(5), InsertOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
    let err = table.get("a").update(json!([1])).await.unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
    assert!(rec.statements().is_empty());
}

#[tokio::test]
async fn test_unsupported_filter_is_named() {
    let (_rec, db) = setup();
    let err = db
        .table("docs", schema())
        .filter(|doc| doc.select("a").select("b").select("c").eq(1))
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation { command: "select", .. }));
}

#[tokio::test]
async fn test_postgres_filters_read_text_columns_through_casts() {
    let rec = Recorder::new("key");
    let db = PostgresDatabase::new(rec.clone());
    let table = db.table("docs", schema());

    let numeric = "CASE WHEN CAST(\"value\" AS TEXT) ~ '^-?[0-9]+([.][0-9]+)?([eE][-+]?[0-9]+)?$' \
                   THEN CAST(CAST(\"value\" AS TEXT) AS DOUBLE PRECISION) END";
    let select = format!(
        "SELECT * FROM \"docs\" WHERE \"key\" IN (SELECT \"key\" FROM \"docs\" WHERE {} > 5)",
        numeric
    );
    rec.respond(&select, json!([{"key": "a", "value": "10"}]));

    let rows = table
        .fork()
        .filter(|doc| doc.select("value").gt(5))
        .run()
        .await
        .unwrap();
    assert_eq!(rows, json!([{"key": "a", "value": 10}]));

    table.get_all([7, 8], Some("value")).run().await.unwrap();
    table.get(3).run().await.unwrap();
    assert_eq!(
        rec.statements(),
        vec![
            select,
            "SELECT * FROM \"docs\" WHERE \"value\" IN ('7', '8')".to_string(),
            "SELECT * FROM \"docs\" WHERE \"key\" = '3'".to_string(),
        ]
    );
}
