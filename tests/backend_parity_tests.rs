//! Backend Parity Tests
//!
//! The same chain must give the same answer when evaluated statically over
//! an array and when compiled to a key-value pipeline over a table holding
//! that array.

mod common;

use chainql::{expr, Chain, Datum, Value};
use serde_json::json;

fn docs() -> Value {
    json!([
        {"key": "a", "value": 5, "tags": {"kind": "x"}},
        {"key": "b", "value": 2, "tags": {"kind": "y"}},
        {"key": "c", "value": 5, "tags": {"kind": "x"}},
        {"key": "d", "value": 9, "tags": null}
    ])
}

async fn check<F>(chain: F)
where
    F: Fn(Datum) -> Datum,
{
    let mut stat = chain(expr(docs()));
    let expected = stat.run().await.unwrap();

    let table = common::kv_table(docs()).await;
    let mut entries = chain(Datum::row());
    let mut node = table.fork();
    for entry in entries.drain() {
        node = node.push(entry);
    }
    assert_eq!(node.run().await.unwrap(), expected);
}

#[tokio::test]
async fn test_filter_parity() {
    check(|d| d.filter(|doc| doc.select("value").eq(5))).await;
    check(|d| d.filter(|doc| doc.select("value").gt_seq([3, 1]))).await;
    check(|d| d.filter_match(json!({"tags": {"kind": "x"}}))).await;
}

#[tokio::test]
async fn test_projection_parity() {
    check(|d| d.select("value").distinct()).await;
    check(|d| d.pluck(["key"]).limit(2)).await;
    check(|d| d.limit(3).map(|doc| doc.select("value").add(1))).await;
}

#[tokio::test]
async fn test_post_pass_parity() {
    check(|d| d.filter(|doc| doc.select("value").lt(6)).count()).await;
    check(|d| d.select("value").contains(9)).await;
}
