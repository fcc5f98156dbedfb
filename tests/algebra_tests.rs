//! Algebra Integration Tests
//!
//! Queue semantics and evaluator behavior observed through the facade.

mod common;

use chainql::{expr, Chain, ChainConfig, Conflict, Error};
use serde_json::json;

#[tokio::test]
async fn test_fork_independence() {
    common::init_tracing();
    let base = expr(json!([1, 2, 3])).filter(|d| d.gt(1));
    let mut fork = base.fork().count();
    let mut base = base;

    assert_eq!(fork.run().await.unwrap(), json!(2));
    assert_eq!(base.run().await.unwrap(), json!([2, 3]));
}

#[tokio::test]
async fn test_drain_invariant() {
    let mut node = expr(json!([1, 2, 3])).map(|d| d.mul(10));
    assert_eq!(node.run().await.unwrap(), json!([10, 20, 30]));
    // The map ran and was drained; the source is untouched
    assert_eq!(node.run().await.unwrap(), json!([1, 2, 3]));

    let mut node = node.count();
    assert_eq!(node.run().await.unwrap(), json!(3));
}

#[tokio::test]
async fn test_variadic_equality() {
    assert_eq!(expr(5).eq_any([3, 5, 7]).run().await.unwrap(), json!(true));
    assert_eq!(expr(5).ne_any([3, 7]).run().await.unwrap(), json!(true));
    assert_eq!(expr(5).ne(5).run().await.unwrap(), json!(false));
}

#[tokio::test]
async fn test_comparison_chain() {
    assert_eq!(expr(10).gt_seq([5, 2]).run().await.unwrap(), json!(true));
    assert_eq!(expr(10).gt_seq([5, 20]).run().await.unwrap(), json!(false));
}

#[tokio::test]
async fn test_branch() {
    let mut no = expr(3).gt(5).branch(["yes", "no"]).unwrap();
    assert_eq!(no.run().await.unwrap(), json!("no"));
    let mut yes = expr(10).gt(5).branch(["yes", "no"]).unwrap();
    assert_eq!(yes.run().await.unwrap(), json!("yes"));

    let err = expr(1).branch(["only"]).unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
}

#[tokio::test]
async fn test_nested_node_operands() {
    let total = expr(json!([1, 2, 3])).count();
    let mut node = expr(4).add(total);
    assert_eq!(node.run().await.unwrap(), json!(7));
}

#[test]
fn test_config_from_toml() {
    let config = ChainConfig::from_toml_str("conflict = \"update\"\nid_attempts = 3").unwrap();
    assert_eq!(config.conflict, Conflict::Update);
    assert_eq!(config.id_attempts, 3);
    assert!(ChainConfig::from_toml_str("id_attempts = 0").is_err());
}
