//! Checks and failure handling shared by backend writes
//!
//! Argument problems are raised before anything reaches storage. Storage
//! and serialization failures on a write are reported inside the
//! [`WriteResult`] instead of failing the call.

use tracing::warn;

use crate::error::{Error, Result};
use crate::value::{loose_eq, type_name, Object, Value};
use crate::write_result::WriteResult;

/// Require a single object argument for `command`
pub fn single_document(value: Value, command: &str) -> Result<Object> {
    match value {
        Value::Object(obj) => Ok(obj),
        other => Err(Error::argument(format!(
            "{} expects an object, got {}",
            command,
            type_name(&other)
        ))),
    }
}

/// Reject a document that names a different primary key than `key`
pub fn check_key(doc: &Object, primary_key: &str, key: &Value) -> Result<()> {
    match doc.get(primary_key) {
        Some(v) if !v.is_null() && !loose_eq(v, key) => Err(Error::argument(format!(
            "cannot change primary key `{}` from {} to {}",
            primary_key, key, v
        ))),
        _ => Ok(()),
    }
}

/// Keep argument and compile errors, degrade storage failures
pub fn degrade(
    backend: &'static str,
    table: &str,
    op: &'static str,
    outcome: Result<WriteResult>,
) -> Result<WriteResult> {
    match outcome {
        Err(e @ (Error::Storage(_) | Error::Serialization(_))) => {
            warn!(target: "chainql::write", backend, table, op, error = %e, "write failed");
            Ok(WriteResult::failure(e.to_string()))
        }
        other => other,
    }
}

/// Implement [`Chain`](crate::Chain), `From<_> for Operand` and `Debug`
/// for backend node types
///
/// Each type needs an `entries: Vec<QueryEntry>` field, a `handle` with a
/// `name`, and an inherent async `run`. A leading `<D: Bound>` makes the
/// impls generic over the types' single parameter.
#[macro_export]
macro_rules! impl_chain {
    (<$param:ident: $bound:path> $($ty:ident),+ $(,)?) => {
        $(
            impl<$param: $bound> $crate::Chain for $ty<$param> {
                fn entries_mut(&mut self) -> &mut ::std::vec::Vec<$crate::QueryEntry> {
                    &mut self.entries
                }
            }

            impl<$param: $bound> ::std::convert::From<$ty<$param>> for $crate::Operand {
                fn from(node: $ty<$param>) -> Self {
                    $crate::Operand::task(move || {
                        let mut node = node.clone();
                        async move { node.run().await }
                    })
                }
            }

            impl<$param> ::std::fmt::Debug for $ty<$param> {
                fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                    f.debug_struct(stringify!($ty))
                        .field("table", &self.handle.name)
                        .field("entries", &self.entries)
                        .finish()
                }
            }
        )+
    };
    ($($ty:ident),+ $(,)?) => {
        $(
            impl $crate::Chain for $ty {
                fn entries_mut(&mut self) -> &mut ::std::vec::Vec<$crate::QueryEntry> {
                    &mut self.entries
                }
            }

            impl ::std::convert::From<$ty> for $crate::Operand {
                fn from(node: $ty) -> Self {
                    $crate::Operand::task(move || {
                        let mut node = node.clone();
                        async move { node.run().await }
                    })
                }
            }

            impl ::std::fmt::Debug for $ty {
                fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                    f.debug_struct(stringify!($ty))
                        .field("table", &self.handle.name)
                        .field("entries", &self.entries)
                        .finish()
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::query::{Operand, QueryEntry};
    use serde_json::json;

    fn doc(value: Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_single_document_rejects_non_objects() {
        assert!(single_document(json!({"a": 1}), "update").is_ok());
        let err = single_document(json!([1]), "update").unwrap_err();
        assert!(matches!(err, Error::Argument(ref m) if m.contains("update expects an object, got array")));
    }

    #[test]
    fn test_check_key_allows_same_or_missing_key() {
        assert!(check_key(&doc(json!({"id": 1})), "id", &json!(1.0)).is_ok());
        assert!(check_key(&doc(json!({"id": null})), "id", &json!(1)).is_ok());
        assert!(check_key(&doc(json!({"v": 2})), "id", &json!(1)).is_ok());
        let err = check_key(&doc(json!({"id": 2})), "id", &json!(1)).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_degrade_keeps_argument_errors() {
        let failed = degrade("test", "t", "insert", Err(Error::storage("disk is full"))).unwrap();
        assert_eq!(failed.errors, 1);
        assert_eq!(failed.first_error.as_deref(), Some("storage error: disk is full"));

        let err = degrade("test", "t", "insert", Err(Error::argument("bad"))).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));

        let ok = degrade("test", "t", "insert", Ok(WriteResult::inserted(2))).unwrap();
        assert_eq!(ok.inserted, 2);
    }

    struct Handle {
        name: &'static str,
    }

    #[derive(Clone)]
    struct Node {
        handle: std::sync::Arc<Handle>,
        entries: Vec<QueryEntry>,
    }

    impl Node {
        async fn run(&mut self) -> Result<Value> {
            Ok(json!(std::mem::take(&mut self.entries).len()))
        }
    }

    impl_chain!(Node);

    #[tokio::test]
    async fn test_impl_chain_wires_node_types() {
        let node = Node {
            handle: std::sync::Arc::new(Handle { name: "t" }),
            entries: Vec::new(),
        }
        .count()
        .distinct();
        assert_eq!(format!("{:?}", node), r#"Node { table: "t", entries: [count, distinct] }"#);
        assert_eq!(crate::resolve(&Operand::from(node)).await.unwrap(), json!(2));
    }
}
