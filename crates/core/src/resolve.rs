//! Deferred resolution
//!
//! Turns a literal-or-task-or-node into a concrete value. Literals pass
//! through, tasks are awaited, nodes are forked and run (their own
//! operands resolve recursively on the way).

use futures::future::{BoxFuture, FutureExt};

use crate::error::Result;
use crate::query::Operand;
use crate::value::Value;

/// Resolve one operand to a value
pub fn resolve(operand: &Operand) -> BoxFuture<'static, Result<Value>> {
    match operand {
        Operand::Literal(v) => {
            let v = v.clone();
            async move { Ok(v) }.boxed()
        }
        Operand::Task(task) => task(),
        Operand::Node(node) => {
            let mut node = node.as_ref().clone();
            async move { node.run().await }.boxed()
        }
    }
}

/// Resolve every operand, in order
pub async fn resolve_all(operands: &[Operand]) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(operands.len());
    for op in operands {
        values.push(resolve(op).await?);
    }
    Ok(values)
}
