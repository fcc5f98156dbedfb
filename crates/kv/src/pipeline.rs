//! Stage pipeline compiler
//!
//! Compiles a stream queue into stages applied to each entry of an ordered
//! scan. A stage is either a test (drops the entry when false) or a
//! transform (replaces the entry):
//!
//! - `select` → transform selecting a field
//! - `filter` → test evaluating the predicate against the entry
//! - `distinct` → test backed by the set of fingerprints seen so far
//! - `limit` → test backed by a running counter
//! - `pluck` → transform projecting named fields
//! - `map` → transform invoking the callback
//!
//! The first other operation ends the pipeline; it and everything after it
//! run through the static evaluator over the collected entries.

use std::collections::HashSet;

use tracing::debug;

use chainql_core::value::{fingerprint, type_name};
use chainql_core::{eval, resolve, Error, Func, Predicate, QueryEntry, Result, Value};

enum Stage {
    Select(Value),
    Filter(Predicate),
    Distinct(HashSet<String>),
    Limit(u64),
    Pluck(Vec<String>),
    Map(Func),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Select(_) => "select",
            Stage::Filter(_) => "filter",
            Stage::Distinct(_) => "distinct",
            Stage::Limit(_) => "limit",
            Stage::Pluck(_) => "pluck",
            Stage::Map(_) => "map",
        }
    }

    /// Apply to one entry; `None` drops it
    async fn apply(&mut self, entry: Value) -> Result<Option<Value>> {
        match self {
            Stage::Select(field) => eval::select(entry, field).map(Some),
            Stage::Filter(predicate) => Ok(eval::test_predicate(predicate, &entry)
                .await?
                .then_some(entry)),
            Stage::Distinct(seen) => Ok(seen.insert(fingerprint(&entry)).then_some(entry)),
            Stage::Limit(remaining) => {
                if *remaining == 0 {
                    return Ok(None);
                }
                *remaining -= 1;
                Ok(Some(entry))
            }
            Stage::Pluck(fields) => eval::pluck(entry, fields, "pluck").map(Some),
            Stage::Map(f) => eval::call(f, entry).await.map(Some),
        }
    }
}

/// Compiled stream queue
pub struct Pipeline {
    stages: Vec<Stage>,
    rest: Vec<QueryEntry>,
}

impl Pipeline {
    /// Compile a stream queue, resolving stage operands up front
    ///
    /// # Errors
    ///
    /// Fails when a `select`, `limit` or `pluck` operand cannot be resolved
    /// or has the wrong type.
    pub async fn compile(entries: Vec<QueryEntry>) -> Result<Self> {
        let mut stages = Vec::new();
        let mut entries = entries.into_iter();
        let mut rest = Vec::new();

        while let Some(entry) = entries.next() {
            let command = entry.command();
            let stage = match entry {
                QueryEntry::Select(field) => Stage::Select(resolve(&field).await?),
                QueryEntry::Filter(predicate) => Stage::Filter(predicate),
                QueryEntry::Distinct => Stage::Distinct(HashSet::new()),
                QueryEntry::Limit(n) => {
                    let n = resolve(&n).await?;
                    let count = n.as_f64().ok_or(Error::TypeMismatch {
                        command,
                        expected: "number",
                        actual: type_name(&n),
                    })?;
                    Stage::Limit(count.max(0.0) as u64)
                }
                QueryEntry::Pluck(fields) => Stage::Pluck(eval::field_names(&fields, command).await?),
                QueryEntry::Map(f) => Stage::Map(f),
                other => {
                    rest.push(other);
                    break;
                }
            };
            stages.push(stage);
        }
        rest.extend(entries);

        debug!(
            target: "chainql::kv",
            stages = ?stages.iter().map(Stage::name).collect::<Vec<_>>(),
            post_pass = rest.len(),
            "compiled pipeline"
        );
        Ok(Self { stages, rest })
    }

    /// Whether any operation is left for the post-pass
    pub fn has_post_pass(&self) -> bool {
        !self.rest.is_empty()
    }

    /// Push every entry through the stages, then run the post-pass
    ///
    /// # Errors
    ///
    /// Propagates stage and evaluation errors.
    pub async fn run(mut self, entries: Vec<Value>) -> Result<Value> {
        let mut out = Vec::with_capacity(entries.len());
        'entries: for entry in entries {
            let mut current = entry;
            for stage in self.stages.iter_mut() {
                match stage.apply(current).await? {
                    Some(next) => current = next,
                    None => continue 'entries,
                }
            }
            out.push(current);
        }
        eval::evaluate(Value::Array(out), self.rest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainql_core::{Chain, Datum};
    use serde_json::json;

    struct Queue(Vec<QueryEntry>);

    impl Chain for Queue {
        fn entries_mut(&mut self) -> &mut Vec<QueryEntry> {
            &mut self.0
        }
    }

    fn rows() -> Vec<Value> {
        vec![
            json!({"k": "a", "v": 1}),
            json!({"k": "b", "v": 2}),
            json!({"k": "c", "v": 2}),
            json!({"k": "d", "v": 3}),
        ]
    }

    async fn run(q: Queue) -> Value {
        Pipeline::compile(q.0).await.unwrap().run(rows()).await.unwrap()
    }

    #[tokio::test]
    async fn test_filter_drops_entries() {
        let out = run(Queue(vec![]).filter(|d: Datum| d.select("v").gt(1))).await;
        assert_eq!(out.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_select_distinct_limit_in_order() {
        let out = run(Queue(vec![]).select("v").distinct().limit(2)).await;
        assert_eq!(out, json!([1, 2]));

        let out = run(Queue(vec![]).limit(2).select("v").distinct()).await;
        assert_eq!(out, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_pluck_and_map() {
        let out = run(Queue(vec![]).pluck(["k"]).limit(1)).await;
        assert_eq!(out, json!([{"k": "a"}]));

        let out = run(Queue(vec![]).map(|d: Datum| d.select("v").mul(2))).await;
        assert_eq!(out, json!([2, 4, 4, 6]));
    }

    #[tokio::test]
    async fn test_post_pass_after_first_other_operation() {
        let pipeline = Pipeline::compile(Queue(vec![]).limit(3).count().0)
            .await
            .unwrap();
        assert!(pipeline.has_post_pass());
        assert_eq!(pipeline.run(rows()).await.unwrap(), json!(3));

        let out = run(Queue(vec![]).filter_match(json!({"v": 2})).count()).await;
        assert_eq!(out, json!(2));
    }
}
