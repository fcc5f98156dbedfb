//! Static evaluator
//!
//! Folds a queue of [`QueryEntry`] over one already-known value. This is
//! what `expr(..).run()` uses, and what the backends use for post-fetch
//! row transforms, `map` callbacks and any tail of a chain they could not
//! push down.
//!
//! Operands of each entry are resolved right before the entry executes.

use std::cmp::Ordering;
use std::collections::HashSet;

use futures::future::{BoxFuture, FutureExt};
use tracing::trace;

use crate::datum::Datum;
use crate::error::{Error, Result};
use crate::query::{BranchArg, Operand, Predicate, QueryEntry};
use crate::resolve::{resolve, resolve_all};
use crate::value::{compare, fingerprint, loose_eq, number, to_text, truthy, type_name, Object, Value};

/// Evaluate `entries` in order against `value`
pub fn evaluate(value: Value, entries: Vec<QueryEntry>) -> BoxFuture<'static, Result<Value>> {
    async move {
        let mut current = value;
        for entry in entries {
            trace!(target: "chainql::eval", command = entry.command(), "apply");
            current = apply(current, entry).await?;
        }
        Ok(current)
    }
    .boxed()
}

/// Test a predicate against one value
pub async fn test_predicate(predicate: &Predicate, value: &Value) -> Result<bool> {
    let outcome = resolve(&predicate.invoke(Datum::new(value.clone()))).await?;
    Ok(truthy(&outcome))
}

/// Invoke a callback with a node wrapping `value` and resolve its result
pub async fn call(f: &crate::query::Func, value: Value) -> Result<Value> {
    resolve(&f(Datum::new(value))).await
}

async fn apply(current: Value, entry: QueryEntry) -> Result<Value> {
    let command = entry.command();
    match entry {
        QueryEntry::Select(field) => {
            let field = resolve(&field).await?;
            select(current, &field)
        }
        QueryEntry::Eq(ops) => {
            let values = resolve_all(&ops).await?;
            Ok(Value::Bool(values.iter().any(|v| loose_eq(&current, v))))
        }
        QueryEntry::Ne(ops) => {
            let values = resolve_all(&ops).await?;
            Ok(Value::Bool(values.iter().any(|v| !loose_eq(&current, v))))
        }
        QueryEntry::Or(ops) => {
            let values = resolve_all(&ops).await?;
            Ok(values
                .into_iter()
                .fold(current, |acc, v| if truthy(&acc) { acc } else { v }))
        }
        QueryEntry::And(ops) => {
            let values = resolve_all(&ops).await?;
            Ok(values
                .into_iter()
                .fold(current, |acc, v| if truthy(&acc) { v } else { acc }))
        }
        QueryEntry::Not => Ok(Value::Bool(!truthy(&current))),
        QueryEntry::Do(f) => call(&f, current).await,
        QueryEntry::Branch(args) => branch(current, &args).await,
        QueryEntry::StartsWith(op) => {
            let prefix = to_text(&resolve(&op).await?);
            Ok(Value::Bool(to_text(&current).starts_with(&prefix)))
        }
        QueryEntry::EndsWith(op) => {
            let suffix = to_text(&resolve(&op).await?);
            Ok(Value::Bool(to_text(&current).ends_with(&suffix)))
        }
        QueryEntry::Substr { start, len } => {
            let start = integer(&resolve(&start).await?, command)?;
            let len = match len {
                Some(op) => Some(integer(&resolve(&op).await?, command)?),
                None => None,
            };
            Ok(Value::String(substr(&to_text(&current), start, len)))
        }
        QueryEntry::Len => match &current {
            Value::Null => Ok(Value::from(0)),
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(items) => Ok(Value::from(items.len())),
            other => Err(mismatch(command, "string or array", other)),
        },
        QueryEntry::Add(ops) => {
            let values = resolve_all(&ops).await?;
            if let Value::String(s) = &current {
                let mut out = s.clone();
                for v in &values {
                    out.push_str(&to_text(v));
                }
                return Ok(Value::String(out));
            }
            arithmetic(current, values, command, |a, b| Ok(a + b))
        }
        QueryEntry::Sub(ops) => {
            let values = resolve_all(&ops).await?;
            arithmetic(current, values, command, |a, b| Ok(a - b))
        }
        QueryEntry::Mul(ops) => {
            let values = resolve_all(&ops).await?;
            arithmetic(current, values, command, |a, b| Ok(a * b))
        }
        QueryEntry::Div(ops) => {
            let values = resolve_all(&ops).await?;
            arithmetic(current, values, command, |a, b| {
                if b == 0.0 {
                    Err(Error::argument("division by zero"))
                } else {
                    Ok(a / b)
                }
            })
        }
        QueryEntry::Mod(ops) => {
            let values = resolve_all(&ops).await?;
            arithmetic(current, values, command, |a, b| {
                if b == 0.0 {
                    Err(Error::argument("modulo by zero"))
                } else {
                    Ok(a % b)
                }
            })
        }
        QueryEntry::Gt(ops) => ordered_chain(current, &ops, |o| o == Ordering::Greater).await,
        QueryEntry::Lt(ops) => ordered_chain(current, &ops, |o| o == Ordering::Less).await,
        QueryEntry::Ge(ops) => ordered_chain(current, &ops, |o| o != Ordering::Less).await,
        QueryEntry::Le(ops) => ordered_chain(current, &ops, |o| o != Ordering::Greater).await,
        QueryEntry::Count => Ok(Value::from(array(current, command)?.len())),
        QueryEntry::Limit(op) => {
            let mut items = array(current, command)?;
            let n = integer(&resolve(&op).await?, command)?.max(0) as usize;
            items.truncate(n);
            Ok(Value::Array(items))
        }
        QueryEntry::Difference(op) => {
            let mut items = array(current, command)?;
            let remove = array(resolve(&op).await?, command)?;
            items.retain(|item| !remove.iter().any(|r| loose_eq(item, r)));
            Ok(Value::Array(items))
        }
        QueryEntry::Contains(ops) => {
            let items = array(current, command)?;
            let wanted = resolve_all(&ops).await?;
            Ok(Value::Bool(
                wanted.iter().all(|w| items.iter().any(|i| loose_eq(i, w))),
            ))
        }
        QueryEntry::Filter(predicate) => {
            let items = array(current, command)?;
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                if test_predicate(&predicate, &item).await? {
                    kept.push(item);
                }
            }
            Ok(Value::Array(kept))
        }
        QueryEntry::Pluck(ops) => {
            let items = array(current, command)?;
            let fields = field_names(&ops, command).await?;
            items
                .into_iter()
                .map(|item| pluck(item, &fields, command))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        QueryEntry::Map(f) => {
            let items = array(current, command)?;
            let mut mapped = Vec::with_capacity(items.len());
            for item in items {
                mapped.push(call(&f, item).await?);
            }
            Ok(Value::Array(mapped))
        }
        QueryEntry::Distinct => {
            let items = array(current, command)?;
            let mut seen = HashSet::new();
            Ok(Value::Array(
                items
                    .into_iter()
                    .filter(|item| seen.insert(fingerprint(item)))
                    .collect(),
            ))
        }
    }
}

/// Select a field of an object, an index of an array, or map a field
/// selection over an array. Selecting through `null` or a scalar gives `null`.
pub fn select(current: Value, field: &Value) -> Result<Value> {
    match (current, field) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Object(mut obj), Value::String(key)) => Ok(obj.remove(key).unwrap_or(Value::Null)),
        (Value::Array(items), Value::Number(n)) => {
            let idx = n.as_i64().unwrap_or(0);
            let idx = if idx < 0 { items.len() as i64 + idx } else { idx };
            Ok(usize::try_from(idx)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Null))
        }
        (Value::Array(items), Value::String(_)) => items
            .into_iter()
            .map(|item| select(item, field))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (Value::Array(_), other) | (Value::Object(_), other) => {
            Err(mismatch("select", "string or number", other))
        }
        // Scalars have no fields
        _ => Ok(Value::Null),
    }
}

/// Project an object onto `fields`
pub fn pluck(item: Value, fields: &[String], command: &'static str) -> Result<Value> {
    match item {
        Value::Object(mut obj) => {
            let mut out = Object::new();
            for field in fields {
                if let Some(v) = obj.remove(field) {
                    out.insert(field.clone(), v);
                }
            }
            Ok(Value::Object(out))
        }
        other => Err(mismatch(command, "object", &other)),
    }
}

/// Resolve operands that must be field names
pub async fn field_names(ops: &[Operand], command: &'static str) -> Result<Vec<String>> {
    resolve_all(ops)
        .await?
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s),
            other => Err(mismatch(command, "string", &other)),
        })
        .collect()
}

async fn branch(current: Value, args: &[BranchArg]) -> Result<Value> {
    if args.len() < 2 {
        return Err(Error::argument("branch requires a true and a false action"));
    }
    let last = args.len() - 1;
    if truthy(&current) {
        return branch_value(&args[0], &current).await;
    }
    // Odd positions are tests, each followed by its action; the last
    // argument is always the fallback
    let mut i = 1;
    while i + 1 < last {
        if truthy(&branch_value(&args[i], &current).await?) {
            return branch_value(&args[i + 1], &current).await;
        }
        i += 2;
    }
    branch_value(&args[last], &current).await
}

async fn branch_value(arg: &BranchArg, current: &Value) -> Result<Value> {
    match arg {
        BranchArg::Value(op) => resolve(op).await,
        BranchArg::Func(f) => call(f, current.clone()).await,
    }
}

async fn ordered_chain(
    current: Value,
    ops: &[Operand],
    holds: impl Fn(Ordering) -> bool,
) -> Result<Value> {
    let mut chain = vec![current];
    chain.extend(resolve_all(ops).await?);
    let ok = chain
        .windows(2)
        .all(|pair| compare(&pair[0], &pair[1]).map(&holds).unwrap_or(false));
    Ok(Value::Bool(ok))
}

fn arithmetic(
    current: Value,
    values: Vec<Value>,
    command: &'static str,
    op: impl Fn(f64, f64) -> Result<f64>,
) -> Result<Value> {
    let mut acc = as_f64(&current, command)?;
    for v in &values {
        acc = op(acc, as_f64(v, command)?)?;
    }
    Ok(number(acc))
}

fn as_f64(value: &Value, command: &'static str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| mismatch(command, "number", value))
}

fn integer(value: &Value, command: &'static str) -> Result<i64> {
    Ok(as_f64(value, command)? as i64)
}

fn array(value: Value, command: &'static str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(mismatch(command, "array", &other)),
    }
}

fn mismatch(command: &'static str, expected: &'static str, actual: &Value) -> Error {
    Error::TypeMismatch {
        command,
        expected,
        actual: type_name(actual),
    }
}

fn substr(s: &str, start: i64, len: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let total = chars.len() as i64;
    let from = if start < 0 { (total + start).max(0) } else { start.min(total) };
    let to = match len {
        Some(n) => from.saturating_add(n.max(0)).min(total),
        None => total,
    };
    chars[from as usize..to as usize].iter().collect()
}
