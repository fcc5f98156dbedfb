//! Value helpers for chainql
//!
//! Documents, literals and evaluation results are all `serde_json::Value`.
//! This module adds the loose comparison rules the evaluator and compilers
//! share:
//!
//! - Numbers compare by their `f64` value, so `5 == 5.0`
//! - Arrays and objects compare element-wise with the same rule
//! - Ordering exists only between two numbers, two strings or two bools
//! - `null`, `false`, `0`, `NaN` and `""` are falsy
//!
//! Arithmetic results that are integral are stored as integers so that
//! `2 + 3` serializes as `5`, not `5.0`.

use std::cmp::Ordering;

use crate::error::{Error, Result};

pub use serde_json::{Map, Number, Value};

/// A JSON object, keys in insertion order
pub type Object = Map<String, Value>;

/// Get the type name of a value as used in error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Truthiness of a value
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Loose equality: numbers by value, containers deeply
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| loose_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map(|other| loose_eq(v, other)).unwrap_or(false))
        }
        _ => a == b,
    }
}

/// Ordering between two values, `None` when the pair is unordered
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Build a number value, preferring an integer representation
pub fn number(f: f64) -> Value {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < (i64::MAX as f64) {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Coerce a value to text for string operations
///
/// `null` becomes the empty string; strings pass through; everything else
/// uses its JSON rendering.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Stable fingerprint used for distinct tracking and store keys
pub fn fingerprint(value: &Value) -> String {
    match value {
        // Integral floats share a fingerprint with the matching integer
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => number(f).to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Whether two documents hold the same data, ignoring `null` fields
///
/// A stored row reads back with `null` for every column the written
/// document did not set, so absent and `null` fields are treated alike.
pub fn same_document(a: &Value, b: &Value) -> bool {
    fn present(value: &Value) -> Value {
        match value {
            Value::Object(obj) => Value::Object(
                obj.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
    loose_eq(&present(a), &present(b))
}

/// Split an insert argument into documents
///
/// # Errors
///
/// Returns `Error::Argument` unless `value` is an object or an array of
/// objects.
pub fn documents(value: Value) -> Result<Vec<Object>> {
    let shape_error = |v: &Value| {
        Error::argument(format!("insert expects an object or an array of objects, got {}", type_name(v)))
    };
    match value {
        Value::Object(obj) => Ok(vec![obj]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(obj) => Ok(obj),
                other => Err(shape_error(&other)),
            })
            .collect(),
        other => Err(shape_error(&other)),
    }
}
