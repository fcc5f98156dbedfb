//! Table schema and row decoding
//!
//! A table is bound to a list of [`SchemaEntry`]s. Backends that store
//! scalars (SQL columns) decode each fetched row back to the declared
//! types:
//!
//! | Type     | Decoding |
//! |----------|----------|
//! | `string` | passthrough |
//! | `number` | numeric coercion |
//! | `bool`   | truthiness |
//! | `object` | JSON parse, malformed input is an error |
//! | `any`    | JSON parse, raw value on failure |

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{number, truthy, Object, Value};

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text
    String,
    /// Boolean
    Bool,
    /// Number
    Number,
    /// JSON object, stored serialized
    Object,
    /// Anything, stored serialized when not a scalar
    Any,
}

/// One field of a table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    /// Field name
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field is indexed
    #[serde(default)]
    pub index: bool,
}

impl SchemaEntry {
    /// Create a non-indexed entry
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            index: false,
        }
    }

    /// Create an indexed entry
    pub fn indexed(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            index: true,
            ..Self::new(name, field_type)
        }
    }
}

/// Validate a schema for table creation
///
/// # Errors
///
/// Returns `Error::Argument` for an empty schema or a blank field name.
pub fn validate_schema(schema: &[SchemaEntry]) -> Result<()> {
    if schema.is_empty() {
        return Err(Error::argument("table schema must have at least one field"));
    }
    if let Some(entry) = schema.iter().find(|e| e.name.is_empty()) {
        return Err(Error::argument(format!(
            "schema field names must not be empty: {:?}",
            entry
        )));
    }
    Ok(())
}

/// Name of the primary-key field: the first indexed entry, else the first
pub fn primary_field(schema: &[SchemaEntry]) -> Option<&SchemaEntry> {
    schema.iter().find(|e| e.index).or_else(|| schema.first())
}

/// Decode one stored scalar to its declared type
///
/// # Errors
///
/// Fails when an `object` field holds malformed JSON.
pub fn decode_value(field_type: FieldType, stored: Value) -> Result<Value> {
    if stored.is_null() {
        return Ok(Value::Null);
    }
    match field_type {
        FieldType::String => Ok(stored),
        FieldType::Number => Ok(match &stored {
            Value::Number(_) => stored,
            Value::String(s) => s.trim().parse::<f64>().map(number).unwrap_or(Value::Null),
            Value::Bool(b) => Value::from(u8::from(*b)),
            _ => Value::Null,
        }),
        FieldType::Bool => Ok(Value::Bool(match &stored {
            Value::String(s) => !matches!(s.as_str(), "" | "0" | "false"),
            other => truthy(other),
        })),
        FieldType::Object => match stored {
            Value::String(text) => Ok(serde_json::from_str(&text)?),
            other => Ok(other),
        },
        FieldType::Any => match stored {
            Value::String(text) => Ok(serde_json::from_str(&text).unwrap_or(Value::String(text))),
            other => Ok(other),
        },
    }
}

/// Decode a stored row, leaving undeclared columns untouched
pub fn decode_row(schema: &[SchemaEntry], row: Object) -> Result<Value> {
    let mut out = Object::new();
    for (name, stored) in row {
        let decoded = match schema.iter().find(|e| e.name == name) {
            Some(entry) => decode_value(entry.field_type, stored)?,
            None => stored,
        };
        out.insert(name, decoded);
    }
    Ok(Value::Object(out))
}
