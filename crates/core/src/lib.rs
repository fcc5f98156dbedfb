//! Core types for chainql
//!
//! This crate defines the backend-agnostic query algebra:
//! - Value: loose comparison helpers over `serde_json::Value`
//! - QueryEntry / Operand: one queued operation and its deferred operands
//! - Chain: the builder surface shared by every node kind
//! - Datum: a deferred scalar expression node (`expr(..)`)
//! - resolve: literal-or-task-or-node resolution
//! - eval: the static evaluator
//! - Schema: table schema and stored-row decoding
//! - mutation: write argument checks and storage-failure degradation
//! - WriteResult, ChainConfig, Error

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod config;
pub mod datum;
pub mod error;
pub mod eval;
pub mod mutation;
pub mod query;
pub mod resolve;
pub mod schema;
pub mod value;
pub mod write_result;

pub use chain::Chain;
pub use config::{ChainConfig, Conflict, InsertOptions};
pub use datum::{expr, Datum};
pub use error::{Error, Result};
pub use query::{func, BranchArg, Func, Operand, Predicate, QueryEntry, Task};
pub use resolve::{resolve, resolve_all};
pub use schema::{decode_row, decode_value, primary_field, validate_schema, FieldType, SchemaEntry};
pub use value::{Object, Value};
pub use write_result::WriteResult;
