//! Datum: a single deferred expression node
//!
//! A `Datum` owns its seed (a literal, task or nested node) and its queue
//! of operations. Building appends to the queue; [`Datum::run`] drains it
//! and folds it over the resolved seed with the static evaluator.
//!
//! The special *row reference* datum stands for "the row under test" when a
//! predicate is compiled for a backend instead of evaluated. It has no
//! value and cannot be run.

use std::fmt;

use crate::chain::Chain;
use crate::error::{Error, Result};
use crate::eval;
use crate::query::{Operand, QueryEntry};
use crate::resolve::resolve;
use crate::value::Value;

/// Where a datum's value comes from
#[derive(Clone)]
enum Source {
    /// The row under test during predicate compilation
    Row,
    /// A literal, task or nested node
    Operand(Operand),
}

/// Deferred scalar expression node
#[derive(Clone)]
pub struct Datum {
    source: Source,
    entries: Vec<QueryEntry>,
}

/// Root factory: wrap a value (or deferred value) into a node
pub fn expr(value: impl Into<Operand>) -> Datum {
    Datum::new(value)
}

impl Datum {
    /// Create a node seeded by `value`
    pub fn new(value: impl Into<Operand>) -> Self {
        Self {
            source: Source::Operand(value.into()),
            entries: Vec::new(),
        }
    }

    /// Create the row-reference placeholder used to compile predicates
    pub fn row() -> Self {
        Self {
            source: Source::Row,
            entries: Vec::new(),
        }
    }

    /// Whether this node is (derived from) the row-reference placeholder
    pub fn is_row(&self) -> bool {
        matches!(self.source, Source::Row)
    }

    /// Queued operations, oldest first
    pub fn entries(&self) -> &[QueryEntry] {
        &self.entries
    }

    /// Take the queued operations, leaving the queue empty
    pub fn drain(&mut self) -> Vec<QueryEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Execute the queued operations against the seed value
    ///
    /// The queue is drained before evaluation starts, so running the same
    /// node again only applies operations queued after this call. Fork
    /// first to reuse a chain.
    ///
    /// # Errors
    ///
    /// Fails if the seed cannot be resolved, if an operation fails, or if
    /// this is a row reference.
    pub async fn run(&mut self) -> Result<Value> {
        let entries = self.drain();
        let seed = match &self.source {
            Source::Row => {
                return Err(Error::argument(
                    "a row reference can only be evaluated inside a query",
                ))
            }
            Source::Operand(op) => resolve(op).await?,
        };
        eval::evaluate(seed, entries).await
    }
}

impl Chain for Datum {
    fn entries_mut(&mut self) -> &mut Vec<QueryEntry> {
        &mut self.entries
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Row => "row".to_string(),
            Source::Operand(op) => format!("{:?}", op),
        };
        f.debug_struct("Datum")
            .field("source", &source)
            .field("entries", &self.entries)
            .finish()
    }
}
