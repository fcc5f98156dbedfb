//! Queued operations and their operands
//!
//! A node's deferred computation is an ordered `Vec<QueryEntry>`. Every
//! entry is one operation with strongly typed operand slots, so each
//! backend compiles the queue with an exhaustive `match`.
//!
//! Operands are `Operand`s: a literal, a zero-argument async task, or a
//! nested expression node. They are resolved (see [`crate::resolve`])
//! right before the operation that consumes them executes.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::chain::Chain;
use crate::datum::Datum;
use crate::error::Result;
use crate::value::{Object, Value};

/// Callback invoked with a node wrapping the current value (`do`, `map`,
/// `filter`)
pub type Func = Arc<dyn Fn(Datum) -> Operand + Send + Sync>;

/// Zero-argument async computation producing a value
pub type Task = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Wrap a closure into a [`Func`]
pub fn func<F, R>(f: F) -> Func
where
    F: Fn(Datum) -> R + Send + Sync + 'static,
    R: Into<Operand>,
{
    Arc::new(move |doc| f(doc).into())
}

/// A possibly still-deferred operand
#[derive(Clone)]
pub enum Operand {
    /// Already-known value
    Literal(Value),
    /// Async zero-argument task
    Task(Task),
    /// Nested expression node, resolved by running a fork of it
    Node(Box<Datum>),
}

impl Operand {
    /// Build a task operand from an async closure
    pub fn task<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Operand::Task(Arc::new(move || Box::pin(f())))
    }

    /// Literal value, if this operand needs no resolution
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Operand::Literal(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(v) => write!(f, "Literal({})", v),
            Operand::Task(_) => f.write_str("Task(..)"),
            Operand::Node(d) => f.debug_tuple("Node").field(d).finish(),
        }
    }
}

macro_rules! impl_literal_from {
    ($target:ident, $wrap:expr; $($t:ty),*) => {
        $(
            impl From<$t> for $target {
                fn from(v: $t) -> Self {
                    $wrap(Value::from(v))
                }
            }
        )*
    };
}

impl_literal_from!(Operand, Operand::Literal; Value, &str, String, bool, i32, i64, u32, u64, usize, f64);

impl From<Datum> for Operand {
    fn from(d: Datum) -> Self {
        Operand::Node(Box::new(d))
    }
}

/// One argument of a `branch` call: a value, or a function of the current value
#[derive(Clone)]
pub enum BranchArg {
    /// Value (or deferred value) used as-is
    Value(Operand),
    /// Callback receiving a node wrapping the current value
    Func(Func),
}

impl BranchArg {
    /// Build a callback argument
    pub fn func<F, R>(f: F) -> Self
    where
        F: Fn(Datum) -> R + Send + Sync + 'static,
        R: Into<Operand>,
    {
        BranchArg::Func(func(f))
    }
}

impl fmt::Debug for BranchArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchArg::Value(op) => f.debug_tuple("Value").field(op).finish(),
            BranchArg::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl_literal_from!(BranchArg, |v| BranchArg::Value(Operand::Literal(v)); Value, &str, String, bool, i32, i64, u32, u64, usize, f64);

impl From<Operand> for BranchArg {
    fn from(op: Operand) -> Self {
        BranchArg::Value(op)
    }
}

impl From<Datum> for BranchArg {
    fn from(d: Datum) -> Self {
        BranchArg::Value(Operand::from(d))
    }
}

/// Row predicate accepted by `filter`
#[derive(Clone)]
pub enum Predicate {
    /// Callback building a test from the row node
    Func(Func),
    /// Deep-partial object: conjunction of (possibly nested) equality tests
    Match(Object),
    /// Constant predicate, tested for truthiness
    Constant(Value),
}

impl Predicate {
    /// Build a predicate from a structural value
    ///
    /// Objects become `Match` predicates, anything else is a constant.
    pub fn structural(value: Value) -> Self {
        match value {
            Value::Object(obj) => Predicate::Match(obj),
            other => Predicate::Constant(other),
        }
    }

    /// Apply the predicate to a row node, producing the test operand
    pub fn invoke(&self, doc: Datum) -> Operand {
        match self {
            Predicate::Func(f) => f(doc),
            Predicate::Match(pattern) => match_operand(doc, pattern),
            Predicate::Constant(v) => Operand::Literal(v.clone()),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Func(_) => f.write_str("Func(..)"),
            Predicate::Match(obj) => write!(f, "Match({})", Value::Object(obj.clone())),
            Predicate::Constant(v) => write!(f, "Constant({})", v),
        }
    }
}

/// Expand a structural pattern against a row node
///
/// `{a: {b: 1}, c: 2}` becomes `doc.select("a").select("b").eq(1)
/// .and(doc.select("c").eq(2))`. Empty nested objects add no constraint.
fn match_operand(doc: Datum, pattern: &Object) -> Operand {
    let mut leaves = Vec::new();
    collect_leaves(pattern, &mut Vec::new(), &mut leaves);

    let mut tests = leaves.into_iter().map(|(path, expected)| {
        path.into_iter()
            .fold(doc.fork(), |node, field| node.select(field))
            .eq(expected)
    });

    match tests.next() {
        None => Operand::Literal(Value::Bool(true)),
        Some(first) => {
            let rest: Vec<Operand> = tests.map(Operand::from).collect();
            if rest.is_empty() {
                first.into()
            } else {
                first.and_all(rest).into()
            }
        }
    }
}

fn collect_leaves(pattern: &Object, path: &mut Vec<String>, out: &mut Vec<(Vec<String>, Value)>) {
    for (key, value) in pattern {
        path.push(key.clone());
        match value {
            Value::Object(nested) => collect_leaves(nested, path, out),
            leaf => out.push((path.clone(), leaf.clone())),
        }
        path.pop();
    }
}

/// One queued operation
#[derive(Clone)]
pub enum QueryEntry {
    /// Attribute (or array index) selection
    Select(Operand),
    /// Equal to any of the operands
    Eq(Vec<Operand>),
    /// Different from any of the operands
    Ne(Vec<Operand>),
    /// Boolean OR seeded by the current value
    Or(Vec<Operand>),
    /// Boolean AND seeded by the current value
    And(Vec<Operand>),
    /// Boolean negation
    Not,
    /// Invoke a callback with the current value (`do`)
    Do(Func),
    /// if / else-if* / else
    Branch(Vec<BranchArg>),
    /// String prefix test
    StartsWith(Operand),
    /// String suffix test
    EndsWith(Operand),
    /// Substring by character position
    Substr {
        /// Start position, negative counts from the end
        start: Operand,
        /// Optional length
        len: Option<Operand>,
    },
    /// Length of a string or array
    Len,
    /// Sum (or string concatenation)
    Add(Vec<Operand>),
    /// Difference
    Sub(Vec<Operand>),
    /// Product
    Mul(Vec<Operand>),
    /// Quotient
    Div(Vec<Operand>),
    /// Remainder
    Mod(Vec<Operand>),
    /// Strictly decreasing chain `[current, ..operands]`
    Gt(Vec<Operand>),
    /// Strictly increasing chain
    Lt(Vec<Operand>),
    /// Non-increasing chain
    Ge(Vec<Operand>),
    /// Non-decreasing chain
    Le(Vec<Operand>),
    /// Number of elements
    Count,
    /// Keep the first n elements
    Limit(Operand),
    /// Remove elements present in the operand array
    Difference(Operand),
    /// True when every operand is an element
    Contains(Vec<Operand>),
    /// Keep elements matching the predicate
    Filter(Predicate),
    /// Project each element onto the named fields
    Pluck(Vec<Operand>),
    /// Replace each element by the callback result
    Map(Func),
    /// Drop repeated elements
    Distinct,
}

impl QueryEntry {
    /// Operation name used in error messages
    pub fn command(&self) -> &'static str {
        match self {
            QueryEntry::Select(_) => "select",
            QueryEntry::Eq(_) => "eq",
            QueryEntry::Ne(_) => "ne",
            QueryEntry::Or(_) => "or",
            QueryEntry::And(_) => "and",
            QueryEntry::Not => "not",
            QueryEntry::Do(_) => "do",
            QueryEntry::Branch(_) => "branch",
            QueryEntry::StartsWith(_) => "starts_with",
            QueryEntry::EndsWith(_) => "ends_with",
            QueryEntry::Substr { .. } => "substr",
            QueryEntry::Len => "len",
            QueryEntry::Add(_) => "add",
            QueryEntry::Sub(_) => "sub",
            QueryEntry::Mul(_) => "mul",
            QueryEntry::Div(_) => "div",
            QueryEntry::Mod(_) => "mod",
            QueryEntry::Gt(_) => "gt",
            QueryEntry::Lt(_) => "lt",
            QueryEntry::Ge(_) => "ge",
            QueryEntry::Le(_) => "le",
            QueryEntry::Count => "count",
            QueryEntry::Limit(_) => "limit",
            QueryEntry::Difference(_) => "difference",
            QueryEntry::Contains(_) => "contains",
            QueryEntry::Filter(_) => "filter",
            QueryEntry::Pluck(_) => "pluck",
            QueryEntry::Map(_) => "map",
            QueryEntry::Distinct => "distinct",
        }
    }
}

impl fmt::Debug for QueryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.command();
        match self {
            QueryEntry::Select(op)
            | QueryEntry::StartsWith(op)
            | QueryEntry::EndsWith(op)
            | QueryEntry::Limit(op)
            | QueryEntry::Difference(op) => f.debug_tuple(name).field(op).finish(),
            QueryEntry::Eq(ops)
            | QueryEntry::Ne(ops)
            | QueryEntry::Or(ops)
            | QueryEntry::And(ops)
            | QueryEntry::Add(ops)
            | QueryEntry::Sub(ops)
            | QueryEntry::Mul(ops)
            | QueryEntry::Div(ops)
            | QueryEntry::Mod(ops)
            | QueryEntry::Gt(ops)
            | QueryEntry::Lt(ops)
            | QueryEntry::Ge(ops)
            | QueryEntry::Le(ops)
            | QueryEntry::Contains(ops)
            | QueryEntry::Pluck(ops) => f.debug_tuple(name).field(ops).finish(),
            QueryEntry::Substr { start, len } => f
                .debug_struct(name)
                .field("start", start)
                .field("len", len)
                .finish(),
            QueryEntry::Branch(args) => f.debug_tuple(name).field(args).finish(),
            QueryEntry::Filter(predicate) => f.debug_tuple(name).field(predicate).finish(),
            QueryEntry::Do(_) | QueryEntry::Map(_) => write!(f, "{}(..)", name),
            QueryEntry::Not | QueryEntry::Len | QueryEntry::Count | QueryEntry::Distinct => {
                f.write_str(name)
            }
        }
    }
}
