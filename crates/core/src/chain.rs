//! The expression algebra shared by every node kind
//!
//! `Chain` is implemented by [`Datum`](crate::Datum) and by every backend
//! table/selection type. Each builder appends exactly one [`QueryEntry`]
//! and hands the node back, so calls chain fluently:
//!
//! ```ignore
//! let mut node = expr(json!({"a": {"b": 3}})).select("a").select("b").gt(2);
//! assert_eq!(node.run().await?, json!(true));
//! ```
//!
//! Builders consume the node. To branch a chain without mutating it, call
//! [`Chain::fork`] first; the fork owns a deep copy of the queue.

use crate::error::{Error, Result};
use crate::query::{func, BranchArg, Operand, Predicate, QueryEntry};
use crate::datum::Datum;
use crate::value::Value;

fn operands<I, V>(values: I) -> Vec<Operand>
where
    I: IntoIterator<Item = V>,
    V: Into<Operand>,
{
    values.into_iter().map(Into::into).collect()
}

/// Operation-queueing builder surface
pub trait Chain: Sized {
    /// Mutable access to the node's queue
    fn entries_mut(&mut self) -> &mut Vec<QueryEntry>;

    /// Append one entry
    fn push(mut self, entry: QueryEntry) -> Self {
        self.entries_mut().push(entry);
        self
    }

    /// Copy the node so the copy and the original evolve independently
    fn fork(&self) -> Self
    where
        Self: Clone,
    {
        self.clone()
    }

    /// Narrow to a field (or array index) of the current value
    fn select(self, field: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Select(field.into()))
    }

    /// Equal to `value`
    fn eq(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Eq(vec![value.into()]))
    }

    /// Equal to any of `values`
    fn eq_any<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.push(QueryEntry::Eq(operands(values)))
    }

    /// Different from `value`
    fn ne(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Ne(vec![value.into()]))
    }

    /// Different from any of `values`
    fn ne_any<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.push(QueryEntry::Ne(operands(values)))
    }

    /// Boolean OR with `value`
    fn or(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Or(vec![value.into()]))
    }

    /// Boolean OR with every value
    fn or_any<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.push(QueryEntry::Or(operands(values)))
    }

    /// Boolean AND with `value`
    fn and(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::And(vec![value.into()]))
    }

    /// Boolean AND with every value
    fn and_all<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.push(QueryEntry::And(operands(values)))
    }

    /// Boolean negation
    fn not(self) -> Self {
        self.push(QueryEntry::Not)
    }

    /// Invoke `f` with a node wrapping the current value (`do`)
    fn apply<F, R>(self, f: F) -> Self
    where
        F: Fn(Datum) -> R + Send + Sync + 'static,
        R: Into<Operand>,
    {
        self.push(QueryEntry::Do(func(f)))
    }

    /// `branch(trueAction, [test, action]*, falseAction)`
    ///
    /// The current value is the first test. After the true action an odd
    /// number of arguments must follow: `[test, action]` pairs and the
    /// final false action.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` immediately when the false action is missing.
    fn branch<I, A>(self, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<BranchArg>,
    {
        let args: Vec<BranchArg> = args.into_iter().map(Into::into).collect();
        if args.len() < 2 || args.len() % 2 != 0 {
            return Err(Error::argument(format!(
                "branch expects a true action, [test, action] pairs and a false action, got {} arguments",
                args.len()
            )));
        }
        Ok(self.push(QueryEntry::Branch(args)))
    }

    /// String prefix test
    fn starts_with(self, prefix: impl Into<Operand>) -> Self {
        self.push(QueryEntry::StartsWith(prefix.into()))
    }

    /// String suffix test
    fn ends_with(self, suffix: impl Into<Operand>) -> Self {
        self.push(QueryEntry::EndsWith(suffix.into()))
    }

    /// Substring from `start` to the end
    fn substr(self, start: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Substr {
            start: start.into(),
            len: None,
        })
    }

    /// Substring of `len` characters from `start`
    fn substr_len(self, start: impl Into<Operand>, len: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Substr {
            start: start.into(),
            len: Some(len.into()),
        })
    }

    /// Length of a string or array
    fn len(self) -> Self {
        self.push(QueryEntry::Len)
    }

    /// Add `value`
    fn add(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Add(vec![value.into()]))
    }

    /// Subtract `value`
    fn sub(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Sub(vec![value.into()]))
    }

    /// Multiply by `value`
    fn mul(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Mul(vec![value.into()]))
    }

    /// Divide by `value`
    fn div(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Div(vec![value.into()]))
    }

    /// Remainder of division by `value` (`mod`)
    fn modulo(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Mod(vec![value.into()]))
    }

    /// Greater than `value`
    fn gt(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Gt(vec![value.into()]))
    }

    /// `current > v1 > v2 > ...`
    fn gt_seq<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.push(QueryEntry::Gt(operands(values)))
    }

    /// Less than `value`
    fn lt(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Lt(vec![value.into()]))
    }

    /// `current < v1 < v2 < ...`
    fn lt_seq<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.push(QueryEntry::Lt(operands(values)))
    }

    /// Greater than or equal to `value`
    fn ge(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Ge(vec![value.into()]))
    }

    /// `current >= v1 >= v2 >= ...`
    fn ge_seq<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.push(QueryEntry::Ge(operands(values)))
    }

    /// Less than or equal to `value`
    fn le(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Le(vec![value.into()]))
    }

    /// `current <= v1 <= v2 <= ...`
    fn le_seq<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.push(QueryEntry::Le(operands(values)))
    }

    /// Number of elements
    fn count(self) -> Self {
        self.push(QueryEntry::Count)
    }

    /// Keep at most `n` elements
    fn limit(self, n: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Limit(n.into()))
    }

    /// Remove the elements of `values`
    fn difference(self, values: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Difference(values.into()))
    }

    /// True when `value` is an element
    fn contains(self, value: impl Into<Operand>) -> Self {
        self.push(QueryEntry::Contains(vec![value.into()]))
    }

    /// True when every value is an element
    fn contains_all<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.push(QueryEntry::Contains(operands(values)))
    }

    /// Keep elements for which `f` is truthy
    fn filter<F, R>(self, f: F) -> Self
    where
        F: Fn(Datum) -> R + Send + Sync + 'static,
        R: Into<Operand>,
    {
        self.push(QueryEntry::Filter(Predicate::Func(func(f))))
    }

    /// Keep elements matching a deep-partial object (or a constant)
    fn filter_match(self, pattern: Value) -> Self {
        self.push(QueryEntry::Filter(Predicate::structural(pattern)))
    }

    /// Project each element onto `fields`
    fn pluck<I, V>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.push(QueryEntry::Pluck(operands(fields)))
    }

    /// Replace each element by `f(element)`
    fn map<F, R>(self, f: F) -> Self
    where
        F: Fn(Datum) -> R + Send + Sync + 'static,
        R: Into<Operand>,
    {
        self.push(QueryEntry::Map(func(f)))
    }

    /// Drop repeated elements
    fn distinct(self) -> Self {
        self.push(QueryEntry::Distinct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::expr;

    #[test]
    fn test_builders_append_one_entry_each() {
        let node = expr(1).add(2).mul(3).gt(4).not();
        let commands: Vec<_> = node.entries().iter().map(|e| e.command()).collect();
        assert_eq!(commands, vec!["add", "mul", "gt", "not"]);
    }

    #[test]
    fn test_branch_rejects_missing_false_action() {
        let err = expr(true).branch(["yes"]).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));

        assert!(expr(true).branch(["a", "t", "b"]).is_err());

        let empty: Vec<BranchArg> = Vec::new();
        assert!(expr(true).branch(empty).is_err());
    }

    #[test]
    fn test_branch_accepts_pairs_and_false_action() {
        assert!(expr(true).branch(["yes", "no"]).is_ok());
        assert!(expr(true).branch(["a", "t", "b", "c"]).is_ok());
    }

    #[test]
    fn test_fork_is_independent() {
        let parent = expr(1).add(1);
        let child = parent.fork().add(5).mul(2);
        assert_eq!(parent.entries().len(), 1);
        assert_eq!(child.entries().len(), 3);
    }
}
