//! Scalar filter compiler
//!
//! Turns a row predicate into one boolean SQL expression. The predicate is
//! invoked with a row-reference [`Datum`], and the queue it builds is folded
//! left to right:
//!
//! - `select` fills the pending column slot, a second `select` fills the
//!   pending sub-field slot (a field inside a JSON-serialized column), a
//!   third one is rejected
//! - `eq`/`ne` on a sub-field render `LIKE` patterns against the stored JSON
//!   text, otherwise `col = v` terms OR-ed together (`IS NULL` for null);
//!   `ne` also holds for a `NULL` column
//! - comparisons render the whole chain: `col > v1 AND v1 > v2`
//! - `substr`, `len` and arithmetic rewrite the pending column expression
//! - `or`/`and` combine the accumulated expression with their operands
//! - `not` negates the accumulated expression, or the next term when nothing
//!   has been accumulated yet
//!
//! Every literal goes through [`Dialect::literal`]. A column compared with a
//! number is read through [`Dialect::numeric_view`], one compared with or
//! sliced as text through [`Dialect::text_view`].

use futures::future::{BoxFuture, FutureExt};

use chainql_core::value::{to_text, truthy, type_name};
use chainql_core::{resolve, Datum, Error, Operand, Predicate, QueryEntry, Result, Value};

use crate::dialect::{like_escape, Dialect};

/// A compiled row test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Boolean SQL expression over the row's columns
    Sql(String),
    /// Outcome known without touching storage
    Const(bool),
}

impl Condition {
    fn not(self) -> Condition {
        match self {
            Condition::Const(b) => Condition::Const(!b),
            Condition::Sql(s) => Condition::Sql(format!("NOT ({})", s)),
        }
    }
}

/// Join conditions with `AND` or `OR`, folding constants
///
/// `absorbing` is the constant that decides the whole group: `false` for
/// `AND`, `true` for `OR`.
fn combine(parts: Vec<Condition>, keyword: &str, absorbing: bool) -> Condition {
    let mut sql = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            Condition::Const(b) if b == absorbing => return Condition::Const(absorbing),
            Condition::Const(_) => {}
            Condition::Sql(s) => sql.push(s),
        }
    }
    match sql.len() {
        0 => Condition::Const(!absorbing),
        1 => Condition::Sql(sql.remove(0)),
        _ => Condition::Sql(format!("({})", sql.join(&format!(" {} ", keyword)))),
    }
}

fn and_all(parts: Vec<Condition>) -> Condition {
    combine(parts, "AND", false)
}

fn or_any(parts: Vec<Condition>) -> Condition {
    combine(parts, "OR", true)
}

/// Compile a `filter` predicate
///
/// # Errors
///
/// Returns `UnsupportedOperation` for operations SQL cannot express and
/// propagates failures from resolving operands.
pub async fn compile_predicate<D: Dialect>(dialect: &D, predicate: &Predicate) -> Result<Condition> {
    condition(dialect, predicate.invoke(Datum::row())).await
}

/// Compile an operand used as a boolean
fn condition<'a, D: Dialect>(dialect: &'a D, operand: Operand) -> BoxFuture<'a, Result<Condition>> {
    async move {
        match operand {
            Operand::Node(node) if node.is_row() => {
                let mut node = *node;
                Compiler::new(dialect).run(node.drain()).await?.into_condition()
            }
            other => Ok(Condition::Const(truthy(&resolve(&other).await?))),
        }
    }
    .boxed()
}

/// One side of a binary test
enum Term {
    Null,
    Literal(Value),
    /// Expression over the row; `numeric` when it always yields a number
    Expr { sql: String, numeric: bool },
}

impl Term {
    fn column(sql: String, numeric: bool) -> Self {
        Term::Expr { sql, numeric }
    }
}

/// Compile an operand used as a value
fn value_sql<'a, D: Dialect>(dialect: &'a D, operand: &'a Operand) -> BoxFuture<'a, Result<Term>> {
    async move {
        match operand {
            Operand::Node(node) if node.is_row() => {
                let mut node = node.as_ref().clone();
                Compiler::new(dialect).run(node.drain()).await?.into_value()
            }
            other => {
                let value = resolve(other).await?;
                Ok(if value.is_null() {
                    Term::Null
                } else {
                    Term::Literal(value)
                })
            }
        }
    }
    .boxed()
}

/// Resolve an operand that must be a plain value
async fn plain_value(operand: &Operand, command: &'static str) -> Result<Value> {
    if let Operand::Node(node) = operand {
        if node.is_row() {
            return Err(Error::unsupported(
                command,
                "a row reference cannot be used as this operand",
            ));
        }
    }
    resolve(operand).await
}

struct Compiler<'a, D> {
    dialect: &'a D,
    /// Pending column expression
    sel: Option<String>,
    /// `sel` always yields a number
    numeric: bool,
    /// Pending field inside the JSON text of `sel`
    sel2: Option<String>,
    /// Accumulated boolean expression
    expr: Option<Condition>,
    /// Negate the next emitted term
    negate_next: bool,
}

impl<'a, D: Dialect> Compiler<'a, D> {
    fn new(dialect: &'a D) -> Self {
        Self {
            dialect,
            sel: None,
            numeric: false,
            sel2: None,
            expr: None,
            negate_next: false,
        }
    }

    async fn run(mut self, entries: Vec<QueryEntry>) -> Result<Self> {
        for entry in entries {
            self.step(entry).await?;
        }
        Ok(self)
    }

    async fn step(&mut self, entry: QueryEntry) -> Result<()> {
        let command = entry.command();
        match entry {
            QueryEntry::Select(field) => {
                let field = match plain_value(&field, command).await? {
                    Value::String(s) => s,
                    other => {
                        return Err(Error::unsupported(
                            command,
                            format!("only named fields can be selected, got {}", other),
                        ))
                    }
                };
                if self.sel.is_none() {
                    self.sel = Some(self.dialect.quote_ident(&field));
                    self.numeric = false;
                } else if self.sel2.is_none() {
                    self.sel2 = Some(field);
                } else {
                    return Err(Error::unsupported(command, "cannot filter via sub-objects"));
                }
            }
            QueryEntry::Eq(ops) => self.equality(command, &ops, false).await?,
            QueryEntry::Ne(ops) => self.equality(command, &ops, true).await?,
            QueryEntry::Gt(ops) => self.comparison(command, &ops, ">").await?,
            QueryEntry::Lt(ops) => self.comparison(command, &ops, "<").await?,
            QueryEntry::Ge(ops) => self.comparison(command, &ops, ">=").await?,
            QueryEntry::Le(ops) => self.comparison(command, &ops, "<=").await?,
            QueryEntry::StartsWith(op) => {
                let column = self.dialect.text_view(&self.take_column(command)?);
                let prefix = plain_value(&op, command).await?;
                let pattern = format!("{}%", like_escape(&to_text(&prefix)));
                self.emit(Condition::Sql(self.like(&column, &pattern, false)));
            }
            QueryEntry::EndsWith(op) => {
                let column = self.dialect.text_view(&self.take_column(command)?);
                let suffix = plain_value(&op, command).await?;
                let pattern = format!("%{}", like_escape(&to_text(&suffix)));
                self.emit(Condition::Sql(self.like(&column, &pattern, false)));
            }
            QueryEntry::Substr { start, len } => {
                let column = self.dialect.text_view(&self.take_column(command)?);
                let start = integer(plain_value(&start, command).await?, command)?;
                let from = if start >= 0 {
                    start.saturating_add(1).to_string()
                } else {
                    format!("length({}) - {}", column, start.saturating_add(1).saturating_neg())
                };
                let expr = match len {
                    Some(len) => {
                        let len = integer(plain_value(&len, command).await?, command)?;
                        format!("substr({}, {}, {})", column, from, len.max(0))
                    }
                    None => format!("substr({}, {})", column, from),
                };
                self.sel = Some(expr);
                self.numeric = false;
            }
            QueryEntry::Len => {
                let column = self.dialect.text_view(&self.take_column(command)?);
                self.sel = Some(format!("length({})", column));
                self.numeric = true;
            }
            QueryEntry::Add(ops) => self.arithmetic(command, &ops, "+").await?,
            QueryEntry::Sub(ops) => self.arithmetic(command, &ops, "-").await?,
            QueryEntry::Mul(ops) => self.arithmetic(command, &ops, "*").await?,
            QueryEntry::Div(ops) => self.arithmetic(command, &ops, "/").await?,
            QueryEntry::Mod(ops) => self.arithmetic(command, &ops, "%").await?,
            QueryEntry::Or(ops) => self.boolean(command, ops, true).await?,
            QueryEntry::And(ops) => self.boolean(command, ops, false).await?,
            QueryEntry::Not => {
                self.flush(command)?;
                match self.expr.take() {
                    Some(expr) => self.expr = Some(expr.not()),
                    None => self.negate_next = !self.negate_next,
                }
            }
            QueryEntry::Do(_)
            | QueryEntry::Branch(_)
            | QueryEntry::Count
            | QueryEntry::Limit(_)
            | QueryEntry::Difference(_)
            | QueryEntry::Contains(_)
            | QueryEntry::Filter(_)
            | QueryEntry::Pluck(_)
            | QueryEntry::Map(_)
            | QueryEntry::Distinct => {
                return Err(Error::unsupported(
                    command,
                    "cannot be compiled into a SQL filter",
                ))
            }
        }
        Ok(())
    }

    /// Take the pending column and sub-field slots
    fn take_selection(&mut self, command: &'static str) -> Result<(String, Option<String>)> {
        match self.sel.take() {
            Some(column) => Ok((column, self.sel2.take())),
            None => Err(Error::unsupported(command, "requires a selected column")),
        }
    }

    /// Take the pending column as a comparison term
    fn take_term(&mut self, command: &'static str) -> Result<Term> {
        let numeric = self.numeric;
        Ok(Term::column(self.take_column(command)?, numeric))
    }

    /// Take the pending column, rejecting a pending sub-field
    fn take_column(&mut self, command: &'static str) -> Result<String> {
        match self.take_selection(command)? {
            (column, None) => Ok(column),
            (_, Some(_)) => Err(Error::unsupported(
                command,
                "only equality is supported inside sub-objects",
            )),
        }
    }

    /// Append a finished term to the accumulated expression
    fn emit(&mut self, term: Condition) {
        let term = if std::mem::take(&mut self.negate_next) {
            term.not()
        } else {
            term
        };
        self.expr = Some(match self.expr.take() {
            Some(expr) => and_all(vec![expr, term]),
            None => term,
        });
    }

    /// Turn a dangling column selection into a truthiness test
    fn flush(&mut self, command: &'static str) -> Result<()> {
        if self.sel.is_some() {
            let column = self.take_column(command)?;
            let term = format!("{} = {}", column, self.dialect.comparable(&Value::Bool(true)));
            self.emit(Condition::Sql(term));
        }
        Ok(())
    }

    fn like(&self, column: &str, pattern: &str, negated: bool) -> String {
        format!(
            "{} {} {}{}",
            column,
            if negated { "NOT LIKE" } else { "LIKE" },
            self.dialect.quote_text(pattern),
            self.dialect.like_escape_clause()
        )
    }

    /// Match `"field":<json>` inside the serialized column text
    fn sub_object(&self, column: &str, field: &str, value: &Value, negated: bool) -> Condition {
        let needle = like_escape(&format!("{}:{}", Value::String(field.to_string()), value));
        let terms = [",", "}"]
            .iter()
            .map(|end| Condition::Sql(self.like(column, &format!("%{}{}%", needle, end), negated)))
            .collect();
        if negated {
            and_all(terms)
        } else {
            or_any(terms)
        }
    }

    fn render(&self, term: &Term) -> String {
        match term {
            Term::Null => "NULL".to_string(),
            Term::Literal(value @ Value::Number(_)) => self.dialect.literal(value),
            Term::Literal(value) => self.dialect.comparable(value),
            Term::Expr { sql, .. } => sql.clone(),
        }
    }

    /// Render a term, reading an expression the way the other side needs
    fn view(&self, term: &Term, other: &Term) -> String {
        match (term, other) {
            (Term::Expr { sql, numeric: false }, Term::Literal(Value::Number(_))) => {
                self.dialect.numeric_view(sql)
            }
            (Term::Expr { sql, .. }, Term::Literal(Value::String(_))) => self.dialect.text_view(sql),
            _ => self.render(term),
        }
    }

    /// Both sides of a binary test
    fn pair(&self, lhs: &Term, rhs: &Term) -> (String, String) {
        (self.view(lhs, rhs), self.view(rhs, lhs))
    }

    async fn equality(&mut self, command: &'static str, ops: &[Operand], negated: bool) -> Result<()> {
        let sub_field = self.sel2.take();
        let column = self.take_term(command)?;
        let mut terms = Vec::with_capacity(ops.len());
        for op in ops {
            let term = match &sub_field {
                Some(field) => {
                    let value = plain_value(op, command).await?;
                    self.sub_object(&self.dialect.text_view(&self.render(&column)), field, &value, negated)
                }
                None => Condition::Sql(match value_sql(self.dialect, op).await? {
                    Term::Null if negated => format!("{} IS NOT NULL", self.render(&column)),
                    Term::Null => format!("{} IS NULL", self.render(&column)),
                    value => {
                        let (lhs, rhs) = self.pair(&column, &value);
                        match value {
                            _ if !negated => format!("{} = {}", lhs, rhs),
                            Term::Expr { .. } => format!(
                                "({} <> {} OR ({} IS NULL) <> ({} IS NULL))",
                                lhs, rhs, lhs, rhs
                            ),
                            _ => format!("({} <> {} OR {} IS NULL)", lhs, rhs, lhs),
                        }
                    }
                }),
            };
            terms.push(term);
        }
        self.emit(or_any(terms));
        Ok(())
    }

    async fn comparison(&mut self, command: &'static str, ops: &[Operand], operator: &str) -> Result<()> {
        let mut chain = vec![self.take_term(command)?];
        for op in ops {
            chain.push(value_sql(self.dialect, op).await?);
        }
        let terms = chain
            .windows(2)
            .map(|pair| {
                let (lhs, rhs) = self.pair(&pair[0], &pair[1]);
                Condition::Sql(format!("{} {} {}", lhs, operator, rhs))
            })
            .collect();
        self.emit(and_all(terms));
        Ok(())
    }

    async fn arithmetic(&mut self, command: &'static str, ops: &[Operand], operator: &str) -> Result<()> {
        let mut expr = match self.take_term(command)? {
            Term::Expr { sql, numeric: false } => self.dialect.numeric_view(&sql),
            other => self.render(&other),
        };
        for op in ops {
            let rhs = match value_sql(self.dialect, op).await? {
                Term::Expr { sql, numeric: false } => self.dialect.numeric_view(&sql),
                other => self.render(&other),
            };
            expr = format!("({} {} {})", expr, operator, rhs);
        }
        self.sel = Some(expr);
        self.numeric = true;
        Ok(())
    }

    async fn boolean(&mut self, command: &'static str, ops: Vec<Operand>, is_or: bool) -> Result<()> {
        self.flush(command)?;
        let Some(expr) = self.expr.take() else {
            return Err(Error::unsupported(command, "requires a preceding condition"));
        };
        let mut parts = vec![expr];
        for op in ops {
            parts.push(condition(self.dialect, op).await?);
        }
        self.expr = Some(if is_or { or_any(parts) } else { and_all(parts) });
        Ok(())
    }

    fn into_condition(mut self) -> Result<Condition> {
        self.flush("filter")?;
        Ok(self.expr.unwrap_or(Condition::Const(!self.negate_next)))
    }

    fn into_value(self) -> Result<Term> {
        match (self.sel, self.sel2, self.expr) {
            (Some(column), None, None) => Ok(Term::column(column, self.numeric)),
            (None, None, Some(Condition::Sql(s))) => Ok(Term::column(format!("({})", s), false)),
            (None, None, Some(Condition::Const(b))) => Ok(Term::Literal(Value::Bool(b))),
            _ => Err(Error::unsupported(
                "select",
                "a row reference operand must select one column",
            )),
        }
    }
}

fn integer(value: Value, command: &'static str) -> Result<i64> {
    value
        .as_f64()
        .map(|f| f as i64)
        .ok_or(Error::TypeMismatch {
            command,
            expected: "number",
            actual: type_name(&value),
        })
}
