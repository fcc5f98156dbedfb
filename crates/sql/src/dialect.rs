//! SQL dialects and literal embedding
//!
//! The two dialects generate statements with identical structure. They
//! differ in identifier quoting, literal escaping, boolean literals,
//! column types and the replace-on-conflict insert form.
//!
//! ## Literal embedding
//!
//! [`Dialect::literal`] ("safen") is the only injection defense: every
//! value interpolated into generated SQL goes through it. Text is wrapped
//! in single quotes with embedded quotes doubled; objects and arrays are
//! JSON-serialized and then quoted; numbers pass through.
//!
//! ## Loosely typed columns
//!
//! `any` columns hold values of every JSON type. SQLite declares them
//! `BLOB` so stored numbers keep their numeric storage class and compare
//! numerically. Postgres stores them as `TEXT`; the filter compiler reads
//! them through [`Dialect::numeric_view`] and [`Dialect::text_view`] and
//! embeds compared scalars with [`Dialect::comparable`], so the same
//! statement is valid whatever the declared column type.

use chainql_core::{FieldType, Value};

/// Character used to escape `LIKE` wildcards
pub const LIKE_ESCAPE: char = '\\';

/// Escape `%`, `_` and the escape character itself for a `LIKE` pattern
pub fn like_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// A SQL flavor
pub trait Dialect: Clone + Default + Send + Sync + 'static {
    /// Dialect name for logs
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column, index name)
    fn quote_ident(&self, name: &str) -> String;

    /// Quote a text literal
    fn quote_text(&self, text: &str) -> String;

    /// Boolean literal
    fn bool_literal(&self, b: bool) -> &'static str;

    /// Column type used at table creation
    fn column_type(&self, field_type: FieldType) -> &'static str;

    /// Statement listing table names in a `name` column
    fn list_tables_sql(&self) -> String;

    /// Insert that overwrites an existing row with the same primary key
    ///
    /// `schema_columns` lists every declared column so that columns absent
    /// from the new row can be reset where the dialect needs it.
    fn replace_sql(
        &self,
        table: &str,
        primary_key: &str,
        columns: &[String],
        values: &[String],
        schema_columns: &[String],
    ) -> String;

    /// Embed a value as a SQL literal ("safen")
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.bool_literal(*b).to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => self.quote_text(s),
            Value::Array(_) | Value::Object(_) => self.quote_text(&value.to_string()),
        }
    }

    /// Literal compared against a column of unknown declared type
    fn comparable(&self, value: &Value) -> String {
        self.literal(value)
    }

    /// An expression read as a number, `NULL` where it holds none
    fn numeric_view(&self, expr: &str) -> String {
        expr.to_string()
    }

    /// An expression read as text
    fn text_view(&self, expr: &str) -> String {
        expr.to_string()
    }

    /// `ESCAPE` clause matching [`like_escape`]
    fn like_escape_clause(&self) -> String {
        format!(" ESCAPE {}", self.quote_text(&LIKE_ESCAPE.to_string()))
    }

    /// Comma-separated quoted identifiers
    fn ident_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote_ident(n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn double(text: &str, quote: char) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        if c == quote {
            out.push(quote);
        }
        out.push(c);
    }
    out.push(quote);
    out
}

/// `INSERT … ON CONFLICT (pk) DO UPDATE SET col = excluded.col` for every
/// non-key column in `set_columns`
pub(crate) fn upsert_sql<D: Dialect>(
    dialect: &D,
    table: &str,
    primary_key: &str,
    columns: &[String],
    values: &[String],
    set_columns: &[String],
    reset_columns: &[String],
) -> String {
    let mut assignments: Vec<String> = set_columns
        .iter()
        .filter(|c| c.as_str() != primary_key)
        .map(|c| {
            let c = dialect.quote_ident(c);
            format!("{} = excluded.{}", c, c)
        })
        .collect();
    assignments.extend(
        reset_columns
            .iter()
            .filter(|c| c.as_str() != primary_key && !columns.contains(c))
            .map(|c| format!("{} = NULL", dialect.quote_ident(c))),
    );
    let action = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        dialect.quote_ident(table),
        dialect.ident_list(columns),
        values.join(", "),
        dialect.quote_ident(primary_key),
        action
    )
}

/// SQLite flavor
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        double(name, '`')
    }

    fn quote_text(&self, text: &str) -> String {
        double(text, '\'')
    }

    fn bool_literal(&self, b: bool) -> &'static str {
        if b {
            "1"
        } else {
            "0"
        }
    }

    fn column_type(&self, field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::String | FieldType::Object => "TEXT",
            FieldType::Any => "BLOB",
            FieldType::Number => "REAL",
            FieldType::Bool => "INTEGER",
        }
    }

    fn list_tables_sql(&self) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name".to_string()
    }

    fn replace_sql(
        &self,
        table: &str,
        _primary_key: &str,
        columns: &[String],
        values: &[String],
        _schema_columns: &[String],
    ) -> String {
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            self.ident_list(columns),
            values.join(", ")
        )
    }
}

/// Text that Postgres reads back as a `DOUBLE PRECISION`
const NUMERIC_PATTERN: &str = "^-?[0-9]+([.][0-9]+)?([eE][-+]?[0-9]+)?$";

/// Postgres flavor
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        double(name, '"')
    }

    fn quote_text(&self, text: &str) -> String {
        if text.contains('\\') {
            format!("E{}", double(&text.replace('\\', "\\\\"), '\''))
        } else {
            double(text, '\'')
        }
    }

    fn bool_literal(&self, b: bool) -> &'static str {
        if b {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn column_type(&self, field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::String | FieldType::Object | FieldType::Any => "TEXT",
            FieldType::Number => "DOUBLE PRECISION",
            FieldType::Bool => "BOOLEAN",
        }
    }

    /// Untyped quoted literal, coerced by Postgres to the column's type
    fn comparable(&self, value: &Value) -> String {
        match value {
            Value::Bool(_) | Value::Number(_) => self.quote_text(&value.to_string()),
            other => self.literal(other),
        }
    }

    fn numeric_view(&self, expr: &str) -> String {
        let text = self.text_view(expr);
        format!(
            "CASE WHEN {} ~ {} THEN CAST({} AS DOUBLE PRECISION) END",
            text,
            self.quote_text(NUMERIC_PATTERN),
            text
        )
    }

    fn text_view(&self, expr: &str) -> String {
        format!("CAST({} AS TEXT)", expr)
    }

    fn list_tables_sql(&self) -> String {
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = 'public' ORDER BY table_name"
            .to_string()
    }

    fn replace_sql(
        &self,
        table: &str,
        primary_key: &str,
        columns: &[String],
        values: &[String],
        schema_columns: &[String],
    ) -> String {
        upsert_sql(self, table, primary_key, columns, values, columns, schema_columns)
    }
}
