//! SQL text builders and conversions between rift and rusqlite values.

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;

use rift_core::{TableSchema, Value};

/// Quote an identifier for use in SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Borrowing adapter so rift values can be bound as statement parameters.
pub struct SqlValue<'a>(pub &'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self.0 {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(f) => ValueRef::Real(*f),
            Value::Text(s) => ValueRef::Text(s),
            Value::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

/// Copy a column value out of a result row. TEXT keeps its stored bytes.
pub fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(t.to_vec()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

fn column_list(schema: &TableSchema) -> String {
    schema
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"k1" = ?1 AND "k2" = ?2`, numbering from `first_param`.
fn key_predicate(schema: &TableSchema, first_param: usize) -> String {
    schema
        .key_columns()
        .into_iter()
        .enumerate()
        .map(|(n, i)| format!("{} = ?{}", quote_ident(&schema.columns[i].name), first_param + n))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn select_all(schema: &TableSchema) -> String {
    let order = schema
        .key_columns()
        .into_iter()
        .map(|i| quote_ident(&schema.columns[i].name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {} FROM {} ORDER BY {}",
        column_list(schema),
        quote_ident(&schema.name),
        order
    )
}

pub fn select_by_key(schema: &TableSchema) -> String {
    format!(
        "SELECT {} FROM {} WHERE {}",
        column_list(schema),
        quote_ident(&schema.name),
        key_predicate(schema, 1)
    )
}

pub fn insert(schema: &TableSchema) -> String {
    let params = (1..=schema.column_count())
        .map(|n| format!("?{}", n))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&schema.name),
        column_list(schema),
        params
    )
}

/// Update of the given columns; parameters are the new values followed by
/// the key values.
pub fn update(schema: &TableSchema, columns: &[usize]) -> String {
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(n, &i)| format!("{} = ?{}", quote_ident(&schema.columns[i].name), n + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(&schema.name),
        assignments,
        key_predicate(schema, columns.len() + 1)
    )
}

pub fn delete(schema: &TableSchema) -> String {
    format!(
        "DELETE FROM {} WHERE {}",
        quote_ident(&schema.name),
        key_predicate(schema, 1)
    )
}
