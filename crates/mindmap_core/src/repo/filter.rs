//! Composable predicates over one entity's columns.
//!
//! # Responsibility
//! - Express the boolean conditions services pass to repositories without
//!   leaking SQL across the service boundary.
//! - Compile conditions into parameterized SQL fragments.
//!
//! # Invariants
//! - Generated SQL references columns only through `Column::name`.
//! - Every user value is emitted as a `?` placeholder with a bound value.
//! - An empty `In` list matches nothing; an empty `And` matches everything.

use crate::repo::entity::{Column, IntoValue};
use rusqlite::types::Value;

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    /// Parses `asc`/`ascending`/`desc`/`descending`, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Ascending),
            "desc" | "descending" => Some(Self::Descending),
            _ => None,
        }
    }
}

/// Boolean condition over the columns `C` of one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter<C> {
    /// Matches every row.
    All,
    Eq(C, Value),
    Ne(C, Value),
    Gt(C, Value),
    Lt(C, Value),
    In(C, Vec<Value>),
    IsNull(C),
    IsNotNull(C),
    /// Case-insensitive substring match.
    Contains(C, String),
    And(Vec<Filter<C>>),
    Or(Vec<Filter<C>>),
    Not(Box<Filter<C>>),
}

impl<C: Column> Filter<C> {
    pub fn eq(column: C, value: impl IntoValue) -> Self {
        Self::Eq(column, value.into_value())
    }

    pub fn ne(column: C, value: impl IntoValue) -> Self {
        Self::Ne(column, value.into_value())
    }

    pub fn gt(column: C, value: impl IntoValue) -> Self {
        Self::Gt(column, value.into_value())
    }

    pub fn lt(column: C, value: impl IntoValue) -> Self {
        Self::Lt(column, value.into_value())
    }

    pub fn is_in<V: IntoValue>(column: C, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(
            column,
            values.into_iter().map(IntoValue::into_value).collect(),
        )
    }

    pub fn is_null(column: C) -> Self {
        Self::IsNull(column)
    }

    pub fn is_not_null(column: C) -> Self {
        Self::IsNotNull(column)
    }

    pub fn contains(column: C, needle: impl Into<String>) -> Self {
        Self::Contains(column, needle.into())
    }

    /// Conjunction, flattening nested `And`s.
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::All, other) | (other, Self::All) => other,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (this, other) => Self::And(vec![this, other]),
        }
    }

    /// Disjunction, flattening nested `Or`s.
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (this, other) => Self::Or(vec![this, other]),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Appends this condition to `sql`, pushing bound values to `binds`.
    pub(crate) fn write_sql(&self, sql: &mut String, binds: &mut Vec<Value>) {
        match self {
            Self::All => sql.push_str("1 = 1"),
            Self::Eq(column, value) => write_comparison(sql, binds, *column, "=", value),
            Self::Ne(column, value) => write_comparison(sql, binds, *column, "<>", value),
            Self::Gt(column, value) => write_comparison(sql, binds, *column, ">", value),
            Self::Lt(column, value) => write_comparison(sql, binds, *column, "<", value),
            Self::In(_, values) if values.is_empty() => sql.push_str("0 = 1"),
            Self::In(column, values) => {
                sql.push_str(column.name());
                sql.push_str(" IN (");
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        sql.push_str(", ");
                    }
                    sql.push('?');
                    binds.push(value.clone());
                }
                sql.push(')');
            }
            Self::IsNull(column) => {
                sql.push_str(column.name());
                sql.push_str(" IS NULL");
            }
            Self::IsNotNull(column) => {
                sql.push_str(column.name());
                sql.push_str(" IS NOT NULL");
            }
            Self::Contains(column, needle) => {
                sql.push_str("instr(lower(");
                sql.push_str(column.name());
                sql.push_str("), lower(?)) > 0");
                binds.push(Value::Text(needle.clone()));
            }
            Self::And(parts) => write_group(sql, binds, parts, " AND ", "1 = 1"),
            Self::Or(parts) => write_group(sql, binds, parts, " OR ", "0 = 1"),
            Self::Not(inner) => {
                sql.push_str("NOT (");
                inner.write_sql(sql, binds);
                sql.push(')');
            }
        }
    }
}

fn write_comparison<C: Column>(
    sql: &mut String,
    binds: &mut Vec<Value>,
    column: C,
    operator: &str,
    value: &Value,
) {
    // `col = NULL` never matches in SQL; map equality against NULL explicitly.
    match (operator, value) {
        ("=", Value::Null) => {
            sql.push_str(column.name());
            sql.push_str(" IS NULL");
        }
        ("<>", Value::Null) => {
            sql.push_str(column.name());
            sql.push_str(" IS NOT NULL");
        }
        _ => {
            sql.push_str(column.name());
            sql.push(' ');
            sql.push_str(operator);
            sql.push_str(" ?");
            binds.push(value.clone());
        }
    }
}

fn write_group<C: Column>(
    sql: &mut String,
    binds: &mut Vec<Value>,
    parts: &[Filter<C>],
    separator: &str,
    empty: &str,
) {
    if parts.is_empty() {
        sql.push_str(empty);
        return;
    }

    sql.push('(');
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            sql.push_str(separator);
        }
        part.write_sql(sql, binds);
    }
    sql.push(')');
}
