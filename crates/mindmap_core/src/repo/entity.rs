//! Entity-to-table mapping contract.
//!
//! # Responsibility
//! - Describe how one entity type maps onto one table: columns, key, row
//!   parsing and the navigations it can eagerly load.
//! - Convert between domain values and SQLite storage values.
//!
//! # Invariants
//! - `Entity::column_values` returns values in `Column::ALL` order.
//! - UUIDs are stored as hyphenated text, booleans as `0/1`, timestamps as
//!   epoch milliseconds.

use crate::repo::{RepoError, RepoResult};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use std::fmt::Debug;
use uuid::Uuid;

/// Column enum of one entity table.
pub trait Column: Copy + Eq + Debug + 'static {
    /// Every column, in select/insert order.
    const ALL: &'static [Self];

    /// SQL column name.
    fn name(self) -> &'static str;

    /// Resolves an external field name (`created_at`, `CreatedAt`,
    /// `createdAt`) to a column. Matching ignores case and underscores.
    fn parse(field: &str) -> Option<Self> {
        let wanted = normalize_field_name(field);
        Self::ALL
            .iter()
            .copied()
            .find(|column| normalize_field_name(column.name()) == wanted)
    }
}

/// Persisted entity handled by the generic repository.
pub trait Entity: Clone + 'static {
    type Column: Column;
    /// Navigation relationships that can be eagerly loaded.
    type Include: Copy + Eq + Debug + 'static;

    const TABLE: &'static str;
    const KEY: Self::Column;

    /// Primary key value.
    fn key(&self) -> Uuid;

    /// Builds an entity (without navigations) from one selected row.
    fn from_row(row: &Row<'_>) -> RepoResult<Self>;

    /// Column values in `Column::ALL` order.
    fn column_values(&self) -> Vec<Value>;

    /// Populates the requested navigations for every item.
    ///
    /// Implementations issue one batched query per navigation.
    fn load_includes(
        conn: &Connection,
        items: &mut [Self],
        include: &[Self::Include],
    ) -> RepoResult<()>;
}

/// Placeholder include type for entities without navigations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoInclude {}

/// Conversion of domain values into SQLite storage values.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for Uuid {
    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoValue for &Uuid {
    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Integer(i64::from(self))
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoValue for &String {
    fn into_value(self) -> Value {
        Value::Text(self.clone())
    }
}

impl IntoValue for DateTime<Utc> {
    fn into_value(self) -> Value {
        Value::Integer(self.timestamp_millis())
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(value) => value.into_value(),
            None => Value::Null,
        }
    }
}

/// Reads a required UUID column.
pub fn read_uuid(row: &Row<'_>, table: &str, column: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    parse_uuid(&text, table, column)
}

/// Reads a nullable UUID column.
pub fn read_optional_uuid(row: &Row<'_>, table: &str, column: &str) -> RepoResult<Option<Uuid>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => parse_uuid(&text, table, column).map(Some),
        None => Ok(None),
    }
}

/// Reads a `0/1` boolean column, rejecting other values.
pub fn read_bool(row: &Row<'_>, table: &str, column: &str) -> RepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {table}.{column}"
        ))),
    }
}

/// Reads an epoch-milliseconds timestamp column.
pub fn read_timestamp(row: &Row<'_>, table: &str, column: &str) -> RepoResult<DateTime<Utc>> {
    let millis: i64 = row.get(column)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "timestamp `{millis}` out of range in {table}.{column}"
        ))
    })
}

fn parse_uuid(value: &str, table: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{value}` in {table}.{column}"))
    })
}

fn normalize_field_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}
