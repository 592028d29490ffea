//! Staged changes recorded by repositories and flushed by the unit of work.

use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use uuid::Uuid;

/// Kind of staged write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One staged write against one row, applied in staging order.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    kind: ChangeKind,
    table: &'static str,
    key_column: &'static str,
    key: Uuid,
    columns: Vec<&'static str>,
    values: Vec<Value>,
}

impl PendingChange {
    pub(crate) fn insert(
        table: &'static str,
        key_column: &'static str,
        key: Uuid,
        columns: Vec<&'static str>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            kind: ChangeKind::Insert,
            table,
            key_column,
            key,
            columns,
            values,
        }
    }

    pub(crate) fn update(
        table: &'static str,
        key_column: &'static str,
        key: Uuid,
        columns: Vec<&'static str>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            kind: ChangeKind::Update,
            table,
            key_column,
            key,
            columns,
            values,
        }
    }

    pub(crate) fn delete(table: &'static str, key_column: &'static str, key: Uuid) -> Self {
        Self {
            kind: ChangeKind::Delete,
            table,
            key_column,
            key,
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    /// Columns written by an insert or update; empty for deletes.
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Executes the change, returning the number of affected rows.
    ///
    /// Updates and deletes that match no row fail with `NotFound`.
    pub(crate) fn apply(&self, conn: &Connection) -> RepoResult<usize> {
        let key = self.key.to_string();
        let changed = match self.kind {
            ChangeKind::Insert => {
                let placeholders = (1..=self.columns.len())
                    .map(|index| format!("?{index}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({placeholders});",
                    self.table,
                    self.columns.join(", ")
                );
                conn.execute(&sql, params_from_iter(self.values.iter()))?
            }
            ChangeKind::Update => {
                let assignments = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| format!("{column} = ?{}", index + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "UPDATE {} SET {assignments} WHERE {} = ?{};",
                    self.table,
                    self.key_column,
                    self.columns.len() + 1
                );
                let mut binds = self.values.clone();
                binds.push(Value::Text(key));
                conn.execute(&sql, params_from_iter(binds))?
            }
            ChangeKind::Delete => {
                let sql = format!("DELETE FROM {} WHERE {} = ?1;", self.table, self.key_column);
                conn.execute(&sql, [key.as_str()])?
            }
        };

        if changed == 0 && self.kind != ChangeKind::Insert {
            return Err(RepoError::NotFound {
                table: self.table,
                key: self.key,
            });
        }
        Ok(changed)
    }
}
