//! Table mapping for `users`.

use crate::model::user::User;
use crate::repo::entity::{read_uuid, Column, Entity, IntoValue, NoInclude};
use crate::repo::RepoResult;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserColumn {
    UserId,
    Email,
    FullName,
}

impl Column for UserColumn {
    const ALL: &'static [Self] = &[Self::UserId, Self::Email, Self::FullName];

    fn name(self) -> &'static str {
        match self {
            Self::UserId => "user_id",
            Self::Email => "email",
            Self::FullName => "full_name",
        }
    }
}

impl Entity for User {
    type Column = UserColumn;
    type Include = NoInclude;

    const TABLE: &'static str = "users";
    const KEY: UserColumn = UserColumn::UserId;

    fn key(&self) -> Uuid {
        self.user_id
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            user_id: read_uuid(row, Self::TABLE, "user_id")?,
            email: row.get("email")?,
            full_name: row.get("full_name")?,
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            self.user_id.into_value(),
            self.email.as_str().into_value(),
            self.full_name.as_str().into_value(),
        ]
    }

    fn load_includes(
        _conn: &Connection,
        _items: &mut [Self],
        include: &[Self::Include],
    ) -> RepoResult<()> {
        match include.first() {
            None => Ok(()),
            Some(never) => match *never {},
        }
    }
}
