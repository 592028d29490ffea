//! Table mapping for `favorites`.
//!
//! # Invariants
//! - Included users and diagrams are loaded with one `IN (...)` query per
//!   navigation, regardless of how many favorites are in the batch.

use crate::model::diagram::Diagram;
use crate::model::favorite::Favorite;
use crate::model::user::User;
use crate::repo::diagram_repo::DiagramColumn;
use crate::repo::entity::{read_uuid, Column, Entity, IntoValue};
use crate::repo::filter::Filter;
use crate::repo::generic_repo::select;
use crate::repo::user_repo::UserColumn;
use crate::repo::RepoResult;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteColumn {
    FavouriteId,
    UserId,
    DiagramId,
}

impl Column for FavoriteColumn {
    const ALL: &'static [Self] = &[Self::FavouriteId, Self::UserId, Self::DiagramId];

    fn name(self) -> &'static str {
        match self {
            Self::FavouriteId => "favourite_id",
            Self::UserId => "user_id",
            Self::DiagramId => "diagram_id",
        }
    }
}

/// Navigations of `Favorite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteInclude {
    User,
    Diagram,
}

impl FavoriteInclude {
    /// Include graph used by favorite reads.
    pub const READ_GRAPH: &'static [Self] = &[Self::User, Self::Diagram];
}

impl Entity for Favorite {
    type Column = FavoriteColumn;
    type Include = FavoriteInclude;

    const TABLE: &'static str = "favorites";
    const KEY: FavoriteColumn = FavoriteColumn::FavouriteId;

    fn key(&self) -> Uuid {
        self.favourite_id
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            favourite_id: read_uuid(row, Self::TABLE, "favourite_id")?,
            user_id: read_uuid(row, Self::TABLE, "user_id")?,
            diagram_id: read_uuid(row, Self::TABLE, "diagram_id")?,
            user: None,
            diagram: None,
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            self.favourite_id.into_value(),
            self.user_id.into_value(),
            self.diagram_id.into_value(),
        ]
    }

    fn load_includes(
        conn: &Connection,
        items: &mut [Self],
        include: &[Self::Include],
    ) -> RepoResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        if include.contains(&FavoriteInclude::User) {
            let ids: BTreeSet<Uuid> = items.iter().map(|item| item.user_id).collect();
            let users: HashMap<Uuid, User> =
                select::<User>(conn, Some(&Filter::is_in(UserColumn::UserId, ids)), None, None)?
                    .into_iter()
                    .map(|user| (user.user_id, user))
                    .collect();
            for item in items.iter_mut() {
                item.user = users.get(&item.user_id).cloned();
            }
        }

        if include.contains(&FavoriteInclude::Diagram) {
            let ids: BTreeSet<Uuid> = items.iter().map(|item| item.diagram_id).collect();
            let diagrams: HashMap<Uuid, Diagram> = select::<Diagram>(
                conn,
                Some(&Filter::is_in(DiagramColumn::DiagramId, ids)),
                None,
                None,
            )?
            .into_iter()
            .map(|diagram| (diagram.diagram_id, diagram))
            .collect();
            for item in items.iter_mut() {
                item.diagram = diagrams.get(&item.diagram_id).cloned().map(Box::new);
            }
        }

        Ok(())
    }
}
