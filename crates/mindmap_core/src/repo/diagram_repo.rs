//! Table mapping for `diagrams` and its include graph.
//!
//! # Responsibility
//! - Map diagram rows and load owner, base, derived and favorite navigations.
//!
//! # Invariants
//! - Each requested navigation costs exactly one query for the whole batch.
//! - Navigations are one level deep: a loaded base or derived diagram does
//!   not carry its own navigations.

use crate::model::diagram::Diagram;
use crate::model::favorite::Favorite;
use crate::model::user::User;
use crate::repo::entity::{
    read_bool, read_optional_uuid, read_timestamp, read_uuid, Column, Entity, IntoValue,
};
use crate::repo::favorite_repo::FavoriteColumn;
use crate::repo::filter::Filter;
use crate::repo::generic_repo::select;
use crate::repo::user_repo::UserColumn;
use crate::repo::RepoResult;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramColumn {
    DiagramId,
    Title,
    Description,
    ContentJson,
    CreatedAt,
    UpdatedAt,
    IsPublic,
    UserId,
    BaseDiagramId,
}

impl Column for DiagramColumn {
    const ALL: &'static [Self] = &[
        Self::DiagramId,
        Self::Title,
        Self::Description,
        Self::ContentJson,
        Self::CreatedAt,
        Self::UpdatedAt,
        Self::IsPublic,
        Self::UserId,
        Self::BaseDiagramId,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::DiagramId => "diagram_id",
            Self::Title => "title",
            Self::Description => "description",
            Self::ContentJson => "content_json",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::IsPublic => "is_public",
            Self::UserId => "user_id",
            Self::BaseDiagramId => "base_diagram_id",
        }
    }
}

/// Navigations of `Diagram`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramInclude {
    Owner,
    Favorites,
    BaseDiagram,
    DerivedDiagrams,
}

impl DiagramInclude {
    /// Full graph used by diagram reads and deletes.
    pub const FULL_GRAPH: &'static [Self] = &[
        Self::Owner,
        Self::Favorites,
        Self::BaseDiagram,
        Self::DerivedDiagrams,
    ];
}

impl Entity for Diagram {
    type Column = DiagramColumn;
    type Include = DiagramInclude;

    const TABLE: &'static str = "diagrams";
    const KEY: DiagramColumn = DiagramColumn::DiagramId;

    fn key(&self) -> Uuid {
        self.diagram_id
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            diagram_id: read_uuid(row, Self::TABLE, "diagram_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            content_json: row.get("content_json")?,
            created_at: read_timestamp(row, Self::TABLE, "created_at")?,
            updated_at: read_timestamp(row, Self::TABLE, "updated_at")?,
            is_public: read_bool(row, Self::TABLE, "is_public")?,
            user_id: read_uuid(row, Self::TABLE, "user_id")?,
            base_diagram_id: read_optional_uuid(row, Self::TABLE, "base_diagram_id")?,
            owner: None,
            base_diagram: None,
            derived_diagrams: Vec::new(),
            favorites: Vec::new(),
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            self.diagram_id.into_value(),
            self.title.as_str().into_value(),
            self.description.as_deref().into_value(),
            self.content_json.as_str().into_value(),
            self.created_at.into_value(),
            self.updated_at.into_value(),
            self.is_public.into_value(),
            self.user_id.into_value(),
            self.base_diagram_id.into_value(),
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

        if include.contains(&DiagramInclude::Owner) {
            let ids: BTreeSet<Uuid> = items.iter().map(|item| item.user_id).collect();
            let owners: HashMap<Uuid, User> =
                select::<User>(conn, Some(&Filter::is_in(UserColumn::UserId, ids)), None, None)?
                    .into_iter()
                    .map(|user| (user.user_id, user))
                    .collect();
            for item in items.iter_mut() {
                item.owner = owners.get(&item.user_id).cloned();
            }
        }

        if include.contains(&DiagramInclude::BaseDiagram) {
            let ids: BTreeSet<Uuid> = items.iter().filter_map(|item| item.base_diagram_id).collect();
            if !ids.is_empty() {
                let bases: HashMap<Uuid, Diagram> = select::<Diagram>(
                    conn,
                    Some(&Filter::is_in(DiagramColumn::DiagramId, ids)),
                    None,
                    None,
                )?
                .into_iter()
                .map(|base| (base.diagram_id, base))
                .collect();
                for item in items.iter_mut() {
                    item.base_diagram = item
                        .base_diagram_id
                        .and_then(|id| bases.get(&id).cloned())
                        .map(Box::new);
                }
            }
        }

        let ids: BTreeSet<Uuid> = items.iter().map(|item| item.diagram_id).collect();

        if include.contains(&DiagramInclude::DerivedDiagrams) {
            let mut derived_by_base: HashMap<Uuid, Vec<Diagram>> = HashMap::new();
            for derived in select::<Diagram>(
                conn,
                Some(&Filter::is_in(DiagramColumn::BaseDiagramId, ids.iter())),
                None,
                None,
            )? {
                if let Some(base_id) = derived.base_diagram_id {
                    derived_by_base.entry(base_id).or_default().push(derived);
                }
            }
            for item in items.iter_mut() {
                item.derived_diagrams = derived_by_base.remove(&item.diagram_id).unwrap_or_default();
            }
        }

        if include.contains(&DiagramInclude::Favorites) {
            let mut favorites_by_diagram: HashMap<Uuid, Vec<Favorite>> = HashMap::new();
            for favorite in select::<Favorite>(
                conn,
                Some(&Filter::is_in(FavoriteColumn::DiagramId, ids.iter())),
                None,
                None,
            )? {
                favorites_by_diagram
                    .entry(favorite.diagram_id)
                    .or_default()
                    .push(favorite);
            }
            for item in items.iter_mut() {
                item.favorites = favorites_by_diagram
                    .remove(&item.diagram_id)
                    .unwrap_or_default();
            }
        }

        Ok(())
    }
}
