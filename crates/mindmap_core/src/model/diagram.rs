//! Diagram entity and lineage helpers.
//!
//! # Responsibility
//! - Hold the persisted diagram columns and its optional navigations.
//! - Provide the mutations services apply during lineage maintenance.
//!
//! # Invariants
//! - `diagram_id` is assigned once at construction and never regenerated.
//! - `base_diagram_id` is only set at creation; it may later be cleared when
//!   the base is deleted, never re-pointed.
//! - `updated_at >= created_at`; both are equal right after construction.

use crate::model::favorite::Favorite;
use crate::model::user::{User, UserId};
use crate::model::utc_now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable diagram identifier.
pub type DiagramId = Uuid;

/// User-authored diagram document with an opaque JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    pub diagram_id: DiagramId,
    pub title: String,
    /// Optional summary, possibly produced by a description generator.
    pub description: Option<String>,
    /// Opaque payload. Never inspected by the core beyond non-emptiness.
    pub content_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_public: bool,
    /// Owning user.
    pub user_id: UserId,
    /// Diagram this one was cloned from.
    pub base_diagram_id: Option<DiagramId>,
    #[serde(skip)]
    pub owner: Option<User>,
    #[serde(skip)]
    pub base_diagram: Option<Box<Diagram>>,
    /// Every diagram whose `base_diagram_id` points here.
    #[serde(skip)]
    pub derived_diagrams: Vec<Diagram>,
    #[serde(skip)]
    pub favorites: Vec<Favorite>,
}

impl Diagram {
    /// Creates a private diagram owned by `user_id` with a generated id.
    ///
    /// Both timestamps are set to the same instant.
    pub fn new(title: impl Into<String>, content_json: impl Into<String>, user_id: UserId) -> Self {
        Self::with_id(Uuid::new_v4(), title, content_json, user_id)
    }

    /// Creates a diagram with a caller-provided id.
    pub fn with_id(
        diagram_id: DiagramId,
        title: impl Into<String>,
        content_json: impl Into<String>,
        user_id: UserId,
    ) -> Self {
        let now = utc_now();
        Self {
            diagram_id,
            title: title.into(),
            description: None,
            content_json: content_json.into(),
            created_at: now,
            updated_at: now,
            is_public: false,
            user_id,
            base_diagram_id: None,
            owner: None,
            base_diagram: None,
            derived_diagrams: Vec::new(),
            favorites: Vec::new(),
        }
    }

    /// Refreshes `updated_at` after a mutation.
    pub fn touch(&mut self) {
        self.updated_at = utc_now();
    }

    /// Clears the lineage pointer. The diagram itself survives.
    pub fn orphan(&mut self) {
        self.base_diagram_id = None;
        self.base_diagram = None;
        self.touch();
    }

    /// Removes `derived_id` from the loaded derived collection.
    ///
    /// Returns whether the collection contained it.
    pub fn detach_derived(&mut self, derived_id: DiagramId) -> bool {
        let before = self.derived_diagrams.len();
        self.derived_diagrams
            .retain(|derived| derived.diagram_id != derived_id);
        before != self.derived_diagrams.len()
    }

    /// Returns whether this diagram was cloned from another one.
    pub fn is_clone(&self) -> bool {
        self.base_diagram_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::Diagram;
    use uuid::Uuid;

    #[test]
    fn new_diagram_has_equal_timestamps_and_no_lineage() {
        let diagram = Diagram::new("t", "{}", Uuid::new_v4());
        assert_eq!(diagram.created_at, diagram.updated_at);
        assert!(!diagram.is_clone());
        assert!(!diagram.is_public);
    }

    #[test]
    fn detach_derived_reports_membership() {
        let owner = Uuid::new_v4();
        let mut base = Diagram::new("base", "{}", owner);
        let mut derived = Diagram::new("copy", "{}", owner);
        derived.base_diagram_id = Some(base.diagram_id);
        let derived_id = derived.diagram_id;
        base.derived_diagrams.push(derived);

        assert!(base.detach_derived(derived_id));
        assert!(base.derived_diagrams.is_empty());
        assert!(!base.detach_derived(derived_id));
    }

    #[test]
    fn orphan_clears_lineage_and_touches() {
        let mut derived = Diagram::new("copy", "{}", Uuid::new_v4());
        derived.base_diagram_id = Some(Uuid::new_v4());
        let created = derived.created_at;

        derived.orphan();

        assert!(derived.base_diagram_id.is_none());
        assert!(derived.updated_at >= created);
    }
}
