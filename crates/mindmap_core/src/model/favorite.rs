//! Favorite membership entity.
//!
//! # Invariants
//! - A favorite references an existing user and diagram.
//! - At most one favorite exists per `(user_id, diagram_id)` pair.

use crate::model::diagram::{Diagram, DiagramId};
use crate::model::user::{User, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable favorite identifier.
pub type FavoriteId = Uuid;

/// Marks that one user bookmarked one diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub favourite_id: FavoriteId,
    pub user_id: UserId,
    pub diagram_id: DiagramId,
    /// Loaded only through the `User` include.
    #[serde(skip)]
    pub user: Option<User>,
    /// Loaded only through the `Diagram` include.
    #[serde(skip)]
    pub diagram: Option<Box<Diagram>>,
}

impl Favorite {
    /// Creates a favorite row with a generated id.
    pub fn new(user_id: UserId, diagram_id: DiagramId) -> Self {
        Self {
            favourite_id: Uuid::new_v4(),
            user_id,
            diagram_id,
            user: None,
            diagram: None,
        }
    }
}
