//! Acting-user entity.
//!
//! Users are owned by the identity collaborator. The core persists them only
//! so that diagram ownership and favorites have a foreign-key target.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable user identifier.
pub type UserId = Uuid;

/// Registered user as seen by the diagram core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    /// Login e-mail; unique and compared case-insensitively by the store.
    pub email: String,
    /// Display name surfaced on diagram and favorite responses.
    pub full_name: String,
}

impl User {
    /// Creates a user with a generated id.
    pub fn new(email: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email: email.into(),
            full_name: full_name.into(),
        }
    }
}
