//! Collaborator seams: acting-user resolution and description generation.
//!
//! Authentication and text-generation providers live outside the core. The
//! services reach them only through these traits.

use crate::model::user::User;
use crate::repo::filter::Filter;
use crate::repo::user_repo::UserColumn;
use crate::repo::RepoResult;
use crate::uow::UnitOfWork;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Resolves the acting user of the current request.
pub trait UserContext {
    /// Returns `None` when the request is unauthenticated or the identity
    /// does not match a stored user.
    fn current_user(&self, uow: &mut UnitOfWork) -> RepoResult<Option<User>>;
}

impl<T: UserContext + ?Sized> UserContext for &T {
    fn current_user(&self, uow: &mut UnitOfWork) -> RepoResult<Option<User>> {
        (**self).current_user(uow)
    }
}

/// Resolves the acting user from an authenticated e-mail claim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimsUserContext {
    email: Option<String>,
}

impl ClaimsUserContext {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
        }
    }

    /// Context for a request that carries no claim.
    pub fn unauthenticated() -> Self {
        Self::default()
    }
}

impl UserContext for ClaimsUserContext {
    fn current_user(&self, uow: &mut UnitOfWork) -> RepoResult<Option<User>> {
        let Some(email) = self.email.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if email.is_empty() {
            return Ok(None);
        }
        uow.repository::<User>()
            .get_by(&Filter::eq(UserColumn::Email, email), false, &[])
    }
}

/// Context that never resolves a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnonymousUserContext;

impl UserContext for AnonymousUserContext {
    fn current_user(&self, _uow: &mut UnitOfWork) -> RepoResult<Option<User>> {
        Ok(None)
    }
}

/// Failure reported by a description generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionError {
    message: String,
}

impl DescriptionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for DescriptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "description generation failed: {}", self.message)
    }
}

impl Error for DescriptionError {}

/// Best-effort summary generator keyed by a diagram's content payload.
pub trait DescriptionGenerator {
    fn generate_description(&self, content_json: &str) -> Result<Option<String>, DescriptionError>;
}

/// Generator that never produces a description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoDescription;

impl DescriptionGenerator for NoDescription {
    fn generate_description(&self, _content_json: &str) -> Result<Option<String>, DescriptionError> {
        Ok(None)
    }
}
