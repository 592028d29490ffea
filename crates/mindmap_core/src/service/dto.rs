//! Request and response shapes exchanged with service callers.
//!
//! # Invariants
//! - `is_in_favorite` and `is_clone` exist only on `DiagramResponse`; they are
//!   computed per read and never persisted.
//! - Pagination values are normalized before reaching the repository:
//!   `page_index >= 1`, `1 <= page_size <= max_page_size`.

use crate::config::PAGE_SIZE_CEILING;
use crate::model::diagram::{Diagram, DiagramId};
use crate::model::favorite::{Favorite, FavoriteId};
use crate::model::user::UserId;
use crate::repo::entity::{Column, Entity};
use crate::repo::filter::SortDirection;
use crate::repo::generic_repo::ListQuery;
use crate::repo::RepoError;
use crate::service::{ServiceError, ServiceResult, ServiceSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum title length, in characters.
pub const TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramAddRequest {
    pub title: String,
    pub content_json: String,
    #[serde(default)]
    pub is_public: bool,
    /// Diagram this one is cloned from.
    #[serde(default)]
    pub base_diagram_id: Option<DiagramId>,
}

impl DiagramAddRequest {
    /// Private, non-cloned diagram request.
    pub fn new(title: impl Into<String>, content_json: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content_json: content_json.into(),
            is_public: false,
            base_diagram_id: None,
        }
    }

    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    pub fn based_on(mut self, base_diagram_id: DiagramId) -> Self {
        self.base_diagram_id = Some(base_diagram_id);
        self
    }

    pub(crate) fn validate(&self) -> ServiceResult<()> {
        validate_title(&self.title)?;
        validate_content(&self.content_json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramUpdateRequest {
    pub diagram_id: DiagramId,
    pub title: String,
    pub content_json: String,
    #[serde(default)]
    pub is_public: bool,
}

impl DiagramUpdateRequest {
    pub(crate) fn validate(&self) -> ServiceResult<()> {
        validate_title(&self.title)?;
        validate_content(&self.content_json)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteAddRequest {
    pub diagram_id: DiagramId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteUpdateRequest {
    pub favorite_id: FavoriteId,
    pub diagram_id: DiagramId,
}

/// Caller-supplied paging and sorting for list reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    /// 1-based. `0` is read as `1`.
    pub page_index: u32,
    /// `0` selects the configured default; larger values are clamped.
    pub page_size: u32,
    /// Entity field name; accepts `snake_case` or `PascalCase`.
    pub sort_by: Option<String>,
    #[serde(with = "sort_direction_serde")]
    pub sort_direction: SortDirection,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_index: 1,
            page_size: 0,
            sort_by: None,
            sort_direction: SortDirection::Ascending,
        }
    }
}

impl Pagination {
    pub fn page(page_index: u32, page_size: u32) -> Self {
        Self {
            page_index,
            page_size,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_by = Some(field.into());
        self.sort_direction = direction;
        self
    }

    /// Normalized `(page_index, page_size)`.
    pub fn window(&self, settings: &ServiceSettings) -> (u32, u32) {
        let page_index = self.page_index.max(1);
        let max_page_size = settings.max_page_size.clamp(1, PAGE_SIZE_CEILING);
        let page_size = match self.page_size {
            0 => settings.default_page_size.clamp(1, max_page_size),
            size => size.min(max_page_size),
        };
        (page_index, page_size)
    }

    /// Builds a repository query, resolving `sort_by` against `E`'s columns.
    pub(crate) fn to_query<E: Entity>(&self, settings: &ServiceSettings) -> ServiceResult<ListQuery<E>> {
        let (page_index, page_size) = self.window(settings);
        let mut query = ListQuery::<E>::new().page(page_index, page_size);

        let field = self.sort_by.as_deref().map(str::trim).filter(|field| !field.is_empty());
        if let Some(field) = field {
            let column = E::Column::parse(field).ok_or_else(|| {
                ServiceError::InvalidArgument(
                    RepoError::UnknownField {
                        entity: E::TABLE,
                        field: field.to_string(),
                    }
                    .to_string(),
                )
            })?;
            query = query.sort(column, self.sort_direction);
        }
        Ok(query)
    }
}

mod sort_direction_serde {
    use crate::repo::filter::SortDirection;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &SortDirection, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match value {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SortDirection, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SortDirection::parse(&raw)
            .ok_or_else(|| D::Error::custom(format!("unsupported sort direction `{raw}`")))
    }
}

/// One page of response items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub page_index: u32,
    pub page_size: u32,
    /// Matching rows before pagination.
    pub total_count: u64,
}

/// Diagram projection returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagramResponse {
    pub diagram_id: DiagramId,
    pub title: String,
    pub description: Option<String>,
    pub content_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_public: bool,
    pub user_id: UserId,
    pub owner_full_name: Option<String>,
    pub base_diagram_id: Option<DiagramId>,
    pub base_diagram_title: Option<String>,
    pub base_diagram_content: Option<String>,
    pub favorite_count: usize,
    /// The acting user has favorited this diagram.
    pub is_in_favorite: bool,
    /// The acting user owns a diagram cloned from this one.
    pub is_clone: bool,
}

impl From<&Diagram> for DiagramResponse {
    fn from(diagram: &Diagram) -> Self {
        Self {
            diagram_id: diagram.diagram_id,
            title: diagram.title.clone(),
            description: diagram.description.clone(),
            content_json: diagram.content_json.clone(),
            created_at: diagram.created_at,
            updated_at: diagram.updated_at,
            is_public: diagram.is_public,
            user_id: diagram.user_id,
            owner_full_name: diagram.owner.as_ref().map(|owner| owner.full_name.clone()),
            base_diagram_id: diagram.base_diagram_id,
            base_diagram_title: diagram.base_diagram.as_ref().map(|base| base.title.clone()),
            base_diagram_content: diagram
                .base_diagram
                .as_ref()
                .map(|base| base.content_json.clone()),
            favorite_count: diagram.favorites.len(),
            is_in_favorite: false,
            is_clone: false,
        }
    }
}

/// Favorite projection returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FavoriteResponse {
    pub favourite_id: FavoriteId,
    pub user_id: UserId,
    pub full_name: Option<String>,
    pub diagram_id: DiagramId,
    pub title: Option<String>,
    pub content_json: Option<String>,
}

impl From<&Favorite> for FavoriteResponse {
    fn from(favorite: &Favorite) -> Self {
        Self {
            favourite_id: favorite.favourite_id,
            user_id: favorite.user_id,
            full_name: favorite.user.as_ref().map(|user| user.full_name.clone()),
            diagram_id: favorite.diagram_id,
            title: favorite.diagram.as_ref().map(|diagram| diagram.title.clone()),
            content_json: favorite
                .diagram
                .as_ref()
                .map(|diagram| diagram.content_json.clone()),
        }
    }
}

fn validate_title(title: &str) -> ServiceResult<()> {
    if title.trim().is_empty() {
        return Err(ServiceError::InvalidArgument("title is required".to_string()));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(ServiceError::InvalidArgument(format!(
            "title must be at most {TITLE_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_content(content_json: &str) -> ServiceResult<()> {
    if content_json.trim().is_empty() {
        return Err(ServiceError::InvalidArgument(
            "content_json is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DiagramAddRequest, Pagination};
    use crate::model::diagram::Diagram;
    use crate::repo::diagram_repo::DiagramColumn;
    use crate::repo::filter::SortDirection;
    use crate::service::{ServiceError, ServiceSettings};

    #[test]
    fn title_over_limit_is_rejected() {
        let request = DiagramAddRequest::new("x".repeat(101), "{}");
        assert!(matches!(request.validate(), Err(ServiceError::InvalidArgument(_))));
        assert!(DiagramAddRequest::new("x".repeat(100), "{}").validate().is_ok());
    }

    #[test]
    fn blank_content_is_rejected() {
        let request = DiagramAddRequest::new("t", "  ");
        assert!(matches!(request.validate(), Err(ServiceError::InvalidArgument(_))));
    }

    #[test]
    fn window_normalizes_zero_and_clamps() {
        let settings = ServiceSettings {
            default_page_size: 10,
            max_page_size: 50,
            transaction_timeout: None,
        };
        assert_eq!(Pagination::page(0, 0).window(&settings), (1, 10));
        assert_eq!(Pagination::page(3, 500).window(&settings), (3, 50));
    }

    #[test]
    fn window_never_exceeds_page_size_ceiling() {
        let settings = ServiceSettings {
            default_page_size: 10,
            max_page_size: 100_000,
            transaction_timeout: None,
        };
        assert_eq!(
            Pagination::page(1, 40_000).window(&settings),
            (1, crate::config::PAGE_SIZE_CEILING)
        );
    }

    #[test]
    fn sort_field_resolves_across_casing() {
        let settings = ServiceSettings::default();
        let query = Pagination::default()
            .sorted_by("CreatedAt", SortDirection::Descending)
            .to_query::<Diagram>(&settings)
            .expect("known field");
        assert_eq!(query.sort_by, Some(DiagramColumn::CreatedAt));
        assert_eq!(query.sort_direction, SortDirection::Descending);
    }

    #[test]
    fn unknown_sort_field_is_invalid_argument() {
        let result = Pagination::default()
            .sorted_by("colour", SortDirection::Ascending)
            .to_query::<Diagram>(&ServiceSettings::default());
        assert!(matches!(result, Err(ServiceError::InvalidArgument(_))));
    }

    #[test]
    fn pagination_deserializes_direction_words() {
        let pagination: Pagination = serde_json::from_str(
            r#"{"page_index":2,"page_size":5,"sort_by":"title","sort_direction":"DESC"}"#,
        )
        .expect("valid pagination json");
        assert_eq!(pagination.sort_direction, SortDirection::Descending);
    }
}
