//! Favorite use-case service.
//!
//! # Invariants
//! - A favorite is written only after its user and diagram were found.
//! - Only the user who owns a favorite may re-point or delete it.
//! - At most one favorite exists per `(user, diagram)` pair; duplicates are
//!   rejected with `AlreadyExists` before a transaction opens.

use crate::model::diagram::{Diagram, DiagramId};
use crate::model::favorite::{Favorite, FavoriteId};
use crate::model::user::User;
use crate::repo::diagram_repo::DiagramColumn;
use crate::repo::favorite_repo::{FavoriteColumn, FavoriteInclude};
use crate::repo::filter::Filter;
use crate::service::context::UserContext;
use crate::service::dto::{
    FavoriteAddRequest, FavoriteResponse, FavoriteUpdateRequest, PaginatedResponse, Pagination,
};
use crate::service::{execute_with_transaction, ServiceError, ServiceResult, ServiceSettings};
use crate::uow::UnitOfWork;
use log::{info, warn};

const ENTITY: &str = "favorite";

/// Favorite service bound to one unit of work.
pub struct FavoriteService<'uow, C> {
    uow: &'uow mut UnitOfWork,
    users: C,
    settings: ServiceSettings,
}

impl<'uow, C: UserContext> FavoriteService<'uow, C> {
    pub fn new(uow: &'uow mut UnitOfWork, users: C) -> Self {
        Self {
            uow,
            users,
            settings: ServiceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Adds `request.diagram_id` to the acting user's favorites.
    ///
    /// # Errors
    /// - `NotFound` when the acting user or the diagram cannot be resolved.
    /// - `AlreadyExists` when the user already favorited the diagram.
    pub fn create(&mut self, request: FavoriteAddRequest) -> ServiceResult<FavoriteResponse> {
        let user = self.require_user_and_diagram(request.diagram_id)?;
        self.ensure_not_favorited(&user, request.diagram_id)?;

        let favorite = Favorite::new(user.user_id, request.diagram_id);
        let favourite_id = favorite.favourite_id;
        execute_with_transaction(self.uow, &self.settings, "favorite_create", |tx| {
            tx.repository::<Favorite>().create(&favorite)
        })?;
        info!(
            "event=favorite_create module=service status=ok favourite_id={favourite_id} diagram_id={}",
            request.diagram_id
        );
        self.read_back(favourite_id)
    }

    /// Re-points an owned favorite at another diagram.
    pub fn update(&mut self, request: FavoriteUpdateRequest) -> ServiceResult<FavoriteResponse> {
        let user = self.require_user_and_diagram(request.diagram_id)?;

        let favourite_id = request.favorite_id;
        let mut favorite = self
            .uow
            .repository::<Favorite>()
            .get_by(&Filter::eq(FavoriteColumn::FavouriteId, favourite_id), true, &[])?
            .ok_or(ServiceError::NotFound {
                entity: ENTITY,
                key: favourite_id,
            })?;
        if favorite.user_id != user.user_id {
            return Err(ServiceError::Forbidden {
                entity: ENTITY,
                key: favourite_id,
            });
        }
        if favorite.diagram_id != request.diagram_id {
            self.ensure_not_favorited(&user, request.diagram_id)?;
        }

        favorite.diagram_id = request.diagram_id;
        execute_with_transaction(self.uow, &self.settings, "favorite_update", |tx| {
            tx.repository::<Favorite>().update(&favorite)
        })?;
        info!("event=favorite_update module=service status=ok favourite_id={favourite_id}");
        self.read_back(favourite_id)
    }

    /// Removes an owned favorite.
    ///
    /// Returns `Ok(false)` when the favorite does not exist.
    ///
    /// # Errors
    /// - `NotAuthenticated` without an acting user.
    /// - `Forbidden` when the favorite belongs to another user.
    pub fn delete(&mut self, favourite_id: FavoriteId) -> ServiceResult<bool> {
        let user = self
            .users
            .current_user(self.uow)?
            .ok_or(ServiceError::NotAuthenticated)?;
        let found = self.uow.repository::<Favorite>().get_by(
            &Filter::eq(FavoriteColumn::FavouriteId, favourite_id),
            false,
            &[],
        )?;
        let Some(favorite) = found else {
            return Ok(false);
        };
        if favorite.user_id != user.user_id {
            warn!(
                "event=favorite_delete module=service status=error reason=not_owner favourite_id={favourite_id} user_id={}",
                user.user_id
            );
            return Err(ServiceError::Forbidden {
                entity: ENTITY,
                key: favourite_id,
            });
        }

        execute_with_transaction(self.uow, &self.settings, "favorite_delete", |tx| {
            tx.repository::<Favorite>().delete(&favorite)
        })?;
        info!("event=favorite_delete module=service status=ok favourite_id={favourite_id}");
        Ok(true)
    }

    pub fn get_by(
        &mut self,
        filter: &Filter<FavoriteColumn>,
        tracked: bool,
    ) -> ServiceResult<Option<FavoriteResponse>> {
        let found = self
            .uow
            .repository::<Favorite>()
            .get_by(filter, tracked, FavoriteInclude::READ_GRAPH)?;
        Ok(found.as_ref().map(FavoriteResponse::from))
    }

    pub fn get_all(
        &mut self,
        filter: Option<Filter<FavoriteColumn>>,
        pagination: &Pagination,
    ) -> ServiceResult<PaginatedResponse<FavoriteResponse>> {
        let mut query = pagination
            .to_query::<Favorite>(&self.settings)?
            .include(FavoriteInclude::READ_GRAPH);
        query.filter = filter;

        let page = self.uow.repository::<Favorite>().get_all(&query)?;
        Ok(PaginatedResponse {
            items: page.items.iter().map(FavoriteResponse::from).collect(),
            page_index: query.page_index,
            page_size: query.page_size,
            total_count: page.total_count,
        })
    }

    /// Favorites of the acting user.
    pub fn get_by_user(
        &mut self,
        pagination: &Pagination,
    ) -> ServiceResult<PaginatedResponse<FavoriteResponse>> {
        let user = self
            .users
            .current_user(self.uow)?
            .ok_or(ServiceError::NotAuthenticated)?;
        self.get_all(
            Some(Filter::eq(FavoriteColumn::UserId, user.user_id)),
            pagination,
        )
    }

    pub fn get_by_diagram(
        &mut self,
        diagram_id: DiagramId,
        pagination: &Pagination,
    ) -> ServiceResult<PaginatedResponse<FavoriteResponse>> {
        self.get_all(
            Some(Filter::eq(FavoriteColumn::DiagramId, diagram_id)),
            pagination,
        )
    }

    fn require_user_and_diagram(&mut self, diagram_id: DiagramId) -> ServiceResult<User> {
        let user = self.users.current_user(self.uow)?;
        let diagram_exists = self
            .uow
            .repository::<Diagram>()
            .exists(&Filter::eq(DiagramColumn::DiagramId, diagram_id))?;
        match user {
            Some(user) if diagram_exists => Ok(user),
            _ => Err(ServiceError::NotFound {
                entity: "user or diagram",
                key: diagram_id,
            }),
        }
    }

    fn ensure_not_favorited(&mut self, user: &User, diagram_id: DiagramId) -> ServiceResult<()> {
        let exists = self.uow.repository::<Favorite>().exists(
            &Filter::eq(FavoriteColumn::UserId, user.user_id)
                .and(Filter::eq(FavoriteColumn::DiagramId, diagram_id)),
        )?;
        if exists {
            return Err(ServiceError::AlreadyExists {
                entity: ENTITY,
                key: diagram_id,
            });
        }
        Ok(())
    }

    fn read_back(&mut self, favourite_id: FavoriteId) -> ServiceResult<FavoriteResponse> {
        self.get_by(&Filter::eq(FavoriteColumn::FavouriteId, favourite_id), false)?
            .ok_or(ServiceError::NotFound {
                entity: ENTITY,
                key: favourite_id,
            })
    }
}
