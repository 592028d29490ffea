//! Diagram use-case service.
//!
//! # Responsibility
//! - Provide diagram create/clone/read/update/delete APIs.
//! - Maintain clone lineage and favorites when a diagram is deleted.
//! - Compute per-request personalization flags on read projections.
//!
//! # Invariants
//! - Delete runs detach-from-base, orphan-derived, delete-favorites and
//!   delete-diagram in that order inside one transaction.
//! - Derived diagrams survive the deletion of their base.
//! - Only the owner may update or delete a diagram; ownership is never
//!   reassigned.
//! - New diagrams may only derive from public or owned diagrams.
//! - Description generation never fails a create and never runs while a
//!   transaction is open.

use crate::model::diagram::{Diagram, DiagramId};
use crate::model::favorite::Favorite;
use crate::model::user::{User, UserId};
use crate::repo::diagram_repo::{DiagramColumn, DiagramInclude};
use crate::repo::favorite_repo::FavoriteColumn;
use crate::repo::filter::Filter;
use crate::service::context::{DescriptionGenerator, NoDescription, UserContext};
use crate::service::dto::{
    DiagramAddRequest, DiagramResponse, DiagramUpdateRequest, PaginatedResponse, Pagination,
};
use crate::service::{execute_with_transaction, ServiceError, ServiceResult, ServiceSettings};
use crate::uow::UnitOfWork;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static LINE_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\r\n]+").expect("valid line break regex"));

const ENTITY: &str = "diagram";

/// Diagram service bound to one unit of work.
pub struct DiagramService<'uow, C, G = NoDescription> {
    uow: &'uow mut UnitOfWork,
    users: C,
    describer: G,
    settings: ServiceSettings,
}

impl<'uow, C: UserContext> DiagramService<'uow, C, NoDescription> {
    /// Creates a service that stores diagrams without descriptions.
    pub fn new(uow: &'uow mut UnitOfWork, users: C) -> Self {
        Self {
            uow,
            users,
            describer: NoDescription,
            settings: ServiceSettings::default(),
        }
    }
}

impl<'uow, C: UserContext, G: DescriptionGenerator> DiagramService<'uow, C, G> {
    /// Replaces the description generator.
    pub fn with_description_generator<H: DescriptionGenerator>(
        self,
        describer: H,
    ) -> DiagramService<'uow, C, H> {
        DiagramService {
            uow: self.uow,
            users: self.users,
            describer,
            settings: self.settings,
        }
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Creates a diagram owned by the acting user.
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty or over-long title or empty content.
    /// - `NotAuthenticated` without an acting user.
    /// - `NotFound` when `base_diagram_id` references no diagram.
    /// - `Forbidden` when the base is private and owned by someone else.
    pub fn create(&mut self, request: DiagramAddRequest) -> ServiceResult<DiagramResponse> {
        request.validate()?;
        let user = self.require_user()?;

        if let Some(base_id) = request.base_diagram_id {
            self.require_derivable(&user, base_id)?;
        }

        let mut diagram = Diagram::new(request.title, request.content_json, user.user_id);
        diagram.is_public = request.is_public;
        diagram.base_diagram_id = request.base_diagram_id;
        diagram.description = self.describe(&diagram);

        self.persist_new(diagram)
    }

    /// Clones `source_id` into a new private diagram owned by the acting user.
    ///
    /// The source must be public or owned by the acting user.
    pub fn clone_diagram(&mut self, source_id: DiagramId) -> ServiceResult<DiagramResponse> {
        let user = self.require_user()?;
        let source = self.require_derivable(&user, source_id)?;

        let mut diagram = Diagram::new(source.title, source.content_json, user.user_id);
        diagram.description = source.description;
        diagram.base_diagram_id = Some(source_id);

        self.persist_new(diagram)
    }

    /// Returns the first diagram matching `filter`, with the full include graph.
    pub fn get_by(
        &mut self,
        filter: &Filter<DiagramColumn>,
        tracked: bool,
    ) -> ServiceResult<Option<DiagramResponse>> {
        let found = self
            .uow
            .repository::<Diagram>()
            .get_by(filter, tracked, DiagramInclude::FULL_GRAPH)?;
        let Some(diagram) = found else {
            return Ok(None);
        };

        let mut items = vec![DiagramResponse::from(&diagram)];
        self.personalize(&mut items)?;
        Ok(items.pop())
    }

    pub fn get_by_id(&mut self, diagram_id: DiagramId) -> ServiceResult<Option<DiagramResponse>> {
        self.get_by(&Filter::eq(DiagramColumn::DiagramId, diagram_id), false)
    }

    /// Returns one page of diagrams matching `filter` (`None` matches all).
    pub fn get_all(
        &mut self,
        filter: Option<Filter<DiagramColumn>>,
        pagination: &Pagination,
    ) -> ServiceResult<PaginatedResponse<DiagramResponse>> {
        let mut query = pagination
            .to_query::<Diagram>(&self.settings)?
            .include(DiagramInclude::FULL_GRAPH);
        query.filter = filter;

        let page = self.uow.repository::<Diagram>().get_all(&query)?;
        let mut items: Vec<DiagramResponse> = page.items.iter().map(DiagramResponse::from).collect();
        self.personalize(&mut items)?;

        Ok(PaginatedResponse {
            items,
            page_index: query.page_index,
            page_size: query.page_size,
            total_count: page.total_count,
        })
    }

    pub fn get_public(
        &mut self,
        pagination: &Pagination,
    ) -> ServiceResult<PaginatedResponse<DiagramResponse>> {
        self.get_all(Some(Filter::eq(DiagramColumn::IsPublic, true)), pagination)
    }

    /// Every diagram owned by `user_id`, public or not.
    pub fn get_user_diagrams(
        &mut self,
        user_id: UserId,
        pagination: &Pagination,
    ) -> ServiceResult<PaginatedResponse<DiagramResponse>> {
        self.get_all(Some(Filter::eq(DiagramColumn::UserId, user_id)), pagination)
    }

    /// Public diagrams whose title contains `title`, ignoring case.
    pub fn search_public_by_title(
        &mut self,
        title: &str,
        pagination: &Pagination,
    ) -> ServiceResult<PaginatedResponse<DiagramResponse>> {
        let filter = Filter::contains(DiagramColumn::Title, title.trim())
            .and(Filter::eq(DiagramColumn::IsPublic, true));
        self.get_all(Some(filter), pagination)
    }

    /// Replaces title, content and visibility of an owned diagram.
    ///
    /// # Errors
    /// - `InvalidArgument`, `NotAuthenticated` as for `create`.
    /// - `NotFound` when the diagram does not exist.
    /// - `Forbidden` when the acting user is not the owner.
    pub fn update(&mut self, request: DiagramUpdateRequest) -> ServiceResult<DiagramResponse> {
        request.validate()?;
        let user = self.require_user()?;

        let diagram_id = request.diagram_id;
        let mut diagram = self
            .uow
            .repository::<Diagram>()
            .get_by(&Filter::eq(DiagramColumn::DiagramId, diagram_id), true, &[])?
            .ok_or(ServiceError::NotFound {
                entity: ENTITY,
                key: diagram_id,
            })?;
        if diagram.user_id != user.user_id {
            warn!(
                "event=diagram_update module=service status=error reason=not_owner diagram_id={diagram_id} user_id={}",
                user.user_id
            );
            return Err(ServiceError::Forbidden {
                entity: ENTITY,
                key: diagram_id,
            });
        }

        diagram.title = request.title;
        diagram.content_json = request.content_json;
        diagram.is_public = request.is_public;
        diagram.touch();

        execute_with_transaction(self.uow, &self.settings, "diagram_update", |tx| {
            tx.repository::<Diagram>().update(&diagram)
        })?;
        info!("event=diagram_update module=service status=ok diagram_id={diagram_id}");

        self.read_back(diagram_id)
    }

    /// Deletes an owned diagram and maintains its dependents.
    ///
    /// Returns `Ok(false)` when the diagram does not exist; no transaction is
    /// opened in that case. The lineage and favorites are read inside the
    /// transaction, so rows added before it began are maintained too.
    ///
    /// # Errors
    /// - `NotAuthenticated` without an acting user.
    /// - `Forbidden` when the acting user is not the owner.
    pub fn delete(&mut self, diagram_id: DiagramId) -> ServiceResult<bool> {
        let user = self.require_user()?;
        let found = self.uow.repository::<Diagram>().get_by(
            &Filter::eq(DiagramColumn::DiagramId, diagram_id),
            false,
            &[],
        )?;
        let Some(diagram) = found else {
            info!("event=diagram_delete module=service status=ok result=not_found diagram_id={diagram_id}");
            return Ok(false);
        };
        if diagram.user_id != user.user_id {
            warn!(
                "event=diagram_delete module=service status=error reason=not_owner diagram_id={diagram_id} user_id={}",
                user.user_id
            );
            return Err(ServiceError::Forbidden {
                entity: ENTITY,
                key: diagram_id,
            });
        }

        let removed = execute_with_transaction(self.uow, &self.settings, "diagram_delete", |tx| {
            let found = tx.repository::<Diagram>().get_by(
                &Filter::eq(DiagramColumn::DiagramId, diagram_id),
                true,
                DiagramInclude::FULL_GRAPH,
            )?;
            let Some(mut diagram) = found else {
                return Ok(None);
            };
            let counts = (diagram.derived_diagrams.len(), diagram.favorites.len());

            if let Some(base_id) = diagram.base_diagram_id {
                let mut diagrams = tx.repository::<Diagram>();
                let base = diagrams.get_by(
                    &Filter::eq(DiagramColumn::DiagramId, base_id),
                    true,
                    &[DiagramInclude::DerivedDiagrams],
                )?;
                diagram.base_diagram_id = None;
                diagram.base_diagram = None;
                diagrams.update(&diagram)?;
                if let Some(mut base) = base {
                    base.detach_derived(diagram.diagram_id);
                    diagrams.update(&base)?;
                }
            }

            for derived in diagram.derived_diagrams.iter_mut() {
                derived.orphan();
                tx.repository::<Diagram>().update(derived)?;
            }

            let mut favorites = tx.repository::<Favorite>();
            for favorite in &diagram.favorites {
                favorites.delete(favorite)?;
            }

            tx.repository::<Diagram>().delete(&diagram)?;
            Ok(Some(counts))
        })?;

        let Some((derived_count, favorite_count)) = removed else {
            info!("event=diagram_delete module=service status=ok result=not_found diagram_id={diagram_id}");
            return Ok(false);
        };
        info!(
            "event=diagram_delete module=service status=ok diagram_id={diagram_id} orphaned={derived_count} favorites_removed={favorite_count}"
        );
        Ok(true)
    }

    fn persist_new(&mut self, diagram: Diagram) -> ServiceResult<DiagramResponse> {
        let diagram_id = diagram.diagram_id;
        execute_with_transaction(self.uow, &self.settings, "diagram_create", |tx| {
            tx.repository::<Diagram>().create(&diagram)
        })?;
        info!(
            "event=diagram_create module=service status=ok diagram_id={diagram_id} is_clone={}",
            diagram.is_clone()
        );
        self.read_back(diagram_id)
    }

    fn read_back(&mut self, diagram_id: DiagramId) -> ServiceResult<DiagramResponse> {
        self.get_by_id(diagram_id)?.ok_or(ServiceError::NotFound {
            entity: ENTITY,
            key: diagram_id,
        })
    }

    fn require_user(&mut self) -> ServiceResult<User> {
        self.users
            .current_user(self.uow)?
            .ok_or(ServiceError::NotAuthenticated)
    }

    /// Loads a diagram the acting user may derive from: public or owned.
    fn require_derivable(&mut self, user: &User, diagram_id: DiagramId) -> ServiceResult<Diagram> {
        let diagram = self
            .uow
            .repository::<Diagram>()
            .get_by(&Filter::eq(DiagramColumn::DiagramId, diagram_id), false, &[])?
            .ok_or(ServiceError::NotFound {
                entity: ENTITY,
                key: diagram_id,
            })?;
        if !diagram.is_public && diagram.user_id != user.user_id {
            return Err(ServiceError::Forbidden {
                entity: ENTITY,
                key: diagram_id,
            });
        }
        Ok(diagram)
    }

    fn describe(&self, diagram: &Diagram) -> Option<String> {
        match self.describer.generate_description(&diagram.content_json) {
            Ok(Some(text)) => normalize_description(&text),
            Ok(None) => None,
            Err(err) => {
                warn!(
                    "event=diagram_describe module=service status=error diagram_id={} error={err}",
                    diagram.diagram_id
                );
                None
            }
        }
    }

    /// Sets `is_in_favorite` and `is_clone` relative to the acting user.
    ///
    /// Leaves both flags false when the request is unauthenticated.
    fn personalize(&mut self, items: &mut [DiagramResponse]) -> ServiceResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let Some(user) = self.users.current_user(self.uow)? else {
            return Ok(());
        };
        let ids: Vec<DiagramId> = items.iter().map(|item| item.diagram_id).collect();

        let favorited: HashSet<DiagramId> = self
            .uow
            .repository::<Favorite>()
            .find(
                &Filter::eq(FavoriteColumn::UserId, user.user_id)
                    .and(Filter::is_in(FavoriteColumn::DiagramId, ids.iter())),
            )?
            .into_iter()
            .map(|favorite| favorite.diagram_id)
            .collect();

        let cloned: HashSet<DiagramId> = self
            .uow
            .repository::<Diagram>()
            .find(
                &Filter::eq(DiagramColumn::UserId, user.user_id)
                    .and(Filter::is_in(DiagramColumn::BaseDiagramId, ids.iter())),
            )?
            .into_iter()
            .filter_map(|clone| clone.base_diagram_id)
            .collect();

        for item in items.iter_mut() {
            item.is_in_favorite = favorited.contains(&item.diagram_id);
            item.is_clone = cloned.contains(&item.diagram_id);
        }
        Ok(())
    }
}

/// Collapses line breaks into spaces and trims; blank text becomes `None`.
fn normalize_description(text: &str) -> Option<String> {
    let normalized = LINE_BREAK_RE.replace_all(text, " ");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
