//! Persistence and relationship core for mind-map diagrams.
//!
//! Diagrams, their clone lineage and favorites are stored in SQLite through a
//! generic repository, coordinated by a unit of work, and exposed through the
//! diagram and favorite services.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod uow;

pub use config::CoreConfig;
pub use db::{open_db, open_db_in_memory, open_db_with_timeout, DbError, DbResult};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::diagram::{Diagram, DiagramId};
pub use model::favorite::{Favorite, FavoriteId};
pub use model::user::{User, UserId};
pub use repo::diagram_repo::{DiagramColumn, DiagramInclude};
pub use repo::favorite_repo::{FavoriteColumn, FavoriteInclude};
pub use repo::filter::{Filter, SortDirection};
pub use repo::generic_repo::{ListQuery, Page, Repository};
pub use repo::user_repo::UserColumn;
pub use repo::{RepoError, RepoResult};
pub use service::context::{
    AnonymousUserContext, ClaimsUserContext, DescriptionError, DescriptionGenerator,
    NoDescription, UserContext,
};
pub use service::diagram_service::DiagramService;
pub use service::dto::{
    DiagramAddRequest, DiagramResponse, DiagramUpdateRequest, FavoriteAddRequest,
    FavoriteResponse, FavoriteUpdateRequest, PaginatedResponse, Pagination,
};
pub use service::favorite_service::FavoriteService;
pub use service::{ServiceError, ServiceResult, ServiceSettings};
pub use uow::{Transaction, TransactionId, UnitOfWork};

/// Opens the database named by `config`, or an in-memory one when unset.
pub fn open_unit_of_work(config: &CoreConfig) -> RepoResult<UnitOfWork> {
    let conn = match config.database_path.as_deref() {
        Some(path) => open_db_with_timeout(path, config.busy_timeout)?,
        None => open_db_in_memory()?,
    };
    Ok(UnitOfWork::new(conn))
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
