//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and unit-of-work calls into diagram and favorite
//!   use cases.
//! - Own the transaction bracket every mutating use case runs in.
//! - Keep transport and identity layers decoupled from storage details.
//!
//! # Invariants
//! - Every mutating use case stages its writes inside exactly one
//!   `execute_with_transaction` bracket.
//! - A failed bracket has already rolled back when its error is returned.

use crate::config::CoreConfig;
use crate::repo::RepoError;
use crate::uow::{Transaction, UnitOfWork};
use log::{debug, error};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub mod context;
pub mod diagram_service;
pub mod dto;
pub mod favorite_service;

/// Service error for diagram and favorite use cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Request is missing required data or fails validation.
    InvalidArgument(String),
    /// No acting user could be resolved where one is required.
    NotAuthenticated,
    /// A referenced entity does not exist.
    NotFound { entity: &'static str, key: Uuid },
    /// The acting user may not mutate the target entity.
    Forbidden { entity: &'static str, key: Uuid },
    /// The write would duplicate an existing entity.
    AlreadyExists { entity: &'static str, key: Uuid },
    /// A bracketed mutation failed and was rolled back.
    TransactionFailure(RepoError),
    /// Persistence failure outside a transaction bracket.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::NotAuthenticated => write!(f, "user not authenticated"),
            Self::NotFound { entity, key } => write!(f, "{entity} not found: {key}"),
            Self::Forbidden { entity, key } => {
                write!(f, "acting user may not modify {entity} {key}")
            }
            Self::AlreadyExists { entity, key } => write!(f, "{entity} already exists: {key}"),
            Self::TransactionFailure(err) => write!(f, "transaction rolled back: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TransactionFailure(err) | Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Paging and transaction knobs shared by services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Page size used when a request leaves it at `0`.
    pub default_page_size: u32,
    /// Upper bound applied to requested page sizes.
    pub max_page_size: u32,
    /// Deadline applied to each transaction bracket.
    pub transaction_timeout: Option<Duration>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_page_size: crate::repo::generic_repo::DEFAULT_PAGE_SIZE,
            max_page_size: 100,
            transaction_timeout: None,
        }
    }
}

impl From<&CoreConfig> for ServiceSettings {
    fn from(config: &CoreConfig) -> Self {
        Self {
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            transaction_timeout: config.transaction_timeout,
        }
    }
}

/// Runs `action` inside one transaction and commits it.
///
/// Any failure in `action` or in the commit rolls the transaction back and
/// returns `TransactionFailure` carrying the original cause.
pub fn execute_with_transaction<T>(
    uow: &mut UnitOfWork,
    settings: &ServiceSettings,
    operation: &'static str,
    action: impl FnOnce(&mut Transaction<'_>) -> Result<T, RepoError>,
) -> ServiceResult<T> {
    let started_at = Instant::now();
    let deadline = settings
        .transaction_timeout
        .map(|timeout| started_at + timeout);

    let mut tx = uow
        .begin_transaction_with_deadline(deadline)
        .map_err(|err| {
            error!("event={operation} module=service status=error stage=begin error={err}");
            ServiceError::TransactionFailure(err)
        })?;
    let transaction_id = tx.id();

    let value = match action(&mut tx) {
        Ok(value) => value,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                error!(
                    "event={operation} module=service status=error stage=rollback transaction_id={transaction_id} error={rollback_err}"
                );
            }
            error!(
                "event={operation} module=service status=error stage=action transaction_id={transaction_id} error={err}"
            );
            return Err(ServiceError::TransactionFailure(err));
        }
    };

    if let Err(err) = tx.commit() {
        error!(
            "event={operation} module=service status=error stage=commit transaction_id={transaction_id} error={err}"
        );
        return Err(ServiceError::TransactionFailure(err));
    }

    debug!(
        "event={operation} module=service status=ok transaction_id={transaction_id} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(value)
}
