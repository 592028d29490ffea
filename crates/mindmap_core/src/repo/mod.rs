//! Repository layer abstractions and SQLite persistence.
//!
//! # Responsibility
//! - Map entities to tables through the `Entity` trait.
//! - Compose predicates (`Filter`), eager-load graphs, sorting and pagination
//!   into parameterized SQL evaluated by SQLite.
//! - Stage writes into the owning unit of work's change log.
//!
//! # Invariants
//! - Column names in generated SQL come only from static column enums; user
//!   values are always bound parameters.
//! - Filtering, counting, ordering and paging never happen in process memory.
//! - Repository reads see flushed data only; staged writes become visible
//!   after `UnitOfWork::complete` or commit.

use crate::db::DbError;
use crate::uow::TransactionId;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod diagram_repo;
pub mod entity;
pub mod favorite_repo;
pub mod filter;
pub mod generic_repo;
pub mod user_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors raised by repositories and the unit of work.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// A staged update or delete matched no row at flush time.
    NotFound { table: &'static str, key: Uuid },
    /// Persisted data cannot be converted into a valid entity.
    InvalidData(String),
    /// A sort or filter field name does not exist on the entity.
    UnknownField {
        entity: &'static str,
        field: String,
    },
    /// `begin_transaction` was called while another transaction is open.
    TransactionAlreadyActive(TransactionId),
    /// Commit or rollback was requested without an open transaction.
    NoActiveTransaction,
    /// The transaction deadline passed before the work finished.
    DeadlineExceeded { transaction_id: TransactionId },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { table, key } => write!(f, "row not found in `{table}`: {key}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UnknownField { entity, field } => {
                write!(f, "unknown field `{field}` on entity `{entity}`")
            }
            Self::TransactionAlreadyActive(id) => {
                write!(f, "transaction {id} is already active on this unit of work")
            }
            Self::NoActiveTransaction => write!(f, "no active transaction"),
            Self::DeadlineExceeded { transaction_id } => {
                write!(f, "transaction {transaction_id} exceeded its deadline")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::InvalidData(_) => None,
            Self::UnknownField { .. } => None,
            Self::TransactionAlreadyActive(_) => None,
            Self::NoActiveTransaction => None,
            Self::DeadlineExceeded { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
