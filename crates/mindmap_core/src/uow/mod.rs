//! Unit of work: one session, memoized repositories, one transaction at a time.
//!
//! # Responsibility
//! - Own the SQLite session for one request scope and release it on drop.
//! - Hand out exactly one repository instance per entity type.
//! - Collect staged writes and flush them in staging order.
//! - Bracket repository calls in `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK`.
//!
//! # Invariants
//! - At most one transaction is active per unit of work; nesting is rejected.
//! - Every begun transaction ends in exactly one commit or rollback. The
//!   `Transaction` guard rolls back when dropped unfinished.
//! - A failed flush or a rollback discards staged changes and tracked
//!   snapshots, so nothing from the failed attempt is replayed later.
//! - A successful commit releases every tracked snapshot; entities must be
//!   re-read with tracking before the next update.
//! - `UnitOfWork` is not `Sync`; it must not be shared across concurrent
//!   operations.

use crate::db::{open_db, open_db_in_memory};
use crate::repo::entity::Entity;
use crate::repo::generic_repo::{Repository, RepositoryState, SqliteRepository};
use crate::repo::{RepoError, RepoResult};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::any::TypeId;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

pub mod change;
mod transaction;

pub use change::{ChangeKind, PendingChange};
pub use transaction::Transaction;

/// Identifier of one transaction, used to correlate log events.
pub type TransactionId = Uuid;

struct ActiveTransaction {
    id: TransactionId,
    deadline: Option<Instant>,
    started_at: Instant,
}

/// Session-scoped coordinator of repositories and transactions.
pub struct UnitOfWork {
    conn: Connection,
    repositories: HashMap<TypeId, Box<dyn RepositoryState>>,
    pending: Vec<PendingChange>,
    active: Option<ActiveTransaction>,
}

impl UnitOfWork {
    /// Wraps an opened and migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            repositories: HashMap::new(),
            pending: Vec::new(),
            active: None,
        }
    }

    /// Opens a database file and wraps the session.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    /// Opens a private in-memory database and wraps the session.
    pub fn open_in_memory() -> RepoResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Underlying session, for diagnostics and test setup.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns the repository for `E`.
    ///
    /// The backing instance is created on first use and reused for the
    /// lifetime of this unit of work.
    pub fn repository<E: Entity>(&mut self) -> Repository<'_, E> {
        let state = self
            .repositories
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(SqliteRepository::<E>::new()) as Box<dyn RepositoryState>)
            .as_any_mut()
            .downcast_mut::<SqliteRepository<E>>()
            .expect("repository map is keyed by the entity's own TypeId");
        Repository::bind(&self.conn, state, &mut self.pending)
    }

    /// Number of repository instances constructed so far.
    pub fn repository_count(&self) -> usize {
        self.repositories.len()
    }

    /// Changes staged since the last flush, in application order.
    pub fn pending_changes(&self) -> &[PendingChange] {
        &self.pending
    }

    /// Drops staged changes without touching the store.
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        self.clear_tracking();
        discarded
    }

    /// Id of the open transaction, if any.
    pub fn active_transaction(&self) -> Option<TransactionId> {
        self.active.as_ref().map(|active| active.id)
    }

    /// Begins a transaction without a deadline.
    pub fn begin_transaction(&mut self) -> RepoResult<Transaction<'_>> {
        self.begin_transaction_with_deadline(None)
    }

    /// Begins a transaction that fails with `DeadlineExceeded` if it is still
    /// flushing or committing after `deadline`.
    pub fn begin_transaction_with_deadline(
        &mut self,
        deadline: Option<Instant>,
    ) -> RepoResult<Transaction<'_>> {
        if let Some(active) = self.active.as_ref() {
            return Err(RepoError::TransactionAlreadyActive(active.id));
        }

        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        let id = Uuid::new_v4();
        self.active = Some(ActiveTransaction {
            id,
            deadline,
            started_at: Instant::now(),
        });
        debug!("event=tx_begin module=uow status=ok transaction_id={id}");
        Ok(Transaction::new(self, id))
    }

    /// Flushes staged changes without ending the current transaction.
    ///
    /// Outside a transaction the flush runs in its own implicit transaction,
    /// so it still applies all-or-nothing, and tracking is released once it
    /// commits. Returns the affected row count.
    pub fn complete(&mut self) -> RepoResult<usize> {
        if self.active.is_some() {
            return self.flush();
        }
        if self.pending.is_empty() {
            return Ok(0);
        }

        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        let affected = match self.flush() {
            Ok(affected) => affected,
            Err(err) => {
                self.rollback_quietly();
                return Err(err);
            }
        };
        if let Err(err) = self.conn.execute_batch("COMMIT;") {
            self.rollback_quietly();
            self.clear_tracking();
            return Err(err.into());
        }
        self.clear_tracking();
        Ok(affected)
    }

    fn flush(&mut self) -> RepoResult<usize> {
        let started_at = Instant::now();
        let changes = std::mem::take(&mut self.pending);
        let mut affected = 0;

        for change in &changes {
            if let Err(err) = self.check_deadline() {
                self.clear_tracking();
                return Err(err);
            }
            match change.apply(&self.conn) {
                Ok(rows) => affected += rows,
                Err(err) => {
                    error!(
                        "event=uow_flush module=uow status=error table={} key={} error={}",
                        change.table(),
                        change.key(),
                        err
                    );
                    self.clear_tracking();
                    return Err(err);
                }
            }
        }

        debug!(
            "event=uow_flush module=uow status=ok changes={} affected={} duration_ms={}",
            changes.len(),
            affected,
            started_at.elapsed().as_millis()
        );
        Ok(affected)
    }

    fn check_deadline(&self) -> RepoResult<()> {
        match self.active.as_ref() {
            Some(active) if active.deadline.is_some_and(|deadline| Instant::now() > deadline) => {
                Err(RepoError::DeadlineExceeded {
                    transaction_id: active.id,
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn commit_active(&mut self) -> RepoResult<()> {
        let (id, started_at) = match self.active.as_ref() {
            Some(active) => (active.id, active.started_at),
            None => return Err(RepoError::NoActiveTransaction),
        };

        if let Err(err) = self.flush().and_then(|_| self.check_deadline()) {
            if let Err(rollback_err) = self.rollback_active() {
                error!(
                    "event=tx_rollback module=uow status=error transaction_id={id} error={rollback_err}"
                );
            }
            return Err(err);
        }

        if let Err(err) = self.conn.execute_batch("COMMIT;") {
            if let Err(rollback_err) = self.rollback_active() {
                error!(
                    "event=tx_rollback module=uow status=error transaction_id={id} error={rollback_err}"
                );
            }
            return Err(err.into());
        }

        self.active = None;
        self.clear_tracking();
        debug!(
            "event=tx_commit module=uow status=ok transaction_id={id} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    pub(crate) fn rollback_active(&mut self) -> RepoResult<()> {
        let active = self.active.take().ok_or(RepoError::NoActiveTransaction)?;
        let discarded = self.pending.len();
        self.pending.clear();
        self.clear_tracking();

        // SQLite may already have rolled back on its own (e.g. after a
        // constraint abort inside a trigger); `ROLLBACK` would then fail.
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK;")?;
        }
        info!(
            "event=tx_rollback module=uow status=ok transaction_id={} discarded_changes={} duration_ms={}",
            active.id,
            discarded,
            active.started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn rollback_quietly(&mut self) {
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
            error!("event=uow_flush module=uow status=error stage=rollback error={err}");
        }
    }

    fn clear_tracking(&mut self) {
        for repository in self.repositories.values_mut() {
            repository.clear_tracking();
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if let Some(active) = self.active.as_ref() {
            warn!(
                "event=uow_dispose module=uow status=error transaction_id={} reason=transaction_left_open",
                active.id
            );
            if let Err(err) = self.rollback_active() {
                error!("event=uow_dispose module=uow status=error error={err}");
            }
        }
        if !self.pending.is_empty() {
            warn!(
                "event=uow_dispose module=uow status=ok discarded_changes={}",
                self.pending.len()
            );
        }
    }
}
