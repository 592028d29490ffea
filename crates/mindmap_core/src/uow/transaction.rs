//! Scoped transaction guard.

use super::{TransactionId, UnitOfWork};
use crate::repo::RepoResult;
use log::{error, warn};
use std::ops::{Deref, DerefMut};

/// Open transaction on a unit of work.
///
/// `commit` and `rollback` consume the guard. A guard dropped without either
/// rolls the transaction back.
pub struct Transaction<'uow> {
    uow: &'uow mut UnitOfWork,
    id: TransactionId,
    finished: bool,
}

impl<'uow> Transaction<'uow> {
    pub(super) fn new(uow: &'uow mut UnitOfWork, id: TransactionId) -> Self {
        Self {
            uow,
            id,
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Flushes staged changes and commits.
    ///
    /// On failure the transaction is already rolled back when this returns.
    pub fn commit(mut self) -> RepoResult<()> {
        self.finished = true;
        self.uow.commit_active()
    }

    /// Discards staged changes and rolls back.
    pub fn rollback(mut self) -> RepoResult<()> {
        self.finished = true;
        self.uow.rollback_active()
    }
}

impl Deref for Transaction<'_> {
    type Target = UnitOfWork;

    fn deref(&self) -> &Self::Target {
        self.uow
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.uow
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished || self.uow.active_transaction() != Some(self.id) {
            return;
        }
        warn!(
            "event=tx_rollback module=uow status=start transaction_id={} reason=guard_dropped",
            self.id
        );
        if let Err(err) = self.uow.rollback_active() {
            error!(
                "event=tx_rollback module=uow status=error transaction_id={} error={err}",
                self.id
            );
        }
    }
}
