//! Generic predicate-driven repository over one entity type.
//!
//! # Responsibility
//! - Execute filtered, eager-loaded, sorted and paginated reads in SQLite.
//! - Stage create/update/delete into the unit of work's change log.
//! - Keep a per-type identity map of tracked snapshots so updates write only
//!   the columns that changed.
//!
//! # Invariants
//! - `get_all` reports the total matching count computed before pagination.
//! - Results without an explicit sort are ordered by insertion (`rowid`);
//!   explicit sorts use `rowid` as the tie-breaker, so pages are stable.
//! - Included navigations are never tracked.

use crate::repo::entity::{Column, Entity};
use crate::repo::filter::{Filter, SortDirection};
use crate::repo::RepoResult;
use crate::uow::change::PendingChange;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Instant;
use uuid::Uuid;

/// Page size used when a list query does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// List query options for `Repository::get_all`.
#[derive(Debug, Clone)]
pub struct ListQuery<E: Entity> {
    /// `None` matches every row.
    pub filter: Option<Filter<E::Column>>,
    pub include: Vec<E::Include>,
    pub sort_by: Option<E::Column>,
    pub sort_direction: SortDirection,
    /// 1-based page index. `0` is treated as `1`.
    pub page_index: u32,
    /// Rows per page. `0` falls back to `DEFAULT_PAGE_SIZE`.
    pub page_size: u32,
}

impl<E: Entity> Default for ListQuery<E> {
    fn default() -> Self {
        Self {
            filter: None,
            include: Vec::new(),
            sort_by: None,
            sort_direction: SortDirection::Ascending,
            page_index: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl<E: Entity> ListQuery<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter<E::Column>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn include(mut self, include: &[E::Include]) -> Self {
        self.include = include.to_vec();
        self
    }

    pub fn sort(mut self, column: E::Column, direction: SortDirection) -> Self {
        self.sort_by = Some(column);
        self.sort_direction = direction;
        self
    }

    pub fn page(mut self, page_index: u32, page_size: u32) -> Self {
        self.page_index = page_index;
        self.page_size = page_size;
        self
    }

    fn window(&self) -> (u32, u64) {
        let page_index = self.page_index.max(1);
        let page_size = if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        };
        let offset = u64::from(page_index - 1) * u64::from(page_size);
        (page_size, offset)
    }
}

/// One page of results plus the pre-pagination match count.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

/// Type-erased view of a memoized repository, owned by the unit of work.
pub(crate) trait RepositoryState {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clear_tracking(&mut self);
}

/// Per-type repository instance memoized by the unit of work.
///
/// Holds the identity map of tracked snapshots. It is bound to the session
/// through the short-lived `Repository` handle.
pub struct SqliteRepository<E: Entity> {
    tracked: HashMap<Uuid, Vec<Value>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> SqliteRepository<E> {
    pub(crate) fn new() -> Self {
        Self {
            tracked: HashMap::new(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> RepositoryState for SqliteRepository<E> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clear_tracking(&mut self) {
        self.tracked.clear();
    }
}

/// Repository handle for `E`, borrowed from a unit of work.
pub struct Repository<'uow, E: Entity> {
    conn: &'uow Connection,
    state: &'uow mut SqliteRepository<E>,
    pending: &'uow mut Vec<PendingChange>,
}

impl<'uow, E: Entity> Repository<'uow, E> {
    pub(crate) fn bind(
        conn: &'uow Connection,
        state: &'uow mut SqliteRepository<E>,
        pending: &'uow mut Vec<PendingChange>,
    ) -> Self {
        Self {
            conn,
            state,
            pending,
        }
    }

    /// Stages an insert. Identity must already be assigned by the caller.
    pub fn create(&mut self, entity: &E) -> RepoResult<()> {
        let values = entity.column_values();
        let key = entity.key();
        self.pending.push(PendingChange::insert(
            E::TABLE,
            E::KEY.name(),
            key,
            column_names::<E>(),
            values.clone(),
        ));
        self.state.tracked.insert(key, values);
        debug!(
            "event=repo_stage module=repo op=insert table={} key={}",
            E::TABLE,
            key
        );
        Ok(())
    }

    /// Stages a full-entity replace.
    ///
    /// Tracked entities write only the columns that differ from their
    /// snapshot; an unchanged tracked entity stages nothing.
    pub fn update(&mut self, entity: &E) -> RepoResult<()> {
        let key = entity.key();
        let values = entity.column_values();
        let snapshot = self.state.tracked.get(&key);

        let mut columns = Vec::new();
        let mut changed = Vec::new();
        for (index, (column, value)) in E::Column::ALL.iter().zip(values.iter()).enumerate() {
            if *column == E::KEY {
                continue;
            }
            let differs = snapshot
                .and_then(|snapshot| snapshot.get(index))
                .map_or(true, |previous| previous != value);
            if differs {
                columns.push(column.name());
                changed.push(value.clone());
            }
        }

        if columns.is_empty() {
            debug!(
                "event=repo_stage module=repo op=update table={} key={} status=skipped reason=unchanged",
                E::TABLE,
                key
            );
            return Ok(());
        }

        debug!(
            "event=repo_stage module=repo op=update table={} key={} columns={}",
            E::TABLE,
            key,
            columns.len()
        );
        self.pending.push(PendingChange::update(
            E::TABLE,
            E::KEY.name(),
            key,
            columns,
            changed,
        ));
        self.state.tracked.insert(key, values);
        Ok(())
    }

    /// Stages a delete of `entity` by key and stops tracking it.
    pub fn delete(&mut self, entity: &E) -> RepoResult<()> {
        let key = entity.key();
        self.pending
            .push(PendingChange::delete(E::TABLE, E::KEY.name(), key));
        self.state.tracked.remove(&key);
        debug!(
            "event=repo_stage module=repo op=delete table={} key={}",
            E::TABLE,
            key
        );
        Ok(())
    }

    /// Returns at most one entity matching `filter`.
    ///
    /// `tracked = true` registers the result for later `update`; use it for
    /// mutation flows and leave it off for display reads.
    pub fn get_by(
        &mut self,
        filter: &Filter<E::Column>,
        tracked: bool,
        include: &[E::Include],
    ) -> RepoResult<Option<E>> {
        let mut items = select::<E>(self.conn, Some(filter), None, Some((1, 0)))?;
        E::load_includes(self.conn, &mut items, include)?;
        let found = items.into_iter().next();

        if tracked {
            if let Some(entity) = found.as_ref() {
                self.state
                    .tracked
                    .insert(entity.key(), entity.column_values());
            }
        }
        Ok(found)
    }

    /// Returns one page of matching entities and the total match count.
    pub fn get_all(&self, query: &ListQuery<E>) -> RepoResult<Page<E>> {
        let started_at = Instant::now();
        let (limit, offset) = query.window();
        let total_count = count::<E>(self.conn, query.filter.as_ref())?;
        let order = query.sort_by.map(|column| (column, query.sort_direction));
        let mut items = if offset >= total_count {
            Vec::new()
        } else {
            select::<E>(self.conn, query.filter.as_ref(), order, Some((limit, offset)))?
        };
        E::load_includes(self.conn, &mut items, &query.include)?;

        debug!(
            "event=repo_query module=repo table={} status=ok rows={} total={} duration_ms={}",
            E::TABLE,
            items.len(),
            total_count,
            started_at.elapsed().as_millis()
        );
        Ok(Page { items, total_count })
    }

    /// Returns every entity matching `filter`, without includes or paging.
    ///
    /// Intended for narrow set lookups (ids of one page, one user's rows).
    pub fn find(&self, filter: &Filter<E::Column>) -> RepoResult<Vec<E>> {
        select::<E>(self.conn, Some(filter), None, None)
    }

    /// Counts entities matching `filter` (`None` counts all).
    pub fn count(&self, filter: Option<&Filter<E::Column>>) -> RepoResult<u64> {
        count::<E>(self.conn, filter)
    }

    /// Returns whether any entity matches `filter`.
    pub fn exists(&self, filter: &Filter<E::Column>) -> RepoResult<bool> {
        let mut sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE ", E::TABLE);
        let mut binds = Vec::new();
        filter.write_sql(&mut sql, &mut binds);
        sql.push_str(");");
        let exists: i64 = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        Ok(exists == 1)
    }

    /// Returns whether `key` is registered in this repository's identity map.
    pub fn is_tracked(&self, key: Uuid) -> bool {
        self.state.tracked.contains_key(&key)
    }

    /// Number of tracked entities of this type.
    pub fn tracked_count(&self) -> usize {
        self.state.tracked.len()
    }
}

/// Selects entities of type `E` without navigations.
///
/// Shared by repository reads and include loaders.
pub(crate) fn select<E: Entity>(
    conn: &Connection,
    filter: Option<&Filter<E::Column>>,
    order: Option<(E::Column, SortDirection)>,
    window: Option<(u32, u64)>,
) -> RepoResult<Vec<E>> {
    let mut sql = format!("SELECT {} FROM {}", column_names::<E>().join(", "), E::TABLE);
    let mut binds: Vec<Value> = Vec::new();

    if let Some(filter) = filter {
        sql.push_str(" WHERE ");
        filter.write_sql(&mut sql, &mut binds);
    }

    match order {
        Some((column, direction)) => {
            sql.push_str(" ORDER BY ");
            sql.push_str(column.name());
            sql.push(' ');
            sql.push_str(direction.sql());
            sql.push_str(", rowid ASC");
        }
        None => sql.push_str(" ORDER BY rowid ASC"),
    }

    if let Some((limit, offset)) = window {
        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(Value::Integer(i64::from(limit)));
        binds.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(E::from_row(row)?);
    }
    Ok(items)
}

fn count<E: Entity>(conn: &Connection, filter: Option<&Filter<E::Column>>) -> RepoResult<u64> {
    let mut sql = format!("SELECT COUNT(*) FROM {}", E::TABLE);
    let mut binds: Vec<Value> = Vec::new();
    if let Some(filter) = filter {
        sql.push_str(" WHERE ");
        filter.write_sql(&mut sql, &mut binds);
    }
    let total: i64 = conn.query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
    Ok(u64::try_from(total).unwrap_or(0))
}

fn column_names<E: Entity>() -> Vec<&'static str> {
    E::Column::ALL.iter().map(|column| column.name()).collect()
}
