//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite sessions.
//! - Configure connection pragmas required by the persistence layer.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have migrations fully applied.

use super::migrations::{apply_migrations, MigrationReport};
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file with the default busy timeout.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
}

/// Opens a SQLite database file with an explicit busy timeout.
///
/// The busy timeout bounds how long a writer waits for a competing
/// `BEGIN IMMEDIATE` holder before failing.
pub fn open_db_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> DbResult<Connection> {
    let path = path.as_ref();
    bootstrap("file", busy_timeout, || Connection::open(path))
}

/// Opens a private in-memory database. Every call yields an empty store.
pub fn open_db_in_memory() -> DbResult<Connection> {
    bootstrap("memory", DEFAULT_BUSY_TIMEOUT, Connection::open_in_memory)
}

fn bootstrap(
    mode: &'static str,
    busy_timeout: Duration,
    opener: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match opener() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match configure_connection(&mut conn, busy_timeout) {
        Ok(report) => {
            info!(
                "event=db_open module=db status=ok mode={mode} schema_version={} migrated={} duration_ms={}",
                report.to_version,
                !report.applied.is_empty(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn configure_connection(conn: &mut Connection, busy_timeout: Duration) -> DbResult<MigrationReport> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    apply_migrations(conn)
}
