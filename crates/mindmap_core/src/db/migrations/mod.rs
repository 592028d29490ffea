//! Ordered schema migrations for the diagram store.
//!
//! # Invariants
//! - Versions start at 1 and increase by exactly 1.
//! - All pending steps of one run commit together or not at all.
//! - `PRAGMA user_version` equals the last applied version.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "init",
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        name: "lookup_indexes",
        sql: include_str!("0002_lookup_indexes.sql"),
    },
];

/// Outcome of one `apply_migrations` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Names of the steps applied by this run, in order.
    pub applied: Vec<&'static str>,
}

/// Latest schema version this build understands.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Current `PRAGMA user_version` of `conn`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Brings `conn` up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the store is newer than this build.
/// - `MigrationFailed` naming the first step that failed.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationReport> {
    let from_version = schema_version(conn)?;
    let latest = latest_version();
    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > from_version)
        .collect();
    if pending.is_empty() {
        return Ok(MigrationReport {
            from_version,
            to_version: from_version,
            applied: Vec::new(),
        });
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        let step = format!(
            "{}\nPRAGMA user_version = {};",
            migration.sql, migration.version
        );
        tx.execute_batch(&step)
            .map_err(|source| DbError::MigrationFailed {
                version: migration.version,
                name: migration.name,
                source,
            })?;
        debug!(
            "event=db_migrate_step module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    let report = MigrationReport {
        from_version,
        to_version: latest,
        applied: pending.iter().map(|migration| migration.name).collect(),
    };
    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={} steps={}",
        report.from_version,
        report.to_version,
        report.applied.len()
    );
    Ok(report)
}
