use mindmap_core::db::migrations::{apply_migrations, latest_version};
use mindmap_core::db::{open_db, open_db_in_memory, schema_version, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "users");
    assert_table_exists(&conn, "diagrams");
    assert_table_exists(&conn, "favorites");
}

#[test]
fn reopening_file_database_applies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mindmap.sqlite3");

    drop(open_db(&path).unwrap());

    let mut conn = Connection::open(&path).unwrap();
    let report = apply_migrations(&mut conn).unwrap();
    assert_eq!(report.from_version, latest_version());
    assert_eq!(report.to_version, latest_version());
    assert!(report.applied.is_empty());
}

#[test]
fn fresh_connection_reports_every_step() {
    let mut conn = Connection::open_in_memory().unwrap();
    let report = apply_migrations(&mut conn).unwrap();

    assert_eq!(report.from_version, 0);
    assert_eq!(report.applied, vec!["init", "lookup_indexes"]);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn foreign_keys_are_enforced() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);

    let orphan = conn.execute(
        "INSERT INTO favorites (favourite_id, user_id, diagram_id) VALUES ('f', 'u', 'd');",
        [],
    );
    assert!(orphan.is_err());
}

#[test]
fn duplicate_favorite_pair_is_rejected_by_index() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO users (user_id, email, full_name) VALUES ('u', 'u@example.com', 'U');
         INSERT INTO diagrams (diagram_id, title, content_json, created_at, updated_at, is_public, user_id)
             VALUES ('d', 't', '{}', 0, 0, 0, 'u');
         INSERT INTO favorites (favourite_id, user_id, diagram_id) VALUES ('f1', 'u', 'd');",
    )
    .unwrap();

    let duplicate = conn.execute(
        "INSERT INTO favorites (favourite_id, user_id, diagram_id) VALUES ('f2', 'u', 'd');",
        [],
    );
    assert!(duplicate.is_err());
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
