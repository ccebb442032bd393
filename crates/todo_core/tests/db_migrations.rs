use rusqlite::Connection;
use std::time::Duration;
use todo_core::db::migrations::{applied_migrations, current_user_version, latest_version};
use todo_core::db::{open_db, open_db_in_memory, DbError};

const TIMEOUT: Duration = Duration::from_secs(1);

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory(TIMEOUT).unwrap();

    assert_eq!(current_user_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "documents");
    assert_table_exists(&conn, "index_catalog");
    assert_table_exists(&conn, "schema_history");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todos.sqlite3");

    let conn_first = open_db(&path, TIMEOUT).unwrap();
    assert_eq!(current_user_version(&conn_first).unwrap(), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path, TIMEOUT).unwrap();
    assert_eq!(current_user_version(&conn_second).unwrap(), latest_version());
    assert_table_exists(&conn_second, "documents");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path, TIMEOUT).unwrap_err();
    match err {
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
fn documents_table_rejects_non_json_bodies() {
    let conn = open_db_in_memory(TIMEOUT).unwrap();

    let result = conn.execute(
        "INSERT INTO documents (collection, id, body) VALUES ('todos', 'x', 'not json');",
        [],
    );
    assert!(result.is_err());
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

#[test]
fn fresh_database_records_every_migration_with_a_timestamp() {
    let conn = open_db_in_memory(TIMEOUT).unwrap();

    let history = applied_migrations(&conn).unwrap();
    let names: Vec<_> = history.iter().map(|row| row.name.as_str()).collect();
    assert_eq!(names, vec!["documents", "index_catalog", "schema_history"]);
    assert_eq!(history.last().unwrap().version, latest_version());
    assert!(history.iter().all(|row| row.applied_at.is_some()));
}

#[test]
fn upgrade_from_version_two_backfills_history_without_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v2.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE documents (
             collection TEXT NOT NULL,
             id TEXT NOT NULL,
             body TEXT NOT NULL CHECK (json_valid(body)),
             PRIMARY KEY (collection, id)
         );
         CREATE TABLE index_catalog (
             collection TEXT NOT NULL,
             name TEXT NOT NULL,
             field TEXT NOT NULL,
             direction INTEGER NOT NULL,
             is_unique INTEGER NOT NULL DEFAULT 0,
             sqlite_name TEXT NOT NULL UNIQUE,
             created_at INTEGER NOT NULL DEFAULT 0,
             PRIMARY KEY (collection, name)
         );
         PRAGMA user_version = 2;",
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path, TIMEOUT).unwrap();
    let history = applied_migrations(&conn).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].applied_at, None);
    assert_eq!(history[1].applied_at, None);
    assert!(history[2].applied_at.is_some());
}

#[test]
fn current_version_with_dropped_table_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("damaged.sqlite3");

    let conn = open_db(&path, TIMEOUT).unwrap();
    conn.execute_batch("DROP TABLE index_catalog;").unwrap();
    drop(conn);

    let err = open_db(&path, TIMEOUT).unwrap_err();
    assert!(matches!(err, DbError::MissingTable("index_catalog")), "{err}");
}
