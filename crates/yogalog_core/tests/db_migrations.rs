use rusqlite::Connection;
use yogalog_core::db::migrations::latest_version;
use yogalog_core::db::{open_db, open_db_in_memory, DbError, JOURNAL_TABLES};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in JOURNAL_TABLES {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yogalog.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "practice_logs");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::SchemaTooNew { found, supported } => {
            assert_eq!(found, 999);
            assert_eq!(supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }

    let message = open_db(&path).unwrap_err().to_string();
    assert!(message.contains("journal schema version 999"), "{message}");
}

#[test]
fn schema_rejects_out_of_range_intensity_and_orphan_asanas() {
    let conn = open_db_in_memory().unwrap();

    let bad_intensity = conn.execute(
        "INSERT INTO practice_logs (id, title, date, intensity)
         VALUES ('a', 'Flow', '2026-01-15T07:00:00Z', 6);",
        [],
    );
    assert!(bad_intensity.is_err());

    let orphan = conn.execute(
        "INSERT INTO asana_entries (log_id, name, position) VALUES ('missing', 'Tree', 0);",
        [],
    );
    assert!(orphan.is_err(), "foreign keys must be enforced");
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
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
