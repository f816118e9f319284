use cellar_core::db::migrations::latest_version;
use cellar_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

const CATALOGUE_TABLES: [&str; 10] = [
    "USER",
    "WINE",
    "VINEYARD",
    "GEOLOCATION",
    "NOTES",
    "WINE_REVIEW",
    "LIST_NAME",
    "LIST_ITEMS",
    "VINEYARD_TOUR",
    "VINEYARD_TOUR_ITEM",
];

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_eq!(latest_version(), 3);
    for table in CATALOGUE_TABLES {
        assert_table_exists(&conn, table);
    }
    assert_column_exists(&conn, "WINE_REVIEW", "FLAGGED");
    for table in ["NOTES", "WINE_REVIEW", "LIST_NAME", "VINEYARD_TOUR"] {
        assert_autoincrement(&conn, table);
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
        "INSERT INTO NOTES (USERNAME, WINE_ID, NOTE) VALUES ('nobody', 42, 'x')",
        [],
    );
    assert!(orphan.is_err());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cellar.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    conn_first
        .execute("INSERT INTO WINE (TITLE) VALUES ('Kept 2015')", [])
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let titles: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM WINE", [], |row| row.get(0))
        .unwrap();
    assert_eq!(titles, 1);
}

#[test]
fn version_one_database_is_upgraded_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_init.sql"))
        .unwrap();
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         INSERT INTO USER (USERNAME, PASSWORD_HASH, SALT) VALUES ('ana', 'h', 's');
         INSERT INTO WINE (ID, TITLE) VALUES (1, 'Kept 2015'), (2, 'Other 2016');
         INSERT INTO LIST_NAME (ID, USERNAME, NAME) VALUES (4, 'ana', 'Favourites');
         INSERT INTO LIST_ITEMS (LIST_ID, WINE_ID, DATE_ADDED) VALUES (4, 1, 10);
         INSERT INTO NOTES (ID, USERNAME, WINE_ID, NOTE) VALUES (1, 'ana', 1, 'first'),
                                                            (2, 'ana', 2, 'second');
         INSERT INTO WINE_REVIEW (ID, USERNAME, WINE_ID, RATING, DESCRIPTION, DATE)
             VALUES (3, 'ana', 1, 4.0, 'good', 5);
         INSERT INTO VINEYARD_TOUR (ID, USERNAME, NAME) VALUES (2, 'ana', 'Spring');
         PRAGMA user_version = 1;",
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), 3);
    assert_column_exists(&conn, "WINE_REVIEW", "FLAGGED");
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM LIST_ITEMS WHERE LIST_ID = 4"), 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM NOTES"), 2);
    assert_eq!(scalar(&conn, "SELECT ID FROM WINE_REVIEW WHERE USERNAME = 'ana'"), 3);
    assert_eq!(scalar(&conn, "SELECT FLAGGED FROM WINE_REVIEW"), 0);
    assert_eq!(scalar(&conn, "SELECT ID FROM VINEYARD_TOUR"), 2);

    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);
    conn.execute("DELETE FROM LIST_NAME WHERE ID = 4", []).unwrap();
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM LIST_ITEMS"), 0);
}

#[test]
fn deleted_child_keys_are_not_reused() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO USER (USERNAME, PASSWORD_HASH, SALT) VALUES ('ana', 'h', 's');
         INSERT INTO WINE (TITLE) VALUES ('Only 2019');
         INSERT INTO NOTES (USERNAME, WINE_ID, NOTE) VALUES ('ana', 1, 'gone soon');",
    )
    .unwrap();
    let first = scalar(&conn, "SELECT ID FROM NOTES");
    conn.execute("DELETE FROM NOTES", []).unwrap();
    conn.execute(
        "INSERT INTO NOTES (USERNAME, WINE_ID, NOTE) VALUES ('ana', 1, 'fresh')",
        [],
    )
    .unwrap();
    assert!(scalar(&conn, "SELECT ID FROM NOTES") > first);
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

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn scalar(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

fn assert_autoincrement(conn: &Connection, table_name: &str) {
    let sql: String = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert!(
        sql.contains("AUTOINCREMENT"),
        "table {table_name} keys can be reused: {sql}"
    );
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

fn assert_column_exists(conn: &Connection, table_name: &str, column: &str) {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table_name});"))
        .unwrap();
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(
        columns.iter().any(|name| name == column),
        "column {table_name}.{column} does not exist"
    );
}
