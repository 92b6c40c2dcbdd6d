//! Database migrations for users, books and notes
//!
//! Each migration is applied in its own transaction and recorded in the
//! `schema_version` table, so running `migrate` twice is a no-op.

use super::error::StoreResult;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Users, books and notes",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    max_usn INTEGER NOT NULL DEFAULT 0 CHECK(max_usn >= 0),
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                -- Books are never physically deleted; `deleted` marks a tombstone
                CREATE TABLE IF NOT EXISTS books (
                    uuid TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    label TEXT NOT NULL,
                    usn INTEGER NOT NULL,
                    deleted BOOLEAN NOT NULL DEFAULT 0,
                    added_on INTEGER NOT NULL,
                    edited_on INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    UNIQUE (user_id, usn),
                    FOREIGN KEY (user_id) REFERENCES users(id)
                );

                CREATE TABLE IF NOT EXISTS notes (
                    uuid TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    book_uuid TEXT NOT NULL,
                    body TEXT NOT NULL,
                    usn INTEGER NOT NULL,
                    public BOOLEAN NOT NULL DEFAULT 0,
                    deleted BOOLEAN NOT NULL DEFAULT 0,
                    added_on INTEGER NOT NULL,
                    edited_on INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    UNIQUE (user_id, usn),
                    FOREIGN KEY (user_id) REFERENCES users(id),
                    FOREIGN KEY (book_uuid) REFERENCES books(uuid)
                );
            "#,
        },
        Migration {
            version: 2,
            description: "Indexes for sync range scans and label lookup",
            up_sql: r#"
                CREATE INDEX IF NOT EXISTS idx_books_user_usn ON books(user_id, usn);
                CREATE INDEX IF NOT EXISTS idx_notes_user_usn ON notes(user_id, usn);
                CREATE INDEX IF NOT EXISTS idx_notes_book ON notes(book_uuid) WHERE deleted = 0;
                CREATE INDEX IF NOT EXISTS idx_books_label ON books(user_id, label) WHERE deleted = 0;
            "#,
        },
    ]
}

/// Get current schema version from database
pub fn get_current_version(conn: &Connection) -> StoreResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(conn: &mut Connection) -> StoreResult<()> {
    let current_version = get_current_version(conn)?;

    let pending: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    for migration in pending {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, Utc::now().timestamp_millis()],
        )?;
        tx.commit()?;

        info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
    }

    Ok(())
}

/// Get the latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).expect("Migration failed");
        conn
    }

    #[test]
    fn test_initial_migration() {
        let conn = migrated();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"books".to_string()));
        assert!(tables.contains(&"notes".to_string()));
    }

    #[test]
    fn test_migration_version_tracking() {
        let conn = migrated();
        assert_eq!(get_current_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(get_latest_version(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotent_migrations() {
        let mut conn = migrated();
        migrate(&mut conn).expect("Second migration failed");

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, get_migrations().len() as i64);
    }

    #[test]
    fn test_usn_unique_per_user_and_table() {
        let conn = migrated();
        conn.execute(
            "INSERT INTO users (uuid, max_usn, created_at, updated_at) VALUES ('u1', 2, 0, 0)",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO books (uuid, user_id, label, usn, added_on, created_at, updated_at)
             VALUES ('b1', 1, 'js', 1, 0, 0, 0)",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO books (uuid, user_id, label, usn, added_on, created_at, updated_at)
             VALUES ('b2', 1, 'go', 1, 0, 0, 0)",
            [],
        );
        assert!(dup.is_err());
    }
}
