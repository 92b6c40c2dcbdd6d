//! SQLite-backed store for users, books and notes
//!
//! Uses an r2d2 pool. Writes go through [`NoteSqlStore::write`], which holds
//! one `BEGIN IMMEDIATE` transaction for the whole closure so a sequence
//! allocation and the row it stamps commit or roll back together.

use super::entities::User;
use super::error::{StoreError, StoreResult};
use super::migrations;
use super::queries;
use super::types::UserId;
use crate::config::StoreConfig;
use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// SQL store for the note domain
#[derive(Clone)]
pub struct NoteSqlStore {
    pool: Pool<SqliteConnectionManager>,
}

impl NoteSqlStore {
    /// Wrap an existing pool and bring its schema up to date
    pub fn new(pool: Pool<SqliteConnectionManager>) -> StoreResult<Self> {
        let mut conn = pool.get()?;
        migrations::migrate(&mut conn)?;
        drop(conn);

        Ok(Self { pool })
    }

    /// Open (or create) the database file named in `config`
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let busy_timeout = config.busy_timeout;
        let manager = SqliteConnectionManager::file(&config.db_path)
            .with_init(move |conn| configure_connection(conn, busy_timeout));

        let pool = Pool::builder().max_size(config.pool_size).build(manager)?;

        info!(path = %config.db_path.display(), pool_size = config.pool_size, "Opened note store");
        Self::new(pool)
    }

    /// Private in-memory database.
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool is
    /// capped at a single connection that is never recycled. Callers must not
    /// hold a connection while asking for another.
    pub fn in_memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.pragma_update(None, "foreign_keys", "ON"));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        Self::new(pool)
    }

    /// Check out a pooled connection
    pub fn connection(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run `f` on a pooled connection without opening a write transaction
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.connection()?;
        f(&conn)
    }

    /// Run `f` inside one immediate transaction.
    ///
    /// Commits when `f` returns `Ok`; any `Err` drops the transaction, which
    /// rolls it back.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| log_contention(StoreError::from(e), "begin"))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| log_contention(StoreError::from(e), "commit"))?;
        Ok(value)
    }

    /// Create a user with an empty change feed
    pub fn create_user(&self) -> StoreResult<User> {
        let user = self.write(|tx| queries::insert_user(tx, Uuid::new_v4(), Utc::now()))?;
        debug!(user_id = %user.id, "Created user");
        Ok(user)
    }

    /// Fetch a user by id
    pub fn get_user(&self, user_id: UserId) -> StoreResult<User> {
        self.read(|conn| queries::get_user(conn, user_id))?
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))
    }
}

fn log_contention(err: StoreError, stage: &str) -> StoreError {
    if err.is_busy() {
        warn!(stage, "Database busy, write transaction abandoned: {}", err);
    }
    err
}

fn configure_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::entities::Book;

    fn book_for(user: &User, label: &str, usn: i64) -> Book {
        let now = Utc::now();
        Book {
            uuid: Uuid::new_v4(),
            user_id: user.id,
            label: label.to_string(),
            usn,
            deleted: false,
            added_on: 1,
            edited_on: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_create_and_get_user() {
        let store = NoteSqlStore::in_memory().unwrap();
        let user = store.create_user().unwrap();

        let fetched = store.get_user(user.id).unwrap();
        assert_eq!(fetched.uuid, user.uuid);
        assert_eq!(fetched.max_usn, 0);
    }

    #[test]
    fn test_get_missing_user() {
        let store = NoteSqlStore::in_memory().unwrap();
        let err = store.get_user(UserId(99)).unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(_)));
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let store = NoteSqlStore::in_memory().unwrap();
        let user = store.create_user().unwrap();
        let book = book_for(&user, "js", 1);

        let result: StoreResult<()> = store.write(|tx| {
            queries::insert_book(tx, &book)?;
            Err(StoreError::Corrupt { column: 0, reason: "forced".to_string() })
        });
        assert!(result.is_err());

        let found = store.read(|conn| queries::get_book(conn, &book.uuid)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_usn_range_is_half_open() {
        let store = NoteSqlStore::in_memory().unwrap();
        let user = store.create_user().unwrap();

        store
            .write(|tx| {
                for usn in 1..=4 {
                    queries::insert_book(tx, &book_for(&user, &format!("b{usn}"), usn))?;
                }
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let books = store
            .read(|conn| queries::books_in_usn_range(conn, user.id, 1, 3, 100))
            .unwrap();
        let usns: Vec<_> = books.iter().map(|b| b.usn).collect();
        assert_eq!(usns, vec![2, 3]);

        let limited = store
            .read(|conn| queries::books_in_usn_range(conn, user.id, 0, 4, 2))
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].usn, 2);
    }

    #[test]
    fn test_open_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            db_path: dir.path().join("notes.db"),
            pool_size: 4,
            busy_timeout: Duration::from_secs(1),
        };

        let store = NoteSqlStore::open(&config).unwrap();
        let user = store.create_user().unwrap();

        let reopened = NoteSqlStore::open(&config).unwrap();
        assert_eq!(reopened.get_user(user.id).unwrap().uuid, user.uuid);
    }
}
