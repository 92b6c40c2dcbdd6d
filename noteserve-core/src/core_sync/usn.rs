//! Per-user update sequence number allocator
//!
//! The user row's `max_usn` column is the only counter. [`next_usn`] bumps
//! it with a single `UPDATE ... RETURNING` inside the caller's transaction,
//! so the new value becomes visible only if the row it stamps is committed
//! too. Write transactions are `BEGIN IMMEDIATE`, which makes SQLite hand
//! out the write lock before the read half of the increment runs; two
//! mutations by the same user therefore never observe the same `max_usn`.

use super::errors::{SyncError, SyncResult};
use crate::core_store::{StoreError, Usn, UserId};
use crate::metrics::{record_counter, USN_ALLOCATED};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::trace;

/// Allocate the next USN for `user_id` within `tx`.
///
/// Call at most once per entity mutation. On error the caller must drop the
/// transaction without committing.
pub fn next_usn(tx: &Transaction<'_>, user_id: UserId) -> SyncResult<Usn> {
    let next: Option<Usn> = tx
        .query_row(
            "UPDATE users SET max_usn = max_usn + 1, updated_at = ?
             WHERE id = ?
             RETURNING max_usn",
            params![Utc::now().timestamp_millis(), user_id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| SyncError::transaction(StoreError::from(e)))?;

    let usn = next.ok_or_else(|| SyncError::NotFound(format!("user {}", user_id)))?;

    record_counter(USN_ALLOCATED, 1);
    trace!(user_id = %user_id, usn, "Allocated USN");
    Ok(usn)
}

/// Current high-water mark of `user_id`
pub fn max_usn(conn: &Connection, user_id: UserId) -> SyncResult<Usn> {
    conn.query_row("SELECT max_usn FROM users WHERE id = ?", params![user_id.0], |row| {
        row.get(0)
    })
    .optional()
    .map_err(|e| SyncError::internal(StoreError::from(e)))?
    .ok_or_else(|| SyncError::NotFound(format!("user {}", user_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::NoteSqlStore;

    #[test]
    fn test_allocations_are_dense_from_one() {
        let store = NoteSqlStore::in_memory().unwrap();
        let user = store.create_user().unwrap();

        let usns: Vec<Usn> = (0..5)
            .map(|_| store.write(|tx| next_usn(tx, user.id)).unwrap())
            .collect();

        assert_eq!(usns, vec![1, 2, 3, 4, 5]);
        assert_eq!(store.read(|conn| max_usn(conn, user.id)).unwrap(), 5);
    }

    #[test]
    fn test_users_have_independent_counters() {
        let store = NoteSqlStore::in_memory().unwrap();
        let alice = store.create_user().unwrap();
        let bob = store.create_user().unwrap();

        store.write(|tx| next_usn(tx, alice.id)).unwrap();
        store.write(|tx| next_usn(tx, alice.id)).unwrap();
        let bob_first = store.write(|tx| next_usn(tx, bob.id)).unwrap();

        assert_eq!(bob_first, 1);
        assert_eq!(store.get_user(alice.id).unwrap().max_usn, 2);
    }

    #[test]
    fn test_rolled_back_allocation_is_not_observable() {
        let store = NoteSqlStore::in_memory().unwrap();
        let user = store.create_user().unwrap();

        let result: SyncResult<Usn> = store.write(|tx| {
            let usn = next_usn(tx, user.id)?;
            assert_eq!(usn, 1);
            Err(SyncError::Internal("entity write failed".to_string()))
        });
        assert!(result.is_err());

        assert_eq!(store.get_user(user.id).unwrap().max_usn, 0);
        assert_eq!(store.write(|tx| next_usn(tx, user.id)).unwrap(), 1);
    }

    #[test]
    fn test_missing_user() {
        let store = NoteSqlStore::in_memory().unwrap();
        let err = store.write(|tx| next_usn(tx, UserId(404))).unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));

        let err = store.read(|conn| max_usn(conn, UserId(404))).unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }
}
