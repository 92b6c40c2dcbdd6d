//! Error types for the sync engine

use crate::core_store::StoreError;
use thiserror::Error;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Failures surfaced by the allocator, the recorder and the feed
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed request parameter or payload; nothing was changed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown user, book or note
    #[error("Not found: {0}")]
    NotFound(String),

    /// The acting user does not own the entity
    #[error("Forbidden: user {user} cannot modify {entity}")]
    Forbidden { user: String, entity: String },

    /// Duplicate label or identifier
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Allocation or write failed; the transaction was rolled back and the
    /// request may be retried
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Unexpected read failure or broken invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn forbidden(user: impl ToString, entity: impl ToString) -> Self {
        SyncError::Forbidden {
            user: user.to_string(),
            entity: entity.to_string(),
        }
    }

    /// Map a storage failure on a write path
    pub fn transaction(err: StoreError) -> Self {
        SyncError::Transaction(err.to_string())
    }

    /// Map a storage failure on a read path
    pub fn internal(err: StoreError) -> Self {
        SyncError::Internal(err.to_string())
    }

    /// Whether re-issuing the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transaction(_))
    }

    /// Whether the failure is the caller's fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SyncError::Validation(_)
                | SyncError::NotFound(_)
                | SyncError::Forbidden { .. }
                | SyncError::Conflict(_)
        )
    }
}

/// Store failures reached through `?` happen inside write transactions
/// (`NoteSqlStore::write`), so they are classified as transaction errors.
/// A row that cannot be decoded will not decode on retry either and is
/// internal. Read paths map explicitly with [`SyncError::internal`].
impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(user) => SyncError::NotFound(format!("user {}", user)),
            corrupt @ StoreError::Corrupt { .. } => SyncError::internal(corrupt),
            other => SyncError::transaction(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::forbidden(7, "book 1234");
        assert_eq!(err.to_string(), "Forbidden: user 7 cannot modify book 1234");

        let err = SyncError::Validation("limit must be a number".to_string());
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_error_conversion() {
        let err: SyncError = StoreError::UserNotFound("3".to_string()).into();
        assert!(matches!(err, SyncError::NotFound(_)));

        let err: SyncError = StoreError::Corrupt { column: 0, reason: "x".to_string() }.into();
        assert!(matches!(err, SyncError::Internal(_)));
        assert!(!err.is_retryable());
        assert!(!err.is_client_error());

        let busy = StoreError::from(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        ));
        let err: SyncError = busy.into();
        assert!(err.is_retryable());
    }
}
