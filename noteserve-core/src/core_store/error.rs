//! Storage error types

use thiserror::Error;

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    /// A stored value could not be decoded (bad UUID text, wrong type)
    #[error("Corrupt row: column {column}: {reason}")]
    Corrupt { column: usize, reason: String },

    #[error("User not found: {0}")]
    UserNotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(column, _, cause) => StoreError::Corrupt {
                column,
                reason: cause.to_string(),
            },
            rusqlite::Error::InvalidColumnType(column, name, ty) => StoreError::Corrupt {
                column,
                reason: format!("{} holds {}", name, ty),
            },
            other => StoreError::Sqlite(other),
        }
    }
}

impl StoreError {
    /// Whether the failure came from lock contention rather than bad data
    pub fn is_busy(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            StoreError::Pool(_) => true,
            _ => false,
        }
    }
}
