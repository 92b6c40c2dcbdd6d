//! Persisted rows: users, books and notes

use super::types::{Usn, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account and its sync high-water mark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Stable external identity
    pub uuid: Uuid,

    /// Highest USN ever allocated to this user
    pub max_usn: Usn,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named container of notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Stable external identity, never reassigned
    pub uuid: Uuid,

    /// Owner
    pub user_id: UserId,

    /// Display name, cleared when the book is tombstoned
    pub label: String,

    /// USN of the most recent mutation
    pub usn: Usn,

    pub deleted: bool,

    /// Unix nanoseconds
    pub added_on: i64,

    /// Unix nanoseconds, 0 until the first edit
    pub edited_on: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A piece of content filed under a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub uuid: Uuid,
    pub user_id: UserId,

    /// Owning book; may point at a tombstoned book
    pub book_uuid: Uuid,

    /// Content, cleared when the note is tombstoned
    pub body: String,

    pub usn: Usn,
    pub public: bool,
    pub deleted: bool,
    pub added_on: i64,
    pub edited_on: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}

impl Note {
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}
