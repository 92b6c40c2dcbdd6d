//! Request/response bodies of the HTTP API

use crate::core_store::{Book, Note, Usn};
use crate::core_sync::{SyncFragment, SyncState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Sync
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateResponse {
    pub full_sync_before: i64,
    pub max_usn: Usn,
    pub current_time: i64,
}

impl From<SyncState> for SyncStateResponse {
    fn from(state: SyncState) -> Self {
        Self {
            full_sync_before: state.full_sync_before,
            max_usn: state.max_usn,
            current_time: state.current_time,
        }
    }
}

/// Raw query of `GET /sync/fragment`. Kept as strings so malformed values
/// surface as validation errors rather than extractor rejections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FragmentParams {
    pub after_usn: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentResponse {
    pub fragment: FragmentBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentBody {
    pub frag_max_usn: Usn,
    pub user_max_usn: Usn,
    pub current_time: i64,
    pub notes: Vec<NoteItem>,
    pub books: Vec<BookItem>,
    pub expunged_notes: Vec<Uuid>,
    pub expunged_books: Vec<Uuid>,
}

impl From<&SyncFragment> for FragmentResponse {
    fn from(fragment: &SyncFragment) -> Self {
        Self {
            fragment: FragmentBody {
                frag_max_usn: fragment.frag_max_usn,
                user_max_usn: fragment.user_max_usn,
                current_time: fragment.current_time,
                notes: fragment.notes.iter().map(NoteItem::from).collect(),
                books: fragment.books.iter().map(BookItem::from).collect(),
                expunged_notes: fragment.expunged_notes.clone(),
                expunged_books: fragment.expunged_books.clone(),
            },
        }
    }
}

// ============================================================================
// Items
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteItem {
    pub uuid: Uuid,
    pub book_uuid: Uuid,
    pub usn: Usn,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub added_on: i64,
    pub edited_on: i64,
    pub content: String,
    pub public: bool,
    pub deleted: bool,
}

impl From<&Note> for NoteItem {
    fn from(note: &Note) -> Self {
        Self {
            uuid: note.uuid,
            book_uuid: note.book_uuid,
            usn: note.usn,
            created_at: note.created_at,
            updated_at: note.updated_at,
            added_on: note.added_on,
            edited_on: note.edited_on,
            content: note.body.clone(),
            public: note.public,
            deleted: note.deleted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookItem {
    pub uuid: Uuid,
    pub usn: Usn,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub added_on: i64,
    pub label: String,
    pub deleted: bool,
}

impl From<&Book> for BookItem {
    fn from(book: &Book) -> Self {
        Self {
            uuid: book.uuid,
            usn: book.usn,
            created_at: book.created_at,
            updated_at: book.updated_at,
            added_on: book.added_on,
            label: book.label.clone(),
            deleted: book.deleted,
        }
    }
}

// ============================================================================
// Mutations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookRequest {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    pub label: String,
    #[serde(default)]
    pub added_on: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBookRequest {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteBookParams {
    /// Also tombstone the book's live notes
    #[serde(default)]
    pub notes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBookResponse {
    pub book: BookItem,
    pub deleted_notes: Vec<NoteItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    pub book_uuid: Uuid,
    pub content: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub added_on: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNoteRequest {
    #[serde(default)]
    pub book_uuid: Option<Uuid>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}
