//! Mutation recorder
//!
//! Every create, update and delete of a book or note goes through here.
//! Each mutation authorizes first, then allocates exactly one USN, stamps the
//! row with it and persists the row, all inside one write transaction.
//! Authorization and validation failures return before [`next_usn`] runs, so
//! a rejected request never consumes a sequence number.

use super::clock::Clock;
use super::errors::{SyncError, SyncResult};
use super::usn::next_usn;
use crate::core_store::types::{truncate_to_millis, unix_nanos};
use crate::core_store::{queries, Book, Note, NoteSqlStore, UserId};
use crate::metrics::{record_counter, MUTATIONS_RECORDED, MUTATIONS_REJECTED};
use chrono::{DateTime, Utc};
use rusqlite::Transaction;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Payload for creating a book
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    /// Client-chosen identity; generated when absent
    pub uuid: Option<Uuid>,
    pub label: String,
    /// Unix nanoseconds; server time when absent
    pub added_on: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct BookUpdate {
    pub label: Option<String>,
}

/// Payload for creating a note
#[derive(Debug, Clone)]
pub struct NewNote {
    pub uuid: Option<Uuid>,
    pub book_uuid: Uuid,
    pub body: String,
    pub public: bool,
    pub added_on: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NoteUpdate {
    pub book_uuid: Option<Uuid>,
    pub body: Option<String>,
    pub public: Option<bool>,
}

impl BookUpdate {
    fn is_empty(&self) -> bool {
        self.label.is_none()
    }
}

impl NoteUpdate {
    fn is_empty(&self) -> bool {
        self.book_uuid.is_none() && self.body.is_none() && self.public.is_none()
    }
}

// ===== Lookups and checks (no allocation) =====

fn owned_book(tx: &Transaction<'_>, user_id: UserId, uuid: &Uuid) -> SyncResult<Book> {
    let book = queries::get_book(tx, uuid)?
        .ok_or_else(|| SyncError::NotFound(format!("book {}", uuid)))?;

    if !book.is_owned_by(user_id) {
        return Err(SyncError::forbidden(user_id, format!("book {}", uuid)));
    }
    Ok(book)
}

fn owned_note(tx: &Transaction<'_>, user_id: UserId, uuid: &Uuid) -> SyncResult<Note> {
    let note = queries::get_note(tx, uuid)?
        .ok_or_else(|| SyncError::NotFound(format!("note {}", uuid)))?;

    if !note.is_owned_by(user_id) {
        return Err(SyncError::forbidden(user_id, format!("note {}", uuid)));
    }
    Ok(note)
}

/// A book that may receive notes: owned by `user_id` and not tombstoned
fn live_target_book(tx: &Transaction<'_>, user_id: UserId, uuid: &Uuid) -> SyncResult<Book> {
    let book = owned_book(tx, user_id, uuid)?;
    if book.deleted {
        return Err(SyncError::NotFound(format!("book {}", uuid)));
    }
    Ok(book)
}

fn validate_label(label: &str) -> SyncResult<()> {
    if label.trim().is_empty() {
        return Err(SyncError::Validation("book label must not be empty".to_string()));
    }
    Ok(())
}

fn ensure_label_free(
    tx: &Transaction<'_>,
    user_id: UserId,
    label: &str,
    except: Option<&Uuid>,
) -> SyncResult<()> {
    match queries::find_live_book_by_label(tx, user_id, label)? {
        Some(existing) if Some(&existing.uuid) != except => {
            Err(SyncError::Conflict(format!("a book labelled '{}' already exists", label)))
        }
        _ => Ok(()),
    }
}

fn tombstone_note(tx: &Transaction<'_>, mut note: Note, now: DateTime<Utc>) -> SyncResult<Note> {
    note.usn = next_usn(tx, note.user_id)?;
    note.deleted = true;
    note.body = String::new();
    note.updated_at = now;

    queries::update_note(tx, &note)?;
    Ok(note)
}

// ===== Books =====

pub fn create_book(
    tx: &Transaction<'_>,
    user_id: UserId,
    new: NewBook,
    now: DateTime<Utc>,
) -> SyncResult<Book> {
    validate_label(&new.label)?;

    if let Some(uuid) = &new.uuid {
        if queries::get_book(tx, uuid)?.is_some() {
            return Err(SyncError::Conflict(format!("book {} already exists", uuid)));
        }
    }
    ensure_label_free(tx, user_id, &new.label, None)?;

    let book = Book {
        uuid: new.uuid.unwrap_or_else(Uuid::new_v4),
        user_id,
        label: new.label,
        usn: next_usn(tx, user_id)?,
        deleted: false,
        added_on: new.added_on.unwrap_or_else(|| unix_nanos(now)),
        edited_on: 0,
        created_at: now,
        updated_at: now,
    };

    queries::insert_book(tx, &book)?;
    Ok(book)
}

pub fn update_book(
    tx: &Transaction<'_>,
    user_id: UserId,
    uuid: &Uuid,
    update: BookUpdate,
    now: DateTime<Utc>,
) -> SyncResult<Book> {
    let mut book = owned_book(tx, user_id, uuid)?;
    if book.deleted {
        return Err(SyncError::NotFound(format!("book {}", uuid)));
    }
    if update.is_empty() {
        return Err(SyncError::Validation("no fields to update".to_string()));
    }

    if let Some(label) = update.label {
        validate_label(&label)?;
        ensure_label_free(tx, user_id, &label, Some(uuid))?;
        book.label = label;
    }

    book.usn = next_usn(tx, user_id)?;
    book.edited_on = unix_nanos(now);
    book.updated_at = now;

    queries::update_book(tx, &book)?;
    Ok(book)
}

/// Tombstone a book. Notes filed under it are left untouched.
///
/// Deleting a book that is already tombstoned still allocates a new USN.
pub fn delete_book(
    tx: &Transaction<'_>,
    user_id: UserId,
    uuid: &Uuid,
    now: DateTime<Utc>,
) -> SyncResult<Book> {
    let mut book = owned_book(tx, user_id, uuid)?;

    book.usn = next_usn(tx, user_id)?;
    book.deleted = true;
    book.label = String::new();
    book.updated_at = now;

    queries::update_book(tx, &book)?;
    Ok(book)
}

/// Tombstone a book, then each of its live notes, one USN per row
pub fn delete_book_with_notes(
    tx: &Transaction<'_>,
    user_id: UserId,
    uuid: &Uuid,
    now: DateTime<Utc>,
) -> SyncResult<(Book, Vec<Note>)> {
    let book = delete_book(tx, user_id, uuid, now)?;

    let notes = queries::live_notes_in_book(tx, uuid)?
        .into_iter()
        .map(|note| tombstone_note(tx, note, now))
        .collect::<SyncResult<Vec<_>>>()?;

    Ok((book, notes))
}

// ===== Notes =====

pub fn create_note(
    tx: &Transaction<'_>,
    user_id: UserId,
    new: NewNote,
    now: DateTime<Utc>,
) -> SyncResult<Note> {
    live_target_book(tx, user_id, &new.book_uuid)?;

    if let Some(uuid) = &new.uuid {
        if queries::get_note(tx, uuid)?.is_some() {
            return Err(SyncError::Conflict(format!("note {} already exists", uuid)));
        }
    }

    let note = Note {
        uuid: new.uuid.unwrap_or_else(Uuid::new_v4),
        user_id,
        book_uuid: new.book_uuid,
        body: new.body,
        usn: next_usn(tx, user_id)?,
        public: new.public,
        deleted: false,
        added_on: new.added_on.unwrap_or_else(|| unix_nanos(now)),
        edited_on: 0,
        created_at: now,
        updated_at: now,
    };

    queries::insert_note(tx, &note)?;
    Ok(note)
}

pub fn update_note(
    tx: &Transaction<'_>,
    user_id: UserId,
    uuid: &Uuid,
    update: NoteUpdate,
    now: DateTime<Utc>,
) -> SyncResult<Note> {
    let mut note = owned_note(tx, user_id, uuid)?;
    if note.deleted {
        return Err(SyncError::NotFound(format!("note {}", uuid)));
    }
    if update.is_empty() {
        return Err(SyncError::Validation("no fields to update".to_string()));
    }

    if let Some(book_uuid) = update.book_uuid {
        live_target_book(tx, user_id, &book_uuid)?;
        note.book_uuid = book_uuid;
    }
    if let Some(body) = update.body {
        note.body = body;
    }
    if let Some(public) = update.public {
        note.public = public;
    }

    note.usn = next_usn(tx, user_id)?;
    note.edited_on = unix_nanos(now);
    note.updated_at = now;

    queries::update_note(tx, &note)?;
    Ok(note)
}

/// Tombstone a note. Deleting a tombstone allocates a new USN again.
pub fn delete_note(
    tx: &Transaction<'_>,
    user_id: UserId,
    uuid: &Uuid,
    now: DateTime<Utc>,
) -> SyncResult<Note> {
    let note = owned_note(tx, user_id, uuid)?;
    tombstone_note(tx, note, now)
}

/// Runs each mutation in its own committed transaction
#[derive(Clone)]
pub struct MutationRecorder {
    store: NoteSqlStore,
    clock: Arc<dyn Clock>,
}

impl MutationRecorder {
    pub fn new(store: NoteSqlStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn record<T, F>(&self, op: &'static str, user_id: UserId, f: F) -> SyncResult<T>
    where
        F: FnOnce(&Transaction<'_>, DateTime<Utc>) -> SyncResult<T>,
    {
        let now = truncate_to_millis(self.clock.now());

        match self.store.write(|tx| f(tx, now)) {
            Ok(value) => {
                record_counter(MUTATIONS_RECORDED, 1);
                debug!(op, user_id = %user_id, "Recorded mutation");
                Ok(value)
            }
            Err(err) if err.is_client_error() => {
                record_counter(MUTATIONS_REJECTED, 1);
                debug!(op, user_id = %user_id, error = %err, "Rejected mutation");
                Err(err)
            }
            Err(err) => {
                warn!(op, user_id = %user_id, error = %err, "Mutation rolled back");
                Err(err)
            }
        }
    }

    pub fn create_book(&self, user_id: UserId, new: NewBook) -> SyncResult<Book> {
        self.record("create_book", user_id, |tx, now| create_book(tx, user_id, new, now))
    }

    pub fn update_book(&self, user_id: UserId, uuid: &Uuid, update: BookUpdate) -> SyncResult<Book> {
        self.record("update_book", user_id, |tx, now| update_book(tx, user_id, uuid, update, now))
    }

    pub fn delete_book(&self, user_id: UserId, uuid: &Uuid) -> SyncResult<Book> {
        self.record("delete_book", user_id, |tx, now| delete_book(tx, user_id, uuid, now))
    }

    pub fn delete_book_with_notes(
        &self,
        user_id: UserId,
        uuid: &Uuid,
    ) -> SyncResult<(Book, Vec<Note>)> {
        self.record("delete_book_with_notes", user_id, |tx, now| {
            delete_book_with_notes(tx, user_id, uuid, now)
        })
    }

    pub fn create_note(&self, user_id: UserId, new: NewNote) -> SyncResult<Note> {
        self.record("create_note", user_id, |tx, now| create_note(tx, user_id, new, now))
    }

    pub fn update_note(&self, user_id: UserId, uuid: &Uuid, update: NoteUpdate) -> SyncResult<Note> {
        self.record("update_note", user_id, |tx, now| update_note(tx, user_id, uuid, update, now))
    }

    pub fn delete_note(&self, user_id: UserId, uuid: &Uuid) -> SyncResult<Note> {
        self.record("delete_note", user_id, |tx, now| delete_note(tx, user_id, uuid, now))
    }
}
