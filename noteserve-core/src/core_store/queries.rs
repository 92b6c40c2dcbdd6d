//! Row-level queries
//!
//! Every function takes a plain `&Connection` so it can run either on a
//! pooled connection or inside a caller's `Transaction` (which derefs to one).

use super::entities::{Book, Note, User};
use super::error::StoreResult;
use super::types::{from_millis, to_millis, Usn, UserId};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, uuid, max_usn, created_at, updated_at";

const BOOK_COLUMNS: &str =
    "uuid, user_id, label, usn, deleted, added_on, edited_on, created_at, updated_at";

const NOTE_COLUMNS: &str = "uuid, user_id, book_uuid, body, usn, public, deleted, \
                            added_on, edited_on, created_at, updated_at";

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        uuid: uuid_column(row, 1)?,
        max_usn: row.get(2)?,
        created_at: from_millis(row.get(3)?),
        updated_at: from_millis(row.get(4)?),
    })
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        uuid: uuid_column(row, 0)?,
        user_id: UserId(row.get(1)?),
        label: row.get(2)?,
        usn: row.get(3)?,
        deleted: row.get(4)?,
        added_on: row.get(5)?,
        edited_on: row.get(6)?,
        created_at: from_millis(row.get(7)?),
        updated_at: from_millis(row.get(8)?),
    })
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        uuid: uuid_column(row, 0)?,
        user_id: UserId(row.get(1)?),
        book_uuid: uuid_column(row, 2)?,
        body: row.get(3)?,
        usn: row.get(4)?,
        public: row.get(5)?,
        deleted: row.get(6)?,
        added_on: row.get(7)?,
        edited_on: row.get(8)?,
        created_at: from_millis(row.get(9)?),
        updated_at: from_millis(row.get(10)?),
    })
}

// ===== Users =====

pub fn insert_user(conn: &Connection, uuid: Uuid, now: DateTime<Utc>) -> StoreResult<User> {
    conn.execute(
        "INSERT INTO users (uuid, max_usn, created_at, updated_at) VALUES (?, 0, ?, ?)",
        params![uuid.to_string(), to_millis(now), to_millis(now)],
    )?;

    Ok(User {
        id: UserId(conn.last_insert_rowid()),
        uuid,
        max_usn: 0,
        created_at: from_millis(to_millis(now)),
        updated_at: from_millis(to_millis(now)),
    })
}

pub fn get_user(conn: &Connection, user_id: UserId) -> StoreResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
            params![user_id.0],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

// ===== Books =====

pub fn get_book(conn: &Connection, uuid: &Uuid) -> StoreResult<Option<Book>> {
    let book = conn
        .query_row(
            &format!("SELECT {BOOK_COLUMNS} FROM books WHERE uuid = ?"),
            params![uuid.to_string()],
            book_from_row,
        )
        .optional()?;
    Ok(book)
}

pub fn insert_book(conn: &Connection, book: &Book) -> StoreResult<()> {
    conn.execute(
        &format!("INSERT INTO books ({BOOK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
        params![
            book.uuid.to_string(),
            book.user_id.0,
            &book.label,
            book.usn,
            book.deleted,
            book.added_on,
            book.edited_on,
            to_millis(book.created_at),
            to_millis(book.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_book(conn: &Connection, book: &Book) -> StoreResult<()> {
    conn.execute(
        "UPDATE books SET label = ?, usn = ?, deleted = ?, edited_on = ?, updated_at = ?
         WHERE uuid = ?",
        params![
            &book.label,
            book.usn,
            book.deleted,
            book.edited_on,
            to_millis(book.updated_at),
            book.uuid.to_string(),
        ],
    )?;
    Ok(())
}

/// Live book of `user_id` carrying `label`, if any
pub fn find_live_book_by_label(
    conn: &Connection,
    user_id: UserId,
    label: &str,
) -> StoreResult<Option<Book>> {
    let book = conn
        .query_row(
            &format!(
                "SELECT {BOOK_COLUMNS} FROM books
                 WHERE user_id = ? AND label = ? AND deleted = 0 LIMIT 1"
            ),
            params![user_id.0, label],
            book_from_row,
        )
        .optional()?;
    Ok(book)
}

/// Books with `after < usn <= upto`, ascending, at most `limit` rows
pub fn books_in_usn_range(
    conn: &Connection,
    user_id: UserId,
    after: Usn,
    upto: Usn,
    limit: u32,
) -> StoreResult<Vec<Book>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {BOOK_COLUMNS} FROM books
         WHERE user_id = ? AND usn > ? AND usn <= ?
         ORDER BY usn ASC LIMIT ?"
    ))?;

    let books = stmt
        .query_map(params![user_id.0, after, upto, limit], book_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(books)
}

// ===== Notes =====

pub fn get_note(conn: &Connection, uuid: &Uuid) -> StoreResult<Option<Note>> {
    let note = conn
        .query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE uuid = ?"),
            params![uuid.to_string()],
            note_from_row,
        )
        .optional()?;
    Ok(note)
}

pub fn insert_note(conn: &Connection, note: &Note) -> StoreResult<()> {
    conn.execute(
        &format!("INSERT INTO notes ({NOTE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
        params![
            note.uuid.to_string(),
            note.user_id.0,
            note.book_uuid.to_string(),
            &note.body,
            note.usn,
            note.public,
            note.deleted,
            note.added_on,
            note.edited_on,
            to_millis(note.created_at),
            to_millis(note.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_note(conn: &Connection, note: &Note) -> StoreResult<()> {
    conn.execute(
        "UPDATE notes SET book_uuid = ?, body = ?, usn = ?, public = ?, deleted = ?,
                          edited_on = ?, updated_at = ?
         WHERE uuid = ?",
        params![
            note.book_uuid.to_string(),
            &note.body,
            note.usn,
            note.public,
            note.deleted,
            note.edited_on,
            to_millis(note.updated_at),
            note.uuid.to_string(),
        ],
    )?;
    Ok(())
}

/// Notes filed under `book_uuid` that are not tombstoned, ascending by usn
pub fn live_notes_in_book(conn: &Connection, book_uuid: &Uuid) -> StoreResult<Vec<Note>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {NOTE_COLUMNS} FROM notes WHERE book_uuid = ? AND deleted = 0 ORDER BY usn ASC"
    ))?;

    let notes = stmt
        .query_map(params![book_uuid.to_string()], note_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(notes)
}

/// Notes with `after < usn <= upto`, ascending, at most `limit` rows
pub fn notes_in_usn_range(
    conn: &Connection,
    user_id: UserId,
    after: Usn,
    upto: Usn,
    limit: u32,
) -> StoreResult<Vec<Note>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {NOTE_COLUMNS} FROM notes
         WHERE user_id = ? AND usn > ? AND usn <= ?
         ORDER BY usn ASC LIMIT ?"
    ))?;

    let notes = stmt
        .query_map(params![user_id.0, after, upto, limit], note_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(notes)
}

/// Every USN currently stamped on a row of `user_id`, books and notes
/// together, ascending. Duplicates are kept so callers can detect them.
pub fn stamped_usns(conn: &Connection, user_id: UserId) -> StoreResult<Vec<Usn>> {
    let mut stmt = conn.prepare(
        "SELECT usn FROM books WHERE user_id = ?1
         UNION ALL
         SELECT usn FROM notes WHERE user_id = ?1
         ORDER BY usn ASC",
    )?;

    let usns = stmt
        .query_map(params![user_id.0], |row| row.get(0))?
        .collect::<Result<Vec<Usn>, _>>()?;
    Ok(usns)
}
