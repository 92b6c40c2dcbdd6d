//! Sync fragment construction
//!
//! A fragment is one bounded page of a user's change feed. Books and notes
//! live in separate tables; both streams are read for the window
//! `(after_usn, user_max_usn]`, merged on their USN, truncated to the page
//! limit and split into live items and tombstones.

use super::errors::{SyncError, SyncResult};
use crate::core_store::{queries, Book, Note, Usn, UserId};
use crate::metrics::{record_histogram, Timer, FRAGMENT_BUILD_MS, FRAGMENT_ITEMS};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Page size used when the client does not ask for one
pub const DEFAULT_FRAGMENT_LIMIT: u32 = 100;

/// Largest page a client may request; larger requests are refused
pub const MAX_FRAGMENT_LIMIT: u32 = 100;

/// Validated page size, always in `1..=MAX_FRAGMENT_LIMIT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentLimit(u32);

impl FragmentLimit {
    pub fn new(limit: u32) -> SyncResult<Self> {
        if limit == 0 || limit > MAX_FRAGMENT_LIMIT {
            return Err(SyncError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_FRAGMENT_LIMIT, limit
            )));
        }
        Ok(FragmentLimit(limit))
    }

    /// Parse a raw query parameter. Absent means the default.
    pub fn parse(raw: Option<&str>) -> SyncResult<Self> {
        let raw = match raw {
            None => return Ok(Self::default()),
            Some(raw) => raw.trim(),
        };

        let value: i64 = raw
            .parse()
            .map_err(|_| SyncError::Validation(format!("limit must be a number, got '{}'", raw)))?;

        if value <= 0 || value > i64::from(MAX_FRAGMENT_LIMIT) {
            return Err(SyncError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_FRAGMENT_LIMIT, value
            )));
        }
        Self::new(value as u32)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for FragmentLimit {
    fn default() -> Self {
        FragmentLimit(DEFAULT_FRAGMENT_LIMIT)
    }
}

impl fmt::Display for FragmentLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the merged change stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeItem {
    Book(Book),
    Note(Note),
}

impl ChangeItem {
    pub fn usn(&self) -> Usn {
        match self {
            ChangeItem::Book(book) => book.usn,
            ChangeItem::Note(note) => note.usn,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            ChangeItem::Book(book) => book.uuid,
            ChangeItem::Note(note) => note.uuid,
        }
    }

    pub fn is_deleted(&self) -> bool {
        match self {
            ChangeItem::Book(book) => book.deleted,
            ChangeItem::Note(note) => note.deleted,
        }
    }
}

/// One page of the change feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFragment {
    /// USN of the last item on the page, or 0 when the page is empty
    pub frag_max_usn: Usn,
    /// The user's high-water mark the page was built against
    pub user_max_usn: Usn,
    /// Server time at read, unix seconds
    pub current_time: i64,
    pub notes: Vec<Note>,
    pub books: Vec<Book>,
    pub expunged_notes: Vec<Uuid>,
    pub expunged_books: Vec<Uuid>,
}

impl SyncFragment {
    /// Total entries on the page, tombstones included
    pub fn len(&self) -> usize {
        self.notes.len() + self.books.len() + self.expunged_notes.len() + self.expunged_books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a client holding this page has seen everything up to `user_max_usn`
    pub fn is_final(&self) -> bool {
        self.is_empty() || self.frag_max_usn == self.user_max_usn
    }
}

/// Merge both streams into one list ordered by USN.
///
/// USNs are unique per user, so a repeated value means the store is broken.
pub fn merge_changes(books: Vec<Book>, notes: Vec<Note>) -> SyncResult<Vec<ChangeItem>> {
    let mut items: Vec<ChangeItem> = books
        .into_iter()
        .map(ChangeItem::Book)
        .chain(notes.into_iter().map(ChangeItem::Note))
        .collect();

    items.sort_by_key(ChangeItem::usn);

    if let Some(pair) = items.windows(2).find(|pair| pair[0].usn() == pair[1].usn()) {
        return Err(SyncError::Internal(format!(
            "usn {} is stamped on both {} and {}",
            pair[0].usn(),
            pair[0].uuid(),
            pair[1].uuid()
        )));
    }

    Ok(items)
}

/// Truncate merged items to the page and split them into their four lists
pub fn assemble(
    mut items: Vec<ChangeItem>,
    limit: FragmentLimit,
    user_max_usn: Usn,
    current_time: i64,
) -> SyncFragment {
    items.truncate(limit.get() as usize);

    let mut fragment = SyncFragment {
        frag_max_usn: items.last().map(ChangeItem::usn).unwrap_or(0),
        user_max_usn,
        current_time,
        notes: Vec::new(),
        books: Vec::new(),
        expunged_notes: Vec::new(),
        expunged_books: Vec::new(),
    };

    for item in items {
        match item {
            ChangeItem::Book(book) if book.deleted => fragment.expunged_books.push(book.uuid),
            ChangeItem::Book(book) => fragment.books.push(book),
            ChangeItem::Note(note) if note.deleted => fragment.expunged_notes.push(note.uuid),
            ChangeItem::Note(note) => fragment.notes.push(note),
        }
    }

    fragment
}

/// Build the page of `user_id`'s feed that follows `after_usn`.
///
/// Each stream is read with the page limit; the first `limit` merged items
/// can never come from beyond the first `limit` rows of either stream.
pub fn build_fragment(
    conn: &Connection,
    user_id: UserId,
    user_max_usn: Usn,
    after_usn: Usn,
    limit: FragmentLimit,
    now: DateTime<Utc>,
) -> SyncResult<SyncFragment> {
    let timer = Timer::new(FRAGMENT_BUILD_MS);

    let books = queries::books_in_usn_range(conn, user_id, after_usn, user_max_usn, limit.get())
        .map_err(SyncError::internal)?;
    let notes = queries::notes_in_usn_range(conn, user_id, after_usn, user_max_usn, limit.get())
        .map_err(SyncError::internal)?;

    let items = merge_changes(books, notes)?;
    let fragment = assemble(items, limit, user_max_usn, now.timestamp());

    record_histogram(FRAGMENT_ITEMS, fragment.len() as f64);
    let elapsed_ms = timer.stop();
    debug!(
        user_id = %user_id,
        after_usn,
        frag_max_usn = fragment.frag_max_usn,
        user_max_usn,
        items = fragment.len(),
        elapsed_ms,
        "Built sync fragment"
    );

    Ok(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::NoteSqlStore;
    use crate::core_sync::clock::SystemClock;
    use crate::core_sync::recorder::{MutationRecorder, NewBook, NewNote, NoteUpdate};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn book(usn: Usn, deleted: bool) -> Book {
        let now = Utc::now();
        Book {
            uuid: Uuid::new_v4(),
            user_id: UserId(1),
            label: if deleted { String::new() } else { format!("b{usn}") },
            usn,
            deleted,
            added_on: 0,
            edited_on: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn note(usn: Usn, deleted: bool) -> Note {
        let now = Utc::now();
        Note {
            uuid: Uuid::new_v4(),
            user_id: UserId(1),
            book_uuid: Uuid::new_v4(),
            body: String::new(),
            usn,
            public: false,
            deleted,
            added_on: 0,
            edited_on: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn read_fragment(store: &NoteSqlStore, user_id: UserId, after: Usn, limit: u32) -> SyncFragment {
        let limit = FragmentLimit::new(limit).unwrap();
        store
            .read(|conn| {
                let max = crate::core_sync::usn::max_usn(conn, user_id)?;
                build_fragment(conn, user_id, max, after, limit, Utc::now())
            })
            .unwrap()
    }

    #[test]
    fn test_limit_parsing() {
        assert_eq!(FragmentLimit::parse(None).unwrap().get(), 100);
        assert_eq!(FragmentLimit::parse(Some("2")).unwrap().get(), 2);
        assert_eq!(FragmentLimit::parse(Some("100")).unwrap().get(), 100);

        for bad in ["0", "-1", "101", "abc", "", "1.5"] {
            assert!(
                matches!(FragmentLimit::parse(Some(bad)), Err(SyncError::Validation(_))),
                "limit {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_merge_orders_across_kinds() {
        let items = merge_changes(vec![book(3, false), book(1, false)], vec![note(2, false)]).unwrap();
        let usns: Vec<_> = items.iter().map(ChangeItem::usn).collect();
        assert_eq!(usns, vec![1, 2, 3]);
        assert!(matches!(items[1], ChangeItem::Note(_)));
    }

    #[test]
    fn test_merge_rejects_duplicate_usn() {
        let err = merge_changes(vec![book(2, false)], vec![note(2, false)]).unwrap_err();
        assert!(matches!(err, SyncError::Internal(_)));
    }

    #[test]
    fn test_assemble_partitions_tombstones() {
        let live_book = book(1, false);
        let dead_book = book(2, true);
        let live_note = note(3, false);
        let dead_note = note(4, true);
        let items = merge_changes(
            vec![live_book.clone(), dead_book.clone()],
            vec![live_note.clone(), dead_note.clone()],
        )
        .unwrap();

        let fragment = assemble(items, FragmentLimit::default(), 4, 10);

        assert_eq!(fragment.frag_max_usn, 4);
        assert_eq!(fragment.books, vec![live_book]);
        assert_eq!(fragment.notes, vec![live_note]);
        assert_eq!(fragment.expunged_books, vec![dead_book.uuid]);
        assert_eq!(fragment.expunged_notes, vec![dead_note.uuid]);
    }

    #[test]
    fn test_empty_page() {
        let fragment = assemble(Vec::new(), FragmentLimit::default(), 7, 10);
        assert_eq!(fragment.frag_max_usn, 0);
        assert_eq!(fragment.user_max_usn, 7);
        assert!(fragment.is_final());
    }

    #[test]
    fn test_paged_scenario() {
        let store = NoteSqlStore::in_memory().unwrap();
        let recorder = MutationRecorder::new(store.clone(), Arc::new(SystemClock));
        let user = store.create_user().unwrap();

        let b1 = recorder
            .create_book(user.id, NewBook { label: "js".to_string(), ..Default::default() })
            .unwrap();
        let n1 = recorder
            .create_note(
                user.id,
                NewNote { uuid: None, book_uuid: b1.uuid, body: "v1".to_string(), public: false, added_on: None },
            )
            .unwrap();
        recorder
            .update_note(user.id, &n1.uuid, NoteUpdate { body: Some("v2".to_string()), ..Default::default() })
            .unwrap();

        // The edit restamped N1, so usn 2 no longer exists in the feed
        let first = read_fragment(&store, user.id, 0, 2);
        assert_eq!(first.frag_max_usn, 3);
        assert_eq!(first.user_max_usn, 3);
        assert_eq!(first.books.len(), 1);
        assert_eq!(first.books[0].usn, 1);
        assert_eq!(first.notes.len(), 1);
        assert_eq!(first.notes[0].usn, 3);
        assert_eq!(first.notes[0].body, "v2");
        assert!(first.is_final());

        let after = read_fragment(&store, user.id, 3, 2);
        assert!(after.is_empty());
        assert_eq!(after.frag_max_usn, 0);
        assert!(after.is_final());

        let resumed = read_fragment(&store, user.id, 2, 2);
        assert_eq!(resumed.frag_max_usn, 3);
        assert!(resumed.books.is_empty());
        assert_eq!(resumed.notes.len(), 1);
        assert_eq!(resumed.notes[0].usn, 3);
        assert!(resumed.is_final());
    }

    #[test]
    fn test_deleted_note_is_expunged() {
        let store = NoteSqlStore::in_memory().unwrap();
        let recorder = MutationRecorder::new(store.clone(), Arc::new(SystemClock));
        let user = store.create_user().unwrap();

        let b1 = recorder
            .create_book(user.id, NewBook { label: "js".to_string(), ..Default::default() })
            .unwrap();
        let mut last = None;
        for i in 0..3 {
            last = Some(
                recorder
                    .create_note(
                        user.id,
                        NewNote { uuid: None, book_uuid: b1.uuid, body: format!("n{i}"), public: false, added_on: None },
                    )
                    .unwrap(),
            );
        }
        let target = last.unwrap();
        let deleted = recorder.delete_note(user.id, &target.uuid).unwrap();
        assert_eq!(deleted.usn, 5);

        let fragment = read_fragment(&store, user.id, 4, 100);
        assert_eq!(fragment.expunged_notes, vec![target.uuid]);
        assert!(fragment.notes.iter().all(|n| n.uuid != target.uuid));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_paging_is_complete(
            ops in prop::collection::vec(0u8..4, 1..40),
            limit in 1u32..=7,
            start in 0i64..5,
        ) {
            let store = NoteSqlStore::in_memory().unwrap();
            let recorder = MutationRecorder::new(store.clone(), Arc::new(SystemClock));
            let user = store.create_user().unwrap();
            let b0 = recorder
                .create_book(user.id, NewBook { label: "root".to_string(), ..Default::default() })
                .unwrap();

            let mut notes: Vec<Uuid> = Vec::new();
            for (i, op) in ops.iter().enumerate() {
                match (*op, notes.last().copied()) {
                    (0, _) | (_, None) => {
                        let n = recorder
                            .create_note(user.id, NewNote {
                                uuid: None, book_uuid: b0.uuid, body: format!("{i}"), public: false, added_on: None,
                            })
                            .unwrap();
                        notes.push(n.uuid);
                    }
                    (1, Some(uuid)) => {
                        recorder
                            .update_note(user.id, &uuid, NoteUpdate { body: Some(format!("e{i}")), ..Default::default() })
                            .unwrap();
                    }
                    (2, Some(uuid)) => {
                        recorder.delete_note(user.id, &uuid).unwrap();
                        notes.pop();
                    }
                    _ => {
                        recorder
                            .create_book(user.id, NewBook { label: format!("b{i}"), ..Default::default() })
                            .unwrap();
                    }
                }
            }

            let max = store.get_user(user.id).unwrap().max_usn;
            let after0 = start.min(max);

            let expected: HashSet<Usn> = store
                .read(|conn| queries::stamped_usns(conn, user.id))
                .unwrap()
                .into_iter()
                .filter(|usn| *usn > after0)
                .collect();

            let mut seen: Vec<Usn> = Vec::new();
            let mut cursor = after0;
            loop {
                let page = store
                    .read(|conn| {
                        let items = merge_changes(
                            queries::books_in_usn_range(conn, user.id, cursor, max, limit)?,
                            queries::notes_in_usn_range(conn, user.id, cursor, max, limit)?,
                        )?;
                        let usns: Vec<Usn> = items.iter().take(limit as usize).map(ChangeItem::usn).collect();
                        Ok::<_, SyncError>((usns, assemble(items, FragmentLimit::new(limit)?, max, 0)))
                    })
                    .unwrap();
                let (usns, fragment) = page;
                seen.extend(usns);
                if fragment.is_final() {
                    break;
                }
                prop_assert!(fragment.frag_max_usn > cursor);
                cursor = fragment.frag_max_usn;
            }

            let unique: HashSet<Usn> = seen.iter().copied().collect();
            prop_assert_eq!(unique.len(), seen.len());
            prop_assert_eq!(unique, expected);
        }
    }
}
