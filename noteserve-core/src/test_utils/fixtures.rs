//! Test fixtures for the sync engine

use crate::config::SyncConfig;
use crate::core_store::{Book, Note, NoteSqlStore, User, UserId};
use crate::core_sync::{
    FragmentLimit, ManualClock, MutationRecorder, NewBook, NewNote, NoteUpdate, SyncClient,
    SyncProtocolHandler, UserSyncSource,
};
use crate::server::{AppState, StaticTokenAuthenticator};
use std::sync::Arc;

/// Unix time the fixture clock starts at
pub const TEST_EPOCH: i64 = 1_700_000_000;

/// Store, recorder and handler wired to one manual clock
pub struct TestEnv {
    pub store: NoteSqlStore,
    pub clock: Arc<ManualClock>,
    pub recorder: MutationRecorder,
    pub handler: SyncProtocolHandler,
}

impl TestEnv {
    /// In-memory database, `full_sync_before` of 0
    pub fn new() -> Self {
        let store = NoteSqlStore::in_memory().expect("in-memory store");
        Self::with_store(store, 0)
    }

    pub fn with_store(store: NoteSqlStore, full_sync_before: i64) -> Self {
        let clock = Arc::new(ManualClock::at_unix(TEST_EPOCH));
        let recorder = MutationRecorder::new(store.clone(), clock.clone());
        let handler = SyncProtocolHandler::new(store.clone(), full_sync_before, clock.clone());
        Self {
            store,
            clock,
            recorder,
            handler,
        }
    }

    pub fn user(&self) -> User {
        self.store.create_user().expect("create user")
    }

    pub fn book(&self, user_id: UserId, label: &str) -> Book {
        self.recorder
            .create_book(
                user_id,
                NewBook {
                    label: label.to_string(),
                    ..Default::default()
                },
            )
            .expect("create book")
    }

    pub fn note(&self, user_id: UserId, book: &Book, body: &str) -> Note {
        self.recorder
            .create_note(
                user_id,
                NewNote {
                    uuid: None,
                    book_uuid: book.uuid,
                    body: body.to_string(),
                    public: false,
                    added_on: None,
                },
            )
            .expect("create note")
    }

    pub fn edit(&self, user_id: UserId, note: &Note, body: &str) -> Note {
        self.recorder
            .update_note(
                user_id,
                &note.uuid,
                NoteUpdate {
                    body: Some(body.to_string()),
                    ..Default::default()
                },
            )
            .expect("update note")
    }

    /// A sync client for `user_id` paging `limit` items at a time
    pub fn client(&self, user_id: UserId, limit: u32) -> SyncClient<UserSyncSource> {
        let limit = FragmentLimit::new(limit).expect("valid limit");
        SyncClient::new(UserSyncSource::new(self.handler.clone(), user_id), limit)
    }

    /// HTTP state over the same store and clock
    pub fn app_state(&self, auth: StaticTokenAuthenticator) -> AppState {
        AppState::new(
            self.store.clone(),
            &SyncConfig::default(),
            Arc::new(auth),
            self.clock.clone(),
        )
        .expect("default sync config is valid")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
