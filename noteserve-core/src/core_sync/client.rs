//! Client half of the sync protocol
//!
//! `SyncClient` walks the state machine
//!
//! ```text
//! Unsynced --sync_state--> Paging { cursor } --final page--> CaughtUp
//!                              ^          |
//!                              +----------+ more pages
//! ```
//!
//! applying every page to a [`LocalReplica`]. The cursor only moves after a
//! page has been applied, so a failed request can simply be retried.

use super::errors::{SyncError, SyncResult};
use super::fragment::{FragmentLimit, SyncFragment};
use super::protocol::{FragmentRequest, SyncProtocolHandler, SyncState};
use crate::core_store::{Book, Note, Usn, UserId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Where a client reads the change feed from
#[async_trait]
pub trait SyncSource: Send + Sync {
    async fn sync_state(&self) -> SyncResult<SyncState>;

    async fn sync_fragment(&self, after_usn: Usn, limit: FragmentLimit) -> SyncResult<SyncFragment>;
}

/// A protocol handler bound to one verified user
#[derive(Clone)]
pub struct UserSyncSource {
    handler: SyncProtocolHandler,
    user_id: UserId,
}

impl UserSyncSource {
    pub fn new(handler: SyncProtocolHandler, user_id: UserId) -> Self {
        Self { handler, user_id }
    }
}

#[async_trait]
impl SyncSource for UserSyncSource {
    async fn sync_state(&self) -> SyncResult<SyncState> {
        self.handler.get_sync_state(self.user_id).await
    }

    async fn sync_fragment(&self, after_usn: Usn, limit: FragmentLimit) -> SyncResult<SyncFragment> {
        self.handler
            .get_sync_fragment(self.user_id, FragmentRequest::new(after_usn, limit))
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Unsynced,
    Paging { cursor: Usn },
    CaughtUp,
}

/// The client's copy of the user's live books and notes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalReplica {
    pub books: BTreeMap<Uuid, Book>,
    pub notes: BTreeMap<Uuid, Note>,
    /// Highest USN the replica has applied
    pub last_max_usn: Usn,
    /// Server time of the last completed sync, unix seconds
    pub last_sync_at: i64,
}

impl LocalReplica {
    /// Upsert live items and drop expunged ones. Returns `(applied, expunged)`.
    pub fn apply(&mut self, fragment: &SyncFragment) -> (usize, usize) {
        for book in &fragment.books {
            self.books.insert(book.uuid, book.clone());
        }
        for note in &fragment.notes {
            self.notes.insert(note.uuid, note.clone());
        }
        for uuid in &fragment.expunged_books {
            self.books.remove(uuid);
        }
        for uuid in &fragment.expunged_notes {
            self.notes.remove(uuid);
        }

        (
            fragment.books.len() + fragment.notes.len(),
            fragment.expunged_books.len() + fragment.expunged_notes.len(),
        )
    }

    /// Forget everything, as a full sync requires
    pub fn reset(&mut self) {
        *self = LocalReplica::default();
    }
}

/// Outcome of one [`SyncClient::sync`] cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pages: usize,
    pub items_applied: usize,
    pub items_expunged: usize,
    pub full_sync: bool,
    /// Cursor after the cycle
    pub max_usn: Usn,
}

pub struct SyncClient<S> {
    source: S,
    replica: LocalReplica,
    phase: ClientPhase,
    limit: FragmentLimit,
    report: SyncReport,
    server_time: i64,
}

impl<S: SyncSource> SyncClient<S> {
    pub fn new(source: S, limit: FragmentLimit) -> Self {
        Self::with_replica(source, limit, LocalReplica::default())
    }

    /// Resume from a replica persisted by an earlier session
    pub fn with_replica(source: S, limit: FragmentLimit, replica: LocalReplica) -> Self {
        Self {
            source,
            replica,
            phase: ClientPhase::Unsynced,
            limit,
            report: SyncReport::default(),
            server_time: 0,
        }
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn replica(&self) -> &LocalReplica {
        &self.replica
    }

    pub fn into_replica(self) -> LocalReplica {
        self.replica
    }

    /// Perform one transition. On error the phase and cursor are unchanged.
    pub async fn step(&mut self) -> SyncResult<ClientPhase> {
        match self.phase {
            ClientPhase::Unsynced => {
                let state = self.source.sync_state().await?;
                self.server_time = state.current_time;

                let stale = self.replica.last_sync_at < state.full_sync_before;
                let server_reset = state.max_usn < self.replica.last_max_usn;
                if stale || server_reset {
                    info!(
                        last_sync_at = self.replica.last_sync_at,
                        full_sync_before = state.full_sync_before,
                        server_max_usn = state.max_usn,
                        local_max_usn = self.replica.last_max_usn,
                        "Performing full sync"
                    );
                    self.replica.reset();
                    self.report.full_sync = true;
                }

                self.phase = ClientPhase::Paging { cursor: self.replica.last_max_usn };
            }
            ClientPhase::Paging { cursor } => {
                let fragment = self.source.sync_fragment(cursor, self.limit).await?;

                if !fragment.is_final() && fragment.frag_max_usn <= cursor {
                    return Err(SyncError::Internal(format!(
                        "fragment after {} did not advance the cursor",
                        cursor
                    )));
                }

                let (applied, expunged) = self.replica.apply(&fragment);
                self.report.pages += 1;
                self.report.items_applied += applied;
                self.report.items_expunged += expunged;
                self.server_time = fragment.current_time;

                let next = if fragment.is_empty() { cursor } else { fragment.frag_max_usn };
                self.replica.last_max_usn = next;
                debug!(cursor, next, applied, expunged, "Applied fragment");

                if fragment.is_final() {
                    self.replica.last_sync_at = self.server_time;
                    self.report.max_usn = next;
                    self.phase = ClientPhase::CaughtUp;
                } else {
                    self.phase = ClientPhase::Paging { cursor: next };
                }
            }
            ClientPhase::CaughtUp => {}
        }

        Ok(self.phase)
    }

    /// Run a full cycle from `Unsynced` to `CaughtUp`
    pub async fn sync(&mut self) -> SyncResult<SyncReport> {
        self.phase = ClientPhase::Unsynced;
        self.report = SyncReport::default();

        while self.step().await? != ClientPhase::CaughtUp {}

        Ok(self.report.clone())
    }
}
