//! Server half of the two-phase sync protocol
//!
//! The server keeps no per-client state. A client asks for the sync state,
//! then pages through fragments, carrying its own cursor between calls.

use super::clock::Clock;
use super::errors::{SyncError, SyncResult};
use super::fragment::{build_fragment, FragmentLimit, SyncFragment};
use super::usn::max_usn;
use crate::core_store::{NoteSqlStore, Usn, UserId};
use crate::metrics::{record_counter, FRAGMENTS_SERVED};
use std::sync::Arc;
use tracing::{debug, error};

/// Answer to a sync state query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    /// Clients whose last sync predates this unix time must resync from 0
    pub full_sync_before: i64,
    pub max_usn: Usn,
    /// Unix seconds
    pub current_time: i64,
}

/// Validated fragment query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRequest {
    pub after_usn: Usn,
    /// `None` defers to the handler's configured default
    pub limit: Option<FragmentLimit>,
}

impl FragmentRequest {
    pub fn new(after_usn: Usn, limit: FragmentLimit) -> Self {
        Self { after_usn, limit: Some(limit) }
    }

    /// Parse raw query parameters. A missing `after_usn` means 0.
    pub fn parse(after_usn: Option<&str>, limit: Option<&str>) -> SyncResult<Self> {
        let after_usn = match after_usn.map(str::trim) {
            None => 0,
            Some(raw) => {
                let value: Usn = raw.parse().map_err(|_| {
                    SyncError::Validation(format!("after_usn must be a number, got '{}'", raw))
                })?;
                if value < 0 {
                    return Err(SyncError::Validation(format!(
                        "after_usn must not be negative, got {}",
                        value
                    )));
                }
                value
            }
        };

        let limit = limit.map(|raw| FragmentLimit::parse(Some(raw))).transpose()?;

        Ok(Self { after_usn, limit })
    }
}

/// Serves sync state and fragments for verified users
#[derive(Clone)]
pub struct SyncProtocolHandler {
    store: NoteSqlStore,
    full_sync_before: i64,
    default_limit: FragmentLimit,
    clock: Arc<dyn Clock>,
}

impl SyncProtocolHandler {
    pub fn new(store: NoteSqlStore, full_sync_before: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            full_sync_before,
            default_limit: FragmentLimit::default(),
            clock,
        }
    }

    pub fn with_default_limit(mut self, limit: FragmentLimit) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn full_sync_before(&self) -> i64 {
        self.full_sync_before
    }

    /// Current high-water mark and full-sync threshold for `user_id`
    pub async fn get_sync_state(&self, user_id: UserId) -> SyncResult<SyncState> {
        let store = self.store.clone();
        let max = run_blocking(move || {
            let conn = store.connection().map_err(SyncError::internal)?;
            max_usn(&conn, user_id)
        })
        .await?;

        Ok(SyncState {
            full_sync_before: self.full_sync_before,
            max_usn: max,
            current_time: self.clock.now().timestamp(),
        })
    }

    /// The page of `user_id`'s feed after `request.after_usn`.
    ///
    /// Reads the high-water mark and both change streams on one connection
    /// outside any write transaction. A write that lands between the two is
    /// simply picked up by the next page. Any read failure, a pool checkout
    /// included, is `Internal`.
    pub async fn get_sync_fragment(
        &self,
        user_id: UserId,
        request: FragmentRequest,
    ) -> SyncResult<SyncFragment> {
        let store = self.store.clone();
        let clock = self.clock.clone();
        let limit = request.limit.unwrap_or(self.default_limit);

        let fragment = run_blocking(move || {
            let conn = store.connection().map_err(SyncError::internal)?;
            let user_max_usn = max_usn(&conn, user_id)?;
            build_fragment(&conn, user_id, user_max_usn, request.after_usn, limit, clock.now())
        })
        .await?;

        record_counter(FRAGMENTS_SERVED, 1);
        debug!(user_id = %user_id, after_usn = request.after_usn, limit = %limit, "Served fragment");
        Ok(fragment)
    }
}

/// Run blocking SQLite work off the async executor
async fn run_blocking<T, F>(f: F) -> SyncResult<T>
where
    F: FnOnce() -> SyncResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("Blocking sync task failed: {}", e);
        SyncError::Internal(format!("blocking task failed: {}", e))
    })?
}
