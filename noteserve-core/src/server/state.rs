//! Shared state handed to every request

use super::auth::Authenticator;
use crate::config::SyncConfig;
use crate::core_store::NoteSqlStore;
use crate::core_sync::{Clock, FragmentLimit, MutationRecorder, SyncProtocolHandler, SyncResult};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Read side: sync state and fragments
    pub handler: SyncProtocolHandler,

    /// Write side: every book and note mutation
    pub recorder: MutationRecorder,

    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(
        store: NoteSqlStore,
        sync: &SyncConfig,
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let handler = SyncProtocolHandler::new(store.clone(), sync.full_sync_before, clock.clone())
            .with_default_limit(FragmentLimit::new(sync.default_fragment_limit)?);
        let recorder = MutationRecorder::new(store, clock);

        Ok(Self {
            handler,
            recorder,
            authenticator,
        })
    }
}
