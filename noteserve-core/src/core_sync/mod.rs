//! USN-based synchronization engine
//!
//! - [`usn`] allocates per-user update sequence numbers
//! - [`recorder`] is the only write path for books and notes
//! - [`fragment`] pages the merged change feed
//! - [`protocol`] serves sync state and fragments
//! - [`client`] drives a replica through the protocol

pub mod client;
pub mod clock;
pub mod errors;
pub mod fragment;
pub mod protocol;
pub mod recorder;
pub mod usn;

pub use client::{ClientPhase, LocalReplica, SyncClient, SyncReport, SyncSource, UserSyncSource};
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{SyncError, SyncResult};
pub use fragment::{
    build_fragment, ChangeItem, FragmentLimit, SyncFragment, DEFAULT_FRAGMENT_LIMIT,
    MAX_FRAGMENT_LIMIT,
};
pub use protocol::{FragmentRequest, SyncProtocolHandler, SyncState};
pub use recorder::{BookUpdate, MutationRecorder, NewBook, NewNote, NoteUpdate};
pub use usn::{max_usn, next_usn};
