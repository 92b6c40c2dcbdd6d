//! noteserve core library
//!
//! Storage, the USN sync engine and the HTTP surface of the note service.

pub mod config;
pub mod core_store;
pub mod core_sync;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod test_utils;

pub use config::Config;
pub use core_store::{Book, Note, NoteSqlStore, User, UserId, Usn};
pub use core_sync::{MutationRecorder, SyncError, SyncProtocolHandler, SyncResult};
pub use logging::{init_logging, init_logging_with_config, LogLevel};
pub use server::NoteServer;
