//! Note store
//!
//! SQLite persistence for users, books and notes. Rows are never physically
//! deleted; a delete is an update that sets `deleted` and clears content.

pub mod entities;
pub mod error;
pub mod migrations;
pub mod queries;
pub mod sql_store;
pub mod types;

pub use entities::{Book, Note, User};
pub use error::{StoreError, StoreResult};
pub use migrations::{migrate, CURRENT_SCHEMA_VERSION};
pub use sql_store::NoteSqlStore;
pub use types::{Usn, UserId};
