//! HTTP surface: sync endpoints and the book/note mutation routes

pub mod api;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod state;
pub mod types;

pub use api::build_router;
pub use auth::{AuthenticatedUser, Authenticator, StaticTokenAuthenticator};
pub use error::{ApiError, ApiResult};
pub use server::NoteServer;
pub use state::AppState;
