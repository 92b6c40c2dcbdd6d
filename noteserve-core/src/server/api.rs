//! API routes definition

use super::auth::require_auth;
use super::handlers;
use super::middleware::track_request;
use super::state::AppState;
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;

/// Build the API router with all endpoints
pub fn build_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        // Sync routes
        .route("/sync/state", get(handlers::get_sync_state))
        .route("/sync/fragment", get(handlers::get_sync_fragment))
        // Book routes
        .route("/books", post(handlers::create_book))
        .route("/books/:uuid", patch(handlers::update_book).delete(handlers::delete_book))
        // Note routes
        .route("/notes", post(handlers::create_note))
        .route("/notes/:uuid", patch(handlers::update_note).delete(handlers::delete_note))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        // Unauthenticated
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(request_timeout, track_request))
        .with_state(state)
}
