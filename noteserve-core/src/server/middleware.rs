//! Request timing and timeout

use super::error::ApiError;
use crate::metrics::{Timer, HTTP_REQUEST_MS};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::{debug, warn};

/// Abort requests that outlive `timeout` and record request durations.
///
/// A mutation already running on the blocking pool still completes and
/// commits after its request timed out.
pub async fn track_request(State(timeout): State<Duration>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let timer = Timer::new(HTTP_REQUEST_MS);

    let response = match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(%method, %path, ?timeout, "Request timed out");
            ApiError::Timeout.into_response()
        }
    };

    let elapsed_ms = timer.stop();
    debug!(%method, %path, status = response.status().as_u16(), elapsed_ms, "Handled request");
    response
}
