//! HTTP routes.
//!
//! # Endpoints
//!
//! - `GET /links/left/{left_id}` - rights linked to a left id
//! - `GET /links/right/{right_id}` - lefts linked to a right id
//! - `POST /links` - link `{"left", "right"}`
//! - `DELETE /links` - unlink `{"left", "right"}`
//! - `POST /notify/{channel_id}` - signed notification from the remote service
//! - `GET /config` - remote service URL for the client
//! - `POST /graphql` - signed pass-through to the remote service
//! - `POST /login` - registers the user's email with the remote service
//! - `GET /health` - liveness
//!
//! Every route except `/notify` and `/health` requires the authenticated-user
//! header. Every handler runs under the configured request deadline.

use std::future::Future;

use axum::{
    Router,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
};
use tokio::time::Instant;

use crate::{error::AppError, state::AppState};

mod links;
mod notify;
mod remote;

pub use links::LinkRequest;

/// Builds the router with every endpoint.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/links", post(links::link_handler).delete(links::unlink_handler))
        .route("/links/left/{left_id}", get(links::rights_of_handler))
        .route("/links/right/{right_id}", get(links::lefts_of_handler))
        .route("/notify/{channel_id}", post(notify::notify_handler))
        .route("/config", get(remote::config_handler))
        .route("/graphql", post(remote::graphql_handler))
        .route("/login", post(remote::login_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Liveness check.
async fn health_handler() -> &'static str {
    "ok"
}

/// Runs `future` until `deadline`, mapping expiry to [`AppError::DeadlineExceeded`].
pub(crate) async fn within_deadline<T>(
    deadline: Instant,
    future: impl Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::time::timeout_at(deadline, future).await.unwrap_or(Err(AppError::DeadlineExceeded))
}

/// The chat user the host authenticated, read from the configured user header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(
    /// User id as sent by the host.
    pub String,
);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let config = state.config();
        parts
            .headers
            .get(config.user_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_owned()))
            .ok_or(AppError::Unauthenticated)
    }
}
