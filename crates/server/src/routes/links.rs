//! Link and list handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{AuthenticatedUser, within_deadline};
use crate::{error::AppError, state::AppState};

/// Body of `POST /links` and `DELETE /links`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkRequest {
    /// Left identifier (for example a team).
    pub left: String,
    /// Right identifier (for example a channel).
    pub right: String,
}

impl LinkRequest {
    fn parse(body: &[u8]) -> Result<Self, AppError> {
        serde_json::from_slice(body)
            .map_err(|e| AppError::bad_request(format!("invalid link body: {e}")))
    }
}

/// `GET /links/left/{left_id}`: rights linked to `left_id`.
#[tracing::instrument(name = "list_rights", skip(state), fields(user = %user.0))]
pub(super) async fn rights_of_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(left_id): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let deadline = state.request_deadline();
    within_deadline(deadline, async {
        Ok(Json(state.links().list_linked_b_before(&left_id, deadline).await?))
    })
    .await
}

/// `GET /links/right/{right_id}`: lefts linked to `right_id`.
#[tracing::instrument(name = "list_lefts", skip(state), fields(user = %user.0))]
pub(super) async fn lefts_of_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(right_id): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let deadline = state.request_deadline();
    within_deadline(deadline, async {
        Ok(Json(state.links().list_linked_a_before(&right_id, deadline).await?))
    })
    .await
}

/// `POST /links`.
#[tracing::instrument(name = "link_request", skip(state, body), fields(user = %user.0))]
pub(super) async fn link_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let request = LinkRequest::parse(&body)?;
    let deadline = state.request_deadline();
    within_deadline(deadline, async {
        state.links().link_before(&request.left, &request.right, deadline).await?;
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}

/// `DELETE /links`.
#[tracing::instrument(name = "unlink_request", skip(state, body), fields(user = %user.0))]
pub(super) async fn unlink_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let request = LinkRequest::parse(&body)?;
    let deadline = state.request_deadline();
    within_deadline(deadline, async {
        state.links().unlink_before(&request.left, &request.right, deadline).await?;
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}
