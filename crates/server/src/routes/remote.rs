//! Client-facing endpoints backed by the remote service.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Serialize, de::IgnoredAny};
use serde_json::json;

use super::{AuthenticatedUser, within_deadline};
use crate::{error::AppError, remote::RemoteError, state::AppState};

/// Remote path that registers a chat user by email.
const LOGIN_PATH: &str = "/mattermost";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ClientConfig {
    remote_url: String,
}

/// `GET /config`: where the client should reach the remote service.
pub(super) async fn config_handler(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Json<ClientConfig> {
    Json(ClientConfig { remote_url: state.config().remote_base().to_owned() })
}

/// `POST /graphql`: forwards the body to the remote service, signed.
///
/// The remote status, content type and body are relayed unchanged.
#[tracing::instrument(name = "graphql", skip(state, headers, body), fields(user = %user.0))]
pub(super) async fn graphql_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let config = state.config();
    within_deadline(state.request_deadline(), async {
        let relayed = state.remote().post(&config, "/graphql", body, &headers).await?;
        let mut response = (relayed.status, relayed.body).into_response();
        if let Some(content_type) = relayed.content_type {
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        Ok(response)
    })
    .await
}

/// `POST /login`: registers the authenticated user with the remote service.
///
/// The request body may be empty or any JSON value; it is not forwarded. The
/// remote answer is relayed as JSON on success, anything but `200` is a
/// gateway error.
#[tracing::instrument(name = "login", skip(state, headers, body), fields(user = %user.0))]
pub(super) async fn login_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    if !body.is_empty() {
        serde_json::from_slice::<IgnoredAny>(&body)
            .map_err(|e| AppError::bad_request(format!("invalid login body: {e}")))?;
    }

    let config = state.config();
    within_deadline(state.request_deadline(), async {
        let email = state.directory().email(&user.0).await?.ok_or(AppError::Unauthenticated)?;
        let payload = Bytes::from(json!({ "email": email }).to_string());

        let relayed = state.remote().post(&config, LOGIN_PATH, payload, &headers).await?;
        if relayed.status != StatusCode::OK {
            return Err(AppError::Remote(RemoteError::Status(relayed.status)));
        }
        let content_type = HeaderValue::from_static("application/json");
        Ok(([(header::CONTENT_TYPE, content_type)], relayed.body).into_response())
    })
    .await
}
