//! Inbound notification webhook.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
};
use bytes::Bytes;
use linkbridge_authn::RequestVerifier;
use serde_json::{Map, Value};

use super::within_deadline;
use crate::{error::AppError, sink::Notification, state::AppState};

/// `POST /notify/{channel_id}`.
///
/// The host strips the plugin prefix before forwarding, so the prefix is
/// re-added to the path before the signature is checked. The body is only
/// parsed after verification succeeds.
#[tracing::instrument(name = "notify", skip(state, method, uri, headers, body))]
pub(super) async fn notify_handler(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let config = state.config();
    let deadline = state.request_deadline();

    let request = signed_view(&config.path_prefix, method, &uri, headers, body)?;
    let verified = RequestVerifier::from_config(&config.signature)?.verify(&request)?;

    let props: Map<String, Value> = serde_json::from_slice(request.body()).map_err(|e| {
        AppError::bad_request(format!("notification body must be a JSON object: {e}"))
    })?;

    tracing::debug!(key_id = %verified.key_id, "notification verified");
    within_deadline(deadline, async {
        state
            .sink()
            .deliver(Notification { channel_id, key_id: verified.key_id, props })
            .await?;
        Ok(StatusCode::OK)
    })
    .await
}

/// Rebuilds the request as the sender signed it, with `prefix` restored.
fn signed_view(
    prefix: &str,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<http::Request<Bytes>, AppError> {
    let target = match uri.query() {
        Some(query) => format!("{prefix}{}?{query}", uri.path()),
        None => format!("{prefix}{}", uri.path()),
    };
    let mut request = http::Request::builder()
        .method(method)
        .uri(target)
        .body(body)
        .map_err(|e| AppError::bad_request(format!("invalid request target: {e}")))?;
    *request.headers_mut() = headers;
    Ok(request)
}
