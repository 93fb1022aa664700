//! HTTP error mapping and startup errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use linkbridge_authn::{AuthError, REJECTION_MESSAGE};
use linkbridge_storage::{LinkError, StorageError};
use serde_json::json;
use thiserror::Error;

use crate::{
    config::ConfigError, directory::DirectoryError, remote::RemoteError, sink::SinkError,
};

/// Errors returned by request handlers.
///
/// Responses carry a JSON body `{"error": "..."}`. Server-side details are
/// logged and never sent to the client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    /// Signature rejected or signing misconfigured.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Link store read failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Link mutation failed.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Outbound call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Notification could not be handed to the host.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The host's user directory failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The authenticated-user header is missing.
    #[error("Not authorized")]
    Unauthenticated,

    /// The request body or parameters are malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request ran past its deadline.
    #[error("Request timed out")]
    DeadlineExceeded,
}

impl AppError {
    /// Creates a [`AppError::BadRequest`].
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(AuthError::Rejected(_)) | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::DeadlineExceeded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(err) => storage_status(err),
            Self::Link(LinkError::EmptyIdentifier { .. }) => StatusCode::BAD_REQUEST,
            Self::Link(LinkError::Failed { source, .. }) => storage_status(source),
            Self::Remote(RemoteError::Header(_)) => StatusCode::BAD_REQUEST,
            Self::Remote(RemoteError::Transport(_) | RemoteError::Status(_)) => {
                StatusCode::BAD_GATEWAY
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the response body.
    fn public_message(&self) -> String {
        match self {
            Self::Auth(AuthError::Rejected(_)) => REJECTION_MESSAGE.to_owned(),
            Self::Auth(_) | Self::Remote(RemoteError::Signing(_)) => {
                "Signing configuration error".to_owned()
            },
            Self::Remote(RemoteError::Header(err)) => err.to_string(),
            Self::Remote(_) => "Remote service error".to_owned(),
            Self::Link(err @ LinkError::EmptyIdentifier { .. }) => err.to_string(),
            Self::Link(LinkError::PartiallyApplied { operation, .. }) => {
                format!("{operation} was only partially applied")
            },
            Self::Unauthenticated | Self::BadRequest(_) | Self::DeadlineExceeded => {
                self.to_string()
            },
            _ => match self.status() {
                StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable".to_owned(),
                _ => "Internal server error".to_owned(),
            },
        }
    }
}

fn storage_status(err: &StorageError) -> StatusCode {
    match err {
        StorageError::RetryBudgetExhausted { .. }
        | StorageError::Timeout { .. }
        | StorageError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else if !matches!(self, Self::Auth(_)) {
            // Rejections are already logged by the verifier.
            tracing::debug!(error = %self, status = status.as_u16(), "request refused");
        }

        let mut body = json!({ "error": self.public_message() });
        if matches!(self, Self::Link(LinkError::PartiallyApplied { .. })) {
            body["retry"] = json!(true);
        }
        (status, Json(body)).into_response()
    }
}

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The outbound client could not be created.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Logging could not be initialized.
    #[error("failed to initialize logging: {0}")]
    Telemetry(String),

    /// Binding or serving failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
