//! Destination for verified notifications.
//!
//! The bridge only authenticates and parses notifications. Posting them into
//! a chat channel is the host's job, reached through [`NotificationSink`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Boxed error carried by [`SinkError`].
pub type BoxError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A notification that passed signature verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Channel the notification is addressed to.
    pub channel_id: String,
    /// Key id that signed the request.
    pub key_id: String,
    /// The JSON object body, passed through untouched.
    pub props: Map<String, Value>,
}

/// Delivery failed on the host side.
#[derive(Debug, Clone, thiserror::Error)]
#[error("notification delivery failed: {message}")]
pub struct SinkError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl SinkError {
    /// Creates an error without an underlying cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    /// Creates an error wrapping `source`.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { message: message.into(), source: Some(Arc::new(source)) }
    }
}

/// Receives verified notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the host could not accept it.
    async fn deliver(&self, notification: Notification) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    async fn deliver(&self, notification: Notification) -> Result<(), SinkError> {
        (**self).deliver(notification).await
    }
}

/// Sink that only records notifications in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: Notification) -> Result<(), SinkError> {
        tracing::info!(
            channel_id = %notification.channel_id,
            key_id = %notification.key_id,
            kind = notification.props.get("type").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "notification received",
        );
        Ok(())
    }
}
