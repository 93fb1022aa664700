//! User lookups the bridge needs from the chat host.
//!
//! Login announces a chat user to the remote service by email address. The
//! bridge has no user records of its own, so the host supplies them through
//! [`UserDirectory`].

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::sink::BoxError;

/// The host's user store failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("user lookup failed: {message}")]
pub struct DirectoryError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl DirectoryError {
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

/// Resolves chat user ids to profile data.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Email address of `user_id`, or `None` for a user the host does not know.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] if the host could not be asked.
    async fn email(&self, user_id: &str) -> Result<Option<String>, DirectoryError>;
}

#[async_trait]
impl<T: UserDirectory + ?Sized> UserDirectory for Arc<T> {
    async fn email(&self, user_id: &str) -> Result<Option<String>, DirectoryError> {
        (**self).email(user_id).await
    }
}

/// Fixed in-memory directory.
///
/// The standalone binary starts with an empty one, so every login is refused
/// until a host wires in its own directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    emails: HashMap<String, String>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `user_id` with `email`.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>, email: impl Into<String>) -> Self {
        self.emails.insert(user_id.into(), email.into());
        self
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn email(&self, user_id: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.emails.get(user_id).cloned())
    }
}
