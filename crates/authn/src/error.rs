//! Authentication error types.
//!
//! Signing failures are configuration problems and carry a readable message.
//! Verification failures carry a [`RejectReason`] for logs and metrics, but
//! their `Display` output is deliberately uniform so an HTTP response built
//! from it reveals nothing about which check failed.

use std::fmt;

use thiserror::Error;

/// Fixed text shown for every rejected request.
pub const REJECTION_MESSAGE: &str = "request signature rejected";

/// Why an inbound request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Signature headers absent or unparseable.
    MissingSignature,
    /// The key identifier is not in the key ring.
    UnknownKey,
    /// The signature, the covered components or the content digest do not match.
    BadSignature,
    /// The creation time is outside the permitted window.
    Expired,
}

impl RejectReason {
    /// Stable lowercase name, used as a structured log field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingSignature => "missing_signature",
            Self::UnknownKey => "unknown_key",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verification rejection.
///
/// `Display` always prints [`REJECTION_MESSAGE`]; use [`reason`](Self::reason)
/// and [`detail`](Self::detail) for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    reason: RejectReason,
    detail: String,
}

impl Rejection {
    /// Creates a rejection with an internal detail message.
    #[must_use]
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self { reason, detail: detail.into() }
    }

    /// Which check failed.
    #[must_use]
    pub fn reason(&self) -> RejectReason {
        self.reason
    }

    /// Internal description, for logs only.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REJECTION_MESSAGE)
    }
}

impl std::error::Error for Rejection {}

/// Errors from signing and verification.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; new variants may be added in
/// future minor releases.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The key, algorithm or covered components are unusable.
    #[error("Signing configuration error: {0}")]
    SigningConfig(String),

    /// An inbound request failed verification.
    #[error(transparent)]
    Rejected(#[from] Rejection),
}

impl AuthError {
    /// Creates a [`AuthError::SigningConfig`].
    #[must_use]
    pub fn signing_config(message: impl Into<String>) -> Self {
        Self::SigningConfig(message.into())
    }

    /// Creates a [`AuthError::Rejected`].
    #[must_use]
    pub fn rejected(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self::Rejected(Rejection::new(reason, detail))
    }

    /// Returns the rejection reason, or `None` for configuration errors.
    #[must_use]
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected(rejection) => Some(rejection.reason()),
            Self::SigningConfig(_) => None,
        }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_display_is_opaque() {
        for reason in [
            RejectReason::MissingSignature,
            RejectReason::UnknownKey,
            RejectReason::BadSignature,
            RejectReason::Expired,
        ] {
            let err = AuthError::rejected(reason, "keyid=\"secret-key\" mismatch");
            assert_eq!(err.to_string(), REJECTION_MESSAGE);
            assert!(!format!("{err}").contains("secret-key"));
            assert_eq!(err.reject_reason(), Some(reason));
        }
    }

    #[test]
    fn test_rejection_accessors() {
        let rejection = Rejection::new(RejectReason::Expired, "created too old");
        assert_eq!(rejection.reason(), RejectReason::Expired);
        assert_eq!(rejection.detail(), "created too old");
        assert_eq!(rejection.reason().to_string(), "expired");
    }

    #[test]
    fn test_signing_config_display() {
        let err = AuthError::signing_config("secret is empty");
        assert_eq!(err.to_string(), "Signing configuration error: secret is empty");
        assert!(err.reject_reason().is_none());
    }
}
