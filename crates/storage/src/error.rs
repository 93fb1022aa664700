//! Storage error types and result alias.
//!
//! Every layer of the crate reports failures through [`StorageError`]. The
//! key-value adapter maps its backend-specific failures onto these variants,
//! the retry helper adds [`StorageError::RetryBudgetExhausted`] and
//! [`StorageError::Timeout`], and the set-array codec adds
//! [`StorageError::CorruptData`].
//!
//! # Error Types
//!
//! - [`StorageError::Unavailable`] - The backing store could not be reached
//! - [`StorageError::RetryBudgetExhausted`] - Every CAS attempt lost a race
//! - [`StorageError::CorruptData`] - Stored bytes are not a valid array record
//! - [`StorageError::Serialization`] - A value could not be encoded
//! - [`StorageError::Timeout`] - The request deadline elapsed
//! - [`StorageError::Internal`] - Backend-specific internal errors
//!
//! # Example
//!
//! ```
//! use linkbridge_storage::{StorageError, StorageResult};
//!
//! fn lookup(key: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::unavailable(format!("store offline while reading {key}")))
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via the `#[source]` attribute, enabling
/// debugging tools to display the full error context.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The backing store is unreachable or failed for a reason other than
    /// "key absent".
    ///
    /// The array store does not retry these; callers retry at a higher level.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
        /// The underlying error reported by the backend.
        #[source]
        source: Option<BoxError>,
    },

    /// Every compare-and-set attempt for the key lost a race.
    ///
    /// Fatal for the operation. Indicates pathological contention or a
    /// malfunctioning store and must be surfaced to the caller.
    #[error("Retry budget exhausted for key {key} after {attempts} attempts")]
    RetryBudgetExhausted {
        /// Key being mutated.
        key: String,
        /// Number of CAS attempts made.
        attempts: u32,
    },

    /// Stored bytes could not be decoded as an array record.
    ///
    /// Fatal. The stored value is left untouched so no data is silently lost.
    #[error("Corrupt data at key {key}: {message}")]
    CorruptData {
        /// Key holding the corrupt value.
        key: String,
        /// Description of the decoding failure.
        message: String,
        /// The underlying decoder error.
        #[source]
        source: Option<BoxError>,
    },

    /// A value could not be encoded for storage.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// The request-scoped deadline passed before the operation completed.
    #[error("Operation on key {key} exceeded its deadline")]
    Timeout {
        /// Key being read or mutated when the deadline passed.
        key: String,
    },

    /// Internal storage backend error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },
}

impl StorageError {
    /// Creates a new `Unavailable` error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into(), source: None }
    }

    /// Creates a new `Unavailable` error with a message and source error.
    #[must_use]
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `RetryBudgetExhausted` error.
    #[must_use]
    pub fn retry_budget_exhausted(key: impl Into<String>, attempts: u32) -> Self {
        Self::RetryBudgetExhausted { key: key.into(), attempts }
    }

    /// Creates a new `CorruptData` error with the given message.
    #[must_use]
    pub fn corrupt_data(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptData { key: key.into(), message: message.into(), source: None }
    }

    /// Creates a new `CorruptData` error with a message and source error.
    #[must_use]
    pub fn corrupt_data_with_source(
        key: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::CorruptData {
            key: key.into(),
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error for the given key.
    #[must_use]
    pub fn timeout(key: impl Into<String>) -> Self {
        Self::Timeout { key: key.into() }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Returns `true` when retrying the whole request later may succeed.
    ///
    /// Corrupt data and serialization failures are permanent; everything the
    /// store or the clock caused is transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. }
                | Self::RetryBudgetExhausted { .. }
                | Self::Timeout { .. }
        )
    }
}
