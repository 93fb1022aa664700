//! Bidirectional many-to-many links between two identifier spaces.
//!
//! A link between `a` (left side, e.g. a team) and `b` (right side, e.g. a
//! channel) is stored twice: `a` in the array at
//! [`LinkNamespace::lefts_of(b)`](LinkNamespace::lefts_of) and `b` in the array at
//! [`LinkNamespace::rights_of(a)`](LinkNamespace::rights_of). The backing store
//! offers no cross-key atomicity, so [`LinkManager::link`] and
//! [`LinkManager::unlink`] run as two idempotent steps:
//!
//! 1. update the array listing the left ids of `b`
//! 2. update the array listing the right ids of `a`
//!
//! When step 1 lands and step 2 fails, the relation is left asymmetric and
//! the call returns [`LinkError::PartiallyApplied`]. Re-invoking the same call
//! is always safe and converges both sides; [`LinkManager::inspect`] lets a
//! repair job find pairs that need it.

use std::fmt;

use fail::fail_point;
use thiserror::Error;
use tokio::time::Instant;

use crate::{
    backend::KeyValueStore,
    config::LinkNamespace,
    error::{StorageError, StorageResult},
    set_array::SetArrayStore,
};

/// Which mutation a [`LinkError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOperation {
    /// [`LinkManager::link`].
    Link,
    /// [`LinkManager::unlink`].
    Unlink,
}

impl fmt::Display for LinkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link => f.write_str("link"),
            Self::Unlink => f.write_str("unlink"),
        }
    }
}

/// Errors returned by [`LinkManager::link`] and [`LinkManager::unlink`].
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinkError {
    /// An identifier was empty; nothing was written.
    #[error("{operation} rejected: {side} identifier is empty")]
    EmptyIdentifier {
        /// Requested operation.
        operation: LinkOperation,
        /// `"left"` or `"right"`.
        side: &'static str,
    },

    /// The first side failed; nothing is known to have been written.
    #[error("{operation} of {left} and {right} failed")]
    Failed {
        /// Requested operation.
        operation: LinkOperation,
        /// Left identifier.
        left: String,
        /// Right identifier.
        right: String,
        /// Store error from the first side.
        #[source]
        source: StorageError,
    },

    /// The first side was updated but the second was not.
    ///
    /// The relation is asymmetric until the same call is retried.
    #[error(
        "{operation} of {left} and {right} partially applied: {applied_key} updated, {pending_key} not updated"
    )]
    PartiallyApplied {
        /// Requested operation.
        operation: LinkOperation,
        /// Left identifier.
        left: String,
        /// Right identifier.
        right: String,
        /// Key whose array was updated.
        applied_key: String,
        /// Key whose array still needs the update.
        pending_key: String,
        /// Store error from the second side.
        #[source]
        source: StorageError,
    },
}

impl LinkError {
    /// Returns `true` for [`LinkError::PartiallyApplied`].
    #[must_use]
    pub fn is_partially_applied(&self) -> bool {
        matches!(self, Self::PartiallyApplied { .. })
    }

    /// Returns the store error that stopped the operation, if any.
    #[must_use]
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            Self::Failed { source, .. } | Self::PartiallyApplied { source, .. } => Some(source),
            Self::EmptyIdentifier { .. } => None,
        }
    }
}

/// Observed state of one left/right pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Both arrays list each other.
    Linked,
    /// Neither array lists the other.
    Unlinked,
    /// Exactly one side lists the other; a link or unlink was interrupted.
    Asymmetric {
        /// The array of lefts for the right id contains the left id.
        right_lists_left: bool,
        /// The array of rights for the left id contains the right id.
        left_lists_right: bool,
    },
}

/// Maintains the two mirrored indices of the link relation.
///
/// # Example
///
/// ```
/// use linkbridge_storage::{LinkManager, MemoryBackend, SetArrayStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let links = LinkManager::new(SetArrayStore::new(MemoryBackend::new()));
///
/// links.link("T1", "C1").await.unwrap();
/// assert_eq!(links.list_linked_b("T1").await.unwrap(), vec!["C1".to_owned()]);
/// assert_eq!(links.list_linked_a("C1").await.unwrap(), vec!["T1".to_owned()]);
/// # });
/// ```
#[derive(Clone)]
pub struct LinkManager<S> {
    arrays: SetArrayStore<S>,
    namespace: LinkNamespace,
}

impl<S: KeyValueStore> LinkManager<S> {
    /// Creates a manager using the default `teams`/`channels` key layout.
    pub fn new(arrays: SetArrayStore<S>) -> Self {
        Self { arrays, namespace: LinkNamespace::default() }
    }

    /// Replaces the key layout.
    #[must_use]
    pub fn with_namespace(mut self, namespace: LinkNamespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Returns the array store used for both sides.
    pub fn arrays(&self) -> &SetArrayStore<S> {
        &self.arrays
    }

    /// Returns the key layout.
    pub fn namespace(&self) -> &LinkNamespace {
        &self.namespace
    }

    /// Returns every right id linked to left id `a`, sorted.
    ///
    /// # Errors
    ///
    /// Any error from [`SetArrayStore::read_array`].
    pub async fn list_linked_b(&self, a: &str) -> StorageResult<Vec<String>> {
        self.list_linked_b_before(a, self.arrays.deadline()).await
    }

    /// [`list_linked_b`](Self::list_linked_b) bounded by a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Any error from [`SetArrayStore::read_array_before`].
    pub async fn list_linked_b_before(
        &self,
        a: &str,
        deadline: Instant,
    ) -> StorageResult<Vec<String>> {
        self.arrays.read_array_before(&self.namespace.rights_of(a), deadline).await
    }

    /// Returns every left id linked to right id `b`, sorted.
    ///
    /// # Errors
    ///
    /// Any error from [`SetArrayStore::read_array`].
    pub async fn list_linked_a(&self, b: &str) -> StorageResult<Vec<String>> {
        self.list_linked_a_before(b, self.arrays.deadline()).await
    }

    /// [`list_linked_a`](Self::list_linked_a) bounded by a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Any error from [`SetArrayStore::read_array_before`].
    pub async fn list_linked_a_before(
        &self,
        b: &str,
        deadline: Instant,
    ) -> StorageResult<Vec<String>> {
        self.arrays.read_array_before(&self.namespace.lefts_of(b), deadline).await
    }

    /// Links left id `a` with right id `b`. Idempotent.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Failed`] if the first side could not be updated
    /// - [`LinkError::PartiallyApplied`] if only the first side was updated
    /// - [`LinkError::EmptyIdentifier`] if either id is empty
    pub async fn link(&self, a: &str, b: &str) -> Result<(), LinkError> {
        self.link_before(a, b, self.arrays.deadline()).await
    }

    /// [`link`](Self::link) with both sides bounded by one caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Same as [`link`](Self::link).
    #[tracing::instrument(name = "link", skip(self, deadline), fields(a = %a, b = %b))]
    pub async fn link_before(&self, a: &str, b: &str, deadline: Instant) -> Result<(), LinkError> {
        self.apply(LinkOperation::Link, a, b, deadline).await
    }

    /// Removes the link between left id `a` and right id `b`. Idempotent.
    ///
    /// # Errors
    ///
    /// Same as [`link`](Self::link).
    pub async fn unlink(&self, a: &str, b: &str) -> Result<(), LinkError> {
        self.unlink_before(a, b, self.arrays.deadline()).await
    }

    /// [`unlink`](Self::unlink) with both sides bounded by one caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Same as [`link`](Self::link).
    #[tracing::instrument(name = "unlink", skip(self, deadline), fields(a = %a, b = %b))]
    pub async fn unlink_before(
        &self,
        a: &str,
        b: &str,
        deadline: Instant,
    ) -> Result<(), LinkError> {
        self.apply(LinkOperation::Unlink, a, b, deadline).await
    }

    /// Reads both sides of the pair and reports whether they agree.
    ///
    /// # Errors
    ///
    /// Any error from [`SetArrayStore::read_array`].
    pub async fn inspect(&self, a: &str, b: &str) -> StorageResult<LinkState> {
        let deadline = self.arrays.deadline();
        let lefts = self.arrays.read_array_before(&self.namespace.lefts_of(b), deadline).await?;
        let rights = self.arrays.read_array_before(&self.namespace.rights_of(a), deadline).await?;

        let right_lists_left = lefts.binary_search_by(|v| v.as_str().cmp(a)).is_ok();
        let left_lists_right = rights.binary_search_by(|v| v.as_str().cmp(b)).is_ok();

        Ok(match (right_lists_left, left_lists_right) {
            (true, true) => LinkState::Linked,
            (false, false) => LinkState::Unlinked,
            _ => LinkState::Asymmetric { right_lists_left, left_lists_right },
        })
    }

    async fn apply(
        &self,
        operation: LinkOperation,
        a: &str,
        b: &str,
        deadline: Instant,
    ) -> Result<(), LinkError> {
        if a.is_empty() {
            return Err(LinkError::EmptyIdentifier { operation, side: "left" });
        }
        if b.is_empty() {
            return Err(LinkError::EmptyIdentifier { operation, side: "right" });
        }

        let first_key = self.namespace.lefts_of(b);
        let second_key = self.namespace.rights_of(a);

        self.mutate(operation, &first_key, a, deadline).await.map_err(|source| {
            tracing::warn!(%operation, key = %first_key, error = %source, "first side failed");
            LinkError::Failed { operation, left: a.to_owned(), right: b.to_owned(), source }
        })?;

        let second = async {
            fail_point!("link-between-sides", |_| {
                Err(StorageError::unavailable("injected failure between link sides"))
            });
            self.mutate(operation, &second_key, b, deadline).await
        };

        second.await.map_err(|source| {
            if let Some(m) = self.arrays.metrics() {
                m.record_partial_link();
            }
            tracing::error!(
                %operation,
                applied_key = %first_key,
                pending_key = %second_key,
                error = %source,
                "link relation left asymmetric",
            );
            LinkError::PartiallyApplied {
                operation,
                left: a.to_owned(),
                right: b.to_owned(),
                applied_key: first_key.clone(),
                pending_key: second_key.clone(),
                source,
            }
        })
    }

    async fn mutate(
        &self,
        operation: LinkOperation,
        key: &str,
        value: &str,
        deadline: Instant,
    ) -> StorageResult<()> {
        match operation {
            LinkOperation::Link => self.arrays.add_value_before(key, value, deadline).await,
            LinkOperation::Unlink => self.arrays.remove_value_before(key, value, deadline).await,
        }
    }
}

impl<S> fmt::Debug for LinkManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkManager")
            .field("arrays", &self.arrays)
            .field("namespace", &self.namespace)
            .finish()
    }
}
