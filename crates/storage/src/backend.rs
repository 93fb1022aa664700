//! Key-value adapter trait definition.
//!
//! This module defines the [`KeyValueStore`] trait, the only interface the
//! crate consumes from the hosting platform's persistence layer. It is
//! deliberately narrow:
//!
//! - **Single-key atomicity**: `compare_and_set` is atomic for one key; there
//!   are no transactions across keys
//! - **Opaque values**: keys are namespaced strings, values are raw bytes
//! - **Async by default**: every call may block on network or disk latency
//!
//! Domain logic (array records, link relations) lives in
//! [`SetArrayStore`](crate::SetArrayStore) and
//! [`LinkManager`](crate::LinkManager), never in adapters.
//!
//! # Implementing an Adapter
//!
//! 1. Implement [`KeyValueStore`] for the platform client
//! 2. Map "key absent" to `Ok(None)` and every other read failure to
//!    [`StorageError::Unavailable`](crate::StorageError::Unavailable)
//! 3. Report a lost compare-and-set race as `Ok(false)`, not as an error
//!
//! See [`MemoryBackend`](crate::MemoryBackend) for a reference implementation.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Single-key key-value store with compare-and-set.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use linkbridge_storage::{KeyValueStore, MemoryBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryBackend::new();
///
/// assert!(store.compare_and_set("teams_C1", None, b"[\"T1\"]".to_vec()).await.unwrap());
/// let value = store.get("teams_C1").await.unwrap();
/// assert_eq!(value, Some(Bytes::from("[\"T1\"]")));
/// # });
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieves the raw value stored at `key`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` if the store could not be read
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Atomically replaces the value at `key` if it still equals `expected`.
    ///
    /// # Semantics
    ///
    /// - **`expected: None`**: insert-if-absent. Swaps only when the key does not exist.
    /// - **`expected: Some(value)`**: update-if-unchanged. Swaps only when the stored value is a
    ///   byte-for-byte match of `value`.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if the new value was written
    /// - `Ok(false)` if the stored value changed concurrently (lost race)
    /// - `Err(...)` if the store could not be reached
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<bool>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<bool> {
        (**self).compare_and_set(key, expected, new_value).await
    }
}
