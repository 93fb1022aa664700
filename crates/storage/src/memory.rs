//! In-memory key-value adapter.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`KeyValueStore`] suitable for testing and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Keys are stored in a [`BTreeMap`], so inspection is deterministic
//! - **Atomic CAS**: The comparison and the write happen under one write lock
//!
//! # Example
//!
//! ```
//! use linkbridge_storage::{KeyValueStore, MemoryBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set("greeting", b"hello".to_vec());
//!     let value = backend.get("greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"hello");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - No replication or distributed features

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{backend::KeyValueStore, error::StorageResult};

/// In-memory key-value store using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryBackend {
    /// Creates a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally stores `value` at `key`.
    ///
    /// Not part of [`KeyValueStore`]; used to seed fixtures, including
    /// deliberately corrupt records.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.data.write().insert(key.into(), value.into());
    }

    /// Removes `key`, returning the previous value if there was one.
    pub fn delete(&self, key: &str) -> Option<Bytes> {
        self.data.write().remove(key)
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns a copy of every stored key-value pair in key order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Bytes)> {
        self.data.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").field("keys", &self.len()).finish()
    }
}

#[async_trait]
impl KeyValueStore for MemoryBackend {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        Ok(self.data.read().get(key).cloned())
    }

    #[tracing::instrument(level = "trace", skip(self, expected, new_value))]
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<bool> {
        let mut data = self.data.write();

        let matches = match (expected, data.get(key)) {
            (None, None) => true,
            (Some(exp), Some(cur)) => exp == &cur[..],
            _ => false,
        };

        if matches {
            data.insert(key.to_owned(), Bytes::from(new_value));
        }

        Ok(matches)
    }
}
