//! Sorted, duplicate-free string arrays stored under single keys.
//!
//! [`SetArrayStore`] keeps one array record per key in a
//! [`KeyValueStore`]. Records are JSON arrays of strings (`["C1","C2"]`), the
//! layout already present in deployed stores. Mutations go through
//! [`retry_compare_and_set`], so concurrent writers converge without any
//! in-process lock.
//!
//! # Invariants
//!
//! After every successful mutation the stored array is sorted
//! lexicographically and contains no duplicates. Reads normalize what they
//! find, so records written by older versions are returned sorted as well.
//!
//! # Corrupt Records
//!
//! Bytes that do not decode as an array of strings produce
//! [`StorageError::CorruptData`]. The record is never overwritten, so the
//! damage stays visible to operators instead of being replaced by an empty
//! array.

use tokio::time::Instant;

use crate::{
    backend::KeyValueStore,
    config::CasRetryConfig,
    error::{StorageError, StorageResult},
    metrics::StoreMetrics,
    retry::{Mutation, retry_compare_and_set, with_deadline},
};

/// Decodes a stored array record.
///
/// An absent key, an empty value, and a JSON `null` all decode to the empty
/// array. The result is sorted and deduplicated.
///
/// # Errors
///
/// Returns [`StorageError::CorruptData`] when the bytes are not a JSON array
/// of strings.
pub fn decode_array(key: &str, raw: Option<&[u8]>) -> StorageResult<Vec<String>> {
    let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
        return Ok(Vec::new());
    };

    let mut values = serde_json::from_slice::<Option<Vec<String>>>(raw)
        .map_err(|e| StorageError::corrupt_data_with_source(key, "not a JSON array of strings", e))?
        .unwrap_or_default();
    values.sort_unstable();
    values.dedup();
    Ok(values)
}

/// Encodes an array record. Always produces a JSON array, `[]` when empty.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if encoding fails.
pub fn encode_array(values: &[String]) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(values)
        .map_err(|e| StorageError::serialization_with_source("failed to encode array record", e))
}

/// Transform that ensures `value` is present.
fn insert_value(key: &str, raw: Option<&[u8]>, value: &str) -> StorageResult<Mutation> {
    let mut values = decode_array(key, raw)?;
    match values.binary_search_by(|probe| probe.as_str().cmp(value)) {
        Ok(_) => Ok(Mutation::Unchanged),
        Err(pos) => {
            values.insert(pos, value.to_owned());
            encode_array(&values).map(Mutation::Replace)
        },
    }
}

/// Transform that ensures `value` is absent.
fn delete_value(key: &str, raw: Option<&[u8]>, value: &str) -> StorageResult<Mutation> {
    let mut values = decode_array(key, raw)?;
    match values.binary_search_by(|probe| probe.as_str().cmp(value)) {
        Ok(pos) => {
            values.remove(pos);
            encode_array(&values).map(Mutation::Replace)
        },
        Err(_) => Ok(Mutation::Unchanged),
    }
}

/// Per-key sets of string identifiers on top of a [`KeyValueStore`].
///
/// Holds no cached state: every call reads through to the store.
///
/// # Example
///
/// ```
/// use linkbridge_storage::{MemoryBackend, SetArrayStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let arrays = SetArrayStore::new(MemoryBackend::new());
///
/// arrays.add_value("channels_T1", "C1").await.unwrap();
/// arrays.add_value("channels_T1", "C2").await.unwrap();
/// arrays.remove_value("channels_T1", "C1").await.unwrap();
///
/// assert_eq!(arrays.read_array("channels_T1").await.unwrap(), vec!["C2".to_owned()]);
/// # });
/// ```
#[derive(Clone)]
pub struct SetArrayStore<S> {
    store: S,
    config: CasRetryConfig,
    metrics: Option<StoreMetrics>,
}

impl<S: KeyValueStore> SetArrayStore<S> {
    /// Creates a store with the default retry configuration.
    pub fn new(store: S) -> Self {
        Self { store, config: CasRetryConfig::default(), metrics: None }
    }

    /// Replaces the retry configuration.
    #[must_use]
    pub fn with_config(mut self, config: CasRetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches a metrics collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: StoreMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the underlying key-value store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &CasRetryConfig {
        &self.config
    }

    /// Returns the attached metrics collector, if any.
    pub fn metrics(&self) -> Option<&StoreMetrics> {
        self.metrics.as_ref()
    }

    /// Deadline for an operation starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.config.timeout()
    }

    /// Returns the set stored at `key`, sorted; empty if the key is absent.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Unavailable`] if the store read fails
    /// - [`StorageError::CorruptData`] if the stored bytes do not decode
    /// - [`StorageError::Timeout`] if the configured deadline passes
    pub async fn read_array(&self, key: &str) -> StorageResult<Vec<String>> {
        self.read_array_before(key, self.deadline()).await
    }

    /// [`read_array`](Self::read_array) bounded by a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Same as [`read_array`](Self::read_array).
    #[tracing::instrument(name = "read_array", skip(self, deadline), fields(key = %key))]
    pub async fn read_array_before(
        &self,
        key: &str,
        deadline: Instant,
    ) -> StorageResult<Vec<String>> {
        let raw = with_deadline(key, deadline, self.store.get(key)).await.inspect_err(|err| {
            if let (StorageError::Timeout { .. }, Some(m)) = (err, &self.metrics) {
                m.record_timeout();
            }
        })?;
        if let Some(m) = &self.metrics {
            m.record_read();
        }
        decode_array(key, raw.as_deref()).inspect_err(|err| self.report_corrupt(key, err))
    }

    /// Ensures `value` is in the set at `key`. Adding a present value succeeds
    /// without writing.
    ///
    /// # Errors
    ///
    /// - [`StorageError::RetryBudgetExhausted`] if every CAS attempt lost a race
    /// - [`StorageError::CorruptData`] if the stored bytes do not decode
    /// - [`StorageError::Unavailable`] or [`StorageError::Timeout`] from the store
    pub async fn add_value(&self, key: &str, value: &str) -> StorageResult<()> {
        self.add_value_before(key, value, self.deadline()).await
    }

    /// [`add_value`](Self::add_value) bounded by a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Same as [`add_value`](Self::add_value).
    #[tracing::instrument(
        name = "add_value",
        skip(self, deadline),
        fields(key = %key, value = %value)
    )]
    pub async fn add_value_before(
        &self,
        key: &str,
        value: &str,
        deadline: Instant,
    ) -> StorageResult<()> {
        retry_compare_and_set(
            &self.store,
            key,
            &self.config,
            deadline,
            self.metrics.as_ref(),
            |raw| insert_value(key, raw, value).inspect_err(|err| self.report_corrupt(key, err)),
        )
        .await
    }

    /// Ensures `value` is not in the set at `key`. Removing an absent value,
    /// or removing from an absent key, succeeds without writing.
    ///
    /// # Errors
    ///
    /// Same as [`add_value`](Self::add_value).
    pub async fn remove_value(&self, key: &str, value: &str) -> StorageResult<()> {
        self.remove_value_before(key, value, self.deadline()).await
    }

    /// [`remove_value`](Self::remove_value) bounded by a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Same as [`add_value`](Self::add_value).
    #[tracing::instrument(
        name = "remove_value",
        skip(self, deadline),
        fields(key = %key, value = %value)
    )]
    pub async fn remove_value_before(
        &self,
        key: &str,
        value: &str,
        deadline: Instant,
    ) -> StorageResult<()> {
        retry_compare_and_set(
            &self.store,
            key,
            &self.config,
            deadline,
            self.metrics.as_ref(),
            |raw| delete_value(key, raw, value).inspect_err(|err| self.report_corrupt(key, err)),
        )
        .await
    }

    fn report_corrupt(&self, key: &str, err: &StorageError) {
        if let StorageError::CorruptData { .. } = err {
            if let Some(m) = &self.metrics {
                m.record_corrupt_read();
            }
            tracing::error!(
                key,
                error = %err,
                "stored array record is corrupt; leaving it untouched"
            );
        }
    }
}

impl<S> std::fmt::Debug for SetArrayStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetArrayStore")
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}
