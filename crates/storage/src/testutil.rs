//! Shared test utilities for array store and link tests.
//!
//! Feature-gated behind `testutil` so it never leaks into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! linkbridge-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use linkbridge_storage::testutil::{encoded, seeded_backend};
//! ```

use crate::{memory::MemoryBackend, set_array::encode_array};

/// Encodes `values` exactly as the array store persists them.
///
/// # Panics
///
/// Panics if encoding fails, which cannot happen for string slices.
#[must_use]
pub fn encoded(values: &[&str]) -> Vec<u8> {
    let owned: Vec<String> = values.iter().map(|v| (*v).to_owned()).collect();
    encode_array(&owned).expect("string arrays always encode")
}

/// Creates a [`MemoryBackend`] holding one encoded array per entry.
///
/// Values are written as given, without sorting, so tests can seed records
/// the way an older writer may have left them.
#[must_use]
pub fn seeded_backend(records: &[(&str, &[&str])]) -> MemoryBackend {
    let backend = MemoryBackend::new();
    for (key, values) in records {
        backend.set(*key, encoded(values));
    }
    backend
}

/// Asserts that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::CorruptData`](crate::StorageError::CorruptData).
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use linkbridge_storage::assert_corrupt_data;
/// use linkbridge_storage::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::corrupt_data("k", "bad json"));
/// assert_corrupt_data!(result);
/// ```
#[macro_export]
macro_rules! assert_corrupt_data {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::CorruptData { .. })),
            "expected StorageError::CorruptData, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::CorruptData { .. })),
            "{}: expected StorageError::CorruptData, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Asserts that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::RetryBudgetExhausted`](crate::StorageError::RetryBudgetExhausted)
/// with the given attempt count.
#[macro_export]
macro_rules! assert_retry_exhausted {
    ($result:expr, $attempts:expr) => {
        match $result {
            Err($crate::error::StorageError::RetryBudgetExhausted { attempts, .. }) => {
                assert_eq!(attempts, $attempts, "unexpected attempt count");
            },
            other => panic!("expected StorageError::RetryBudgetExhausted, got: {other:?}"),
        }
    };
}

/// Asserts that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::Timeout`](crate::StorageError::Timeout).
#[macro_export]
macro_rules! assert_timeout {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Timeout { .. })),
            "expected StorageError::Timeout, got: {:?}",
            $result,
        );
    };
}
