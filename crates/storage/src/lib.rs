//! Conflict-tolerant array records and bidirectional links over a plain
//! key-value store.
//!
//! The backing store only offers single-key reads and single-key
//! compare-and-set. On top of that this crate builds:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      LinkManager                            │
//! │       link / unlink / list_linked_a / list_linked_b         │
//! │         (two mirrored arrays, partial-failure report)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     SetArrayStore                           │
//! │          read_array / add_value / remove_value              │
//! │      (sorted JSON string arrays, set semantics)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 retry_compare_and_set                       │
//! │    (bounded optimistic loop, jittered back-off, deadline)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    KeyValueStore                            │
//! │               get / compare_and_set                         │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryBackend│     host-provided adapter                    │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use linkbridge_storage::{LinkManager, MemoryBackend, SetArrayStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let links = LinkManager::new(SetArrayStore::new(MemoryBackend::new()));
//!
//!     links.link("team-1", "channel-1").await?;
//!     links.link("team-1", "channel-2").await?;
//!
//!     assert_eq!(links.list_linked_b("team-1").await?, vec!["channel-1", "channel-2"]);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Store operations return [`StorageResult<T>`]. Link mutations return
//! [`LinkError`], which distinguishes a clean failure from one that left the
//! relation asymmetric. Retrying the same mutation repairs either case.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with seeded backends and assertion macros.
//! - **`failpoints`**: Activates the `cas-retry-before-sleep` and `link-between-sides` fault
//!   injection sites.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod error;
pub mod links;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod set_array;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

// Re-export primary types at crate root for convenience
pub use backend::KeyValueStore;
pub use config::{
    CasRetryConfig, ConfigError, DEFAULT_CAS_BASE_DELAY, DEFAULT_MAX_CAS_ATTEMPTS,
    DEFAULT_OPERATION_TIMEOUT, LinkNamespace,
};
pub use error::{BoxError, StorageError, StorageResult};
pub use links::{LinkError, LinkManager, LinkOperation, LinkState};
pub use memory::MemoryBackend;
pub use metrics::{StoreMetrics, StoreMetricsSnapshot};
pub use retry::{Mutation, retry_compare_and_set};
pub use set_array::{SetArrayStore, decode_array, encode_array};
