//! Optimistic read-modify-write over a single key.
//!
//! [`retry_compare_and_set`] reads the raw value at a key, hands it to a pure
//! transform, and writes the result back with a compare-and-set conditioned
//! on the bytes it read. A lost race re-runs the whole cycle from a fresh
//! read, so the transform must be side-effect free.
//!
//! # Budget
//!
//! - At most `max_attempts` compare-and-set calls are issued per operation
//! - Between attempts the loop sleeps `base_delay + random(0..=base_delay)` to
//!   spread out contending writers
//! - Every backend call runs under the operation deadline, and no attempt
//!   starts once the deadline has passed
//!
//! Backend errors and transform errors end the loop immediately; only lost
//! races are retried.

use std::{future::Future, time::Duration};

use fail::fail_point;
use rand::Rng;
use tokio::time::Instant;

use crate::{
    backend::KeyValueStore,
    config::CasRetryConfig,
    error::{StorageError, StorageResult},
    metrics::StoreMetrics,
};

/// Outcome of a transform applied to the current raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// The current value already satisfies the request; nothing is written.
    Unchanged,
    /// Replace the current value with these bytes.
    Replace(Vec<u8>),
}

/// Runs `future` under `deadline`, mapping expiry to [`StorageError::Timeout`].
pub(crate) async fn with_deadline<T, Fut>(
    key: &str,
    deadline: Instant,
    future: Fut,
) -> StorageResult<T>
where
    Fut: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout_at(deadline, future).await {
        Ok(result) => result,
        Err(_elapsed) => Err(StorageError::timeout(key)),
    }
}

/// Applies `transform` to the value at `key` until a compare-and-set lands.
///
/// `transform` receives the raw bytes just read (`None` when the key is
/// absent) and may be invoked once per attempt.
///
/// # Errors
///
/// - [`StorageError::RetryBudgetExhausted`] after `config.max_attempts()` lost races
/// - [`StorageError::Timeout`] when `deadline` passes first
/// - Any error returned by the store or by `transform`, unchanged
#[tracing::instrument(
    skip(store, config, deadline, metrics, transform),
    fields(key = %key, max_attempts = config.max_attempts())
)]
pub async fn retry_compare_and_set<S, F>(
    store: &S,
    key: &str,
    config: &CasRetryConfig,
    deadline: Instant,
    metrics: Option<&StoreMetrics>,
    transform: F,
) -> StorageResult<()>
where
    S: KeyValueStore + ?Sized,
    F: Fn(Option<&[u8]>) -> StorageResult<Mutation>,
{
    let max_attempts = config.max_attempts();

    for attempt in 1..=max_attempts {
        if Instant::now() >= deadline {
            return Err(timed_out(key, attempt - 1, metrics));
        }

        let current = match with_deadline(key, deadline, store.get(key)).await {
            Ok(current) => current,
            Err(err @ StorageError::Timeout { .. }) => {
                return Err(timed_out_with(err, attempt - 1, metrics));
            },
            Err(err) => return Err(err),
        };
        if let Some(m) = metrics {
            m.record_read();
        }

        let next = match transform(current.as_deref())? {
            Mutation::Unchanged => {
                if let Some(m) = metrics {
                    m.record_noop();
                }
                return Ok(());
            },
            Mutation::Replace(next) => next,
        };

        if let Some(m) = metrics {
            m.record_cas_attempt();
        }
        let swapped =
            match with_deadline(key, deadline, store.compare_and_set(key, current.as_deref(), next))
                .await
            {
                Ok(swapped) => swapped,
                Err(err @ StorageError::Timeout { .. }) => {
                    return Err(timed_out_with(err, attempt, metrics));
                },
                Err(err) => return Err(err),
            };

        if swapped {
            if attempt > 1 {
                tracing::debug!(attempt, "compare-and-set succeeded after retry");
            }
            return Ok(());
        }

        if let Some(m) = metrics {
            m.record_conflict();
        }

        if attempt < max_attempts {
            let delay = jittered_delay(config.base_delay());
            tracing::debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "CAS conflict, retrying after jitter",
            );
            fail_point!("cas-retry-before-sleep", |_| {
                Err(StorageError::internal("injected failure before CAS retry sleep"))
            });
            tokio::time::sleep_until((Instant::now() + delay).min(deadline)).await;
        }
    }

    if let Some(m) = metrics {
        m.record_retry_exhausted();
    }
    tracing::warn!(attempts = max_attempts, "CAS retry budget exhausted");
    Err(StorageError::retry_budget_exhausted(key, max_attempts))
}

fn timed_out(key: &str, attempts_completed: u32, metrics: Option<&StoreMetrics>) -> StorageError {
    timed_out_with(StorageError::timeout(key), attempts_completed, metrics)
}

fn timed_out_with(
    err: StorageError,
    attempts_completed: u32,
    metrics: Option<&StoreMetrics>,
) -> StorageError {
    if let Some(m) = metrics {
        m.record_timeout();
    }
    tracing::warn!(attempts_completed, "operation deadline passed");
    err
}

/// `base + random(0..=base)`, or zero when `base` is zero.
fn jittered_delay(base: Duration) -> Duration {
    let range = base.as_millis() as u64;
    if range == 0 {
        return base;
    }
    base + Duration::from_millis(rand::rng().random_range(0..=range))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::MemoryBackend;

    fn fast_config(max_attempts: u32) -> CasRetryConfig {
        CasRetryConfig::builder()
            .max_attempts(max_attempts)
            .base_delay(Duration::ZERO)
            .build()
            .unwrap()
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    /// Store whose compare-and-set never lands.
    struct AlwaysLoses {
        cas_calls: AtomicU32,
    }

    #[async_trait]
    impl KeyValueStore for AlwaysLoses {
        async fn get(&self, _key: &str) -> StorageResult<Option<Bytes>> {
            Ok(None)
        }

        async fn compare_and_set(
            &self,
            _key: &str,
            _expected: Option<&[u8]>,
            _new_value: Vec<u8>,
        ) -> StorageResult<bool> {
            self.cas_calls.fetch_add(1, Ordering::Relaxed);
            Ok(false)
        }
    }

    /// Store whose reads hang forever.
    struct Stalled;

    #[async_trait]
    impl KeyValueStore for Stalled {
        async fn get(&self, _key: &str) -> StorageResult<Option<Bytes>> {
            std::future::pending().await
        }

        async fn compare_and_set(
            &self,
            _key: &str,
            _expected: Option<&[u8]>,
            _new_value: Vec<u8>,
        ) -> StorageResult<bool> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let store = MemoryBackend::new();
        let calls = AtomicU32::new(0);

        let result = retry_compare_and_set(&store, "k", &fast_config(3), far_deadline(), None, |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(Mutation::Replace(b"v".to_vec()))
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from("v")));
    }

    #[tokio::test]
    async fn test_transform_sees_current_bytes() {
        let store = MemoryBackend::new();
        store.set("k", b"old".to_vec());

        retry_compare_and_set(&store, "k", &fast_config(3), far_deadline(), None, |current| {
            assert_eq!(current, Some(b"old".as_slice()));
            Ok(Mutation::Replace(b"new".to_vec()))
        })
        .await
        .unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from("new")));
    }

    #[tokio::test]
    async fn test_unchanged_skips_write() {
        let store = AlwaysLoses { cas_calls: AtomicU32::new(0) };

        let result =
            retry_compare_and_set(&store, "k", &fast_config(3), far_deadline(), None, |_| {
                Ok(Mutation::Unchanged)
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(store.cas_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_after_exact_attempt_count() {
        let store = AlwaysLoses { cas_calls: AtomicU32::new(0) };
        let metrics = StoreMetrics::new();

        let result = retry_compare_and_set(
            &store,
            "channels_T1",
            &fast_config(10),
            far_deadline(),
            Some(&metrics),
            |_| Ok(Mutation::Replace(b"[\"C1\"]".to_vec())),
        )
        .await;

        assert!(
            matches!(result, Err(StorageError::RetryBudgetExhausted { attempts: 10, .. })),
            "expected RetryBudgetExhausted with 10 attempts, got: {result:?}",
        );
        assert_eq!(store.cas_calls.load(Ordering::Relaxed), 10);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cas_attempts, 10);
        assert_eq!(snapshot.conflicts, 10);
        assert_eq!(snapshot.retry_exhausted, 1);
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let store = AlwaysLoses { cas_calls: AtomicU32::new(0) };

        let result = retry_compare_and_set(&store, "k", &fast_config(1), far_deadline(), None, |_| {
            Ok(Mutation::Replace(Vec::new()))
        })
        .await;

        assert!(matches!(result, Err(StorageError::RetryBudgetExhausted { attempts: 1, .. })));
        assert_eq!(store.cas_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_transform_error_not_retried() {
        let store = MemoryBackend::new();
        store.set("k", b"garbage".to_vec());
        let calls = AtomicU32::new(0);

        let result = retry_compare_and_set(&store, "k", &fast_config(5), far_deadline(), None, |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            Err(StorageError::corrupt_data("k", "not an array"))
        })
        .await;

        assert!(matches!(result, Err(StorageError::CorruptData { .. })));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        // Corrupt bytes are left in place.
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from("garbage")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_stalled_read() {
        let deadline = Instant::now() + Duration::from_secs(30);

        let result = retry_compare_and_set(&Stalled, "k", &fast_config(10), deadline, None, |_| {
            Ok(Mutation::Unchanged)
        })
        .await;

        assert!(matches!(result, Err(StorageError::Timeout { ref key }) if key == "k"));
        assert!(Instant::now() >= deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_attempt_starts_after_deadline() {
        let store = AlwaysLoses { cas_calls: AtomicU32::new(0) };
        let config = CasRetryConfig::builder()
            .max_attempts(100)
            .base_delay(Duration::from_secs(1))
            .build()
            .unwrap();
        let deadline = Instant::now() + Duration::from_millis(2500);

        let result = retry_compare_and_set(&store, "k", &config, deadline, None, |_| {
            Ok(Mutation::Replace(b"v".to_vec()))
        })
        .await;

        assert!(matches!(result, Err(StorageError::Timeout { .. })), "got: {result:?}");
        let calls = store.cas_calls.load(Ordering::Relaxed);
        assert!((1..100).contains(&calls), "expected the deadline to cut retries short: {calls}");
    }

    #[tokio::test]
    async fn test_expired_deadline_issues_no_calls() {
        let store = AlwaysLoses { cas_calls: AtomicU32::new(0) };
        let deadline = Instant::now() - Duration::from_millis(1);

        let result = retry_compare_and_set(&store, "k", &fast_config(3), deadline, None, |_| {
            Ok(Mutation::Replace(b"v".to_vec()))
        })
        .await;

        assert!(matches!(result, Err(StorageError::Timeout { .. })));
        assert_eq!(store.cas_calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_jittered_delay_bounds() {
        assert_eq!(jittered_delay(Duration::ZERO), Duration::ZERO);

        let base = Duration::from_millis(10);
        for _ in 0..100 {
            let delay = jittered_delay(base);
            assert!(delay >= base && delay <= base * 2, "delay out of range: {delay:?}");
        }
    }
}
