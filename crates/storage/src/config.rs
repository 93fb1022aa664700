//! Configuration for the array store and the link manager.
//!
//! [`CasRetryConfig`] bounds the optimistic read-modify-write loop and the
//! request deadline. [`LinkNamespace`] fixes how link keys are named in the
//! backing store.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of compare-and-set attempts per operation.
pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 10;

/// Default base delay between CAS attempts.
pub const DEFAULT_CAS_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default deadline for one store operation, including every retry.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors produced while validating configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric setting is below its minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// Smallest accepted value.
        min: String,
        /// Value that was supplied.
        value: String,
    },

    /// A string setting is empty or otherwise malformed.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Bounds for the compare-and-set retry loop.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use linkbridge_storage::CasRetryConfig;
///
/// let config = CasRetryConfig::builder()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(1))
///     .build()?;
/// assert_eq!(config.max_attempts(), 5);
/// # Ok::<(), linkbridge_storage::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CasRetryConfig {
    /// Total CAS attempts before giving up with `RetryBudgetExhausted`.
    #[serde(default = "default_max_attempts")]
    pub(crate) max_attempts: u32,

    /// Base delay before a retry; a random jitter of up to the same amount is added.
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    pub(crate) base_delay: Duration,

    /// Deadline for a whole operation, measured from its start.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub(crate) timeout: Duration,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_CAS_ATTEMPTS
}

fn default_base_delay() -> Duration {
    DEFAULT_CAS_BASE_DELAY
}

fn default_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

impl Default for CasRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
            base_delay: DEFAULT_CAS_BASE_DELAY,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

#[bon::bon]
impl CasRetryConfig {
    /// Creates a validated retry configuration.
    ///
    /// # Optional Fields
    ///
    /// * `max_attempts` - Total CAS attempts (default: 10).
    /// * `base_delay` - Base back-off between attempts (default: 5ms).
    /// * `timeout` - Operation deadline (default: 30 seconds).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if `max_attempts` is zero or
    /// `timeout` is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_CAS_ATTEMPTS)] max_attempts: u32,
        #[builder(default = DEFAULT_CAS_BASE_DELAY)] base_delay: Duration,
        #[builder(default = DEFAULT_OPERATION_TIMEOUT)] timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_attempts, base_delay, timeout };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants enforced by the builder.
    ///
    /// Deserialized configurations skip the builder, so loaders call this
    /// explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] on a zero attempt budget or a
    /// zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_attempts",
                min: "1".into(),
                value: "0".into(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "timeout",
                min: "1ns".into(),
                value: "0s".into(),
            });
        }
        Ok(())
    }

    /// Returns the total number of CAS attempts per operation.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the base delay between attempts.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the operation deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Key prefixes for the two sides of the link relation.
///
/// The key holding every left id linked to right `r` is `"{left_prefix}_{r}"`;
/// the key holding every right id linked to left `l` is `"{right_prefix}_{l}"`.
/// The defaults produce the persisted layout `teams_<channel id>` and
/// `channels_<team id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct LinkNamespace {
    /// Prefix of keys that list left ids.
    #[serde(default = "default_left_prefix")]
    #[builder(into, default = default_left_prefix())]
    pub left_prefix: String,

    /// Prefix of keys that list right ids.
    #[serde(default = "default_right_prefix")]
    #[builder(into, default = default_right_prefix())]
    pub right_prefix: String,
}

fn default_left_prefix() -> String {
    "teams".to_owned()
}

fn default_right_prefix() -> String {
    "channels".to_owned()
}

impl Default for LinkNamespace {
    fn default() -> Self {
        Self { left_prefix: default_left_prefix(), right_prefix: default_right_prefix() }
    }
}

impl LinkNamespace {
    /// Key of the array listing every left id linked to `right_id`.
    #[must_use]
    pub fn lefts_of(&self, right_id: &str) -> String {
        format!("{}_{right_id}", self.left_prefix)
    }

    /// Key of the array listing every right id linked to `left_id`.
    #[must_use]
    pub fn rights_of(&self, left_id: &str) -> String {
        format!("{}_{left_id}", self.right_prefix)
    }

    /// Rejects empty or identical prefixes, which would make keys collide.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.left_prefix.is_empty() || self.right_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: "prefixes cannot be empty".into(),
            });
        }
        if self.left_prefix == self.right_prefix {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: format!("left and right prefix are both '{}'", self.left_prefix),
            });
        }
        Ok(())
    }
}
