//! Bridge configuration and the process-wide configuration holder.
//!
//! [`BridgeConfig`] is read from the JSON file named by `LINKBRIDGE_CONFIG`.
//! `LINKBRIDGE_REMOTE_URL` and `LINKBRIDGE_SHARED_SECRET` override the file.
//! [`ConfigHolder`] publishes the active configuration to request handlers.

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use linkbridge_authn::{AuthError, SignatureConfig};
use linkbridge_storage::{CasRetryConfig, LinkNamespace};
use parking_lot::RwLock;
use serde::Deserialize;
use url::Url;

/// Environment variable naming the JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "LINKBRIDGE_CONFIG";

/// Environment variable overriding `remote_url`.
pub const REMOTE_URL_ENV: &str = "LINKBRIDGE_REMOTE_URL";

/// Environment variable overriding the signing secret.
pub const SHARED_SECRET_ENV: &str = "LINKBRIDGE_SHARED_SECRET";

/// Default time budget for one inbound request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default prefix the hosting platform strips from plugin request paths.
pub const DEFAULT_PATH_PREFIX: &str = "/plugins/co.parabol.action";

/// Default header carrying the authenticated chat user.
pub const DEFAULT_USER_HEADER: &str = "mattermost-user-id";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was being read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`BridgeConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds an unusable value.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Retry or namespace settings are invalid.
    #[error(transparent)]
    Store(#[from] linkbridge_storage::ConfigError),

    /// Signature settings are invalid.
    #[error(transparent)]
    Signature(#[from] AuthError),
}

impl ConfigError {
    #[must_use]
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Settings for the link store.
///
/// Read once at startup; replacing the configuration does not rebuild the
/// store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    /// CAS retry budget and per-operation deadline.
    #[serde(default)]
    pub retry: CasRetryConfig,

    /// Key prefixes for both sides of the link relation.
    #[serde(default)]
    pub namespace: LinkNamespace,
}

/// Complete bridge configuration.
///
/// # Example
///
/// ```
/// use linkbridge_server::BridgeConfig;
///
/// let config = BridgeConfig::from_json(
///     r#"{
///         "remote_url": "https://remote.example",
///         "request_timeout": "10s",
///         "signature": { "secret": "shared-secret" }
///     }"#,
/// )?;
/// assert_eq!(config.request_timeout.as_secs(), 10);
/// assert_eq!(config.user_header, "mattermost-user-id");
/// # Ok::<(), linkbridge_server::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Base URL of the remote collaboration service.
    pub remote_url: Url,

    /// Prefix re-added to inbound paths before signature verification.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Budget for one inbound request, including every store retry.
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Header naming the authenticated chat user.
    #[serde(default = "default_user_header")]
    pub user_header: String,

    /// Link store settings.
    #[serde(default)]
    pub store: StoreSettings,

    /// Signing and verification settings.
    pub signature: SignatureConfig,

    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_path_prefix() -> String {
    DEFAULT_PATH_PREFIX.to_owned()
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_user_header() -> String {
    DEFAULT_USER_HEADER.to_owned()
}

#[bon::bon]
impl BridgeConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found by [`validate`](Self::validate).
    #[builder]
    pub fn new(
        remote_url: Url,
        signature: SignatureConfig,
        #[builder(default = default_listen_addr())] listen_addr: SocketAddr,
        #[builder(into, default = default_path_prefix())] path_prefix: String,
        #[builder(default = DEFAULT_REQUEST_TIMEOUT)] request_timeout: Duration,
        #[builder(into, default = default_user_header())] user_header: String,
        #[builder(default)] store: StoreSettings,
        #[builder(default)] log_format: LogFormat,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            listen_addr,
            remote_url,
            path_prefix,
            request_timeout,
            user_header,
            store,
            signature,
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields,
    /// and any [`validate`](Self::validate) error.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, applies `lookup` overrides, and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise as
    /// [`from_json`](Self::from_json).
    pub fn load(
        path: impl AsRef<Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        let config: Self = serde_json::from_str(&raw)?;
        let config = config.with_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by `LINKBRIDGE_CONFIG` with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] if `LINKBRIDGE_CONFIG` is unset,
    /// otherwise as [`load`](Self::load).
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map_err(|_| ConfigError::MissingEnv(CONFIG_PATH_ENV))?;
        Self::load(path, |name| std::env::var(name).ok())
    }

    /// Applies `LINKBRIDGE_REMOTE_URL` and `LINKBRIDGE_SHARED_SECRET` from `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the remote URL override does not parse.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup(REMOTE_URL_ENV).filter(|v| !v.is_empty()) {
            self.remote_url = Url::parse(&url)
                .map_err(|e| ConfigError::invalid("remote_url", format!("{REMOTE_URL_ENV}: {e}")))?;
        }
        if let Some(secret) = lookup(SHARED_SECRET_ENV).filter(|v| !v.is_empty()) {
            self.signature = self.signature.with_secret(secret);
        }
        Ok(self)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.remote_url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid("remote_url", "scheme must be http or https"));
        }
        if self.remote_url.cannot_be_a_base() {
            return Err(ConfigError::invalid("remote_url", "must be an absolute base URL"));
        }
        if !self.path_prefix.is_empty()
            && (!self.path_prefix.starts_with('/') || self.path_prefix.ends_with('/'))
        {
            return Err(ConfigError::invalid(
                "path_prefix",
                "must be empty or start with '/' and not end with '/'",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout", "must be greater than zero"));
        }
        if http::HeaderName::from_bytes(self.user_header.as_bytes()).is_err() {
            return Err(ConfigError::invalid(
                "user_header",
                format!("'{}' is not a header name", self.user_header),
            ));
        }
        self.store.retry.validate()?;
        self.store.namespace.validate()?;
        self.signature.validate()?;
        Ok(())
    }

    /// Absolute URL of `path` on the remote service.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.remote_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
    }

    /// The remote base URL as shown to clients, without a trailing slash.
    #[must_use]
    pub fn remote_base(&self) -> &str {
        self.remote_url.as_str().trim_end_matches('/')
    }
}

/// Process-wide holder of the active [`BridgeConfig`].
///
/// Readers take a cheap snapshot with [`current`](Self::current) and keep
/// using it for the rest of the request, so a concurrent
/// [`replace`](Self::replace) never changes settings mid-request.
#[derive(Debug, Clone)]
pub struct ConfigHolder {
    inner: Arc<RwLock<Arc<BridgeConfig>>>,
}

impl ConfigHolder {
    /// Wraps an initial configuration after validating it.
    ///
    /// # Errors
    ///
    /// Any [`BridgeConfig::validate`] error.
    pub fn new(config: BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { inner: Arc::new(RwLock::new(Arc::new(config))) })
    }

    /// Snapshot of the active configuration.
    #[must_use]
    pub fn current(&self) -> Arc<BridgeConfig> {
        Arc::clone(&self.inner.read())
    }

    /// Validates `config` and makes it active, returning the previous one.
    ///
    /// The active configuration is unchanged if validation fails.
    ///
    /// # Errors
    ///
    /// Any [`BridgeConfig::validate`] error.
    pub fn replace(&self, config: BridgeConfig) -> Result<Arc<BridgeConfig>, ConfigError> {
        config.validate()?;
        let previous = std::mem::replace(&mut *self.inner.write(), Arc::new(config));
        tracing::info!(remote_url = %self.current().remote_url, "configuration replaced");
        Ok(previous)
    }
}
