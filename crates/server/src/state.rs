//! Shared application state.

use std::sync::Arc;

use linkbridge_storage::{KeyValueStore, LinkManager, SetArrayStore, StoreMetrics};
use tokio::time::Instant;

use crate::{
    config::{BridgeConfig, ConfigHolder},
    error::ServerError,
    directory::{StaticDirectory, UserDirectory},
    remote::RemoteClient,
    sink::{LogSink, NotificationSink},
};

/// Store handle used by the bridge; any [`KeyValueStore`] behind an `Arc`.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// State handed to every handler through axum's `State` extractor.
///
/// Cloning is cheap; all clones share the same configuration holder, link
/// manager, sink and HTTP client.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ConfigHolder,
    links: LinkManager<SharedStore>,
    metrics: StoreMetrics,
    sink: Arc<dyn NotificationSink>,
    directory: Arc<dyn UserDirectory>,
    remote: RemoteClient,
}

fn default_sink() -> Arc<dyn NotificationSink> {
    Arc::new(LogSink)
}

fn default_directory() -> Arc<dyn UserDirectory> {
    Arc::new(StaticDirectory::new())
}

#[bon::bon]
impl AppState {
    /// Creates the state.
    ///
    /// The link manager takes its retry budget and key namespace from the
    /// configuration active at this point.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Remote`] if the outbound HTTP client cannot be built.
    #[builder]
    pub fn new(
        config: ConfigHolder,
        store: SharedStore,
        #[builder(default = default_sink())] sink: Arc<dyn NotificationSink>,
        #[builder(default = default_directory())] directory: Arc<dyn UserDirectory>,
        #[builder(default)] metrics: StoreMetrics,
    ) -> Result<Self, ServerError> {
        let current = config.current();
        let arrays = SetArrayStore::new(store)
            .with_config(current.store.retry.clone())
            .with_metrics(metrics.clone());
        let links = LinkManager::new(arrays).with_namespace(current.store.namespace.clone());
        let remote = RemoteClient::new(current.request_timeout)?;

        let inner = AppStateInner { config, links, metrics, sink, directory, remote };
        Ok(Self { inner: Arc::new(inner) })
    }
}

impl AppState {
    /// Snapshot of the active configuration.
    #[must_use]
    pub fn config(&self) -> Arc<BridgeConfig> {
        self.inner.config.current()
    }

    /// The configuration holder, for reloads.
    #[must_use]
    pub fn config_holder(&self) -> &ConfigHolder {
        &self.inner.config
    }

    /// The link manager.
    #[must_use]
    pub fn links(&self) -> &LinkManager<SharedStore> {
        &self.inner.links
    }

    /// Store operation counters.
    #[must_use]
    pub fn metrics(&self) -> &StoreMetrics {
        &self.inner.metrics
    }

    /// Destination for verified notifications.
    #[must_use]
    pub fn sink(&self) -> &dyn NotificationSink {
        self.inner.sink.as_ref()
    }

    /// Profile lookups for authenticated users.
    #[must_use]
    pub fn directory(&self) -> &dyn UserDirectory {
        self.inner.directory.as_ref()
    }

    /// Outbound client.
    #[must_use]
    pub fn remote(&self) -> &RemoteClient {
        &self.inner.remote
    }

    /// Deadline for a request starting now.
    #[must_use]
    pub fn request_deadline(&self) -> Instant {
        Instant::now() + self.config().request_timeout
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.inner.config)
            .field("links", &self.inner.links)
            .finish_non_exhaustive()
    }
}
