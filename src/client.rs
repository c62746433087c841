//! Caller-facing pooled client.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{load_config, validate_config, ClientConfig, ConfigError};
use crate::error::DispatchError;
use crate::pool::registry::PoolRegistry;
use crate::pool::scope::PoolingScope;
use crate::transport::{Authority, RequestOf, ResponseOf, Transport};

/// HTTP client front end over the pooling subsystem.
///
/// One instance owns a [`PoolRegistry`] and hands requests to per-scope
/// pools. Construction validates the configuration; invalid limits are an
/// error up front, never a runtime surprise.
///
/// Cloning is cheap and shares the underlying pools.
pub struct PooledClient<T: Transport> {
    registry: Arc<PoolRegistry<T>>,
}

impl<T: Transport> Clone for PooledClient<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: Transport> PooledClient<T> {
    /// Create a client from an already-built configuration.
    pub fn new(transport: T, config: ClientConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(Self {
            registry: Arc::new(PoolRegistry::new(transport, config)),
        })
    }

    /// Create a client from a TOML configuration file.
    pub fn from_config_file(transport: T, path: &Path) -> Result<Self, ConfigError> {
        let config = load_config(path)?;
        Ok(Self {
            registry: Arc::new(PoolRegistry::new(transport, config)),
        })
    }

    /// Dispatch one request to `authority` on behalf of `service`.
    ///
    /// Resolves once the exchange completes or the request fails with a
    /// typed [`DispatchError`]. The call itself never blocks on capacity;
    /// waiting happens on the returned future.
    pub async fn submit(
        &self,
        service: &str,
        authority: Authority,
        request: RequestOf<T>,
    ) -> Result<ResponseOf<T>, DispatchError> {
        let scope = PoolingScope::new(service, authority);
        let pool = self.registry.pool_for(&scope)?;
        match pool.submit(request).await {
            Ok(result) => result,
            // reply sender dropped: the pool went away mid-flight
            Err(_) => Err(DispatchError::Shutdown),
        }
    }

    /// Access the underlying registry, mainly for introspection.
    pub fn registry(&self) -> &PoolRegistry<T> {
        &self.registry
    }

    /// Shut down every pool. See [`PoolRegistry::shutdown`].
    pub async fn shutdown(&self, grace: Option<Duration>) {
        self.registry.shutdown(grace).await;
    }
}
