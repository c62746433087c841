//! Pool registry.
//!
//! # Responsibilities
//! - Map pooling scopes to their per-authority pools
//! - Create pools lazily and atomically on first use
//! - Coordinate shutdown across every pool
//!
//! # Design Decisions
//! - Concurrent map so unrelated scopes never contend
//! - Owned object with an explicit shutdown lifecycle; no globals

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::DispatchError;
use crate::pool::authority::{PerAuthorityPool, PoolStats};
use crate::pool::scope::PoolingScope;
use crate::transport::Transport;

struct PoolEntry<T: Transport> {
    pool: Arc<PerAuthorityPool<T>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Top-level map from pooling scope to per-authority pool.
pub struct PoolRegistry<T: Transport> {
    transport: Arc<T>,
    config: ClientConfig,
    pools: DashMap<PoolingScope, PoolEntry<T>>,
    closed: AtomicBool,
}

impl<T: Transport> PoolRegistry<T> {
    /// The config must already be validated.
    pub(crate) fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            pools: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Look up the pool for a scope, creating it on first use.
    pub(crate) fn pool_for(
        &self,
        scope: &PoolingScope,
    ) -> Result<Arc<PerAuthorityPool<T>>, DispatchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::Shutdown);
        }
        let entry = self.pools.entry(scope.clone()).or_insert_with(|| {
            tracing::debug!(%scope, "creating pool");
            let limits = self.config.limits_for(scope.service());
            let (pool, driver) =
                PerAuthorityPool::spawn(scope.clone(), limits, Arc::clone(&self.transport));
            PoolEntry {
                pool,
                driver: Mutex::new(Some(driver)),
            }
        });
        let pool = Arc::clone(&entry.pool);
        drop(entry);

        // A pool created while shutdown ran would miss the broadcast.
        if self.closed.load(Ordering::SeqCst) {
            pool.shutdown(None);
            return Err(DispatchError::Shutdown);
        }
        Ok(pool)
    }

    /// Number of pools currently materialized.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Counters for one scope's pool, if it has been created.
    pub fn stats(&self, scope: &PoolingScope) -> Option<PoolStats> {
        self.pools.get(scope).map(|entry| entry.pool.stats())
    }

    /// Drain and close every pool.
    ///
    /// All queued requests fail with [`DispatchError::Shutdown`]. In-flight
    /// exchanges finish normally unless `grace` elapses first, at which
    /// point their connections are forced closed.
    pub async fn shutdown(&self, grace: Option<Duration>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(pools = self.pools.len(), ?grace, "registry shutting down");

        let mut drivers = Vec::new();
        for entry in self.pools.iter() {
            entry.pool.shutdown(grace);
            if let Some(handle) = entry.driver.lock().take() {
                drivers.push(handle);
            }
        }
        for result in join_all(drivers).await {
            if let Err(error) = result {
                tracing::warn!(error = %error, "pool driver ended abnormally");
            }
        }
        self.pools.clear();
    }
}

impl<T: Transport> Drop for PoolRegistry<T> {
    fn drop(&mut self) {
        // Stop driver tasks even when the owner never called shutdown.
        for entry in self.pools.iter() {
            entry.pool.shutdown(None);
        }
    }
}
