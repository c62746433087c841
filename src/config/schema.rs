//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Durations are expressed as `*_ms` integer fields.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for a pooled client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Pool limits applied to every service unless overridden.
    pub pool: PoolLimits,

    /// Per-service overrides; values set here take precedence.
    pub services: Vec<ServiceConfig>,
}

impl ClientConfig {
    /// Effective limits for a service, with overrides applied over the
    /// global `[pool]` table.
    pub fn limits_for(&self, service: &str) -> PoolLimits {
        match self.services.iter().find(|s| s.name == service) {
            Some(svc) => self.pool.overlay(&svc.overrides),
            None => self.pool.clone(),
        }
    }
}

/// Connection-pool limits and timeouts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolLimits {
    /// Maximum queued acquire requests per scope. Unset means unbounded.
    pub max_pending_acquires: Option<usize>,

    /// How long a queued request may wait for a connection. Unset means forever.
    pub acquire_timeout_ms: Option<u64>,

    /// Maximum connections being established concurrently per scope.
    pub max_pending_connections: usize,

    /// Maximum established HTTP/1 connections per scope. Unset means unbounded.
    pub max_concurrent_http1_connections: Option<usize>,

    /// Maximum established HTTP/2 (or HTTP/3) connections per scope.
    pub max_concurrent_http2_connections: usize,

    /// Concurrent exchanges allowed on one HTTP/2 (or HTTP/3) connection.
    ///
    /// There is no usable default. Validation rejects configurations that
    /// leave this at zero.
    pub max_concurrent_requests_per_http2_connection: usize,

    /// Time allowed for one exchange to produce a response. Unset disables it.
    pub read_timeout_ms: Option<u64>,

    /// Idle connections are retired after this long. Unset disables it.
    pub connection_pool_idle_timeout_ms: Option<u64>,

    /// Connections are retired this long after creation, letting in-flight
    /// exchanges finish. Unset disables it.
    pub connect_ttl_ms: Option<u64>,

    /// What a read timeout does to the connection carrying the exchange.
    pub read_timeout_policy: ReadTimeoutPolicy,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_pending_acquires: None,
            acquire_timeout_ms: None,
            max_pending_connections: default_max_pending_connections(),
            max_concurrent_http1_connections: None,
            max_concurrent_http2_connections: default_max_http2_connections(),
            max_concurrent_requests_per_http2_connection: 0,
            read_timeout_ms: None,
            connection_pool_idle_timeout_ms: None,
            connect_ttl_ms: None,
            read_timeout_policy: ReadTimeoutPolicy::default(),
        }
    }
}

fn default_max_pending_connections() -> usize {
    4
}

fn default_max_http2_connections() -> usize {
    1
}

impl PoolLimits {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.connection_pool_idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_ttl(&self) -> Option<Duration> {
        self.connect_ttl_ms.map(Duration::from_millis)
    }

    /// Apply per-service overrides on top of these limits.
    pub(crate) fn overlay(&self, o: &PoolOverrides) -> PoolLimits {
        PoolLimits {
            max_pending_acquires: o.max_pending_acquires.or(self.max_pending_acquires),
            acquire_timeout_ms: o.acquire_timeout_ms.or(self.acquire_timeout_ms),
            max_pending_connections: o
                .max_pending_connections
                .unwrap_or(self.max_pending_connections),
            max_concurrent_http1_connections: o
                .max_concurrent_http1_connections
                .or(self.max_concurrent_http1_connections),
            max_concurrent_http2_connections: o
                .max_concurrent_http2_connections
                .unwrap_or(self.max_concurrent_http2_connections),
            max_concurrent_requests_per_http2_connection: o
                .max_concurrent_requests_per_http2_connection
                .unwrap_or(self.max_concurrent_requests_per_http2_connection),
            read_timeout_ms: o.read_timeout_ms.or(self.read_timeout_ms),
            connection_pool_idle_timeout_ms: o
                .connection_pool_idle_timeout_ms
                .or(self.connection_pool_idle_timeout_ms),
            connect_ttl_ms: o.connect_ttl_ms.or(self.connect_ttl_ms),
            read_timeout_policy: o.read_timeout_policy.unwrap_or(self.read_timeout_policy),
        }
    }
}

/// Per-service pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Logical service identifier this override applies to.
    pub name: String,

    #[serde(flatten)]
    pub overrides: PoolOverrides,
}

/// Optional overrides for every field of [`PoolLimits`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolOverrides {
    pub max_pending_acquires: Option<usize>,
    pub acquire_timeout_ms: Option<u64>,
    pub max_pending_connections: Option<usize>,
    pub max_concurrent_http1_connections: Option<usize>,
    pub max_concurrent_http2_connections: Option<usize>,
    pub max_concurrent_requests_per_http2_connection: Option<usize>,
    pub read_timeout_ms: Option<u64>,
    pub connection_pool_idle_timeout_ms: Option<u64>,
    pub connect_ttl_ms: Option<u64>,
    pub read_timeout_policy: Option<ReadTimeoutPolicy>,
}

/// Blast radius of a read timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadTimeoutPolicy {
    /// Fail only the timed-out exchange; the connection stays in the pool.
    #[default]
    FailRequest,

    /// Fail the exchange and retire the whole connection.
    DrainConnection,
}
