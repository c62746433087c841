//! Bounded HTTP connection pooling and request dispatch.
//!
//! Connection pools are partitioned by (service, authority) scope. Each pool
//! enforces protocol-aware concurrency limits, queues requests when capacity
//! runs out, and retires connections on idle timeout, TTL, or error.
//!
//! # Architecture Overview
//!
//! ```text
//!  submit(service, authority, request)
//!      │
//!      ▼
//!  ┌──────────────┐     ┌───────────────────────────────────────────┐
//!  │   registry   │────▶│           per-authority pool              │
//!  │ scope → pool │     │  ┌───────────┐    ┌─────────────────────┐ │
//!  └──────────────┘     │  │ admission │───▶│ slots (one state    │ │
//!                       │  │ control   │    │ machine per conn)   │ │
//!                       │  └─────┬─────┘    └──────────┬──────────┘ │
//!                       │        │ enqueue             │ dispatch   │
//!                       │  ┌─────▼───────┐  ┌──────────▼──────────┐ │
//!                       │  │ FIFO queue  │  │ lifecycle           │ │
//!                       │  │ + deadlines │  │ connect / monitor   │ │
//!                       │  └─────────────┘  └─────────────────────┘ │
//!                       └───────────────────────────────────────────┘
//!                                           │
//!                                           ▼
//!                                   Transport trait
//!                             (handshake + protocol codec,
//!                              supplied by the embedder)
//! ```
//!
//! The protocol codec itself lives behind the [`Transport`] and
//! [`Connection`] traits; this crate only decides *which* connection an
//! exchange runs on and *when*.

// Core subsystems
pub mod client;
pub mod config;
pub mod error;
pub mod pool;
pub mod transport;

// Cross-cutting concerns
pub(crate) mod lifecycle;
pub mod observability;

pub use client::PooledClient;
pub use config::{load_config, ClientConfig, ConfigError, PoolLimits, ReadTimeoutPolicy};
pub use error::DispatchError;
pub use pool::{PoolRegistry, PoolStats, PoolingScope};
pub use transport::{
    Authority, Connection, HttpProtocol, ProtocolFamily, RequestOf, ResponseOf, Transport,
    TransportError,
};
