//! Dispatch error definitions.

use std::time::Duration;

use thiserror::Error;

use crate::transport::{Authority, TransportError};

/// Errors surfaced through a request's completion handle.
///
/// Every failure is recovered at the pool boundary and delivered here; a
/// failing request never takes the pool down with it.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The pending-request queue for the target authority is full.
    ///
    /// Not retried internally. Retry policy, if any, belongs to the caller.
    #[error("pending request queue for {authority} is full ({limit} waiting)")]
    CapacityExceeded {
        authority: Authority,
        limit: usize,
    },

    /// The request waited in the queue past the configured acquire timeout.
    ///
    /// Distinct from [`DispatchError::CapacityExceeded`] so callers can tell
    /// transient overload apart from deadline misconfiguration.
    #[error("no connection became available within {timeout:?}")]
    AcquireTimeout { timeout: Duration },

    /// The transport failed to establish a connection.
    ///
    /// Delivered to the one request that triggered the connection attempt.
    #[error("failed to establish connection to {authority}")]
    ConnectionFailed {
        authority: Authority,
        #[source]
        source: TransportError,
    },

    /// The exchange failed after dispatch (reset, malformed frame, I/O).
    #[error("request failed mid-exchange")]
    Protocol(#[source] TransportError),

    /// No response arrived within the configured read timeout.
    #[error("no response received within {timeout:?}")]
    ReadTimeout { timeout: Duration },

    /// The request was cancelled because the owning client is shutting down.
    #[error("client is shutting down")]
    Shutdown,
}

impl DispatchError {
    /// True for errors caused by local capacity limits rather than the peer.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            DispatchError::CapacityExceeded { .. } | DispatchError::AcquireTimeout { .. }
        )
    }
}
