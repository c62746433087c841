//! Connection establishment.
//!
//! The handshake runs on its own task; the owning pool learns the outcome
//! through its event channel, never through a reentrant callback.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::pool::authority::PoolEvent;
use crate::pool::slot::SlotId;
use crate::transport::{Authority, Transport};

/// Establish a connection for a pending slot.
///
/// Exactly one event is delivered per invocation: `Established` on success,
/// `EstablishFailed` otherwise. The send is allowed to fail when the pool
/// driver has already gone away.
pub(crate) fn establish<T: Transport>(
    transport: Arc<T>,
    authority: Authority,
    slot: SlotId,
    events: mpsc::UnboundedSender<PoolEvent<T>>,
) {
    tokio::spawn(async move {
        tracing::debug!(%slot, %authority, "establishing connection");
        match transport.connect(&authority).await {
            Ok(conn) => {
                let _ = events.send(PoolEvent::Established { slot, conn });
            }
            Err(error) => {
                tracing::warn!(%slot, %authority, error = %error, "connection establishment failed");
                let _ = events.send(PoolEvent::EstablishFailed { slot, error });
            }
        }
    });
}
