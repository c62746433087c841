//! Admission control.
//!
//! # Responsibilities
//! - Decide, per incoming request: dispatch, open a connection, queue, or reject
//! - Enforce the pending-connection and per-protocol concurrency caps
//! - Load-balance exchanges across usable slots
//!
//! # Design Decisions
//! - Pure functions over a snapshot of pool state; callers hold the pool lock,
//!   which makes check-and-reserve atomic with respect to concurrent submits
//! - Never opens more connections than there are requests waiting for them

use std::collections::HashMap;

use crate::config::PoolLimits;
use crate::pool::slot::{Slot, SlotId, SlotState};
use crate::transport::ProtocolFamily;

/// Protocol family a pool has committed to.
///
/// A pool starts undetermined; the first established connection settles the
/// family, and it resets only when the slot set empties again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VersionState {
    Undetermined,
    Settled(ProtocolFamily),
}

/// Outcome of evaluating one incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// A usable slot exists; dispatch through the queue immediately.
    Dispatch(SlotId),
    /// Reserve a new connection and queue the request until it is ready.
    OpenNew,
    /// No capacity now; wait in the queue.
    Enqueue,
    /// Queue is full; fail with a capacity error.
    Reject,
}

/// Full evaluation for a request entering the pool.
pub(crate) fn decide<C>(
    slots: &HashMap<SlotId, Slot<C>>,
    family: VersionState,
    queue_len: usize,
    limits: &PoolLimits,
) -> Admission {
    if let Some(slot) = select_slot(slots, limits) {
        return Admission::Dispatch(slot);
    }
    // The triggering request counts toward demand.
    if may_open_connection(slots, family, queue_len + 1, limits) {
        return Admission::OpenNew;
    }
    match limits.max_pending_acquires {
        Some(max) if queue_len >= max => Admission::Reject,
        _ => Admission::Enqueue,
    }
}

/// Pick the usable slot with the fewest in-flight exchanges.
/// Slot id breaks ties for stability.
pub(crate) fn select_slot<C>(
    slots: &HashMap<SlotId, Slot<C>>,
    limits: &PoolLimits,
) -> Option<SlotId> {
    let streams = limits.max_concurrent_requests_per_http2_connection;
    slots
        .values()
        .filter(|s| s.capacity(streams) > 0)
        .min_by_key(|s| (s.in_flight(), s.id))
        .map(|s| s.id)
}

/// Whether a new connection may be opened for `waiting` unserved requests.
///
/// While the pool's family is undetermined both protocol caps apply, which
/// keeps initial fan-out at one connection under default limits.
pub(crate) fn may_open_connection<C>(
    slots: &HashMap<SlotId, Slot<C>>,
    family: VersionState,
    waiting: usize,
    limits: &PoolLimits,
) -> bool {
    let pending = slots
        .values()
        .filter(|s| s.state() == SlotState::Pending)
        .count();

    if pending >= limits.max_pending_connections {
        return false;
    }
    // Never provision beyond demand.
    if pending >= waiting {
        return false;
    }

    let established = |f: ProtocolFamily| {
        slots
            .values()
            .filter(|s| s.state() != SlotState::Pending && s.state() != SlotState::Closed)
            .filter(|s| s.protocol().map(|p| p.family()) == Some(f))
            .count()
    };

    let under_h1_cap = |count: usize| match limits.max_concurrent_http1_connections {
        Some(cap) => count < cap,
        None => true,
    };

    match family {
        VersionState::Settled(ProtocolFamily::H1) => {
            under_h1_cap(pending + established(ProtocolFamily::H1))
        }
        VersionState::Settled(ProtocolFamily::H2) => {
            pending + established(ProtocolFamily::H2) < limits.max_concurrent_http2_connections
        }
        VersionState::Undetermined => {
            let total =
                pending + established(ProtocolFamily::H1) + established(ProtocolFamily::H2);
            under_h1_cap(total) && total < limits.max_concurrent_http2_connections
        }
    }
}
