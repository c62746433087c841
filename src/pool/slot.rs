//! Connection slot state machine.
//!
//! # Responsibilities
//! - Track one physical connection: state, protocol, timestamps, in-flight count
//! - Generate unique slot IDs for tracing
//! - Enforce the draining contract (no new work, existing work finishes)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::Instant;

use crate::transport::HttpProtocol;

/// Global atomic counter for slot IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static SLOT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl SlotId {
    pub fn next() -> Self {
        Self(SLOT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Handshake in progress; the slot reserves a capacity unit.
    Pending,
    /// Established with no in-flight exchanges.
    Idle,
    /// Established with at least one in-flight exchange.
    Busy,
    /// No new exchanges accepted; existing ones finish, then the slot closes.
    Draining,
    /// Fully retired and about to be removed from the pool.
    Closed,
}

/// One managed connection within a pool.
///
/// Owned exclusively by its pool; all mutation happens under the pool lock.
#[derive(Debug)]
pub(crate) struct Slot<C> {
    pub(crate) id: SlotId,
    state: SlotState,
    conn: Option<Arc<C>>,
    protocol: Option<HttpProtocol>,
    created_at: Instant,
    last_activity: Instant,
    in_flight: usize,
    /// Queued request that triggered opening this connection.
    pub(crate) opened_for: Option<u64>,
}

impl<C> Slot<C> {
    /// Register a slot for a connection that is about to be established.
    pub(crate) fn pending(opened_for: u64) -> Self {
        let now = Instant::now();
        Self {
            id: SlotId::next(),
            state: SlotState::Pending,
            conn: None,
            protocol: None,
            created_at: now,
            last_activity: now,
            in_flight: 0,
            opened_for: Some(opened_for),
        }
    }

    pub(crate) fn state(&self) -> SlotState {
        self.state
    }

    pub(crate) fn protocol(&self) -> Option<HttpProtocol> {
        self.protocol
    }

    pub(crate) fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Handshake finished; the slot becomes usable.
    pub(crate) fn established(&mut self, conn: Arc<C>, protocol: HttpProtocol) {
        debug_assert_eq!(self.state, SlotState::Pending);
        self.conn = Some(conn);
        self.protocol = Some(protocol);
        self.state = SlotState::Idle;
        self.last_activity = Instant::now();
    }

    /// Remaining exchange capacity given the per-connection HTTP/2 cap.
    pub(crate) fn capacity(&self, streams_per_connection: usize) -> usize {
        let cap = match self.protocol {
            Some(p) if p.is_multiplexed() => streams_per_connection,
            Some(_) => 1,
            None => 0,
        };
        match self.state {
            SlotState::Idle | SlotState::Busy => cap.saturating_sub(self.in_flight),
            _ => 0,
        }
    }

    /// Reserve one exchange on this slot and hand out its connection.
    pub(crate) fn begin_dispatch(&mut self) -> Arc<C> {
        debug_assert!(matches!(self.state, SlotState::Idle | SlotState::Busy));
        self.in_flight += 1;
        self.state = SlotState::Busy;
        self.last_activity = Instant::now();
        Arc::clone(self.conn.as_ref().expect("established slot has a connection"))
    }

    /// One exchange finished, successfully or not.
    pub(crate) fn finish_dispatch(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.last_activity = Instant::now();
        if self.state == SlotState::Busy && self.in_flight == 0 {
            self.state = SlotState::Idle;
        }
    }

    /// Stop accepting new exchanges. No-op if already draining or closed.
    pub(crate) fn drain(&mut self) {
        if matches!(self.state, SlotState::Idle | SlotState::Busy) {
            self.state = SlotState::Draining;
        }
    }

    /// Whether the slot is ready to leave the pool.
    pub(crate) fn drained(&self) -> bool {
        self.state == SlotState::Draining && self.in_flight == 0
    }

    /// Transition to Closed, yielding the connection for the actual close.
    ///
    /// Idempotent: closing an already-closed slot returns None.
    pub(crate) fn close(&mut self) -> Option<Arc<C>> {
        if self.state == SlotState::Closed {
            return None;
        }
        self.state = SlotState::Closed;
        self.conn.take()
    }
}
