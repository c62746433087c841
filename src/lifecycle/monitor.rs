//! Timer-driven connection retirement.
//!
//! # Responsibilities
//! - Detect idle-timeout and connect-TTL expiry
//! - Surface retirement work as explicit actions for the pool to apply
//!
//! # Design Decisions
//! - Pure functions over the slot set, exercised directly in unit tests
//! - TTL counts from creation and lets in-flight exchanges finish;
//!   idle timeout only ever retires connections with nothing in flight

use std::collections::HashMap;

use tokio::time::Instant;

use crate::config::PoolLimits;
use crate::pool::slot::{Slot, SlotId, SlotState};

/// Retirement decision for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotAction {
    /// Stop dispatching to the slot; it closes once empty.
    Drain(SlotId),
    /// The slot has fully drained and can leave the pool.
    Close(SlotId),
}

/// Compute the retirement actions due at `now`.
pub(crate) fn expirations<C>(
    slots: &HashMap<SlotId, Slot<C>>,
    limits: &PoolLimits,
    now: Instant,
) -> Vec<SlotAction> {
    let mut actions = Vec::new();
    for slot in slots.values() {
        match slot.state() {
            SlotState::Idle | SlotState::Busy => {
                let ttl_expired = limits
                    .connect_ttl()
                    .is_some_and(|ttl| now >= slot.created_at() + ttl);
                let idled_out = slot.state() == SlotState::Idle
                    && limits
                        .idle_timeout()
                        .is_some_and(|idle| now >= slot.last_activity() + idle);
                if ttl_expired || idled_out {
                    actions.push(SlotAction::Drain(slot.id));
                }
            }
            SlotState::Draining if slot.in_flight() == 0 => {
                actions.push(SlotAction::Close(slot.id));
            }
            _ => {}
        }
    }
    actions
}

/// Earliest instant at which some slot will need retirement.
pub(crate) fn next_expiry<C>(
    slots: &HashMap<SlotId, Slot<C>>,
    limits: &PoolLimits,
) -> Option<Instant> {
    let mut earliest: Option<Instant> = None;
    let mut consider = |t: Instant| {
        earliest = Some(match earliest {
            Some(e) if e <= t => e,
            _ => t,
        });
    };
    for slot in slots.values() {
        match slot.state() {
            SlotState::Idle | SlotState::Busy => {
                if let Some(ttl) = limits.connect_ttl() {
                    consider(slot.created_at() + ttl);
                }
                if slot.state() == SlotState::Idle {
                    if let Some(idle) = limits.idle_timeout() {
                        consider(slot.last_activity() + idle);
                    }
                }
            }
            _ => {}
        }
    }
    earliest
}
