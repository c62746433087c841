//! Per-authority connection pool.
//!
//! # Responsibilities
//! - Own the slot set and pending-request queue for one pooling scope
//! - Apply admission decisions and dispatch queued requests FIFO
//! - Consume lifecycle events and timer expiries on a single driver task
//!
//! # Design Decisions
//! - All state mutation happens under one mutex per scope; admission
//!   check-and-reserve is atomic with respect to concurrent submits
//! - Lifecycle outcomes arrive as messages on an unbounded channel rather
//!   than callbacks, so the driver is the only event consumer
//! - The driver sleeps until the earliest deadline it knows about instead
//!   of polling on a fixed interval

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{PoolLimits, ReadTimeoutPolicy};
use crate::error::DispatchError;
use crate::lifecycle::{connect, monitor};
use crate::lifecycle::monitor::SlotAction;
use crate::observability::metrics::{self, outcome};
use crate::pool::admission::{self, Admission, VersionState};
use crate::pool::queue::{next_request_id, PendingQueue, PendingRequest};
use crate::pool::scope::PoolingScope;
use crate::pool::slot::{Slot, SlotId, SlotState};
use crate::transport::{Connection, RequestOf, ResponseOf, Transport, TransportError};

/// Lifecycle event consumed by a pool's driver task.
pub(crate) enum PoolEvent<T: Transport> {
    /// Handshake finished for a pending slot.
    Established { slot: SlotId, conn: T::Conn },
    /// Handshake failed; the slot is abandoned.
    EstablishFailed {
        slot: SlotId,
        error: TransportError,
    },
    /// One exchange finished on an established slot.
    RequestFinished {
        slot: SlotId,
        disposition: Disposition,
    },
    /// Begin shutdown: cancel queued requests and drain every slot.
    Shutdown { grace: Option<Duration> },
    /// Nudge the driver to recompute its wakeup deadline.
    Wake,
}

/// How an exchange ended, as far as the pool cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Completed,
    TimedOut,
    Failed,
}

/// Point-in-time counters for one pool, for introspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Slots still in the handshake phase.
    pub pending_connections: usize,
    /// Established slots, including draining ones.
    pub open_connections: usize,
    /// Exchanges currently running.
    pub in_flight: usize,
    /// Requests waiting in the queue.
    pub queued: usize,
}

struct PoolInner<T: Transport> {
    slots: HashMap<SlotId, Slot<T::Conn>>,
    queue: PendingQueue<RequestOf<T>, ResponseOf<T>>,
    family: VersionState,
    closing: bool,
    close_deadline: Option<Instant>,
}

/// Connection pool for one (service, authority) scope.
pub(crate) struct PerAuthorityPool<T: Transport> {
    scope: PoolingScope,
    limits: PoolLimits,
    transport: Arc<T>,
    inner: Mutex<PoolInner<T>>,
    events: mpsc::UnboundedSender<PoolEvent<T>>,
}

impl<T: Transport> PerAuthorityPool<T> {
    /// Create the pool and its driver task.
    pub(crate) fn spawn(
        scope: PoolingScope,
        limits: PoolLimits,
        transport: Arc<T>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (events, rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            scope,
            limits,
            transport,
            inner: Mutex::new(PoolInner {
                slots: HashMap::new(),
                queue: PendingQueue::new(),
                family: VersionState::Undetermined,
                closing: false,
                close_deadline: None,
            }),
            events,
        });
        let driver = tokio::spawn(drive(Arc::clone(&pool), rx));
        (pool, driver)
    }

    /// Submit one request. Never blocks; the admission decision happens
    /// under the pool lock and the returned channel completes on dispatch,
    /// rejection, timeout, or shutdown.
    pub(crate) fn submit(
        &self,
        request: RequestOf<T>,
    ) -> oneshot::Receiver<Result<ResponseOf<T>, DispatchError>> {
        let (reply, receiver) = oneshot::channel();
        let mut inner = self.inner.lock();

        if inner.closing {
            let _ = reply.send(Err(DispatchError::Shutdown));
            metrics::record_request(self.scope.service(), outcome::SHUTDOWN);
            return receiver;
        }

        let decision =
            admission::decide(&inner.slots, inner.family, inner.queue.len(), &self.limits);

        if decision == Admission::Reject {
            let limit = self.limits.max_pending_acquires.unwrap_or(usize::MAX);
            tracing::debug!(scope = %self.scope, limit, "request rejected, queue full");
            metrics::record_request(self.scope.service(), outcome::REJECTED);
            let _ = reply.send(Err(DispatchError::CapacityExceeded {
                authority: self.scope.authority().clone(),
                limit,
            }));
            return receiver;
        }

        let id = next_request_id();
        let now = Instant::now();
        inner.queue.push_back(PendingRequest {
            id,
            request,
            reply,
            enqueued_at: now,
            deadline: self.limits.acquire_timeout().map(|t| now + t),
        });

        if decision == Admission::OpenNew {
            self.open_connection(&mut inner, id);
        }
        self.pump(&mut inner);
        metrics::queue_depth(self.scope.service(), inner.queue.len());
        drop(inner);

        // The driver may be sleeping on a stale deadline; make it pick up
        // the new request's deadline.
        let _ = self.events.send(PoolEvent::Wake);
        receiver
    }

    /// Ask the driver to shut the pool down.
    pub(crate) fn shutdown(&self, grace: Option<Duration>) {
        let _ = self.events.send(PoolEvent::Shutdown { grace });
    }

    /// Register a pending slot and start the handshake for it.
    fn open_connection(&self, inner: &mut PoolInner<T>, triggered_by: u64) {
        let slot = Slot::pending(triggered_by);
        let id = slot.id;
        inner.slots.insert(id, slot);
        tracing::debug!(scope = %self.scope, %id, request = triggered_by, "opening connection");
        metrics::connection_pending(self.scope.service(), 1.0);
        connect::establish(
            Arc::clone(&self.transport),
            self.scope.authority().clone(),
            id,
            self.events.clone(),
        );
    }

    /// Pop-and-dispatch loop: move queued requests onto usable slots, then
    /// open further connections while demand and the caps allow it.
    fn pump(&self, inner: &mut PoolInner<T>) {
        loop {
            if inner.queue.is_empty() {
                break;
            }
            if let Some(slot_id) = admission::select_slot(&inner.slots, &self.limits) {
                let pending = inner
                    .queue
                    .pop_front()
                    .expect("queue checked non-empty");
                self.dispatch(inner, slot_id, pending);
                continue;
            }
            if inner.closing {
                break;
            }
            if admission::may_open_connection(
                &inner.slots,
                inner.family,
                inner.queue.len(),
                &self.limits,
            ) {
                // Attribute the connection to the first queued request that
                // does not already have one on the way.
                let covered: HashSet<u64> = inner
                    .slots
                    .values()
                    .filter(|s| s.state() == SlotState::Pending)
                    .filter_map(|s| s.opened_for)
                    .collect();
                let trigger = inner.queue.ids().find(|id| !covered.contains(id));
                match trigger {
                    Some(trigger) => {
                        self.open_connection(inner, trigger);
                        continue;
                    }
                    None => break,
                }
            }
            break;
        }
    }

    /// Hand one queued request to an established slot and run the exchange
    /// on its own task.
    fn dispatch(
        &self,
        inner: &mut PoolInner<T>,
        slot_id: SlotId,
        pending: PendingRequest<RequestOf<T>, ResponseOf<T>>,
    ) {
        let slot = inner
            .slots
            .get_mut(&slot_id)
            .expect("selected slot exists");
        let conn = slot.begin_dispatch();

        tracing::trace!(
            scope = %self.scope,
            slot = %slot_id,
            request = pending.id,
            waited = ?pending.enqueued_at.elapsed(),
            "dispatching request"
        );
        metrics::record_request(self.scope.service(), outcome::DISPATCHED);

        let events = self.events.clone();
        let read_timeout = self.limits.read_timeout();
        let reply = pending.reply;
        let request = pending.request;
        tokio::spawn(async move {
            let exchange = conn.dispatch(request);
            let (result, disposition) = match read_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, exchange).await {
                    Ok(Ok(response)) => (Ok(response), Disposition::Completed),
                    Ok(Err(error)) => {
                        (Err(DispatchError::Protocol(error)), Disposition::Failed)
                    }
                    Err(_) => (
                        Err(DispatchError::ReadTimeout { timeout }),
                        Disposition::TimedOut,
                    ),
                },
                None => match exchange.await {
                    Ok(response) => (Ok(response), Disposition::Completed),
                    Err(error) => {
                        (Err(DispatchError::Protocol(error)), Disposition::Failed)
                    }
                },
            };
            let _ = reply.send(result);
            let _ = events.send(PoolEvent::RequestFinished {
                slot: slot_id,
                disposition,
            });
        });
    }

    /// Apply one lifecycle event. Runs on the driver task only.
    fn handle_event(&self, event: PoolEvent<T>) {
        let mut inner = self.inner.lock();
        match event {
            PoolEvent::Established { slot, conn } => {
                self.on_established(&mut inner, slot, conn)
            }
            PoolEvent::EstablishFailed { slot, error } => {
                self.on_establish_failed(&mut inner, slot, error)
            }
            PoolEvent::RequestFinished { slot, disposition } => {
                self.on_request_finished(&mut inner, slot, disposition)
            }
            PoolEvent::Shutdown { grace } => self.on_shutdown(&mut inner, grace),
            PoolEvent::Wake => {}
        }
        metrics::queue_depth(self.scope.service(), inner.queue.len());
    }

    fn on_established(&self, inner: &mut PoolInner<T>, slot_id: SlotId, conn: T::Conn) {
        metrics::connection_pending(self.scope.service(), -1.0);

        if inner.closing || !inner.slots.contains_key(&slot_id) {
            // The slot was abandoned while the handshake ran.
            inner.slots.remove(&slot_id);
            self.reset_family_if_empty(inner);
            let conn = Arc::new(conn);
            tokio::spawn(async move { conn.close().await });
            return;
        }

        let protocol = conn.protocol();
        match inner.family {
            VersionState::Undetermined => {
                inner.family = VersionState::Settled(protocol.family());
            }
            VersionState::Settled(family) if family != protocol.family() => {
                tracing::warn!(
                    scope = %self.scope,
                    negotiated = %protocol,
                    pool = %family,
                    "connection negotiated a different protocol family than the pool"
                );
            }
            VersionState::Settled(_) => {}
        }

        let slot = inner.slots.get_mut(&slot_id).expect("checked above");
        slot.established(Arc::new(conn), protocol);
        tracing::debug!(scope = %self.scope, slot = %slot_id, %protocol, "connection established");
        metrics::connection_opened(self.scope.service());
        self.pump(inner);
    }

    fn on_establish_failed(
        &self,
        inner: &mut PoolInner<T>,
        slot_id: SlotId,
        error: TransportError,
    ) {
        metrics::connection_pending(self.scope.service(), -1.0);

        let trigger = inner
            .slots
            .remove(&slot_id)
            .and_then(|slot| slot.opened_for);
        self.reset_family_if_empty(inner);

        // The failure reaches exactly one request: the one the connection
        // was opened for, if it is still waiting. Everyone else stays queued
        // and gets re-evaluated below.
        if let Some(pending) = trigger.and_then(|id| inner.queue.remove(id)) {
            metrics::record_request(self.scope.service(), outcome::CONNECT_FAILED);
            pending.fail(DispatchError::ConnectionFailed {
                authority: self.scope.authority().clone(),
                source: error,
            });
        } else {
            tracing::debug!(scope = %self.scope, slot = %slot_id, error = %error,
                "establishment failed with no waiting request");
        }

        if !inner.closing {
            self.pump(inner);
        }
    }

    fn on_request_finished(
        &self,
        inner: &mut PoolInner<T>,
        slot_id: SlotId,
        disposition: Disposition,
    ) {
        let Some(slot) = inner.slots.get_mut(&slot_id) else {
            // Force-closed during shutdown while the exchange was in flight.
            return;
        };
        slot.finish_dispatch();

        match disposition {
            Disposition::Completed => {}
            Disposition::Failed => slot.drain(),
            Disposition::TimedOut => {
                if self.limits.read_timeout_policy == ReadTimeoutPolicy::DrainConnection {
                    slot.drain();
                }
            }
        }

        if slot.drained() {
            self.close_slot(inner, slot_id);
        }
        self.pump(inner);
    }

    fn on_shutdown(&self, inner: &mut PoolInner<T>, grace: Option<Duration>) {
        if inner.closing {
            return;
        }
        inner.closing = true;
        inner.close_deadline = grace.map(|g| Instant::now() + g);
        tracing::info!(scope = %self.scope, ?grace, "pool shutting down");

        for pending in inner.queue.drain_all() {
            metrics::record_request(self.scope.service(), outcome::SHUTDOWN);
            pending.fail(DispatchError::Shutdown);
        }

        // Pending handshakes are abandoned; established slots drain.
        let pending_ids: Vec<SlotId> = inner
            .slots
            .values()
            .filter(|s| s.state() == SlotState::Pending)
            .map(|s| s.id)
            .collect();
        for id in pending_ids {
            inner.slots.remove(&id);
        }
        let slot_ids: Vec<SlotId> = inner.slots.keys().copied().collect();
        for id in slot_ids {
            let drained = match inner.slots.get_mut(&id) {
                Some(slot) => {
                    slot.drain();
                    slot.drained()
                }
                None => false,
            };
            if drained {
                self.close_slot(inner, id);
            }
        }
    }

    /// Timer sweep: expire queued deadlines and retire aged slots.
    fn sweep(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if let Some(timeout) = self.limits.acquire_timeout() {
            for pending in inner.queue.take_expired(now) {
                tracing::debug!(scope = %self.scope, request = pending.id,
                    waited = ?pending.enqueued_at.elapsed(), "acquire timeout");
                metrics::record_request(self.scope.service(), outcome::ACQUIRE_TIMEOUT);
                pending.fail(DispatchError::AcquireTimeout { timeout });
            }
        }

        for action in monitor::expirations(&inner.slots, &self.limits, now) {
            match action {
                SlotAction::Drain(id) => {
                    let drained = match inner.slots.get_mut(&id) {
                        Some(slot) => {
                            tracing::debug!(scope = %self.scope, slot = %id, "retiring connection");
                            slot.drain();
                            slot.drained()
                        }
                        None => false,
                    };
                    if drained {
                        self.close_slot(&mut inner, id);
                    }
                }
                SlotAction::Close(id) => self.close_slot(&mut inner, id),
            }
        }

        if inner.closing {
            if let Some(deadline) = inner.close_deadline {
                if now >= deadline {
                    let ids: Vec<SlotId> = inner.slots.keys().copied().collect();
                    for id in ids {
                        tracing::warn!(scope = %self.scope, slot = %id, "forcing connection closed");
                        self.close_slot(&mut inner, id);
                    }
                }
            }
        }

        if !inner.closing {
            self.pump(&mut inner);
        }
        metrics::queue_depth(self.scope.service(), inner.queue.len());
    }

    /// Remove a slot and close its connection off-lock.
    fn close_slot(&self, inner: &mut PoolInner<T>, slot_id: SlotId) {
        if let Some(mut slot) = inner.slots.remove(&slot_id) {
            let was_established = slot.protocol().is_some();
            if let Some(conn) = slot.close() {
                tokio::spawn(async move { conn.close().await });
            }
            if was_established {
                metrics::connection_closed(self.scope.service());
            }
            tracing::debug!(scope = %self.scope, slot = %slot_id, "connection closed");
        }
        self.reset_family_if_empty(inner);
    }

    fn reset_family_if_empty(&self, inner: &mut PoolInner<T>) {
        if inner.slots.is_empty() {
            inner.family = VersionState::Undetermined;
        }
    }

    /// Earliest instant the driver must wake at without an event.
    fn next_wakeup(&self) -> Option<Instant> {
        let inner = self.inner.lock();
        let mut earliest = inner.queue.next_deadline();
        let mut consider = |t: Option<Instant>| {
            earliest = match (earliest, t) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        };
        consider(monitor::next_expiry(&inner.slots, &self.limits));
        if inner.closing {
            consider(inner.close_deadline);
        }
        earliest
    }

    /// Snapshot the pool's counters.
    pub(crate) fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        let mut stats = PoolStats {
            queued: inner.queue.len(),
            ..Default::default()
        };
        for slot in inner.slots.values() {
            match slot.state() {
                SlotState::Pending => stats.pending_connections += 1,
                SlotState::Closed => {}
                _ => {
                    stats.open_connections += 1;
                    stats.in_flight += slot.in_flight();
                }
            }
        }
        stats
    }

    /// The driver can exit once shutdown finished emptying the pool.
    fn finished(&self) -> bool {
        let inner = self.inner.lock();
        inner.closing && inner.slots.is_empty() && inner.queue.is_empty()
    }
}

/// Driver loop: single consumer of a pool's lifecycle events and timers.
async fn drive<T: Transport>(
    pool: Arc<PerAuthorityPool<T>>,
    mut events: mpsc::UnboundedReceiver<PoolEvent<T>>,
) {
    loop {
        if pool.finished() {
            break;
        }
        let wakeup = pool.next_wakeup();
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => pool.handle_event(event),
                // all senders dropped: the registry no longer knows this pool
                None => break,
            },
            _ = sleep_until_opt(wakeup) => pool.sweep(),
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
