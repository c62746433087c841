//! Pending-request queue.
//!
//! # Responsibilities
//! - Hold requests waiting for connection capacity, strictly FIFO
//! - Track per-request deadlines from the configured acquire timeout
//! - Remove expired or cancelled entries exactly once

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::DispatchError;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A request waiting for a slot to dispatch on.
#[derive(Debug)]
pub(crate) struct PendingRequest<Req, Resp> {
    pub(crate) id: u64,
    pub(crate) request: Req,
    pub(crate) reply: oneshot::Sender<Result<Resp, DispatchError>>,
    pub(crate) enqueued_at: Instant,
    pub(crate) deadline: Option<Instant>,
}

impl<Req, Resp> PendingRequest<Req, Resp> {
    /// Complete the request with a failure. The caller may have gone away,
    /// in which case the result is dropped.
    pub(crate) fn fail(self, error: DispatchError) {
        let _ = self.reply.send(Err(error));
    }
}

/// FIFO queue of pending requests for one scope.
#[derive(Debug)]
pub(crate) struct PendingQueue<Req, Resp> {
    entries: VecDeque<PendingRequest<Req, Resp>>,
}

impl<Req, Resp> PendingQueue<Req, Resp> {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push_back(&mut self, request: PendingRequest<Req, Resp>) {
        self.entries.push_back(request);
    }

    pub(crate) fn pop_front(&mut self) -> Option<PendingRequest<Req, Resp>> {
        self.entries.pop_front()
    }

    /// Remove a specific request, wherever it sits in the queue.
    pub(crate) fn remove(&mut self, id: u64) -> Option<PendingRequest<Req, Resp>> {
        let idx = self.entries.iter().position(|r| r.id == id)?;
        self.entries.remove(idx)
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|r| r.id)
    }

    /// Extract every request whose deadline has passed, preserving the
    /// relative order of the remainder.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<PendingRequest<Req, Resp>> {
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            match entry.deadline {
                Some(deadline) if deadline <= now => expired.push(entry),
                _ => kept.push_back(entry),
            }
        }
        self.entries = kept;
        expired
    }

    /// Earliest deadline among queued requests, for driver wakeup planning.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().filter_map(|r| r.deadline).min()
    }

    pub(crate) fn drain_all(&mut self) -> Vec<PendingRequest<Req, Resp>> {
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(deadline: Option<Instant>) -> (PendingRequest<u32, u32>, u64) {
        let (tx, _rx) = oneshot::channel();
        let id = next_request_id();
        (
            PendingRequest {
                id,
                request: 0,
                reply: tx,
                enqueued_at: Instant::now(),
                deadline,
            },
            id,
        )
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let mut queue: PendingQueue<u32, u32> = PendingQueue::new();
        let (a, a_id) = request(None);
        let (b, b_id) = request(None);
        queue.push_back(a);
        queue.push_back(b);

        assert_eq!(queue.pop_front().unwrap().id, a_id);
        assert_eq!(queue.pop_front().unwrap().id, b_id);
    }

    #[tokio::test]
    async fn expiry_removes_only_due_entries() {
        let now = Instant::now();
        let mut queue: PendingQueue<u32, u32> = PendingQueue::new();
        let (due, due_id) = request(Some(now - Duration::from_millis(1)));
        let (later, later_id) = request(Some(now + Duration::from_secs(5)));
        let (forever, _) = request(None);
        queue.push_back(due);
        queue.push_back(later);
        queue.push_back(forever);

        let expired = queue.take_expired(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, due_id);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next_deadline(), Some(now + Duration::from_secs(5)));
        assert_eq!(queue.pop_front().unwrap().id, later_id);
    }

    #[tokio::test]
    async fn remove_targets_one_entry() {
        let mut queue: PendingQueue<u32, u32> = PendingQueue::new();
        let (a, _a_id) = request(None);
        let (b, b_id) = request(None);
        queue.push_back(a);
        queue.push_back(b);

        assert!(queue.remove(b_id).is_some());
        assert!(queue.remove(b_id).is_none());
        assert_eq!(queue.len(), 1);
    }
}
