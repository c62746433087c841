//! Shared in-memory mock transport for integration testing.
//!
//! Connections are programmable: the handshake can be gated or scripted to
//! fail, and exchanges complete only when the test says so.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Semaphore};

use dispatch_pool::{Authority, Connection, HttpProtocol, Transport, TransportError};

struct Exchange {
    request: u32,
    reply: oneshot::Sender<Result<u32, TransportError>>,
}

/// Observable state of one mock connection.
#[derive(Default)]
pub struct ConnState {
    exchanges: Mutex<VecDeque<Exchange>>,
    closed: AtomicBool,
}

pub struct MockConnection {
    protocol: HttpProtocol,
    state: Arc<ConnState>,
}

impl Connection for MockConnection {
    type Request = u32;
    type Response = u32;

    fn protocol(&self) -> HttpProtocol {
        self.protocol
    }

    fn dispatch(&self, request: u32) -> BoxFuture<'static, Result<u32, TransportError>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            if state.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            let (tx, rx) = oneshot::channel();
            state.exchanges.lock().push_back(Exchange { request, reply: tx });
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Closed),
            }
        })
    }

    fn close(&self) -> BoxFuture<'static, ()> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            state.closed.store(true, Ordering::SeqCst);
            for exchange in state.exchanges.lock().drain(..) {
                let _ = exchange.reply.send(Err(TransportError::Closed));
            }
        })
    }
}

struct TransportState {
    protocol: HttpProtocol,
    gate: Option<Arc<Semaphore>>,
    fail_connects: AtomicUsize,
    connects_started: AtomicUsize,
    conns: Mutex<Vec<Arc<ConnState>>>,
}

/// Programmable transport handing out [`MockConnection`]s.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<TransportState>,
}

impl MockTransport {
    pub fn new(protocol: HttpProtocol) -> Self {
        Self::build(protocol, false, 0)
    }

    /// Handshakes block until [`MockTransport::release_connect`] is called.
    pub fn gated(protocol: HttpProtocol) -> Self {
        Self::build(protocol, true, 0)
    }

    /// Handshakes are gated and the first `n` of them fail once released.
    pub fn gated_failing_first(protocol: HttpProtocol, n: usize) -> Self {
        Self::build(protocol, true, n)
    }

    fn build(protocol: HttpProtocol, gated: bool, fail_connects: usize) -> Self {
        Self {
            inner: Arc::new(TransportState {
                protocol,
                gate: gated.then(|| Arc::new(Semaphore::new(0))),
                fail_connects: AtomicUsize::new(fail_connects),
                connects_started: AtomicUsize::new(0),
                conns: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Let one gated handshake proceed.
    pub fn release_connect(&self) {
        self.inner
            .gate
            .as_ref()
            .expect("transport is not gated")
            .add_permits(1);
    }

    pub fn connects_started(&self) -> usize {
        self.inner.connects_started.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.inner
            .conns
            .lock()
            .iter()
            .filter(|c| !c.closed.load(Ordering::SeqCst))
            .count()
    }

    pub fn closed_connections(&self) -> usize {
        self.inner
            .conns
            .lock()
            .iter()
            .filter(|c| c.closed.load(Ordering::SeqCst))
            .count()
    }

    /// Exchanges currently waiting for a scripted completion.
    pub fn in_flight(&self) -> usize {
        self.inner
            .conns
            .lock()
            .iter()
            .map(|c| c.exchanges.lock().len())
            .sum()
    }

    /// Complete the oldest live exchange with an echo of its request.
    /// Returns the request that was answered.
    pub fn complete_one(&self) -> Option<u32> {
        self.finish_one(|request| Ok(request))
    }

    /// Fail the oldest live exchange with a protocol error.
    pub fn fail_one(&self) -> Option<u32> {
        self.finish_one(|_| Err(TransportError::Protocol("stream reset".into())))
    }

    fn finish_one(
        &self,
        outcome: impl Fn(u32) -> Result<u32, TransportError>,
    ) -> Option<u32> {
        for conn in self.inner.conns.lock().iter() {
            let mut exchanges = conn.exchanges.lock();
            while let Some(exchange) = exchanges.pop_front() {
                let request = exchange.request;
                // A dead reply means the dispatcher gave up on this
                // exchange already (read timeout); skip it.
                if exchange.reply.send(outcome(request)).is_ok() {
                    return Some(request);
                }
            }
        }
        None
    }
}

impl Transport for MockTransport {
    type Conn = MockConnection;

    fn connect(
        &self,
        _authority: &Authority,
    ) -> BoxFuture<'static, Result<MockConnection, TransportError>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            inner.connects_started.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &inner.gate {
                let permit = gate.acquire().await.expect("gate never closes");
                permit.forget();
            }
            let mut remaining = inner.fail_connects.load(Ordering::SeqCst);
            while remaining > 0 {
                match inner.fail_connects.compare_exchange(
                    remaining,
                    remaining - 1,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => {
                        return Err(TransportError::Io(io::Error::new(
                            io::ErrorKind::ConnectionRefused,
                            "connection refused",
                        )))
                    }
                    Err(actual) => remaining = actual,
                }
            }
            let state = Arc::new(ConnState::default());
            inner.conns.lock().push(Arc::clone(&state));
            Ok(MockConnection {
                protocol: inner.protocol,
                state,
            })
        })
    }
}

/// Poll `cond` until it holds or a couple of seconds pass.
pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
