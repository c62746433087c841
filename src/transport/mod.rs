//! Transport collaborator seam.
//!
//! # Responsibilities
//! - Define the `Transport` / `Connection` traits the pool dispatches against
//! - Model destination authorities (host:port) and negotiated protocol versions
//! - Keep the protocol codec fully outside this crate
//!
//! # Design Decisions
//! - Connect and dispatch return boxed futures so transports stay object-simple
//! - Request/response payloads are opaque associated types
//! - HTTP/3 is pooled like HTTP/2 (multiplexed family, same caps)

use std::fmt;
use std::str::FromStr;

use futures_util::future::BoxFuture;
use thiserror::Error;
use url::Url;

/// Negotiated protocol version of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpProtocol {
    Http1,
    Http2,
    Http3,
}

impl HttpProtocol {
    /// Whether the protocol carries multiple concurrent exchanges per connection.
    pub fn is_multiplexed(self) -> bool {
        !matches!(self, HttpProtocol::Http1)
    }

    /// The pooling family this version belongs to.
    pub fn family(self) -> ProtocolFamily {
        match self {
            HttpProtocol::Http1 => ProtocolFamily::H1,
            HttpProtocol::Http2 | HttpProtocol::Http3 => ProtocolFamily::H2,
        }
    }
}

impl fmt::Display for HttpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpProtocol::Http1 => write!(f, "HTTP/1.1"),
            HttpProtocol::Http2 => write!(f, "HTTP/2"),
            HttpProtocol::Http3 => write!(f, "HTTP/3"),
        }
    }
}

/// Protocol family used for connection accounting.
///
/// HTTP/1 connections carry one exchange at a time; HTTP/2 and HTTP/3 share
/// the multiplexed family and its concurrency caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolFamily {
    H1,
    H2,
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolFamily::H1 => write!(f, "http1"),
            ProtocolFamily::H2 => write!(f, "http2"),
        }
    }
}

/// A connection destination: host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Authority {
    host: String,
    port: u16,
}

impl Authority {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The string could not be parsed as a host:port authority.
#[derive(Debug, Clone, Error)]
pub enum InvalidAuthority {
    #[error("authority is empty")]
    Empty,

    #[error("`{0}` is not a host:port pair")]
    NotHostPort(String),

    #[error("invalid authority: {0}")]
    Parse(#[from] url::ParseError),
}

impl FromStr for Authority {
    type Err = InvalidAuthority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(InvalidAuthority::Empty);
        }
        if s.contains('/') || s.contains('?') || s.contains('#') {
            return Err(InvalidAuthority::NotHostPort(s.to_string()));
        }
        // Reuse the url parser rather than hand-rolling host syntax.
        let url = Url::parse(&format!("http://{}", s))?;
        let host = url
            .host_str()
            .ok_or_else(|| InvalidAuthority::NotHostPort(s.to_string()))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        Ok(Self { host, port })
    }
}

/// Failures reported by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying socket failure.
    #[error("i/o failure")]
    Io(#[from] std::io::Error),

    /// The peer violated the protocol (malformed frame, forced reset).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The connection was closed before the exchange completed.
    #[error("connection closed by peer")]
    Closed,
}

/// One established connection supplied by a [`Transport`].
///
/// Implementations own the protocol codec. `dispatch` may be called
/// concurrently on multiplexed connections; the pool enforces the configured
/// per-connection exchange limit before calling it.
pub trait Connection: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// The protocol version negotiated during the handshake.
    fn protocol(&self) -> HttpProtocol;

    /// Run one request/response exchange on this connection.
    fn dispatch(
        &self,
        request: Self::Request,
    ) -> BoxFuture<'static, Result<Self::Response, TransportError>>;

    /// Close the connection. Must be safe to call more than once.
    fn close(&self) -> BoxFuture<'static, ()>;
}

/// Connection factory for a destination authority.
pub trait Transport: Send + Sync + 'static {
    type Conn: Connection;

    /// Perform the transport handshake against `authority`.
    fn connect(
        &self,
        authority: &Authority,
    ) -> BoxFuture<'static, Result<Self::Conn, TransportError>>;
}

/// Request payload type of a transport.
pub type RequestOf<T> = <<T as Transport>::Conn as Connection>::Request;

/// Response payload type of a transport.
pub type ResponseOf<T> = <<T as Transport>::Conn as Connection>::Response;
