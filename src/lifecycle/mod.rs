//! Connection lifecycle management.
//!
//! # Data Flow
//! ```text
//! admission reserves a pending slot
//!     → connect.rs (handshake task, reports Established/EstablishFailed)
//!     → pool settles protocol family, dispatches queued requests
//!
//! driver timer tick
//!     → monitor.rs (idle timeout / TTL / drained-slot detection)
//!     → pool drains and closes affected slots
//! ```

pub(crate) mod connect;
pub(crate) mod monitor;
