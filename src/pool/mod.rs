//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! submit(service, authority, request)
//!     → registry.rs (resolve scope, find or create pool)
//!     → authority.rs (per-scope state, one driver task)
//!         → admission.rs (dispatch / open / enqueue / reject)
//!         → queue.rs (FIFO wait with deadlines)
//!         → slot.rs (per-connection state machine)
//! ```
//!
//! # Design Decisions
//! - One pool per (service, authority) scope; scopes never contend
//! - Admission is evaluated under the pool lock, so capacity reservations
//!   cannot race
//! - Protocol family is settled by the first established connection and
//!   resets when the pool empties

pub(crate) mod admission;
pub(crate) mod authority;
pub(crate) mod queue;
pub mod registry;
pub mod scope;
pub mod slot;

pub use authority::PoolStats;
pub use registry::PoolRegistry;
pub use scope::PoolingScope;
pub use slot::{SlotId, SlotState};
