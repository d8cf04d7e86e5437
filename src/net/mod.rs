//! Network admission subsystem.
//!
//! # Data Flow
//! ```text
//! Runtime Accepted event
//!     → listener.rs (admission: optimistic room + backlog ceiling)
//!     → connection.rs (pending backlog, offer tracking)
//!     → manager offers to the consumer, consumer claims a stream
//!
//! Connection States:
//!     Pending → claimed (becomes a Stream) | closed while pending | aborted
//! ```
//!
//! # Design Decisions
//! - Nothing is allocated per connection beyond a backlog entry until claim
//! - Rejected connections are aborted without a response

pub mod connection;
pub mod listener;

pub use connection::{Backlog, PendingConnection};
pub use listener::{admit, EphemeralPorts, Listener, ListenerCallback, ListenerError, ResourceExhausted};
