//! Event-loop runtime seam.
//!
//! # Data Flow
//! ```text
//! runtime.poll()            (once per tick, drained into a Vec<SocketEvent>)
//!     → Accepted            → manager admission control
//!     → Received/Sent/Timer/Poll → readiness translation for the owning stream
//!     → Closed              → pending cleanup or orphan handling
//! ```
//!
//! # Design Decisions
//! - The manager never owns a loop; it is driven one `turn()` per tick
//! - Sockets are identified by plain ids; the manager keeps its own
//!   socket → stream association map
//! - Events are level-triggered: every open connection yields a `Poll`
//!   event each tick, and the manager layers edge-triggered notifications on
//!   top

pub mod sim;
pub mod tcp;

use std::io;
use std::time::Duration;

pub use sim::SimRuntime;
pub use tcp::TcpRuntime;

/// Opaque identifier of a runtime socket (listener or connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sock-{}", self.0)
    }
}

/// What happened to a socket during the last tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketEventKind {
    /// A new connection was accepted on `listener`.
    Accepted { listener: SocketId },
    /// New inbound bytes were buffered.
    Received,
    /// The outbound buffer drained completely.
    Sent,
    /// A timer armed with [`Runtime::schedule`] fired.
    Timer,
    /// Periodic level-triggered tick for an open connection.
    Poll,
    /// The connection is gone. No further events follow.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketEvent {
    pub socket: SocketId,
    pub kind: SocketEventKind,
}

impl SocketEvent {
    pub fn new(socket: SocketId, kind: SocketEventKind) -> Self {
        Self { socket, kind }
    }
}

/// A listening socket as returned by [`Runtime::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundListener {
    pub socket: SocketId,
    /// Actual port, which differs from the requested one when port 0 was asked for.
    pub port: u16,
}

/// Primitives consumed from the single-threaded event loop.
///
/// Every method is non-blocking. Methods taking a connection id must tolerate
/// ids that are no longer open and treat them as empty/closed.
pub trait Runtime {
    /// Monotonic time since the runtime's epoch.
    fn now(&self) -> Duration;

    /// Bind and listen on `port`.
    fn bind(&mut self, port: u16) -> io::Result<BoundListener>;

    fn close_listener(&mut self, listener: SocketId);

    /// Append every event produced since the previous call.
    fn poll(&mut self, events: &mut Vec<SocketEvent>);

    /// Bytes received and not yet consumed.
    fn inbound_len(&self, socket: SocketId) -> usize;

    /// Bytes enqueued and not yet handed to the network.
    fn outbound_len(&self, socket: SocketId) -> usize;

    /// Move up to `buf.len()` buffered inbound bytes into `buf`.
    fn recv(&mut self, socket: SocketId, buf: &mut [u8]) -> usize;

    /// Enqueue bytes for transmission.
    fn send(&mut self, socket: SocketId, bytes: &[u8]);

    /// Abortive close. Unsent data is discarded.
    fn abort(&mut self, socket: SocketId);

    /// Arm a one-shot timer producing a [`SocketEventKind::Timer`] event.
    fn schedule(&mut self, socket: SocketId, delay: Duration);
}
