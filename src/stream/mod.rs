//! Claimed streams.
//!
//! # Data Flow
//! ```text
//! manager.accept_stream()
//!     → arena.rs (slot allocated, generation-tagged handle returned)
//!     → interest.rs (consumer registers interests + callback)
//!     → per tick: buffer levels → at most one StreamEvent
//!
//! Stream States:
//!     Active (socket attached) → Orphaned (socket gone) → freed
//! ```
//!
//! # Design Decisions
//! - Records are allocated at claim time only, never for backlog entries
//! - The socket ↔ stream association lives in the manager's map, not here
//! - Callbacks are reference-counted closures; captured state replaces the
//!   opaque context pointer

pub mod arena;
pub mod error;
pub mod interest;

use std::rc::Rc;
use std::time::Duration;

pub use arena::{StreamArena, StreamHandle};
pub use error::StreamError;
pub use interest::{InterestState, Interests, StreamEvent};

use crate::manager::StreamManager;
use crate::runtime::SocketId;

/// Notification target for a stream. Called from inside `StreamManager::turn`.
pub type StreamCallback = Rc<dyn Fn(&mut StreamManager, StreamHandle, StreamEvent)>;

/// Lifecycle state of a live stream record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Claimed and attached to its socket; counted against capacity.
    Active,
    /// Socket gone; waiting for the consumer to acknowledge.
    Orphaned,
}

pub(crate) struct Stream {
    pub socket: Option<SocketId>,
    pub readiness: InterestState,
    pub callback: Option<StreamCallback>,
    pub last_activity: Duration,
    /// Turn in which the last notification fired.
    pub notified_turn: Option<u64>,
}

impl Stream {
    pub fn new(socket: SocketId, now: Duration) -> Self {
        Self {
            socket: Some(socket),
            readiness: InterestState::default(),
            callback: None,
            last_activity: now,
            notified_turn: None,
        }
    }

    pub fn state(&self) -> StreamState {
        match self.socket {
            Some(_) => StreamState::Active,
            None => StreamState::Orphaned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stream_is_active() {
        let stream = Stream::new(SocketId::new(3), Duration::from_secs(1));
        assert_eq!(stream.state(), StreamState::Active);
        assert!(stream.readiness.interests().is_empty());
    }
}
