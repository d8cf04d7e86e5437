//! Pending connections.
//!
//! # Responsibilities
//! - Hold connections accepted by the runtime but not yet claimed
//! - Track which of them were already offered to the consumer
//! - Guarantee each admitted connection leaves the backlog exactly once
//!
//! # Design Decisions
//! - The backlog length *is* the pending count, so removal and decrement
//!   cannot drift apart
//! - Entries whose socket closes are removed eagerly; every entry in the
//!   queue is therefore claimable

use std::collections::VecDeque;
use std::time::Duration;

use crate::runtime::SocketId;

/// A connection waiting to be claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingConnection {
    pub socket: SocketId,
    pub accepted_at: Duration,
    pub offered: bool,
}

/// FIFO of pending connections.
#[derive(Debug, Default)]
pub struct Backlog {
    entries: VecDeque<PendingConnection>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, socket: SocketId, accepted_at: Duration) {
        self.entries.push_back(PendingConnection {
            socket,
            accepted_at,
            offered: false,
        });
    }

    /// Claim the oldest pending connection.
    pub fn claim(&mut self) -> Option<PendingConnection> {
        self.entries.pop_front()
    }

    /// Remove a connection whose socket went away. Returns true if it was pending.
    pub fn remove(&mut self, socket: SocketId) -> bool {
        match self.entries.iter().position(|entry| entry.socket == socket) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// The oldest connection not yet offered to the consumer.
    pub fn next_unoffered(&mut self) -> Option<&mut PendingConnection> {
        self.entries.iter_mut().find(|entry| !entry.offered)
    }

    pub fn has_unoffered(&self) -> bool {
        self.entries.iter().any(|entry| !entry.offered)
    }

    pub fn drain(&mut self) -> impl Iterator<Item = PendingConnection> + '_ {
        self.entries.drain(..)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
