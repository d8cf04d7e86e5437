//! Listener and admission control.
//!
//! # Responsibilities
//! - Remember the bound server socket and the consumer's offer callback
//! - Decide whether an incoming connection may enter the pending backlog
//! - Resolve "any port" requests from explicit ephemeral-port state
//!
//! # Design Decisions
//! - Admission counts pending connections against free capacity, so
//!   `active + pending` never exceeds capacity through admission alone
//! - A full backlog is a hard ceiling, independent of capacity
//! - Rejection is always a bare abortive close; nothing is written to the peer

use std::io;
use std::rc::Rc;

use thiserror::Error;

use crate::manager::StreamManager;
use crate::runtime::SocketId;

/// Called when a pending connection is offered; the consumer reacts by
/// calling `StreamManager::accept_stream`.
pub type ListenerCallback = Rc<dyn Fn(&mut StreamManager)>;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("listener already open on port {0}")]
    AlreadyOpen(u16),
}

/// Why an incoming connection was turned away.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ResourceExhausted {
    #[error("no free stream slot ({active}/{capacity} active, {pending} pending)")]
    NoCapacity {
        capacity: usize,
        active: usize,
        pending: usize,
    },

    #[error("pending backlog full ({pending}/{max_pending})")]
    BacklogFull { pending: usize, max_pending: usize },
}

impl ResourceExhausted {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ResourceExhausted::NoCapacity { .. } => "no_capacity",
            ResourceExhausted::BacklogFull { .. } => "backlog_full",
        }
    }
}

/// Check whether a new connection has optimistic room.
pub fn admit(
    capacity: usize,
    active: usize,
    pending: usize,
    max_pending: usize,
) -> Result<(), ResourceExhausted> {
    if pending >= max_pending {
        return Err(ResourceExhausted::BacklogFull { pending, max_pending });
    }
    if pending >= capacity.saturating_sub(active) {
        return Err(ResourceExhausted::NoCapacity {
            capacity,
            active,
            pending,
        });
    }
    Ok(())
}

/// An open listener.
pub struct Listener {
    pub socket: SocketId,
    pub callback: ListenerCallback,
}

impl Listener {
    pub fn new(socket: SocketId, callback: ListenerCallback) -> Self {
        Self { socket, callback }
    }
}

/// Source of ports for managers created with "any port".
///
/// Owned by whoever creates managers, so independent owners never share a
/// counter.
#[derive(Debug, Clone)]
pub struct EphemeralPorts {
    base: u16,
    next: Option<u16>,
}

impl EphemeralPorts {
    /// Hand out `base`, `base + 1`, ... wrapping back to `base` after `u16::MAX`.
    pub fn starting_at(base: u16) -> Self {
        Self {
            base,
            next: (base != 0).then_some(base),
        }
    }

    /// Always request port 0 and let the runtime pick.
    pub fn runtime_assigned() -> Self {
        Self { base: 0, next: None }
    }

    pub fn next_port(&mut self) -> u16 {
        match self.next {
            Some(port) => {
                self.next = Some(port.checked_add(1).unwrap_or(self.base));
                port
            }
            None => 0,
        }
    }
}

impl Default for EphemeralPorts {
    fn default() -> Self {
        Self::starting_at(9000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_while_room_remains() {
        assert!(admit(2, 0, 0, 4).is_ok());
        assert!(admit(2, 0, 1, 4).is_ok());
        assert!(admit(2, 1, 0, 4).is_ok());
    }

    #[test]
    fn rejects_without_optimistic_room() {
        assert_eq!(
            admit(2, 0, 2, 4),
            Err(ResourceExhausted::NoCapacity { capacity: 2, active: 0, pending: 2 })
        );
        assert!(admit(2, 2, 0, 4).is_err());
        assert!(admit(2, 1, 1, 4).is_err());
    }

    #[test]
    fn backlog_ceiling_wins() {
        let err = admit(8, 0, 2, 2).unwrap_err();
        assert_eq!(err, ResourceExhausted::BacklogFull { pending: 2, max_pending: 2 });
        assert_eq!(err.reason(), "backlog_full");
    }

    #[test]
    fn ephemeral_ports_are_sequential() {
        let mut ports = EphemeralPorts::starting_at(9000);
        assert_eq!(ports.next_port(), 9000);
        assert_eq!(ports.next_port(), 9001);

        let mut top = EphemeralPorts::starting_at(u16::MAX - 1);
        assert_eq!(top.next_port(), u16::MAX - 1);
        assert_eq!(top.next_port(), u16::MAX);
        assert_eq!(top.next_port(), u16::MAX - 1);

        let mut runtime = EphemeralPorts::runtime_assigned();
        assert_eq!(runtime.next_port(), 0);
        assert_eq!(runtime.next_port(), 0);
    }
}
