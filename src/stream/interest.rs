//! Interest registration and readiness translation.
//!
//! The runtime reports socket state every tick (level-triggered). Consumers
//! expect edge-triggered notifications: one notification, then
//! silence until they re-arm with `update_interests`.

/// Which notifications a consumer wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interests {
    pub readable: bool,
    pub writable: bool,
}

impl Interests {
    pub const NONE: Self = Self { readable: false, writable: false };
    pub const READABLE: Self = Self { readable: true, writable: false };
    pub const WRITABLE: Self = Self { readable: false, writable: true };
    pub const BOTH: Self = Self { readable: true, writable: true };

    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable
    }
}

impl std::ops::BitOr for Interests {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            readable: self.readable || rhs.readable,
            writable: self.writable || rhs.writable,
        }
    }
}

/// A notification delivered to a stream's callback.
///
/// After a socket closes, the notification for whichever interest is still
/// registered doubles as EOF: the next `read` returns `Ok(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// Inbound bytes are buffered (or the stream reached EOF).
    Readable,
    /// The outbound buffer has drained (or the stream reached EOF).
    Writable,
}

/// Registered interests plus the notification delivered since the last re-arm.
///
/// A stream has at most one outstanding notification. Once one fires, every
/// further notification (EOF included) waits for the next `rearm`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterestState {
    interests: Interests,
    outstanding: Option<StreamEvent>,
}

impl InterestState {
    pub fn interests(&self) -> Interests {
        self.interests
    }

    pub fn outstanding(&self) -> Option<StreamEvent> {
        self.outstanding
    }

    /// Replace the interest set and clear the outstanding notification.
    pub fn rearm(&mut self, interests: Interests) {
        self.interests = interests;
        self.outstanding = None;
    }

    /// Translate buffer levels into at most one notification.
    ///
    /// A pending write drain wins over readable data so inbound buffering
    /// cannot grow without bound while output is stalled.
    pub fn poll_ready(&mut self, inbound_len: usize, outbound_len: usize) -> Option<StreamEvent> {
        if self.outstanding.is_some() {
            return None;
        }
        let event = if self.interests.writable && outbound_len == 0 {
            StreamEvent::Writable
        } else if self.interests.readable && inbound_len > 0 {
            StreamEvent::Readable
        } else {
            return None;
        };
        self.outstanding = Some(event);
        Some(event)
    }

    /// Terminal notification for a stream whose socket is gone.
    pub fn poll_eof(&mut self) -> Option<StreamEvent> {
        if self.outstanding.is_some() {
            return None;
        }
        let event = if self.interests.readable {
            StreamEvent::Readable
        } else if self.interests.writable {
            StreamEvent::Writable
        } else {
            return None;
        };
        self.outstanding = Some(event);
        Some(event)
    }
}
