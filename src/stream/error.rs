//! Errors returned by stream operations.

use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum StreamError {
    /// Nothing to read, or no room to write. Wait for the matching notification.
    #[error("stream busy; wait for the matching interest notification")]
    Busy,

    /// The handle refers to a stream that was freed (or never existed).
    #[error("stale or unknown stream handle")]
    InvalidHandle,

    /// The stream's socket is gone; there is nowhere to send.
    #[error("stream socket is closed")]
    Closed,
}
