//! Echo consumer.
//!
//! Claims every offered connection and writes back whatever it reads. Used by
//! the daemon and by the end-to-end tests as a reference consumer of the
//! stream manager.
//!
//! # Data Flow
//! ```text
//! offer     → accept_stream → arm READABLE
//! Readable  → read chunk → write as much as fits
//!               all written → arm READABLE
//!               leftover    → keep it, arm WRITABLE
//! Writable  → flush leftover → arm READABLE once empty
//! EOF       → close
//! ```
//!
//! Nothing new is read while a leftover is waiting, so each session holds at
//! most one chunk on top of the manager's outbound queue.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use bytes::{Buf, BytesMut};

use crate::manager::StreamManager;
use crate::net::ListenerError;
use crate::stream::{Interests, StreamCallback, StreamError, StreamEvent, StreamHandle};

const READ_CHUNK: usize = 1024;

/// Counters kept by the echo service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoStats {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub active_sessions: usize,
    pub bytes_echoed: u64,
}

#[derive(Default)]
struct Session {
    leftover: BytesMut,
}

struct EchoState {
    sessions: HashMap<StreamHandle, Session>,
    stats: EchoStats,
    callback: StreamCallback,
}

/// Echo consumer attached to one manager.
pub struct EchoService {
    state: Rc<RefCell<EchoState>>,
}

impl EchoService {
    /// Open the manager's listener and start serving offered connections.
    pub fn attach(manager: &mut StreamManager) -> Result<Self, ListenerError> {
        let state = Rc::new_cyclic(|weak: &Weak<RefCell<EchoState>>| {
            let weak = weak.clone();
            let callback: StreamCallback = Rc::new(
                move |manager: &mut StreamManager, handle: StreamHandle, event: StreamEvent| {
                    if let Some(state) = weak.upgrade() {
                        on_stream_event(&state, manager, handle, event);
                    }
                },
            );
            RefCell::new(EchoState {
                sessions: HashMap::new(),
                stats: EchoStats::default(),
                callback,
            })
        });

        let weak = Rc::downgrade(&state);
        manager.open_listener(Rc::new(move |manager: &mut StreamManager| {
            if let Some(state) = weak.upgrade() {
                on_offer(&state, manager);
            }
        }))?;

        tracing::info!(port = manager.listener_port(), "Echo service attached");
        Ok(Self { state })
    }

    pub fn stats(&self) -> EchoStats {
        self.state.borrow().stats
    }
}

fn on_offer(state: &Rc<RefCell<EchoState>>, manager: &mut StreamManager) {
    let Some(handle) = manager.accept_stream() else {
        return;
    };

    let callback = {
        let mut state = state.borrow_mut();
        state.sessions.insert(handle, Session::default());
        let active = state.sessions.len();
        state.stats.sessions_opened += 1;
        state.stats.active_sessions = active;
        state.callback.clone()
    };

    tracing::debug!(stream = %handle, "Echo session started");
    if let Err(e) = manager.update_interests(handle, Interests::READABLE, Some(callback)) {
        tracing::warn!(stream = %handle, error = %e, "Failed to arm new session");
        end_session(state, manager, handle);
    }
}

fn on_stream_event(
    state: &Rc<RefCell<EchoState>>,
    manager: &mut StreamManager,
    handle: StreamHandle,
    event: StreamEvent,
) {
    let next = match event {
        StreamEvent::Readable => echo_chunk(state, manager, handle),
        StreamEvent::Writable => flush_leftover(state, manager, handle),
    };

    match next {
        Some(interests) => {
            let callback = state.borrow().callback.clone();
            if manager.update_interests(handle, interests, Some(callback)).is_err() {
                end_session(state, manager, handle);
            }
        }
        None => end_session(state, manager, handle),
    }
}

/// Read one chunk and write it back. Returns the interests to arm next, or
/// `None` when the session is over.
fn echo_chunk(
    state: &Rc<RefCell<EchoState>>,
    manager: &mut StreamManager,
    handle: StreamHandle,
) -> Option<Interests> {
    let mut buf = [0u8; READ_CHUNK];
    let n = match manager.read(handle, &mut buf) {
        Ok(0) => {
            tracing::debug!(stream = %handle, "Echo peer finished");
            return None;
        }
        Ok(n) => n,
        Err(StreamError::Busy) => return Some(Interests::READABLE),
        Err(_) => return None,
    };

    let written = match manager.write(handle, &buf[..n]) {
        Ok(written) => written,
        Err(StreamError::Busy) => 0,
        Err(_) => return None,
    };

    let mut state = state.borrow_mut();
    state.stats.bytes_echoed += written as u64;
    if written == n {
        return Some(Interests::READABLE);
    }
    let session = state.sessions.entry(handle).or_default();
    session.leftover.extend_from_slice(&buf[written..n]);
    Some(Interests::WRITABLE)
}

fn flush_leftover(
    state: &Rc<RefCell<EchoState>>,
    manager: &mut StreamManager,
    handle: StreamHandle,
) -> Option<Interests> {
    let mut leftover = match state.borrow_mut().sessions.get_mut(&handle) {
        Some(session) => session.leftover.split(),
        None => return None,
    };
    if leftover.is_empty() {
        return Some(Interests::READABLE);
    }

    let written = match manager.write(handle, &leftover) {
        Ok(written) => written,
        Err(StreamError::Busy) => 0,
        Err(_) => return None,
    };
    leftover.advance(written);

    let mut state = state.borrow_mut();
    state.stats.bytes_echoed += written as u64;
    let session = state.sessions.entry(handle).or_default();
    if leftover.is_empty() {
        Some(Interests::READABLE)
    } else {
        session.leftover = leftover;
        Some(Interests::WRITABLE)
    }
}

fn end_session(state: &Rc<RefCell<EchoState>>, manager: &mut StreamManager, handle: StreamHandle) {
    {
        let mut state = state.borrow_mut();
        if state.sessions.remove(&handle).is_some() {
            let active = state.sessions.len();
            state.stats.sessions_closed += 1;
            state.stats.active_sessions = active;
        }
    }
    manager.close(handle);
    tracing::debug!(stream = %handle, "Echo session ended");
}
