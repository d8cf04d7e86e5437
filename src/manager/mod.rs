//! Bounded stream manager.
//!
//! # Responsibilities
//! - Own the listener and the pending backlog for one port
//! - Admit or reject incoming connections against a fixed stream capacity
//! - Hand out stream handles and translate buffer levels into
//!   edge-triggered notifications
//! - Evict the longest-idle stream under capacity pressure
//! - Keep stream records alive after their socket dies until the consumer
//!   acknowledges the EOF
//!
//! # Data Flow
//! ```text
//! turn()
//!     → runtime.poll()                    (level-triggered socket events)
//!     → Accepted  → admission / eviction → backlog
//!     → Closed    → backlog cleanup | orphan transition
//!     → other     → readiness translation → stream callback
//!     → orphan EOF delivery
//!     → offer one pending connection      (accept staggering)
//! ```
//!
//! # Design Decisions
//! - Single-threaded and caller-driven; nothing runs outside `turn()` and
//!   the consumer-facing calls
//! - Callbacks receive `&mut StreamManager`, so consumers may claim, close,
//!   read and write from inside a notification
//! - Aborts requested while a callback is running are deferred until it
//!   returns; the socket is unmapped first so no event can reach a freed
//!   stream
//! - At most one notification per stream per turn

pub mod eviction;
pub mod options;
mod orphan;
pub mod stagger;
pub mod stats;

use std::collections::{HashMap, VecDeque};

use crate::net::{admit, Backlog, EphemeralPorts, Listener, ListenerCallback, ListenerError, ResourceExhausted};
use crate::observability::metrics;
use crate::runtime::{Runtime, SocketEvent, SocketEventKind, SocketId};
use crate::stream::{
    Interests, Stream, StreamArena, StreamCallback, StreamError, StreamEvent, StreamHandle,
    StreamState,
};

pub use eviction::{Candidate, EvictionPolicy};
pub use options::ManagerOptions;
pub use stagger::AcceptStagger;
pub use stats::ManagerStats;

use stats::Totals;

/// Accepts TCP connections on one port and manages a bounded set of streams.
pub struct StreamManager {
    runtime: Box<dyn Runtime>,
    options: ManagerOptions,
    port: u16,
    listener: Option<Listener>,
    backlog: Backlog,
    streams: StreamArena<Stream>,
    sockets: HashMap<SocketId, StreamHandle>,
    active_count: usize,
    stagger: AcceptStagger,
    eviction: EvictionPolicy,
    orphan_eofs: VecDeque<StreamHandle>,
    deferred_aborts: Vec<SocketId>,
    dispatch_depth: usize,
    turn: u64,
    events: Vec<SocketEvent>,
    totals: Totals,
    released: bool,
}

impl StreamManager {
    /// Create a manager. No socket is bound until [`open_listener`](Self::open_listener).
    ///
    /// When `options.port` is `None` the port is taken from `ports`.
    pub fn new(
        runtime: impl Runtime + 'static,
        options: ManagerOptions,
        ports: &mut EphemeralPorts,
    ) -> Self {
        let port = options.port.unwrap_or_else(|| ports.next_port());
        let capacity = options.max_concurrent_streams;

        tracing::debug!(
            port,
            capacity,
            max_pending = options.max_pending,
            "Stream manager created"
        );

        Self {
            runtime: Box::new(runtime),
            port,
            listener: None,
            backlog: Backlog::new(),
            streams: StreamArena::with_capacity(capacity),
            sockets: HashMap::with_capacity(capacity),
            active_count: 0,
            stagger: AcceptStagger::new(options.min_accept_interval, options.close_quiet_period),
            eviction: EvictionPolicy::new(options.min_idle),
            orphan_eofs: VecDeque::new(),
            deferred_aborts: Vec::new(),
            dispatch_depth: 0,
            turn: 0,
            events: Vec::new(),
            totals: Totals::default(),
            released: false,
            options,
        }
    }

    /// Close the listener and every stream, then drop the manager.
    pub fn release(mut self) {
        self.shutdown();
    }

    /// Bind the port and start admitting connections.
    ///
    /// `callback` is invoked once per pending connection offer; the consumer
    /// answers with [`accept_stream`](Self::accept_stream).
    pub fn open_listener(&mut self, callback: ListenerCallback) -> Result<(), ListenerError> {
        if self.listener.is_some() {
            return Err(ListenerError::AlreadyOpen(self.port));
        }

        let bound = self.runtime.bind(self.port).map_err(|source| {
            tracing::error!(port = self.port, error = %source, "Failed to bind listener");
            ListenerError::Bind {
                port: self.port,
                source,
            }
        })?;

        self.port = bound.port;
        self.listener = Some(Listener::new(bound.socket, callback));

        tracing::info!(
            port = self.port,
            capacity = self.options.max_concurrent_streams,
            max_pending = self.options.max_pending,
            "Listener open"
        );
        Ok(())
    }

    /// Stop listening. Pending, unclaimed connections are aborted; claimed
    /// streams are unaffected.
    pub fn close_listener(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        self.runtime.close_listener(listener.socket);

        let pending: Vec<SocketId> = self.backlog.drain().map(|entry| entry.socket).collect();
        for socket in &pending {
            self.request_abort(*socket);
        }

        tracing::info!(port = self.port, aborted_pending = pending.len(), "Listener closed");
        self.record_occupancy();
    }

    /// Port the listener is (or will be) bound to.
    pub fn listener_port(&self) -> u16 {
        self.port
    }

    pub fn is_listener_open(&self) -> bool {
        self.listener.is_some()
    }

    /// Claim the oldest pending connection as a stream.
    ///
    /// Returns `None` when nothing is pending or every stream slot is taken.
    pub fn accept_stream(&mut self) -> Option<StreamHandle> {
        if self.active_count >= self.options.max_concurrent_streams {
            tracing::debug!(
                active = self.active_count,
                capacity = self.options.max_concurrent_streams,
                "No free stream slot to claim"
            );
            return None;
        }

        let pending = self.backlog.claim()?;
        let now = self.runtime.now();
        let handle = self.streams.insert(Stream::new(pending.socket, now));
        self.sockets.insert(pending.socket, handle);
        self.active_count += 1;
        debug_assert!(self.active_count <= self.options.max_concurrent_streams);

        tracing::debug!(
            stream = %handle,
            socket = %pending.socket,
            waited_ms = now.saturating_sub(pending.accepted_at).as_millis() as u64,
            active = self.active_count,
            "Stream claimed"
        );
        self.record_occupancy();
        Some(handle)
    }

    /// Close a stream abortively and free its record.
    ///
    /// Closing a stale handle is a no-op. Safe to call from inside the
    /// stream's own callback.
    pub fn close(&mut self, handle: StreamHandle) {
        let Some(stream) = self.streams.remove(handle) else {
            tracing::trace!(stream = %handle, "Close on stale handle ignored");
            return;
        };

        match stream.socket {
            Some(socket) => {
                self.sockets.remove(&socket);
                self.active_count -= 1;
                self.stagger.record_close(self.runtime.now());
                self.request_abort(socket);
                tracing::debug!(stream = %handle, socket = %socket, active = self.active_count, "Stream closed");
            }
            None => {
                self.orphan_eofs.retain(|queued| *queued != handle);
                tracing::debug!(stream = %handle, "Orphaned stream released");
            }
        }
        self.record_occupancy();
    }

    /// Half-close of the output direction. Not supported; does nothing.
    pub fn close_output(&mut self, handle: StreamHandle) {
        tracing::trace!(stream = %handle, "Output half-close not supported; ignored");
    }

    /// Replace a stream's interests and callback.
    ///
    /// Always re-arms: the outstanding notification is cleared. On an
    /// orphaned stream, non-empty interests schedule the EOF notification and
    /// empty interests free the record.
    pub fn update_interests(
        &mut self,
        handle: StreamHandle,
        interests: Interests,
        callback: Option<StreamCallback>,
    ) -> Result<(), StreamError> {
        let Some(stream) = self.streams.get_mut(handle) else {
            tracing::warn!(stream = %handle, "update_interests on stale handle");
            return Err(StreamError::InvalidHandle);
        };

        stream.readiness.rearm(interests);
        stream.callback = callback;

        if stream.socket.is_none() {
            if interests.is_empty() {
                self.release_orphan(handle);
            } else {
                self.schedule_orphan_eof(handle);
            }
        }
        Ok(())
    }

    /// Read buffered inbound bytes.
    ///
    /// `Ok(0)` means EOF: the socket is gone. `Err(Busy)` means nothing is
    /// buffered yet, or `buf` has no room.
    pub fn read(&mut self, handle: StreamHandle, buf: &mut [u8]) -> Result<usize, StreamError> {
        let now = self.runtime.now();
        let Some(stream) = self.streams.get_mut(handle) else {
            tracing::warn!(stream = %handle, "read on stale handle");
            return Err(StreamError::InvalidHandle);
        };
        let Some(socket) = stream.socket else {
            return Ok(0);
        };

        if buf.is_empty() || self.runtime.inbound_len(socket) == 0 {
            return Err(StreamError::Busy);
        }

        let n = self.runtime.recv(socket, buf);
        stream.last_activity = now;

        // Data left behind would otherwise wait for the next level poll.
        if self.runtime.inbound_len(socket) > 0 {
            self.runtime.schedule(socket, self.options.active_push_delay);
        }
        Ok(n)
    }

    /// Enqueue bytes for sending. Returns how many were accepted.
    ///
    /// At most `max_outbound_bytes` may be queued per stream; `Err(Busy)` when
    /// the queue is already full.
    pub fn write(&mut self, handle: StreamHandle, bytes: &[u8]) -> Result<usize, StreamError> {
        let Some(stream) = self.streams.get(handle) else {
            tracing::warn!(stream = %handle, "write on stale handle");
            return Err(StreamError::InvalidHandle);
        };
        let Some(socket) = stream.socket else {
            return Err(StreamError::Closed);
        };

        let queued = self.runtime.outbound_len(socket);
        let limit = self.options.max_outbound_bytes;
        if queued >= limit {
            return Err(StreamError::Busy);
        }

        let n = bytes.len().min(limit - queued);
        self.runtime.send(socket, &bytes[..n]);
        Ok(n)
    }

    /// State of a live stream record; `None` for stale handles.
    pub fn stream_state(&self, handle: StreamHandle) -> Option<StreamState> {
        self.streams.get(handle).map(Stream::state)
    }

    /// Interests currently registered on a stream.
    pub fn interests(&self, handle: StreamHandle) -> Option<Interests> {
        self.streams.get(handle).map(|stream| stream.readiness.interests())
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            capacity: self.options.max_concurrent_streams,
            pending_count: self.backlog.len(),
            active_count: self.active_count,
            accepted_total: self.totals.accepted,
            rejected_total: self.totals.rejected,
            evicted_total: self.totals.evicted,
            orphaned_total: self.totals.orphaned,
            last_accept_at: self.stagger.last_accept(),
            last_close_at: self.stagger.last_close(),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Run one event-loop tick: process socket events, deliver notifications
    /// and make at most one accept offer.
    ///
    /// Must not be called from inside a callback.
    pub fn turn(&mut self) {
        debug_assert_eq!(self.dispatch_depth, 0, "turn() called from a callback");
        self.turn += 1;

        let mut events = std::mem::take(&mut self.events);
        self.runtime.poll(&mut events);
        for event in events.drain(..) {
            self.handle_event(event);
        }
        self.events = events;

        self.deliver_orphan_eofs();
        self.offer_pending();
        self.flush_aborts();

        debug_assert!(self.active_count <= self.options.max_concurrent_streams);
    }

    fn handle_event(&mut self, event: SocketEvent) {
        match event.kind {
            SocketEventKind::Accepted { listener } => self.on_accepted(event.socket, listener),
            SocketEventKind::Closed => self.on_closed(event.socket),
            SocketEventKind::Received
            | SocketEventKind::Sent
            | SocketEventKind::Timer
            | SocketEventKind::Poll => {
                if let Some(&handle) = self.sockets.get(&event.socket) {
                    self.evaluate(handle);
                }
            }
        }
    }

    fn on_accepted(&mut self, socket: SocketId, listener: SocketId) {
        if self.listener.as_ref().map(|l| l.socket) != Some(listener) {
            tracing::debug!(socket = %socket, "Connection for a closed listener aborted");
            self.request_abort(socket);
            return;
        }

        let now = self.runtime.now();
        let mut verdict = self.check_admission();
        if matches!(verdict, Err(ResourceExhausted::NoCapacity { .. })) && self.evict_idle(now) {
            verdict = self.check_admission();
        }

        match verdict {
            Ok(()) => {
                self.backlog.push(socket, now);
                self.totals.accepted += 1;
                metrics::record_accepted();
                tracing::debug!(socket = %socket, pending = self.backlog.len(), "Connection admitted");
            }
            Err(reason) => {
                self.totals.rejected += 1;
                metrics::record_rejected(reason.reason());
                tracing::warn!(socket = %socket, reason = %reason, "Connection rejected");
                self.request_abort(socket);
            }
        }
        self.record_occupancy();
    }

    fn check_admission(&self) -> Result<(), ResourceExhausted> {
        admit(
            self.options.max_concurrent_streams,
            self.active_count,
            self.backlog.len(),
            self.options.max_pending,
        )
    }

    /// Evict the longest-idle stream if every slot is taken and it has been
    /// idle at least `min_idle`. Returns true if a stream was evicted.
    fn evict_idle(&mut self, now: std::time::Duration) -> bool {
        if self.active_count < self.options.max_concurrent_streams {
            return false;
        }

        // Closing streams have already given up their socket.
        let candidates = self.streams.iter().filter_map(|(handle, stream)| {
            stream.socket.map(|_| Candidate {
                handle,
                last_activity: stream.last_activity,
            })
        });

        let Some(victim) = self.eviction.select(now, candidates) else {
            tracing::debug!(
                min_idle_ms = self.eviction.min_idle().as_millis() as u64,
                "No stream idle long enough to evict"
            );
            return false;
        };

        tracing::info!(
            stream = %victim.handle,
            idle_ms = now.saturating_sub(victim.last_activity).as_millis() as u64,
            "Evicting idle stream"
        );
        self.totals.evicted += 1;
        metrics::record_evicted();
        self.detach(victim.handle, true);
        true
    }

    fn on_closed(&mut self, socket: SocketId) {
        if self.backlog.remove(socket) {
            tracing::debug!(socket = %socket, "Pending connection closed before claim");
            self.record_occupancy();
            return;
        }
        if let Some(&handle) = self.sockets.get(&socket) {
            tracing::debug!(stream = %handle, socket = %socket, "Peer closed stream");
            self.detach(handle, false);
        }
    }

    /// Translate current buffer levels into at most one notification.
    fn evaluate(&mut self, handle: StreamHandle) {
        let turn = self.turn;
        let Some(stream) = self.streams.get_mut(handle) else {
            return;
        };
        let Some(socket) = stream.socket else {
            return;
        };
        if stream.callback.is_none() || stream.notified_turn == Some(turn) {
            return;
        }

        let inbound = self.runtime.inbound_len(socket);
        let outbound = self.runtime.outbound_len(socket);
        if let Some(event) = stream.readiness.poll_ready(inbound, outbound) {
            self.notify(handle, event);
        }
    }

    fn notify(&mut self, handle: StreamHandle, event: StreamEvent) {
        let turn = self.turn;
        let Some(stream) = self.streams.get_mut(handle) else {
            return;
        };
        let Some(callback) = stream.callback.clone() else {
            return;
        };
        stream.notified_turn = Some(turn);

        tracing::trace!(stream = %handle, event = ?event, "Notifying stream");
        self.dispatch(|manager| callback(manager, handle, event));
    }

    /// Offer the oldest unoffered pending connection, if staggering allows.
    fn offer_pending(&mut self) {
        let Some(callback) = self.listener.as_ref().map(|l| l.callback.clone()) else {
            return;
        };
        let now = self.runtime.now();
        if !self.backlog.has_unoffered() || !self.stagger.may_offer(now) {
            return;
        }
        let Some(entry) = self.backlog.next_unoffered() else {
            return;
        };
        entry.offered = true;
        let socket = entry.socket;
        self.stagger.record_offer(now);

        tracing::debug!(socket = %socket, pending = self.backlog.len(), "Offering pending connection");
        self.dispatch(|manager| callback(manager));
    }

    fn dispatch(&mut self, f: impl FnOnce(&mut Self)) {
        self.dispatch_depth += 1;
        f(self);
        self.dispatch_depth -= 1;
        if self.dispatch_depth == 0 {
            self.flush_aborts();
        }
    }

    fn request_abort(&mut self, socket: SocketId) {
        if self.dispatch_depth > 0 {
            self.deferred_aborts.push(socket);
        } else {
            self.runtime.abort(socket);
        }
    }

    fn flush_aborts(&mut self) {
        for socket in std::mem::take(&mut self.deferred_aborts) {
            self.runtime.abort(socket);
        }
    }

    fn record_occupancy(&self) {
        metrics::record_occupancy(self.active_count, self.backlog.len());
    }

    fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.close_listener();
        let handles = self.streams.handles();
        let count = handles.len();
        for handle in handles {
            self.close(handle);
        }
        self.orphan_eofs.clear();
        self.flush_aborts();

        tracing::info!(port = self.port, closed_streams = count, "Stream manager released");
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
