//! Deterministic in-memory runtime.
//!
//! `SimRuntime` models a network with a virtual clock. Tests keep a clone of
//! the runtime to act as the remote peers: connecting, sending, closing and
//! observing what the manager transmitted. Time only moves through
//! [`SimRuntime::advance`].

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::runtime::{BoundListener, Runtime, SocketEvent, SocketEventKind, SocketId};

/// Port handed out when a simulated bind asks for port 0.
const FIRST_SIM_PORT: u16 = 40_000;

#[derive(Debug, Default)]
struct SimConnection {
    inbound: BytesMut,
    outbound: BytesMut,
    /// Bytes that reached the peer.
    delivered: Vec<u8>,
    stalled: bool,
    timer: Option<Duration>,
}

#[derive(Debug)]
struct SimNetwork {
    clock: Duration,
    next_id: u64,
    next_port: u16,
    listeners: HashMap<SocketId, u16>,
    connections: BTreeMap<SocketId, SimConnection>,
    /// Connections that were closed by either side.
    closed: Vec<SocketId>,
    queued: Vec<SocketEvent>,
}

impl Default for SimNetwork {
    fn default() -> Self {
        Self {
            clock: Duration::ZERO,
            next_id: 1,
            next_port: FIRST_SIM_PORT,
            listeners: HashMap::new(),
            connections: BTreeMap::new(),
            closed: Vec::new(),
            queued: Vec::new(),
        }
    }
}

impl SimNetwork {
    fn allocate_id(&mut self) -> SocketId {
        let id = SocketId::new(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Simulated runtime. Clones share the same network.
#[derive(Debug, Clone, Default)]
pub struct SimRuntime {
    net: Rc<RefCell<SimNetwork>>,
}

impl SimRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, by: Duration) {
        self.net.borrow_mut().clock += by;
    }

    /// Open a connection to a bound port. Returns `None` when nobody listens.
    pub fn connect(&self, port: u16) -> Option<SocketId> {
        let mut net = self.net.borrow_mut();
        let listener = net
            .listeners
            .iter()
            .find(|(_, bound)| **bound == port)
            .map(|(id, _)| *id)?;
        let socket = net.allocate_id();
        net.connections.insert(socket, SimConnection::default());
        net.queued
            .push(SocketEvent::new(socket, SocketEventKind::Accepted { listener }));
        Some(socket)
    }

    /// Deliver bytes from the peer into the connection's inbound buffer.
    pub fn peer_send(&self, socket: SocketId, bytes: &[u8]) {
        let mut guard = self.net.borrow_mut();
        let net = &mut *guard;
        if let Some(conn) = net.connections.get_mut(&socket) {
            conn.inbound.extend_from_slice(bytes);
            net.queued.push(SocketEvent::new(socket, SocketEventKind::Received));
        }
    }

    /// Close the connection from the peer side.
    pub fn peer_close(&self, socket: SocketId) {
        let mut net = self.net.borrow_mut();
        if net.connections.remove(&socket).is_some() {
            net.closed.push(socket);
            net.queued.push(SocketEvent::new(socket, SocketEventKind::Closed));
        }
    }

    /// Take every byte that reached the peer so far.
    pub fn peer_received(&self, socket: SocketId) -> Vec<u8> {
        self.net
            .borrow_mut()
            .connections
            .get_mut(&socket)
            .map(|conn| std::mem::take(&mut conn.delivered))
            .unwrap_or_default()
    }

    /// Stop (or resume) draining the outbound buffer, as if the peer stopped reading.
    pub fn stall_output(&self, socket: SocketId, stalled: bool) {
        if let Some(conn) = self.net.borrow_mut().connections.get_mut(&socket) {
            conn.stalled = stalled;
        }
    }

    /// Virtual time at which the socket's follow-up timer fires, if armed.
    pub fn timer_due(&self, socket: SocketId) -> Option<Duration> {
        self.net.borrow().connections.get(&socket).and_then(|conn| conn.timer)
    }

    pub fn is_open(&self, socket: SocketId) -> bool {
        self.net.borrow().connections.contains_key(&socket)
    }

    /// Whether the socket was ever closed, by either side.
    pub fn was_closed(&self, socket: SocketId) -> bool {
        self.net.borrow().closed.contains(&socket)
    }

    pub fn is_listening(&self, port: u16) -> bool {
        self.net.borrow().listeners.values().any(|bound| *bound == port)
    }

    pub fn open_connections(&self) -> usize {
        self.net.borrow().connections.len()
    }
}

impl Runtime for SimRuntime {
    fn now(&self) -> Duration {
        self.net.borrow().clock
    }

    fn bind(&mut self, port: u16) -> io::Result<BoundListener> {
        let mut net = self.net.borrow_mut();
        let port = if port == 0 {
            let port = net.next_port;
            net.next_port += 1;
            port
        } else {
            port
        };
        if net.listeners.values().any(|bound| *bound == port) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("port {} already bound", port),
            ));
        }
        let socket = net.allocate_id();
        net.listeners.insert(socket, port);
        Ok(BoundListener { socket, port })
    }

    fn close_listener(&mut self, listener: SocketId) {
        self.net.borrow_mut().listeners.remove(&listener);
    }

    fn poll(&mut self, events: &mut Vec<SocketEvent>) {
        let mut guard = self.net.borrow_mut();
        let net = &mut *guard;
        let now = net.clock;
        events.append(&mut net.queued);

        for (socket, conn) in net.connections.iter_mut() {
            if !conn.stalled && !conn.outbound.is_empty() {
                let sent = conn.outbound.split();
                conn.delivered.extend_from_slice(&sent);
                events.push(SocketEvent::new(*socket, SocketEventKind::Sent));
            }
            if conn.timer.is_some_and(|due| due <= now) {
                conn.timer = None;
                events.push(SocketEvent::new(*socket, SocketEventKind::Timer));
            }
            events.push(SocketEvent::new(*socket, SocketEventKind::Poll));
        }
    }

    fn inbound_len(&self, socket: SocketId) -> usize {
        self.net
            .borrow()
            .connections
            .get(&socket)
            .map_or(0, |conn| conn.inbound.len())
    }

    fn outbound_len(&self, socket: SocketId) -> usize {
        self.net
            .borrow()
            .connections
            .get(&socket)
            .map_or(0, |conn| conn.outbound.len())
    }

    fn recv(&mut self, socket: SocketId, buf: &mut [u8]) -> usize {
        let mut net = self.net.borrow_mut();
        let Some(conn) = net.connections.get_mut(&socket) else {
            return 0;
        };
        let n = buf.len().min(conn.inbound.len());
        buf[..n].copy_from_slice(&conn.inbound[..n]);
        conn.inbound.advance(n);
        n
    }

    fn send(&mut self, socket: SocketId, bytes: &[u8]) {
        if let Some(conn) = self.net.borrow_mut().connections.get_mut(&socket) {
            conn.outbound.extend_from_slice(bytes);
        }
    }

    fn abort(&mut self, socket: SocketId) {
        let mut net = self.net.borrow_mut();
        if net.connections.remove(&socket).is_some() {
            net.closed.push(socket);
            net.queued.push(SocketEvent::new(socket, SocketEventKind::Closed));
        }
    }

    fn schedule(&mut self, socket: SocketId, delay: Duration) {
        let mut net = self.net.borrow_mut();
        let due = net.clock + delay;
        if let Some(conn) = net.connections.get_mut(&socket) {
            conn.timer = Some(conn.timer.map_or(due, |armed| armed.min(due)));
        }
    }
}
