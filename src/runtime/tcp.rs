//! Non-blocking TCP runtime over mio.
//!
//! # Responsibilities
//! - Bind listeners and accept connections without blocking
//! - Buffer inbound bytes (bounded) and outbound bytes per connection
//! - Turn mio's edge-triggered readiness into the level-triggered event
//!   stream the manager expects (one `Poll` per open connection per tick)
//!
//! # Design Decisions
//! - `poll()` uses a zero timeout; the caller owns the tick cadence
//! - A peer half-close is surfaced as `Closed` only once the consumer has
//!   drained every buffered inbound byte
//! - Abort sets a zero linger before dropping the socket, so the peer sees
//!   a reset instead of an orderly FIN; bytes still queued here are discarded

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use socket2::SockRef;

use crate::runtime::{BoundListener, Runtime, SocketEvent, SocketEventKind, SocketId};

const EVENT_CAPACITY: usize = 256;
const READ_CHUNK: usize = 4096;

#[derive(Debug)]
struct TcpConnection {
    stream: TcpStream,
    inbound: BytesMut,
    outbound: BytesMut,
    /// Readiness was reported and the socket has not yet returned WouldBlock.
    wants_read: bool,
    peer_closed: bool,
    timer: Option<Duration>,
}

impl TcpConnection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            wants_read: true,
            peer_closed: false,
            timer: None,
        }
    }

    /// Read until WouldBlock, EOF, or the inbound cap. Returns bytes read.
    fn fill(&mut self, max_inbound: usize) -> usize {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;
        while self.wants_read && self.inbound.len() < max_inbound {
            let room = (max_inbound - self.inbound.len()).min(READ_CHUNK);
            match self.stream.read(&mut chunk[..room]) {
                Ok(0) => {
                    self.peer_closed = true;
                    self.wants_read = false;
                }
                Ok(n) => {
                    self.inbound.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.wants_read = false,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(error = %e, "Connection read failed");
                    self.inbound.clear();
                    self.peer_closed = true;
                    self.wants_read = false;
                }
            }
        }
        total
    }

    /// Write as much queued output as the socket takes. Returns true when the
    /// buffer became empty during this call.
    fn flush(&mut self) -> bool {
        if self.outbound.is_empty() || self.peer_closed {
            return false;
        }
        loop {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    self.peer_closed = true;
                    return false;
                }
                Ok(n) => {
                    self.outbound.advance(n);
                    if self.outbound.is_empty() {
                        return true;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return false,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(error = %e, "Connection write failed");
                    self.inbound.clear();
                    self.outbound.clear();
                    self.peer_closed = true;
                    return false;
                }
            }
        }
    }
}

/// Runtime backed by real sockets.
pub struct TcpRuntime {
    poll: Poll,
    events: Events,
    epoch: Instant,
    bind_address: IpAddr,
    max_inbound: usize,
    next_id: u64,
    listeners: HashMap<SocketId, TcpListener>,
    connections: HashMap<SocketId, TcpConnection>,
}

impl TcpRuntime {
    /// Create a runtime binding listeners on `bind_address`, buffering at most
    /// `max_inbound` unread bytes per connection.
    pub fn new(bind_address: IpAddr, max_inbound: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENT_CAPACITY),
            epoch: Instant::now(),
            bind_address,
            max_inbound,
            next_id: 1,
            listeners: HashMap::new(),
            connections: HashMap::new(),
        })
    }

    fn allocate_id(&mut self) -> SocketId {
        let id = SocketId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn token(socket: SocketId) -> Token {
        Token(socket.as_u64() as usize)
    }

    fn accept_all(&mut self, listener_id: SocketId, out: &mut Vec<SocketEvent>) {
        loop {
            let Some(listener) = self.listeners.get(&listener_id) else {
                return;
            };
            match listener.accept() {
                Ok((mut stream, peer_addr)) => {
                    let socket = self.allocate_id();
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%socket, error = %e, "Failed to set TCP_NODELAY");
                    }
                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        Self::token(socket),
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        tracing::warn!(%socket, %peer_addr, error = %e, "Failed to register connection");
                        continue;
                    }
                    tracing::trace!(%socket, %peer_addr, "TCP connection accepted");
                    self.connections.insert(socket, TcpConnection::new(stream));
                    out.push(SocketEvent::new(
                        socket,
                        SocketEventKind::Accepted { listener: listener_id },
                    ));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(listener = %listener_id, error = %e, "Accept failed");
                    return;
                }
            }
        }
    }

    fn drop_connection(&mut self, socket: SocketId) -> bool {
        match self.connections.remove(&socket) {
            Some(mut conn) => {
                if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
                    tracing::debug!(%socket, error = %e, "Failed to deregister connection");
                }
                true
            }
            None => false,
        }
    }
}

impl Runtime for TcpRuntime {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn bind(&mut self, port: u16) -> io::Result<BoundListener> {
        let mut listener = TcpListener::bind(SocketAddr::new(self.bind_address, port))?;
        let local_addr = listener.local_addr()?;
        let socket = self.allocate_id();
        self.poll
            .registry()
            .register(&mut listener, Self::token(socket), Interest::READABLE)?;
        self.listeners.insert(socket, listener);
        tracing::debug!(%socket, address = %local_addr, "TCP listener bound");
        Ok(BoundListener {
            socket,
            port: local_addr.port(),
        })
    }

    fn close_listener(&mut self, listener: SocketId) {
        if let Some(mut inner) = self.listeners.remove(&listener) {
            if let Err(e) = self.poll.registry().deregister(&mut inner) {
                tracing::debug!(%listener, error = %e, "Failed to deregister listener");
            }
        }
    }

    fn poll(&mut self, out: &mut Vec<SocketEvent>) {
        if let Err(e) = self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            if e.kind() != io::ErrorKind::Interrupted {
                tracing::warn!(error = %e, "Runtime poll failed");
            }
            return;
        }

        let mut ready_listeners = Vec::new();
        for event in self.events.iter() {
            let socket = SocketId::new(event.token().0 as u64);
            if self.listeners.contains_key(&socket) {
                ready_listeners.push(socket);
            } else if let Some(conn) = self.connections.get_mut(&socket) {
                if event.is_readable() || event.is_read_closed() || event.is_error() {
                    conn.wants_read = true;
                }
            }
        }
        for listener in ready_listeners {
            self.accept_all(listener, out);
        }

        let now = self.now();
        let max_inbound = self.max_inbound;
        let mut finished = Vec::new();
        for (socket, conn) in self.connections.iter_mut() {
            if conn.fill(max_inbound) > 0 {
                out.push(SocketEvent::new(*socket, SocketEventKind::Received));
            }
            if conn.flush() {
                out.push(SocketEvent::new(*socket, SocketEventKind::Sent));
            }
            if conn.timer.is_some_and(|due| due <= now) {
                conn.timer = None;
                out.push(SocketEvent::new(*socket, SocketEventKind::Timer));
            }
            if conn.peer_closed && conn.inbound.is_empty() {
                finished.push(*socket);
            } else {
                out.push(SocketEvent::new(*socket, SocketEventKind::Poll));
            }
        }
        for socket in finished {
            if self.drop_connection(socket) {
                tracing::trace!(%socket, "TCP connection closed by peer");
                out.push(SocketEvent::new(socket, SocketEventKind::Closed));
            }
        }
    }

    fn inbound_len(&self, socket: SocketId) -> usize {
        self.connections.get(&socket).map_or(0, |conn| conn.inbound.len())
    }

    fn outbound_len(&self, socket: SocketId) -> usize {
        self.connections.get(&socket).map_or(0, |conn| conn.outbound.len())
    }

    fn recv(&mut self, socket: SocketId, buf: &mut [u8]) -> usize {
        let Some(conn) = self.connections.get_mut(&socket) else {
            return 0;
        };
        let n = buf.len().min(conn.inbound.len());
        buf[..n].copy_from_slice(&conn.inbound[..n]);
        conn.inbound.advance(n);
        if n > 0 && !conn.peer_closed {
            // Room freed below the cap; resume reading on the next tick.
            conn.wants_read = true;
        }
        n
    }

    fn send(&mut self, socket: SocketId, bytes: &[u8]) {
        if let Some(conn) = self.connections.get_mut(&socket) {
            conn.outbound.extend_from_slice(bytes);
            conn.flush();
        }
    }

    fn abort(&mut self, socket: SocketId) {
        if let Some(conn) = self.connections.get(&socket) {
            if let Err(e) = SockRef::from(&conn.stream).set_linger(Some(Duration::ZERO)) {
                tracing::debug!(%socket, error = %e, "Failed to set zero linger; close will be orderly");
            }
        }
        if self.drop_connection(socket) {
            tracing::trace!(%socket, "TCP connection aborted");
        }
    }

    fn schedule(&mut self, socket: SocketId, delay: Duration) {
        let due = self.now() + delay;
        if let Some(conn) = self.connections.get_mut(&socket) {
            conn.timer = Some(conn.timer.map_or(due, |armed| armed.min(due)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn drive_until(rt: &mut TcpRuntime, events: &mut Vec<SocketEvent>, pred: impl Fn(&[SocketEvent]) -> bool) {
        for _ in 0..500 {
            rt.poll(events);
            if pred(events) {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached; events: {:?}", events);
    }

    #[test]
    fn accept_read_write_close() {
        let mut rt = TcpRuntime::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1024).unwrap();
        let bound = rt.bind(0).unwrap();
        assert_ne!(bound.port, 0);

        let mut client = std::net::TcpStream::connect(("127.0.0.1", bound.port)).unwrap();
        client.write_all(b"ping").unwrap();

        let mut events = Vec::new();
        drive_until(&mut rt, &mut events, |evs| {
            evs.iter().any(|e| matches!(e.kind, SocketEventKind::Accepted { .. }))
        });
        let socket = events
            .iter()
            .find(|e| matches!(e.kind, SocketEventKind::Accepted { .. }))
            .map(|e| e.socket)
            .unwrap();

        for _ in 0..500 {
            if rt.inbound_len(socket) >= 4 {
                break;
            }
            rt.poll(&mut events);
            std::thread::sleep(Duration::from_millis(2));
        }
        let mut buf = [0u8; 16];
        assert_eq!(rt.recv(socket, &mut buf), 4);
        assert_eq!(&buf[..4], b"ping");

        rt.send(socket, b"pong");
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"pong");

        drop(client);
        events.clear();
        drive_until(&mut rt, &mut events, |evs| {
            evs.contains(&SocketEvent::new(socket, SocketEventKind::Closed))
        });
        assert_eq!(rt.inbound_len(socket), 0);
    }

    #[test]
    fn abort_resets_peer() {
        let mut rt = TcpRuntime::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1024).unwrap();
        let bound = rt.bind(0).unwrap();
        let mut client = std::net::TcpStream::connect(("127.0.0.1", bound.port)).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let mut events = Vec::new();
        drive_until(&mut rt, &mut events, |evs| {
            evs.iter().any(|e| matches!(e.kind, SocketEventKind::Accepted { .. }))
        });
        let socket = events
            .iter()
            .find(|e| matches!(e.kind, SocketEventKind::Accepted { .. }))
            .map(|e| e.socket)
            .unwrap();

        rt.abort(socket);
        let mut buf = [0u8; 4];
        let err = client.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
