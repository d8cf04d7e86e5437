//! Admission control, claiming and listener lifecycle.

use std::rc::Rc;

use tcp_stream_manager::net::{EphemeralPorts, ListenerError};
use tcp_stream_manager::StreamManager;

mod common;
use common::{ms, options, Harness, PORT};

#[test]
fn test_capacity_two_admits_two_of_three() {
    let mut h = Harness::claiming(options(2));
    let a = h.connect();
    let b = h.connect();
    let c = h.connect();

    h.manager.turn();
    assert!(h.sim.was_closed(c), "third connection has no optimistic room");
    assert!(h.sim.is_open(a) && h.sim.is_open(b));
    assert_eq!(h.manager.stats().rejected_total, 1);
    assert_eq!(h.manager.stats().accepted_total, 2);
    assert_eq!(h.claimed().len(), 1);

    h.sim.advance(ms(100));
    h.manager.turn();
    let stats = h.manager.stats();
    assert_eq!(h.claimed().len(), 2);
    assert_eq!(stats.active_count, 2);
    assert_eq!(stats.pending_count, 0);
}

#[test]
fn test_backlog_ceiling_rejects() {
    let mut opts = options(8);
    opts.max_pending = 2;
    let mut h = Harness::counting(opts);
    let sockets: Vec<_> = (0..3).map(|_| h.connect()).collect();

    h.manager.turn();
    assert_eq!(h.manager.stats().pending_count, 2);
    assert!(!h.sim.was_closed(sockets[1]));
    assert!(h.sim.was_closed(sockets[2]));
}

#[test]
fn test_pending_close_before_claim() {
    let mut h = Harness::counting(options(2));
    let socket = h.connect();
    h.manager.turn();
    assert_eq!(h.manager.stats().pending_count, 1);

    h.sim.peer_close(socket);
    h.manager.turn();
    assert_eq!(h.manager.stats().pending_count, 0);
    assert_eq!(h.manager.accept_stream(), None);

    // The slot is free again.
    h.connect();
    h.sim.advance(ms(100));
    h.manager.turn();
    assert_eq!(h.manager.stats().pending_count, 1);
    assert!(h.manager.accept_stream().is_some());
}

#[test]
fn test_claim_takes_oldest_pending_even_if_not_offered() {
    let mut h = Harness::counting(options(2));
    let a = h.connect();
    let b = h.connect();
    h.manager.turn();
    assert_eq!(h.offers(), 1);

    let first = h.manager.accept_stream().unwrap();
    let second = h.manager.accept_stream().unwrap();
    assert_ne!(first, second);
    assert_eq!(h.manager.accept_stream(), None);

    // Claim order follows accept order: writes from `first` reach `a`.
    h.manager.write(first, b"to-a").unwrap();
    h.manager.write(second, b"to-b").unwrap();
    h.manager.turn();
    assert_eq!(h.sim.peer_received(a), b"to-a");
    assert_eq!(h.sim.peer_received(b), b"to-b");
}

#[test]
fn test_close_listener_aborts_pending_only() {
    let mut h = Harness::counting(options(2));
    let _first = h.connect();
    let pending = h.connect();
    h.manager.turn();
    let stream = h.manager.accept_stream().unwrap();
    assert_eq!(h.manager.stats().pending_count, 1);

    h.manager.close_listener();
    assert!(!h.manager.is_listener_open());
    assert!(!h.sim.is_listening(PORT));
    assert!(h.sim.was_closed(pending));
    assert_eq!(h.manager.stats().pending_count, 0);
    assert!(h.sim.connect(PORT).is_none());

    assert_eq!(h.manager.write(stream, b"still here"), Ok(10));
}

#[test]
fn test_bind_failure_is_reported() {
    let h = Harness::counting(options(1));
    let mut other = StreamManager::new(h.sim.clone(), options(1), &mut EphemeralPorts::default());
    let err = other.open_listener(Rc::new(|_: &mut StreamManager| {})).unwrap_err();
    assert!(matches!(err, ListenerError::Bind { port, .. } if port == PORT));
    assert!(!other.is_listener_open());
}

#[test]
fn test_active_never_exceeds_capacity() {
    let capacity = 3;
    let mut h = Harness::claiming(options(capacity));

    for round in 0..40 {
        h.connect();
        h.connect();
        if round % 3 == 0 {
            if let Some(handle) = h.claimed().first().copied() {
                h.claimed.borrow_mut().remove(0);
                h.manager.close(handle);
            }
        }
        h.tick(ms(60));

        let stats = h.manager.stats();
        assert!(stats.active_count <= capacity);
        assert!(stats.active_count + stats.pending_count <= capacity);
    }
    assert!(h.manager.stats().rejected_total > 0);
}
