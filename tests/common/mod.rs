//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tcp_stream_manager::net::{EphemeralPorts, ListenerCallback};
use tcp_stream_manager::runtime::SimRuntime;
use tcp_stream_manager::stream::{StreamCallback, StreamEvent, StreamHandle};
use tcp_stream_manager::{ManagerOptions, StreamManager};

pub const PORT: u16 = 7300;

pub fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

/// Options with short, easy-to-reason-about timings.
pub fn options(capacity: usize) -> ManagerOptions {
    ManagerOptions {
        port: Some(PORT),
        max_concurrent_streams: capacity,
        max_pending: 4,
        min_accept_interval: ms(100),
        close_quiet_period: ms(500),
        min_idle: Duration::from_secs(10),
        max_outbound_bytes: 64,
        active_push_delay: ms(10),
    }
}

/// A simulated network plus a manager bound to it.
pub struct Harness {
    pub sim: SimRuntime,
    pub manager: StreamManager,
    pub claimed: Rc<RefCell<Vec<StreamHandle>>>,
    pub offers: Rc<RefCell<usize>>,
}

impl Harness {
    /// Manager whose listener claims every offered connection.
    pub fn claiming(options: ManagerOptions) -> Self {
        let mut harness = Self::new(options);
        let claimed = harness.claimed.clone();
        let offers = harness.offers.clone();
        let callback: ListenerCallback = Rc::new(move |manager: &mut StreamManager| {
            *offers.borrow_mut() += 1;
            if let Some(handle) = manager.accept_stream() {
                claimed.borrow_mut().push(handle);
            }
        });
        harness.manager.open_listener(callback).unwrap();
        harness
    }

    /// Manager whose listener only counts offers; claims are left to the test.
    pub fn counting(options: ManagerOptions) -> Self {
        let mut harness = Self::new(options);
        let offers = harness.offers.clone();
        let callback: ListenerCallback = Rc::new(move |_: &mut StreamManager| {
            *offers.borrow_mut() += 1;
        });
        harness.manager.open_listener(callback).unwrap();
        harness
    }

    fn new(options: ManagerOptions) -> Self {
        let sim = SimRuntime::new();
        let manager = StreamManager::new(sim.clone(), options, &mut EphemeralPorts::default());
        Self {
            sim,
            manager,
            claimed: Rc::new(RefCell::new(Vec::new())),
            offers: Rc::new(RefCell::new(0)),
        }
    }

    pub fn connect(&self) -> tcp_stream_manager::runtime::SocketId {
        self.sim.connect(PORT).expect("listener is open")
    }

    /// Run one turn, then move the clock forward.
    pub fn tick(&mut self, advance: Duration) {
        self.manager.turn();
        self.sim.advance(advance);
    }

    pub fn offers(&self) -> usize {
        *self.offers.borrow()
    }

    pub fn claimed(&self) -> Vec<StreamHandle> {
        self.claimed.borrow().clone()
    }
}

pub type EventLog = Rc<RefCell<Vec<(StreamHandle, StreamEvent)>>>;

/// Callback that records every notification it receives.
pub fn recorder() -> (EventLog, StreamCallback) {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let callback: StreamCallback =
        Rc::new(move |_: &mut StreamManager, handle: StreamHandle, event: StreamEvent| {
            sink.borrow_mut().push((handle, event));
        });
    (log, callback)
}
