//! Streams that outlive their socket.
//!
//! When a claimed stream loses its socket (peer close or eviction) the record
//! is kept so the consumer still holds a valid handle. The stream no longer
//! counts against capacity. If the consumer registered any interest it gets
//! exactly one EOF notification; reads then return `Ok(0)`. The record is
//! freed when the consumer closes it or clears its interests.

use crate::observability::metrics;
use crate::stream::StreamHandle;

use super::StreamManager;

impl StreamManager {
    /// Separate a stream from its socket.
    ///
    /// With `abort` set the socket is closed abortively as well (eviction);
    /// otherwise the runtime already closed it.
    pub(super) fn detach(&mut self, handle: StreamHandle, abort: bool) {
        let Some(stream) = self.streams.get_mut(handle) else {
            return;
        };
        let Some(socket) = stream.socket.take() else {
            return;
        };
        let has_interest = !stream.readiness.interests().is_empty();

        self.sockets.remove(&socket);
        self.active_count -= 1;
        self.stagger.record_close(self.runtime.now());
        if abort {
            self.request_abort(socket);
        }

        if has_interest {
            self.totals.orphaned += 1;
            metrics::record_orphaned();
            self.schedule_orphan_eof(handle);
            tracing::debug!(stream = %handle, socket = %socket, "Stream orphaned; EOF pending");
        } else {
            self.streams.remove(handle);
            tracing::debug!(stream = %handle, socket = %socket, "Stream freed; no interest registered");
        }
        self.record_occupancy();
    }

    /// Free an orphan the consumer acknowledged by clearing its interests.
    pub(super) fn release_orphan(&mut self, handle: StreamHandle) {
        if self.streams.remove(handle).is_some() {
            self.orphan_eofs.retain(|queued| *queued != handle);
            tracing::debug!(stream = %handle, "Orphaned stream acknowledged and freed");
        }
    }

    pub(super) fn schedule_orphan_eof(&mut self, handle: StreamHandle) {
        if !self.orphan_eofs.contains(&handle) {
            self.orphan_eofs.push_back(handle);
        }
    }

    /// Deliver queued EOF notifications.
    ///
    /// Only handles queued before this call are served; a consumer re-arming
    /// from inside the callback is served next turn.
    pub(super) fn deliver_orphan_eofs(&mut self) {
        let turn = self.turn;
        let due: Vec<StreamHandle> = self.orphan_eofs.drain(..).collect();

        for handle in due {
            let Some(stream) = self.streams.get_mut(handle) else {
                continue;
            };
            if stream.socket.is_some() || stream.callback.is_none() {
                continue;
            }
            if stream.notified_turn == Some(turn) {
                self.orphan_eofs.push_back(handle);
                continue;
            }
            if let Some(event) = stream.readiness.poll_eof() {
                tracing::trace!(stream = %handle, event = ?event, "Delivering EOF");
                self.notify(handle, event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use crate::manager::{ManagerOptions, StreamManager};
    use crate::net::EphemeralPorts;
    use crate::runtime::SimRuntime;
    use crate::stream::{Interests, StreamCallback, StreamEvent, StreamHandle, StreamState};

    fn setup() -> (SimRuntime, StreamManager) {
        let sim = SimRuntime::new();
        let mut options = ManagerOptions::with_capacity(1);
        options.port = Some(7100);
        let mut manager = StreamManager::new(sim.clone(), options, &mut EphemeralPorts::default());
        manager.open_listener(Rc::new(|_: &mut StreamManager| {})).unwrap();
        (sim, manager)
    }

    fn recording(events: &Rc<RefCell<Vec<StreamEvent>>>) -> StreamCallback {
        let events = events.clone();
        Rc::new(move |_: &mut StreamManager, _: StreamHandle, event: StreamEvent| {
            events.borrow_mut().push(event)
        })
    }

    fn ignore() -> StreamCallback {
        Rc::new(|_: &mut StreamManager, _: StreamHandle, _: StreamEvent| {})
    }

    #[test]
    fn peer_close_without_interest_frees_record() {
        let (sim, mut manager) = setup();
        let socket = sim.connect(7100).unwrap();
        manager.turn();
        let handle = manager.accept_stream().unwrap();

        sim.peer_close(socket);
        manager.turn();
        assert_eq!(manager.stream_state(handle), None);
        assert_eq!(manager.stats().active_count, 0);
        assert_eq!(manager.stats().orphaned_total, 0);
    }

    #[test]
    fn orphan_gets_single_eof() {
        let (sim, mut manager) = setup();
        let socket = sim.connect(7100).unwrap();
        manager.turn();
        let handle = manager.accept_stream().unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        manager
            .update_interests(handle, Interests::READABLE, Some(recording(&events)))
            .unwrap();

        sim.peer_close(socket);
        manager.turn();
        assert_eq!(manager.stream_state(handle), Some(StreamState::Orphaned));
        assert_eq!(manager.stats().active_count, 0);
        assert_eq!(*events.borrow(), vec![StreamEvent::Readable]);

        let mut buf = [0u8; 4];
        assert_eq!(manager.read(handle, &mut buf), Ok(0));

        manager.turn();
        manager.turn();
        assert_eq!(events.borrow().len(), 1);

        manager.update_interests(handle, Interests::NONE, None).unwrap();
        assert_eq!(manager.stream_state(handle), None);
    }

    #[test]
    fn rearmed_orphan_gets_another_eof() {
        let (sim, mut manager) = setup();
        let socket = sim.connect(7100).unwrap();
        manager.turn();
        let handle = manager.accept_stream().unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let callback = recording(&events);
        manager
            .update_interests(handle, Interests::WRITABLE, Some(callback.clone()))
            .unwrap();
        sim.peer_close(socket);
        manager.turn();
        assert_eq!(*events.borrow(), vec![StreamEvent::Writable]);

        manager
            .update_interests(handle, Interests::READABLE, Some(callback))
            .unwrap();
        manager.turn();
        assert_eq!(*events.borrow(), vec![StreamEvent::Writable, StreamEvent::Readable]);

        manager.close(handle);
        assert_eq!(manager.stream_state(handle), None);
    }

    #[test]
    fn orphan_close_starts_quiet_period_once() {
        let (sim, mut manager) = setup();
        let socket = sim.connect(7100).unwrap();
        manager.turn();
        let handle = manager.accept_stream().unwrap();
        manager
            .update_interests(handle, Interests::READABLE, Some(ignore()))
            .unwrap();

        sim.advance(Duration::from_secs(1));
        sim.peer_close(socket);
        manager.turn();
        assert_eq!(manager.stats().last_close_at, Some(Duration::from_secs(1)));

        sim.advance(Duration::from_secs(1));
        manager.close(handle);
        assert_eq!(manager.stats().last_close_at, Some(Duration::from_secs(1)));
        assert_eq!(manager.stats().active_count, 0);
    }

    #[test]
    fn write_to_orphan_is_closed() {
        let (sim, mut manager) = setup();
        let socket = sim.connect(7100).unwrap();
        manager.turn();
        let handle = manager.accept_stream().unwrap();
        manager
            .update_interests(handle, Interests::READABLE, Some(ignore()))
            .unwrap();
        sim.peer_close(socket);
        manager.turn();

        assert_eq!(
            manager.write(handle, b"late"),
            Err(crate::stream::StreamError::Closed)
        );
    }
}
