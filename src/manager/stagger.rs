//! Accept staggering.
//!
//! Offers are spaced by a minimum inter-accept interval, and no offer is made
//! during a quiet period after any stream closes. This gives consumer-side
//! session teardown a chance to run before a new session is built on top of
//! the same memory budget.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AcceptStagger {
    min_accept_interval: Duration,
    close_quiet_period: Duration,
    last_accept: Option<Duration>,
    last_close: Option<Duration>,
}

impl AcceptStagger {
    pub fn new(min_accept_interval: Duration, close_quiet_period: Duration) -> Self {
        Self {
            min_accept_interval,
            close_quiet_period,
            last_accept: None,
            last_close: None,
        }
    }

    pub fn may_offer(&self, now: Duration) -> bool {
        let accept_ok = self
            .last_accept
            .map_or(true, |at| now.saturating_sub(at) >= self.min_accept_interval);
        let close_ok = self
            .last_close
            .map_or(true, |at| now.saturating_sub(at) >= self.close_quiet_period);
        accept_ok && close_ok
    }

    pub fn record_offer(&mut self, now: Duration) {
        self.last_accept = Some(now);
    }

    pub fn record_close(&mut self, now: Duration) {
        self.last_close = Some(now);
    }

    pub fn last_accept(&self) -> Option<Duration> {
        self.last_accept
    }

    pub fn last_close(&self) -> Option<Duration> {
        self.last_close
    }
}
