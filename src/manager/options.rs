//! Manager construction options.

use std::time::Duration;

use crate::config::ManagerConfig;

/// Tunables of a [`StreamManager`](crate::manager::StreamManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Requested port; `None` takes the next ephemeral port.
    pub port: Option<u16>,
    pub max_concurrent_streams: usize,
    pub max_pending: usize,
    pub min_accept_interval: Duration,
    pub close_quiet_period: Duration,
    pub min_idle: Duration,
    pub max_outbound_bytes: usize,
    pub active_push_delay: Duration,
}

impl ManagerOptions {
    pub fn with_capacity(max_concurrent_streams: usize) -> Self {
        Self {
            max_concurrent_streams,
            ..Self::default()
        }
    }
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from(&ManagerConfig::default())
    }
}

impl From<&ManagerConfig> for ManagerOptions {
    fn from(config: &ManagerConfig) -> Self {
        Self {
            port: (config.listener.port != 0).then_some(config.listener.port),
            max_concurrent_streams: config.listener.max_concurrent_streams,
            max_pending: config.listener.max_pending,
            min_accept_interval: Duration::from_millis(config.admission.min_accept_interval_ms),
            close_quiet_period: Duration::from_millis(config.admission.close_quiet_period_ms),
            min_idle: Duration::from_millis(config.eviction.min_idle_ms),
            max_outbound_bytes: config.io.max_outbound_bytes,
            active_push_delay: Duration::from_millis(config.io.active_push_delay_ms),
        }
    }
}
