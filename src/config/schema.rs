//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the stream
//! manager daemon. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ManagerConfig {
    /// Listener configuration (port, capacity, backlog).
    pub listener: ListenerConfig,

    /// Accept staggering.
    pub admission: AdmissionConfig,

    /// Idle eviction.
    pub eviction: EvictionConfig,

    /// Stream buffering and tick cadence.
    pub io: IoConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Port to listen on. 0 picks the next port from `ephemeral_port_base`.
    pub port: u16,

    /// First port handed out for "any port" listeners.
    pub ephemeral_port_base: u16,

    /// Address listeners bind to (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Maximum concurrently claimed streams.
    pub max_concurrent_streams: usize,

    /// Hard ceiling on accepted-but-unclaimed connections.
    pub max_pending: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            ephemeral_port_base: 9000,
            bind_address: "0.0.0.0".to_string(),
            max_concurrent_streams: 8,
            max_pending: 4,
        }
    }
}

/// Accept staggering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Minimum time between two offers in milliseconds.
    pub min_accept_interval_ms: u64,

    /// Quiet period after any stream close in milliseconds.
    pub close_quiet_period_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_accept_interval_ms: 100,
            close_quiet_period_ms: 500,
        }
    }
}

/// Idle eviction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvictionConfig {
    /// Streams idle for less than this are never evicted.
    pub min_idle_ms: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self { min_idle_ms: 10_000 }
    }
}

/// Stream I/O configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IoConfig {
    /// Outbound buffer cap per stream; writes beyond it return Busy.
    pub max_outbound_bytes: usize,

    /// Inbound buffer cap per connection (TCP runtime).
    pub max_inbound_bytes: usize,

    /// Delay of the follow-up tick after a partial read in milliseconds.
    pub active_push_delay_ms: u64,

    /// Event-loop tick interval in milliseconds (daemon driver).
    pub tick_interval_ms: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_outbound_bytes: 1024,
            max_inbound_bytes: 4096,
            active_push_delay_ms: 10,
            tick_interval_ms: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: ManagerConfig = toml::from_str(
            r#"
            [listener]
            port = 8080
            max_concurrent_streams = 2

            [eviction]
            min_idle_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.listener.max_concurrent_streams, 2);
        assert_eq!(config.listener.max_pending, 4);
        assert_eq!(config.eviction.min_idle_ms, 250);
        assert_eq!(config.io.max_outbound_bytes, 1024);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn empty_config_is_default() {
        let config: ManagerConfig = toml::from_str("").unwrap();
        assert_eq!(config.admission.min_accept_interval_ms, 100);
        assert_eq!(config.admission.close_quiet_period_ms, 500);
        assert_eq!(config.listener.ephemeral_port_base, 9000);
    }
}
