//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! StreamManager lifecycle edges (admit, reject, offer, claim, evict, orphan, close)
//!     → tracing events with `socket` / `stream` fields
//!     → metrics.rs counters and occupancy gauges
//!
//! Consumers:
//!     → stdout via tracing-subscriber (logging.rs)
//!     → Prometheus scrape endpoint (daemon only)
//! ```

pub mod logging;
pub mod metrics;
