//! Manager counters.

use std::time::Duration;

/// Snapshot returned by [`StreamManager::stats`](crate::manager::StreamManager::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub capacity: usize,
    pub pending_count: usize,
    pub active_count: usize,
    /// Connections admitted to the backlog since creation.
    pub accepted_total: u64,
    pub rejected_total: u64,
    pub evicted_total: u64,
    pub orphaned_total: u64,
    pub last_accept_at: Option<Duration>,
    pub last_close_at: Option<Duration>,
}

/// Lifetime totals kept by the manager.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Totals {
    pub accepted: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub orphaned: u64,
}
