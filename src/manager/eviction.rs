//! Idle-stream eviction policy.
//!
//! # Policy
//! ```text
//! candidates = active streams whose socket is not already closing
//! victim     = candidate with the oldest last activity
//! evict only if now - victim.last_activity >= min_idle
//! ```
//!
//! The floor protects bursty sessions that are quiet for a moment but still
//! alive. When the oldest candidate is under the floor, every other candidate
//! is too, so nothing is evicted.

use std::time::Duration;

use crate::stream::StreamHandle;

/// An eviction candidate as seen by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub handle: StreamHandle,
    pub last_activity: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
    min_idle: Duration,
}

impl EvictionPolicy {
    pub fn new(min_idle: Duration) -> Self {
        Self { min_idle }
    }

    pub fn min_idle(&self) -> Duration {
        self.min_idle
    }

    /// Pick the stream to evict, if any qualifies.
    pub fn select(
        &self,
        now: Duration,
        candidates: impl IntoIterator<Item = Candidate>,
    ) -> Option<Candidate> {
        let oldest = candidates
            .into_iter()
            .min_by_key(|candidate| candidate.last_activity)?;
        let idle = now.saturating_sub(oldest.last_activity);
        (idle >= self.min_idle).then_some(oldest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamArena;

    fn handles(n: usize) -> Vec<StreamHandle> {
        let mut arena = StreamArena::with_capacity(n);
        (0..n).map(|i| arena.insert(i)).collect()
    }

    fn secs(v: u64) -> Duration {
        Duration::from_secs(v)
    }

    #[test]
    fn picks_oldest_activity() {
        let h = handles(3);
        let policy = EvictionPolicy::new(secs(10));
        let candidates = vec![
            Candidate { handle: h[0], last_activity: secs(50) },
            Candidate { handle: h[1], last_activity: secs(20) },
            Candidate { handle: h[2], last_activity: secs(40) },
        ];
        let victim = policy.select(secs(100), candidates).unwrap();
        assert_eq!(victim.handle, h[1]);
    }

    #[test]
    fn floor_is_inclusive() {
        let h = handles(1);
        let policy = EvictionPolicy::new(secs(10));
        let candidate = Candidate { handle: h[0], last_activity: secs(90) };

        assert_eq!(policy.select(secs(100), [candidate]), Some(candidate));
        assert_eq!(
            policy.select(secs(100) - Duration::from_millis(1), [candidate]),
            None
        );
    }

    #[test]
    fn activity_ahead_of_clock_counts_as_fresh() {
        let h = handles(1);
        let policy = EvictionPolicy::new(Duration::ZERO);
        let candidate = Candidate { handle: h[0], last_activity: secs(8) };
        assert_eq!(policy.select(secs(4), [candidate]), Some(candidate));

        let policy = EvictionPolicy::new(secs(1));
        assert_eq!(policy.select(secs(4), [candidate]), None);
    }

    #[test]
    fn nothing_to_evict_without_candidates() {
        let policy = EvictionPolicy::new(Duration::ZERO);
        assert_eq!(policy.select(secs(5), Vec::new()), None);
    }
}
