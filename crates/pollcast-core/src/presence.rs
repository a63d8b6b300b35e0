// ── Presence tracker ──
//
// Visitor id → last seen. Joins and leaves report the new count so the
// caller can broadcast it; the periodic sweep evicts everyone older than
// the TTL in one batch.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Default visitor TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug)]
pub struct PresenceTracker {
    ttl: Duration,
    seen: HashMap<String, Instant>,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl PresenceTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    /// Insert or refresh a visitor. Returns the new count.
    pub fn join(&mut self, visitor_id: &str, now: Instant) -> usize {
        self.seen.insert(visitor_id.to_owned(), now);
        self.seen.len()
    }

    /// Remove a visitor if present. Returns the new count.
    pub fn leave(&mut self, visitor_id: &str) -> usize {
        self.seen.remove(visitor_id);
        self.seen.len()
    }

    /// Evict every visitor last seen more than the TTL before `now`.
    /// Returns the evicted ids.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let ttl = self.ttl;
        let mut evicted = Vec::new();
        self.seen.retain(|id, last_seen| {
            let expired = now.saturating_duration_since(*last_seen) > ttl;
            if expired {
                evicted.push(id.clone());
            }
            !expired
        });
        evicted.sort_unstable();
        evicted
    }

    pub fn count(&self) -> usize {
        self.seen.len()
    }

    pub fn contains(&self, visitor_id: &str) -> bool {
        self.seen.contains_key(visitor_id)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_leave_report_counts() {
        let mut presence = PresenceTracker::default();
        let now = Instant::now();

        assert_eq!(presence.join("a", now), 1);
        assert_eq!(presence.join("b", now), 2);
        assert_eq!(presence.join("a", now), 2);
        assert_eq!(presence.leave("a"), 1);
        assert_eq!(presence.leave("a"), 1);
        assert!(presence.contains("b"));
    }

    #[test]
    fn sweep_evicts_only_expired() {
        let ttl = Duration::from_secs(60);
        let mut presence = PresenceTracker::new(ttl);
        let start = Instant::now();

        presence.join("old-1", start);
        presence.join("old-2", start);
        presence.join("fresh", start + Duration::from_secs(30));

        assert!(presence.sweep(start + ttl).is_empty());

        let evicted = presence.sweep(start + ttl + Duration::from_secs(1));
        assert_eq!(evicted, vec!["old-1".to_string(), "old-2".to_string()]);
        assert_eq!(presence.count(), 1);
    }

    #[test]
    fn refresh_extends_lifetime() {
        let ttl = Duration::from_secs(10);
        let mut presence = PresenceTracker::new(ttl);
        let start = Instant::now();

        presence.join("v", start);
        presence.join("v", start + Duration::from_secs(8));

        assert!(presence.sweep(start + Duration::from_secs(15)).is_empty());
        assert_eq!(presence.count(), 1);
    }
}
