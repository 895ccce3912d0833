//! Remembers which non-player entities were recently sent in full.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Entity id to the last time it appeared in a frame.
///
/// Shared between the frame path and the connection listener, which clears
/// it so a new consumer receives full records.
#[derive(Debug)]
pub struct MobSendCache {
    sent: DashMap<i32, Instant>,
    ttl: Duration,
    cleanup_interval: Duration,
    last_cleanup: Mutex<Option<Instant>>,
}

impl MobSendCache {
    /// Entries unseen for longer than `ttl` expire; expiry sweeps run at most
    /// once per `cleanup_interval`.
    pub fn new(ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            sent: DashMap::new(),
            ttl,
            cleanup_interval,
            last_cleanup: Mutex::new(None),
        }
    }

    /// Record a send of `id` at `now`. Returns `true` when the entity was
    /// already known and unexpired, i.e. a position-only record suffices.
    pub fn touch(&self, id: i32, now: Instant) -> bool {
        let previous = self.sent.insert(id, now);
        previous.is_some_and(|seen| now.saturating_duration_since(seen) <= self.ttl)
    }

    /// Whether `id` would get a position-only record at `now`.
    pub fn is_fresh(&self, id: i32, now: Instant) -> bool {
        self.sent
            .get(&id)
            .is_some_and(|seen| now.saturating_duration_since(*seen) <= self.ttl)
    }

    /// Drop expired entries if the last sweep is older than the cleanup
    /// interval. Returns the number of entries removed.
    pub fn maybe_cleanup(&self, now: Instant) -> usize {
        {
            let mut last = self.last_cleanup.lock();
            if let Some(at) = *last
                && now.saturating_duration_since(at) <= self.cleanup_interval
            {
                return 0;
            }
            *last = Some(now);
        }
        let before = self.sent.len();
        self.sent
            .retain(|_, seen| now.saturating_duration_since(*seen) <= self.ttl);
        let removed = before.saturating_sub(self.sent.len());
        if removed > 0 {
            tracing::trace!("Expired {removed} mob cache entries");
        }
        removed
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.sent.clear();
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MobSendCache {
        MobSendCache::new(Duration::from_secs(5), Duration::from_secs(1))
    }

    #[test]
    fn test_first_touch_is_not_fresh() {
        let cache = cache();
        let now = Instant::now();
        assert!(!cache.touch(7, now));
        assert!(cache.touch(7, now + Duration::from_millis(16)));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache = cache();
        let t0 = Instant::now();
        cache.touch(7, t0);
        assert!(cache.is_fresh(7, t0 + Duration::from_secs(5)));
        assert!(!cache.touch(7, t0 + Duration::from_secs(6)));
    }

    #[test]
    fn test_cleanup_rate_limited() {
        let cache = cache();
        let t0 = Instant::now();
        cache.touch(1, t0);
        cache.touch(2, t0 + Duration::from_secs(4));

        assert_eq!(cache.maybe_cleanup(t0 + Duration::from_secs(6)), 1);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.maybe_cleanup(t0 + Duration::from_millis(6500)), 0);
        assert_eq!(cache.maybe_cleanup(t0 + Duration::from_secs(10)), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = cache();
        let now = Instant::now();
        cache.touch(1, now);
        cache.clear();
        assert!(!cache.touch(1, now));
    }
}
