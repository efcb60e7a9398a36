// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Age-out cache for destinations that are not (yet) confirmed group
//! members (§3 "Age-out cache", §4.4 step 2).
//!
//! Registered the first time an outbound message targets a non-member
//! address; if membership is never confirmed before `ttl` elapses, the
//! caller tears down both windows for that peer.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::PeerAddress;

/// Opaque `Address -> deadline` map with a fixed time-to-live.
pub struct AgeOutCache<A: PeerAddress> {
    deadlines: DashMap<A, Instant>,
    ttl: Duration,
}

impl<A: PeerAddress> AgeOutCache<A> {
    /// `ttl == Duration::ZERO` disables age-out entirely (§6.3
    /// `max_retransmit_time`, `0` = off); callers should avoid calling
    /// [`AgeOutCache::register`] in that case, but `sweep_expired` is a
    /// harmless no-op either way since nothing will ever be registered.
    pub fn new(ttl: Duration) -> Self {
        Self {
            deadlines: DashMap::new(),
            ttl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl > Duration::ZERO
    }

    /// Register `addr` if it isn't already tracked (first-writer-wins, so
    /// a burst of outbound messages to the same unconfirmed peer doesn't
    /// keep pushing the deadline back).
    pub fn register(&self, addr: A) {
        if !self.is_enabled() {
            return;
        }
        self.deadlines
            .entry(addr)
            .or_insert_with(|| Instant::now() + self.ttl);
    }

    /// Membership confirmed (or peer no longer relevant): stop tracking.
    pub fn confirm(&self, addr: &A) {
        self.deadlines.remove(addr);
    }

    /// Remove and return every address whose deadline has passed.
    pub fn sweep_expired(&self) -> Vec<A> {
        let now = Instant::now();
        let expired: Vec<A> = self
            .deadlines
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| entry.key().clone())
            .collect();
        for addr in &expired {
            self.deadlines.remove(addr);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_cache_never_expires() {
        let cache: AgeOutCache<u32> = AgeOutCache::new(Duration::ZERO);
        cache.register(1);
        assert!(cache.is_empty());
        assert!(cache.sweep_expired().is_empty());
    }

    #[test]
    fn first_writer_wins_on_register() {
        let cache: AgeOutCache<u32> = AgeOutCache::new(Duration::from_secs(60));
        cache.register(1);
        cache.register(1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn confirm_removes_tracking() {
        let cache: AgeOutCache<u32> = AgeOutCache::new(Duration::from_secs(60));
        cache.register(1);
        cache.confirm(&1);
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_expired_only_returns_past_deadlines() {
        let cache: AgeOutCache<u32> = AgeOutCache::new(Duration::from_millis(10));
        cache.register(1);
        assert!(cache.sweep_expired().is_empty(), "not yet expired");
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.sweep_expired(), vec![1]);
        assert!(cache.is_empty(), "expired entry was removed");
    }
}
